//! Hybrid retrieval engine: BM25 over persisted keyword records fused with
//! vector similarity.
//!
//! # Query pipeline
//!
//! Each call to [`HybridSearcher::search`] walks the same phases
//! ([`SearchPhase`]), logged at `debug` level:
//!
//! 1. **LoadingIndex**: load every keyword record from storage and merge
//!    them into a [`MergedKeywordIndex`]. Corrupt records are skipped.
//! 2. **ScoringSparse**: BM25-score every document against the query.
//!    Zero-score documents are not candidates.
//! 3. **QueryingDense**: embed the query and fetch
//!    `max(candidate_k_vector, top_k × 4)` nearest passages, with the
//!    document filter forwarded. Passages are grouped per document by MAX.
//! 4. **Fusing**: min-max normalize each signal to `[0, 1]`, then
//!    `score = (1 - α) × keyword + α × dense`. A document missing from one
//!    signal gets 0 for it.
//! 5. Sort by score (desc), then document name (asc); truncate to `top_k`.
//!
//! # Degradation
//!
//! The dense signal failing (network, timeout, vendor error) never fails
//! the query: α drops to 0 and the outcome is [`SearchStatus::Partial`].
//! Likewise an unlistable keyword store gives α = 1. With no dense backend
//! configured the engine is keyword-only and still reports `Complete`.
//!
//! Nothing is cached between queries; a record saved by an ingest that
//! finished before the query started is always visible.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::dense::{DenseRetrieval, VectorHit};
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::index_store::KeywordIndexStore;
use crate::keyword::{Bm25Params, MergedKeywordIndex};
use crate::models::DocumentName;
use crate::tokenize::tokenize;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Dense weight: `score = (1-α)*keyword + α*dense`.
    pub hybrid_alpha: f64,
    pub bm25: Bm25Params,
    /// Minimum number of passages to request from the vector index.
    pub candidate_k_vector: usize,
    /// Maximum characters of a passage selected from parsed text.
    pub passage_chars: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            hybrid_alpha: 0.3,
            bm25: Bm25Params::default(),
            candidate_k_vector: 20,
            passage_chars: 480,
        }
    }
}

/// A validated query.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    query: String,
    top_k: usize,
    allowed_documents: Option<Vec<DocumentName>>,
    debug: bool,
}

impl SearchRequest {
    /// Fails with [`Error::InvalidRequest`] for a blank query or a `top_k`
    /// outside `1..=max_top_k`.
    pub fn new(query: &str, top_k: usize, max_top_k: usize) -> Result<Self> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::invalid("query must not be empty"));
        }
        if top_k == 0 || top_k > max_top_k {
            return Err(Error::invalid(format!(
                "top_k must be between 1 and {}, got {}",
                max_top_k, top_k
            )));
        }
        Ok(Self {
            query: query.to_string(),
            top_k,
            allowed_documents: None,
            debug: false,
        })
    }

    /// Restrict results to `documents`. An empty list means no restriction.
    pub fn with_documents(mut self, mut documents: Vec<DocumentName>) -> Self {
        documents.sort();
        documents.dedup();
        self.allowed_documents = (!documents.is_empty()).then_some(documents);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn allowed_documents(&self) -> Option<&[DocumentName]> {
        self.allowed_documents.as_deref()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    fn allows(&self, document: &DocumentName) -> bool {
        match &self.allowed_documents {
            Some(allowed) => allowed.binary_search(document).is_ok(),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Complete,
    /// One signal was unavailable; results come from the other.
    Partial,
    NoResults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    LoadingIndex,
    ScoringSparse,
    QueryingDense,
    Fusing,
    Done,
}

impl SearchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchPhase::Idle => "idle",
            SearchPhase::LoadingIndex => "loading_index",
            SearchPhase::ScoringSparse => "scoring_sparse",
            SearchPhase::QueryingDense => "querying_dense",
            SearchPhase::Fusing => "fusing",
            SearchPhase::Done => "done",
        }
    }
}

/// Normalized per-signal scores of one result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Signals {
    pub keyword: f64,
    pub dense: f64,
}

/// Raw and normalized scores, populated when the request asks for debug.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub keyword_raw: Option<f64>,
    pub keyword_normalized: f64,
    pub dense_raw: Option<f64>,
    pub dense_normalized: f64,
    pub alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResultItem {
    pub document: DocumentName,
    /// Fused score in `[0.0, 1.0]`.
    pub score: f64,
    /// Best-matching passage text.
    pub passage: String,
    pub signals: Signals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreBreakdown>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub records_loaded: usize,
    pub records_skipped: usize,
    pub corpus_terms: usize,
    pub keyword_candidates: usize,
    pub dense_enabled: bool,
    pub dense_passages: usize,
    pub dense_candidates: usize,
    pub alpha_effective: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub results: Vec<QueryResultItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

/// The retrieval engine. Cheap to clone; holds only store handles.
#[derive(Clone)]
pub struct HybridSearcher {
    keywords: KeywordIndexStore,
    documents: DocumentStore,
    dense: Option<DenseRetrieval>,
    params: SearchParams,
}

struct Fused {
    document: DocumentName,
    keyword_raw: Option<f64>,
    keyword: f64,
    dense_raw: Option<f64>,
    dense: f64,
    passage: Option<String>,
    score: f64,
}

impl HybridSearcher {
    pub fn new(
        keywords: KeywordIndexStore,
        documents: DocumentStore,
        dense: Option<DenseRetrieval>,
        params: SearchParams,
    ) -> Self {
        Self {
            keywords,
            documents,
            dense,
            params,
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub async fn search(&self, req: &SearchRequest) -> Result<SearchOutcome> {
        let mut diag = Diagnostics {
            dense_enabled: self.dense.is_some(),
            ..Diagnostics::default()
        };
        enter(SearchPhase::Idle);

        enter(SearchPhase::LoadingIndex);
        let index = match self.keywords.load_all().await {
            Ok(loaded) => {
                diag.records_loaded = loaded.records.len();
                diag.records_skipped = loaded.skipped.len();
                MergedKeywordIndex::from_records(loaded.records)
            }
            Err(e) => {
                warn!(error = %e, "keyword index unavailable, continuing dense-only");
                diag.keyword_error = Some(e.to_string());
                MergedKeywordIndex::default()
            }
        };
        diag.corpus_terms = index.term_count();

        enter(SearchPhase::ScoringSparse);
        let sparse: Vec<(DocumentName, f64)> = index
            .score(req.query(), self.params.bm25)
            .into_iter()
            .filter(|(doc, _)| req.allows(doc))
            .collect();
        diag.keyword_candidates = sparse.len();

        enter(SearchPhase::QueryingDense);
        let dense_docs = match &self.dense {
            Some(dense) => {
                let top_n = self.params.candidate_k_vector.max(req.top_k() * 4);
                match dense
                    .search(req.query(), top_n, req.allowed_documents())
                    .await
                {
                    Ok(hits) => {
                        diag.dense_passages = hits.len();
                        best_passage_per_document(hits, req)
                    }
                    Err(e) => {
                        warn!(error = %e, "dense retrieval failed, continuing keyword-only");
                        diag.dense_error = Some(e.to_string());
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };
        diag.dense_candidates = dense_docs.len();

        enter(SearchPhase::Fusing);
        let dense_ok = self.dense.is_some() && diag.dense_error.is_none();
        let keyword_ok = diag.keyword_error.is_none() && !index.is_empty();
        let alpha = if !dense_ok {
            0.0
        } else if !keyword_ok {
            1.0
        } else {
            self.params.hybrid_alpha
        };
        diag.alpha_effective = alpha;

        let mut fused = fuse(&sparse, &dense_docs, alpha);
        fused.truncate(req.top_k());

        let terms: HashSet<String> = tokenize(req.query()).into_iter().collect();
        let mut results = Vec::with_capacity(fused.len());
        for item in fused {
            let passage = match item.passage {
                Some(p) => p,
                None => self.passage_from_text(&item.document, &terms).await,
            };
            let explain = req.debug().then(|| ScoreBreakdown {
                keyword_raw: item.keyword_raw,
                keyword_normalized: item.keyword,
                dense_raw: item.dense_raw,
                dense_normalized: item.dense,
                alpha,
            });
            results.push(QueryResultItem {
                document: item.document,
                score: item.score,
                passage,
                signals: Signals {
                    keyword: item.keyword,
                    dense: item.dense,
                },
                explain,
            });
        }

        let degraded = diag.dense_error.is_some() || diag.keyword_error.is_some();
        let status = if degraded {
            SearchStatus::Partial
        } else if results.is_empty() {
            SearchStatus::NoResults
        } else {
            SearchStatus::Complete
        };

        enter(SearchPhase::Done);
        debug!(
            status = ?status,
            results = results.len(),
            alpha,
            keyword_candidates = diag.keyword_candidates,
            dense_candidates = diag.dense_candidates,
            "search finished"
        );

        Ok(SearchOutcome {
            status,
            results,
            diagnostics: req.debug().then_some(diag),
        })
    }

    async fn passage_from_text(&self, document: &DocumentName, terms: &HashSet<String>) -> String {
        match self.documents.read_parsed(document).await {
            Ok(text) => best_paragraph(&text, terms, self.params.passage_chars),
            Err(e) => {
                debug!(document = %document, error = %e, "no parsed text for passage");
                String::new()
            }
        }
    }
}

fn enter(phase: SearchPhase) {
    debug!(phase = phase.as_str(), "search phase");
}

/// Group hits by document, keeping each document's best passage.
fn best_passage_per_document(hits: Vec<VectorHit>, req: &SearchRequest) -> Vec<VectorHit> {
    let mut best: BTreeMap<DocumentName, VectorHit> = BTreeMap::new();
    for hit in hits.into_iter().filter(|h| req.allows(&h.document)) {
        match best.get(&hit.document) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.document.clone(), hit);
            }
        }
    }
    best.into_values().collect()
}

fn fuse(sparse: &[(DocumentName, f64)], dense: &[VectorHit], alpha: f64) -> Vec<Fused> {
    let sparse_raw: Vec<f64> = sparse.iter().map(|(_, s)| *s).collect();
    let dense_raw: Vec<f64> = dense.iter().map(|h| h.score).collect();
    let sparse_norm = normalize_scores(&sparse_raw);
    let dense_norm = normalize_scores(&dense_raw);

    let mut by_doc: BTreeMap<&DocumentName, Fused> = BTreeMap::new();
    for ((doc, raw), norm) in sparse.iter().zip(sparse_norm) {
        by_doc.insert(
            doc,
            Fused {
                document: doc.clone(),
                keyword_raw: Some(*raw),
                keyword: norm,
                dense_raw: None,
                dense: 0.0,
                passage: None,
                score: 0.0,
            },
        );
    }
    for (hit, norm) in dense.iter().zip(dense_norm) {
        let entry = by_doc.entry(&hit.document).or_insert_with(|| Fused {
            document: hit.document.clone(),
            keyword_raw: None,
            keyword: 0.0,
            dense_raw: None,
            dense: 0.0,
            passage: None,
            score: 0.0,
        });
        entry.dense_raw = Some(hit.score);
        entry.dense = norm;
        entry.passage = Some(hit.text.clone());
    }

    let mut fused: Vec<Fused> = by_doc
        .into_values()
        .map(|mut f| {
            f.score = (1.0 - alpha) * f.keyword + alpha * f.dense;
            f
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document.cmp(&b.document))
    });
    fused
}

/// Min-max normalize raw scores to `[0.0, 1.0]`.
///
/// If all scores are equal, they are normalized to `1.0`.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let s_min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    scores
        .iter()
        .map(|s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

/// Pick the paragraph with the most query-term hits (first wins ties),
/// falling back to the first paragraph, cut to `max_chars` characters.
pub fn best_paragraph(text: &str, terms: &HashSet<String>, max_chars: usize) -> String {
    let mut best: Option<(&str, usize)> = None;
    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let hits = tokenize(para).iter().filter(|t| terms.contains(*t)).count();
        if best.map_or(true, |(_, h)| hits > h) {
            best = Some((para, hits));
        }
    }
    match best {
        Some((para, _)) => para.chars().take(max_chars).collect::<String>().trim_end().to_string(),
        None => String::new(),
    }
}
