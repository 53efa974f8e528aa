//! Per-document keyword records and the corpus-wide BM25 scorer.
//!
//! A [`KeywordIndexRecord`] holds only what one document knows about
//! itself: raw term counts and its length in tokens. Corpus statistics
//! (document frequency, average length) depend on every other document,
//! so they are recomputed whenever records are merged into a
//! [`MergedKeywordIndex`].
//!
//! # Scoring
//!
//! ```text
//! idf(t)      = ln(1 + (N - df(t) + 0.5) / (df(t) + 0.5))
//! score(d, q) = Σ_t∈q idf(t) · tf(t,d)·(k1 + 1) / (tf(t,d) + k1·(1 - b + b·|d|/avgdl))
//! ```
//!
//! The `1 +` inside the logarithm keeps idf positive even for a term that
//! appears in every document, so a one-document corpus still ranks.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::DocumentName;
use crate::tokenize::tokenize;

/// Serialized record layout version.
pub const RECORD_VERSION: u32 = 1;

/// Term statistics for a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordIndexRecord {
    pub version: u32,
    pub document: DocumentName,
    /// Raw occurrence count per term. Ordered so serialization is stable.
    pub term_counts: BTreeMap<String, u32>,
    /// Number of tokens in the document.
    pub length: u32,
    /// SHA-256 (hex) of the text the record was built from.
    pub content_hash: String,
}

impl KeywordIndexRecord {
    /// Weight of `term` in this document: its raw count, `0` if absent.
    pub fn weight(&self, term: &str) -> u32 {
        self.term_counts.get(term).copied().unwrap_or(0)
    }

    /// Sum of all term weights. Equals [`length`](Self::length).
    pub fn total_weight(&self) -> u64 {
        self.term_counts.values().map(|&c| c as u64).sum()
    }
}

/// Build the keyword record for one document.
///
/// Fails with [`Error::EmptyDocument`] when the text yields no tokens;
/// callers skip ingestion in that case.
pub fn build(document: &DocumentName, text: &str) -> Result<KeywordIndexRecord> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Err(Error::EmptyDocument(document.to_string()));
    }

    let mut term_counts: BTreeMap<String, u32> = BTreeMap::new();
    for token in &tokens {
        *term_counts.entry(token.clone()).or_insert(0) += 1;
    }

    Ok(KeywordIndexRecord {
        version: RECORD_VERSION,
        document: document.clone(),
        term_counts,
        length: tokens.len() as u32,
        content_hash: content_hash(text),
    })
}

/// SHA-256 hex digest of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// BM25 tuning constants. Fixed configuration, never derived from data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization, in `[0, 1]`.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Corpus-wide scorer built from a snapshot of keyword records.
///
/// Reflects exactly the records it was built from; it is never updated in
/// place. Build a new one per query.
#[derive(Debug, Default)]
pub struct MergedKeywordIndex {
    docs: Vec<KeywordIndexRecord>,
    doc_freq: HashMap<String, u32>,
    avg_len: f64,
}

impl MergedKeywordIndex {
    /// Merge records into one index.
    ///
    /// If the same document appears more than once, the later record wins.
    pub fn from_records(records: Vec<KeywordIndexRecord>) -> Self {
        let mut by_name: BTreeMap<DocumentName, KeywordIndexRecord> = BTreeMap::new();
        for record in records {
            by_name.insert(record.document.clone(), record);
        }
        let docs: Vec<KeywordIndexRecord> = by_name.into_values().collect();

        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0u64;
        for doc in &docs {
            total_len += doc.length as u64;
            for term in doc.term_counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Self {
            docs,
            doc_freq,
            avg_len,
        }
    }

    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Distinct terms across the corpus.
    pub fn term_count(&self) -> usize {
        self.doc_freq.len()
    }

    pub fn avg_document_length(&self) -> f64 {
        self.avg_len
    }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    pub fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.document_frequency(term) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// BM25 score of every document against `query`.
    ///
    /// Documents sharing no term with the query are omitted. Repeated query
    /// terms count once. Output is ordered by score descending, then name.
    pub fn score(&self, query: &str, params: Bm25Params) -> Vec<(DocumentName, f64)> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let idfs: Vec<(&str, f64)> = terms
            .iter()
            .filter(|t| self.doc_freq.contains_key(t.as_str()))
            .map(|t| (t.as_str(), self.idf(t)))
            .collect();
        if idfs.is_empty() {
            return Vec::new();
        }

        let avg_len = self.avg_len.max(1.0);
        let mut scored: Vec<(DocumentName, f64)> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let len_norm = 1.0 - params.b + params.b * doc.length as f64 / avg_len;
                let score: f64 = idfs
                    .iter()
                    .map(|(term, idf)| {
                        let tf = doc.weight(term) as f64;
                        if tf == 0.0 {
                            0.0
                        } else {
                            idf * tf * (params.k1 + 1.0) / (tf + params.k1 * len_norm)
                        }
                    })
                    .sum();
                (score > 0.0).then(|| (doc.document.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DocumentName {
        DocumentName::new(s).unwrap()
    }

    #[test]
    fn test_build_counts_terms() {
        let rec = build(&name("a.md"), "Invoice invoice, INVOICE and a contract.").unwrap();
        assert_eq!(rec.weight("invoice"), 3);
        assert_eq!(rec.weight("contract"), 1);
        assert_eq!(rec.weight("missing"), 0);
        assert_eq!(rec.length, 6);
        assert_eq!(rec.total_weight(), 6);
        assert_eq!(rec.version, RECORD_VERSION);
    }

    #[test]
    fn test_build_empty_fails() {
        for text in ["", "   \n\t", "--- !!! ..."] {
            let err = build(&name("e.md"), text).unwrap_err();
            assert!(matches!(err, Error::EmptyDocument(ref n) if n == "e.md"));
        }
    }

    #[test]
    fn test_repeating_a_term_never_decreases_weight() {
        let mut text = String::from("alpha beta");
        let mut last = build(&name("a"), &text).unwrap();
        for _ in 0..5 {
            text.push_str(" alpha");
            let next = build(&name("a"), &text).unwrap();
            assert!(next.weight("alpha") > last.weight("alpha"));
            assert!(next.weight("beta") >= last.weight("beta"));
            assert!(next.total_weight() > last.total_weight());
            last = next;
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = build(&name("a"), "one two two three").unwrap();
        let b = build(&name("a"), "one two two three").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_merge_statistics() {
        let idx = MergedKeywordIndex::from_records(vec![
            build(&name("a"), "apple banana apple").unwrap(),
            build(&name("b"), "banana cherry").unwrap(),
        ]);
        assert_eq!(idx.document_count(), 2);
        assert_eq!(idx.term_count(), 3);
        assert_eq!(idx.document_frequency("banana"), 2);
        assert_eq!(idx.document_frequency("apple"), 1);
        assert!((idx.avg_document_length() - 2.5).abs() < 1e-9);
        assert!(idx.idf("apple") > idx.idf("banana"));
        assert!(idx.idf("banana") > 0.0);
    }

    #[test]
    fn test_merge_later_record_wins() {
        let idx = MergedKeywordIndex::from_records(vec![
            build(&name("a"), "old words").unwrap(),
            build(&name("a"), "fresh words").unwrap(),
        ]);
        assert_eq!(idx.document_count(), 1);
        assert_eq!(idx.document_frequency("old"), 0);
        assert_eq!(idx.document_frequency("fresh"), 1);
    }

    #[test]
    fn test_invoice_scenario() {
        let idx = MergedKeywordIndex::from_records(vec![
            build(
                &name("A"),
                "invoice invoice invoice invoice invoice for services",
            )
            .unwrap(),
            build(&name("B"), "invoice attached to the contract contract contract").unwrap(),
        ]);
        let scores = idx.score("invoice", Bm25Params::default());
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].0.as_str(), "A");
        assert_eq!(scores[1].0.as_str(), "B");
        assert!(scores[0].1 > scores[1].1);
    }

    #[test]
    fn test_score_omits_non_matching() {
        let idx = MergedKeywordIndex::from_records(vec![
            build(&name("a"), "rust cargo crates").unwrap(),
            build(&name("b"), "python pip wheels").unwrap(),
        ]);
        let scores = idx.score("cargo", Bm25Params::default());
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].0.as_str(), "a");
        assert!(idx.score("golang", Bm25Params::default()).is_empty());
        assert!(idx.score("  ", Bm25Params::default()).is_empty());
    }

    #[test]
    fn test_single_document_corpus_still_scores() {
        let idx = MergedKeywordIndex::from_records(vec![build(&name("only"), "lonely term").unwrap()]);
        let scores = idx.score("term", Bm25Params::default());
        assert_eq!(scores.len(), 1);
        assert!(scores[0].1 > 0.0);
    }

    #[test]
    fn test_length_normalization() {
        let idx = MergedKeywordIndex::from_records(vec![
            build(&name("short"), "deploy now").unwrap(),
            build(
                &name("long"),
                "deploy now with many more unrelated words padding this document out",
            )
            .unwrap(),
        ]);
        let scores = idx.score("deploy", Bm25Params::default());
        assert_eq!(scores[0].0.as_str(), "short");

        let flat = idx.score("deploy", Bm25Params { k1: 1.2, b: 0.0 });
        assert!((flat[0].1 - flat[1].1).abs() < 1e-9);
        // Equal scores fall back to name order.
        assert_eq!(flat[0].0.as_str(), "long");
    }

    #[test]
    fn test_empty_index() {
        let idx = MergedKeywordIndex::from_records(Vec::new());
        assert!(idx.is_empty());
        assert!(idx.score("anything", Bm25Params::default()).is_empty());
    }
}
