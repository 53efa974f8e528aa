//! Ingestion pipeline.
//!
//! Turns a document's parsed text into everything search needs: the
//! keyword record and, when dense retrieval is configured, one vector per
//! passage. Runs are serialized per document name so two ingests of the
//! same document never interleave their writes; different documents
//! proceed independently.
//!
//! Dense failures are non-fatal: the keyword record is still written and
//! the report carries the error, so search degrades to keyword-only for
//! that document.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use docsearch_core::chunk::split_passages;
use docsearch_core::dense::DenseRetrieval;
use docsearch_core::documents::DocumentStore;
use docsearch_core::index_store::KeywordIndexStore;
use docsearch_core::keyword;
use docsearch_core::DocumentName;

/// What one ingest run wrote.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document: DocumentName,
    /// Distinct terms in the keyword record.
    pub terms: usize,
    /// Token count of the parsed text.
    pub length: u32,
    pub content_hash: String,
    pub passages: usize,
    pub vector_ids: Vec<String>,
    pub dense_indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_error: Option<String>,
}

/// What a removal found and deleted.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RemovedIndexes {
    pub keyword_record: bool,
    pub vectors: bool,
}

#[derive(Clone)]
pub struct Ingestor {
    documents: DocumentStore,
    keywords: KeywordIndexStore,
    dense: Option<DenseRetrieval>,
    max_tokens: usize,
    locks: Arc<Mutex<HashMap<DocumentName, Arc<Mutex<()>>>>>,
}

impl Ingestor {
    pub fn new(
        documents: DocumentStore,
        keywords: KeywordIndexStore,
        dense: Option<DenseRetrieval>,
        max_tokens: usize,
    ) -> Self {
        Self {
            documents,
            keywords,
            dense,
            max_tokens,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lock_for(&self, document: &DocumentName) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // Drop entries nobody else holds so the table stays bounded.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(document.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Index the current parsed text of `document`.
    ///
    /// Fails with `DocumentNotParsed` when only the upload exists and
    /// `EmptyDocument` when the text has no tokens.
    pub async fn ingest(&self, document: &DocumentName) -> Result<IngestReport> {
        let lock = self.lock_for(document).await;
        let _guard = lock.lock().await;

        let text = self.documents.read_parsed(document).await?;
        let record = keyword::build(document, &text)?;

        let unchanged = matches!(
            self.keywords.load(document).await,
            Ok(Some(ref existing)) if *existing == record
        );
        if !unchanged {
            self.keywords.save(&record).await?;
        }

        let passages = split_passages(document, &text, self.max_tokens);
        let passage_count = passages.len();

        let mut report = IngestReport {
            document: document.clone(),
            terms: record.term_counts.len(),
            length: record.length,
            content_hash: record.content_hash.clone(),
            passages: passage_count,
            vector_ids: Vec::new(),
            dense_indexed: false,
            dense_error: None,
        };

        if let Some(dense) = &self.dense {
            match dense.index_passages(document, passages).await {
                Ok(ids) => {
                    report.vector_ids = ids;
                    report.dense_indexed = true;
                }
                Err(e) => {
                    warn!(document = %document, error = %e, "dense indexing failed, keyword record kept");
                    report.dense_error = Some(e.to_string());
                }
            }
        }

        info!(
            document = %document,
            terms = report.terms,
            passages = passage_count,
            dense = report.dense_indexed,
            record_rewritten = !unchanged,
            "ingested"
        );
        Ok(report)
    }

    /// Remove the keyword record and vectors of `document`. Absent parts
    /// are not an error; a vector-index failure is logged and reported.
    pub async fn remove(&self, document: &DocumentName) -> Result<RemovedIndexes> {
        let lock = self.lock_for(document).await;
        let _guard = lock.lock().await;

        let keyword_record = self.keywords.delete(document).await?;
        let vectors = match &self.dense {
            Some(dense) => match dense.index.delete_document(document).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(document = %document, error = %e, "failed to delete vectors");
                    false
                }
            },
            None => false,
        };
        Ok(RemovedIndexes {
            keyword_record,
            vectors,
        })
    }
}
