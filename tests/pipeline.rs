//! End-to-end retrieval behaviour over in-memory backends.

use std::sync::Arc;

use async_trait::async_trait;

use docsearch::config::Config;
use docsearch::parser::LocalParser;
use docsearch::services::{SearchQuery, Services};
use docsearch_core::dense::hashing::HashingEmbedder;
use docsearch_core::dense::memory::InMemoryVectorIndex;
use docsearch_core::dense::{DenseRetrieval, Embedder};
use docsearch_core::error::Error;
use docsearch_core::search::SearchStatus;
use docsearch_core::storage::memory::InMemoryBlobStore;
use docsearch_core::storage::{BlobStore, KEYWORD_INDEXES};

/// Embeds documents fine but fails every query-time call after `arm()`.
struct FlakyEmbedder {
    inner: HashingEmbedder,
    broken: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky"
    }
    fn dims(&self) -> usize {
        self.inner.dims()
    }
    async fn embed(&self, texts: &[String]) -> docsearch_core::Result<Vec<Vec<f32>>> {
        if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::external("embedding", "timed out"));
        }
        self.inner.embed(texts).await
    }
}

fn services_with(
    blobs: Arc<dyn BlobStore>,
    embedder: Arc<dyn Embedder>,
) -> (Services, Arc<InMemoryVectorIndex>) {
    let index = Arc::new(InMemoryVectorIndex::new());
    let dense = DenseRetrieval::new(embedder, index.clone(), 16);
    let services = Services::assemble(
        Config::default(),
        blobs,
        Some(dense),
        Arc::new(LocalParser),
        None,
    );
    (services, index)
}

fn query(text: &str, top_k: usize) -> SearchQuery {
    SearchQuery {
        query: text.to_string(),
        top_k: Some(top_k),
        ..SearchQuery::default()
    }
}

#[tokio::test]
async fn test_repeated_term_ranks_higher() {
    let (s, _) = services_with(
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(HashingEmbedder::new(64)),
    );
    s.save_and_ingest("A", "invoice invoice invoice invoice invoice")
        .await
        .unwrap();
    s.save_and_ingest("B", "invoice contract contract contract")
        .await
        .unwrap();

    let resp = s.search(query("invoice", 2)).await.unwrap();
    assert_eq!(resp.outcome.status, SearchStatus::Complete);
    let names: Vec<&str> = resp
        .outcome
        .results
        .iter()
        .map(|r| r.document.as_str())
        .collect();
    assert_eq!(names, vec!["A", "B"]);
    let scores: Vec<f64> = resp.outcome.results.iter().map(|r| r.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_dense_failure_degrades_to_partial() {
    let embedder = Arc::new(FlakyEmbedder {
        inner: HashingEmbedder::new(64),
        broken: Default::default(),
    });
    let (s, index) = services_with(Arc::new(InMemoryBlobStore::new()), embedder.clone());
    s.save_and_ingest("a.md", "rust ownership and borrowing")
        .await
        .unwrap();
    assert_eq!(index.len(), 1);

    embedder
        .broken
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let resp = s
        .search(SearchQuery {
            debug: true,
            ..query("ownership", 5)
        })
        .await
        .unwrap();
    assert_eq!(resp.outcome.status, SearchStatus::Partial);
    assert_eq!(resp.outcome.results.len(), 1);
    let diag = resp.outcome.diagnostics.unwrap();
    assert_eq!(diag.alpha_effective, 0.0);
    assert!(diag.dense_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_filter_excludes_top_document() {
    let (s, _) = services_with(
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(HashingEmbedder::new(64)),
    );
    s.save_and_ingest("best.md", "refund refund refund policy")
        .await
        .unwrap();
    s.save_and_ingest("other.md", "refund window").await.unwrap();

    let resp = s
        .search(SearchQuery {
            documents: vec!["other.md".to_string()],
            ..query("refund", 5)
        })
        .await
        .unwrap();
    assert!(resp
        .outcome
        .results
        .iter()
        .all(|r| r.document.as_str() == "other.md"));
    assert_eq!(resp.outcome.results.len(), 1);
}

#[tokio::test]
async fn test_corrupt_record_is_skipped() {
    let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
    let (s, _) = services_with(blobs.clone(), Arc::new(HashingEmbedder::new(64)));
    s.save_and_ingest("good.md", "quarterly revenue report")
        .await
        .unwrap();
    blobs
        .write(KEYWORD_INDEXES, "bad.md.json", b"{not json")
        .await
        .unwrap();

    let resp = s
        .search(SearchQuery {
            debug: true,
            ..query("revenue", 5)
        })
        .await
        .unwrap();
    assert_eq!(resp.outcome.results.len(), 1);
    assert_eq!(resp.outcome.results[0].document.as_str(), "good.md");
    assert_eq!(resp.outcome.diagnostics.unwrap().records_skipped, 1);
}

#[tokio::test]
async fn test_delete_removes_from_search() {
    let (s, index) = services_with(
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(HashingEmbedder::new(64)),
    );
    s.save_and_ingest("gone.md", "ephemeral content").await.unwrap();
    s.delete("gone.md").await.unwrap();

    assert!(index.is_empty());
    let resp = s.search(query("ephemeral", 5)).await.unwrap();
    assert_eq!(resp.outcome.status, SearchStatus::NoResults);
    assert!(resp.outcome.results.is_empty());
}
