//! Dense retrieval seams: embedding providers and vector indexes.
//!
//! The engine never talks to a vendor directly. It sees two traits:
//!
//! - [`Embedder`] turns text into fixed-length vectors.
//! - [`VectorIndex`] stores passage vectors and answers nearest-neighbour
//!   queries, optionally restricted to a set of documents.
//!
//! [`DenseRetrieval`] pairs one of each and implements the two operations
//! the rest of the crate needs: replacing a document's passages and
//! querying with text.
//!
//! Concrete HTTP-backed implementations (OpenAI embeddings, Pinecone) live
//! in the `docsearch` app crate. [`memory::InMemoryVectorIndex`] and
//! [`hashing::HashingEmbedder`] run fully in-process.

pub mod hashing;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{DocumentName, Passage};

/// Text-to-vector provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch. Output order matches input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A passage with its embedding, ready to upsert.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub passage: Passage,
    pub vector: Vec<f32>,
}

/// One nearest-neighbour match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub id: String,
    pub document: DocumentName,
    pub score: f64,
    pub text: String,
}

/// Passage vector storage.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend label for logs.
    fn backend(&self) -> &str;

    /// Replace every vector of `document` with `entries`.
    ///
    /// After success the index holds exactly the ids in `entries` for that
    /// document; stale passages from a longer previous version are gone.
    async fn replace_document(
        &self,
        document: &DocumentName,
        entries: Vec<VectorEntry>,
    ) -> Result<()>;

    /// Top `top_n` passages by similarity to `vector`, best first.
    ///
    /// With `filter`, only passages of the listed documents are returned.
    async fn query(
        &self,
        vector: &[f32],
        top_n: usize,
        filter: Option<&[DocumentName]>,
    ) -> Result<Vec<VectorHit>>;

    async fn delete_document(&self, document: &DocumentName) -> Result<()>;
}

/// An embedder and a vector index used together.
#[derive(Clone)]
pub struct DenseRetrieval {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    /// Texts per embedding request.
    pub batch_size: usize,
}

impl DenseRetrieval {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, batch_size: usize) -> Self {
        Self {
            embedder,
            index,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed `passages` and make them the document's only vectors.
    ///
    /// Returns the ids written. An empty passage list clears the document.
    pub async fn index_passages(
        &self,
        document: &DocumentName,
        passages: Vec<Passage>,
    ) -> Result<Vec<String>> {
        let mut entries = Vec::with_capacity(passages.len());
        for batch in passages.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::external(
                    self.embedder.model_name(),
                    format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        vectors.len()
                    ),
                ));
            }
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(passage, vector)| VectorEntry { passage, vector }),
            );
        }

        let ids: Vec<String> = entries.iter().map(|e| e.passage.id.clone()).collect();
        self.index.replace_document(document, entries).await?;
        debug!(
            document = %document,
            passages = ids.len(),
            backend = self.index.backend(),
            "replaced document vectors"
        );
        Ok(ids)
    }

    /// Embed `query` and fetch the `top_n` closest passages.
    pub async fn search(
        &self,
        query: &str,
        top_n: usize,
        filter: Option<&[DocumentName]>,
    ) -> Result<Vec<VectorHit>> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            Error::external(self.embedder.model_name(), "empty embedding response")
        })?;
        self.index.query(&vector, top_n, filter).await
    }
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
