//! In-memory [`VectorIndex`] for tests and the `memory` vector backend.
//!
//! Vectors live in a `Vec` behind `std::sync::RwLock`; queries are a
//! brute-force cosine scan.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::DocumentName;

use super::{cosine_similarity, VectorEntry, VectorHit, VectorIndex};

struct StoredVector {
    id: String,
    document: DocumentName,
    text: String,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids stored for `document`, in insertion order.
    pub fn document_ids(&self, document: &DocumentName) -> Vec<String> {
        self.vectors
            .read()
            .map(|v| {
                v.iter()
                    .filter(|sv| &sv.document == document)
                    .map(|sv| sv.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::external("memory vector index", "lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn replace_document(
        &self,
        document: &DocumentName,
        entries: Vec<VectorEntry>,
    ) -> Result<()> {
        let mut vectors = self.vectors.write().map_err(poisoned)?;
        vectors.retain(|sv| &sv.document != document);
        for entry in entries {
            vectors.retain(|sv| sv.id != entry.passage.id);
            vectors.push(StoredVector {
                id: entry.passage.id,
                document: document.clone(),
                text: entry.passage.text,
                vector: entry.vector,
            });
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_n: usize,
        filter: Option<&[DocumentName]>,
    ) -> Result<Vec<VectorHit>> {
        let vectors = self.vectors.read().map_err(poisoned)?;
        let mut hits: Vec<VectorHit> = vectors
            .iter()
            .filter(|sv| filter.map_or(true, |allowed| allowed.contains(&sv.document)))
            .map(|sv| VectorHit {
                id: sv.id.clone(),
                document: sv.document.clone(),
                score: cosine_similarity(vector, &sv.vector) as f64,
                text: sv.text.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_n);
        Ok(hits)
    }

    async fn delete_document(&self, document: &DocumentName) -> Result<()> {
        let mut vectors = self.vectors.write().map_err(poisoned)?;
        vectors.retain(|sv| &sv.document != document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Passage;

    fn entry(doc: &DocumentName, index: usize, vector: Vec<f32>) -> VectorEntry {
        VectorEntry {
            passage: Passage {
                id: Passage::id_for(doc, index),
                document: doc.clone(),
                index,
                text: format!("passage {}", index),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = InMemoryVectorIndex::new();
        let a = DocumentName::new("a").unwrap();
        let b = DocumentName::new("b").unwrap();
        index
            .replace_document(&a, vec![entry(&a, 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .replace_document(&b, vec![entry(&b, 0, vec![0.6, 0.8])])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a#0");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].id, "b#0");

        let top1 = index.query(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_and_delete() {
        let index = InMemoryVectorIndex::new();
        let a = DocumentName::new("a").unwrap();
        let b = DocumentName::new("b").unwrap();
        index
            .replace_document(&a, vec![entry(&a, 0, vec![1.0]), entry(&a, 1, vec![1.0])])
            .await
            .unwrap();
        index
            .replace_document(&b, vec![entry(&b, 0, vec![1.0])])
            .await
            .unwrap();

        let filtered = index
            .query(&[1.0], 10, Some(std::slice::from_ref(&b)))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].document, b);

        index.delete_document(&a).await.unwrap();
        assert!(index.document_ids(&a).is_empty());
        assert_eq!(index.len(), 1);
    }
}
