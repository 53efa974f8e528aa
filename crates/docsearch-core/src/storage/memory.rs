//! In-memory [`BlobStore`] for tests and the `memory` storage backend.
//!
//! A single `BTreeMap` behind `std::sync::RwLock`; every write is one map
//! insert, which gives the atomic-replace guarantee for free.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::BlobStore;

type Key = (String, String);

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<BTreeMap<Key, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs across all namespaces.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::storage("in-memory store lock poisoned")
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        Ok(blobs
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn read(&self, namespace: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        Ok(blobs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn write(&self, namespace: &str, name: &str, content: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        blobs.insert((namespace.to_string(), name.to_string()), content.to_vec());
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        Ok(blobs
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_namespaces() {
        let store = InMemoryBlobStore::new();
        store.write("a", "x.json", b"1").await.unwrap();
        store.write("a", "w.json", b"2").await.unwrap();
        store.write("b", "x.json", b"3").await.unwrap();

        assert_eq!(store.list("a").await.unwrap(), vec!["w.json", "x.json"]);
        assert_eq!(store.list("b").await.unwrap(), vec!["x.json"]);
        assert!(store.list("c").await.unwrap().is_empty());
        assert_eq!(store.read("a", "x.json").await.unwrap().unwrap(), b"1");
        assert!(store.read("a", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_and_delete() {
        let store = InMemoryBlobStore::new();
        store.write("ns", "k", b"old").await.unwrap();
        store.write("ns", "k", b"new").await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.read("ns", "k").await.unwrap().unwrap(), b"new");

        assert!(store.delete("ns", "k").await.unwrap());
        assert!(!store.delete("ns", "k").await.unwrap());
        assert!(!store.exists("ns", "k").await.unwrap());
        assert!(store.is_empty());
    }
}
