//! Storage abstraction for docsearch.
//!
//! Everything the service persists (raw uploads, parsed text, keyword
//! records) is a named blob inside a namespace. The [`BlobStore`] trait is
//! the only contract the engine needs from a backend; the application picks
//! one implementation at startup (local directory, S3-compatible bucket, or
//! [`memory::InMemoryBlobStore`]) and hands it to every component.
//!
//! Implementations must make [`write`](BlobStore::write) an atomic replace
//! of a single blob: a concurrent reader sees either the previous content or
//! the new content, never a partial write.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

/// Raw uploaded bytes, keyed by document name.
pub const UPLOADS: &str = "uploaded_files";
/// Parsed/edited markdown, keyed by `<document>.md`.
pub const PARSED: &str = "parsed_files";
/// Serialized keyword records, keyed by `<document>.json`.
pub const KEYWORD_INDEXES: &str = "bm25_indexes";

/// Abstract blob backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list`](BlobStore::list) | Names in a namespace, sorted |
/// | [`read`](BlobStore::read) | Content of one blob, `None` if absent |
/// | [`write`](BlobStore::write) | Create or atomically replace a blob |
/// | [`delete`](BlobStore::delete) | Remove a blob; `false` if it was absent |
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend label for logs (`"local"`, `"s3"`, `"memory"`).
    fn backend(&self) -> &str;

    /// List blob names in `namespace`, sorted ascending. An unknown
    /// namespace is empty, not an error.
    async fn list(&self, namespace: &str) -> Result<Vec<String>>;

    async fn read(&self, namespace: &str, name: &str) -> Result<Option<Vec<u8>>>;

    async fn write(&self, namespace: &str, name: &str, content: &[u8]) -> Result<()>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn exists(&self, namespace: &str, name: &str) -> Result<bool> {
        Ok(self.read(namespace, name).await?.is_some())
    }
}
