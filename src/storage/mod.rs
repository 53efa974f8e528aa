//! Blob storage backends.
//!
//! | Backend | Type | Layout |
//! |---------|------|--------|
//! | `local` | [`local::LocalBlobStore`] | `<root>/<namespace>/<name>` |
//! | `s3` | [`s3::S3BlobStore`] | `s3://<bucket>/<prefix><namespace>/<name>` |
//! | `memory` | [`InMemoryBlobStore`] | process memory, lost on exit |

pub mod local;
pub mod s3;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use docsearch_core::storage::memory::InMemoryBlobStore;
use docsearch_core::storage::BlobStore;

use crate::config::StorageConfig;

/// Create the configured backend.
pub fn create_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.backend.as_str() {
        "local" => Arc::new(local::LocalBlobStore::new(config.root.clone())),
        "s3" => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("storage.s3 is not configured"))?;
            Arc::new(s3::S3BlobStore::new(s3.clone())?)
        }
        "memory" => Arc::new(InMemoryBlobStore::new()),
        other => anyhow::bail!("Unknown storage backend: '{}'", other),
    };
    info!(backend = store.backend(), "storage ready");
    Ok(store)
}
