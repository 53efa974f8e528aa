//! Persistence for per-document keyword records.
//!
//! One JSON blob per document, named `<document>.json`, in the
//! [`KEYWORD_INDEXES`] namespace. Loading is tolerant: a blob that cannot be
//! read or decoded is logged and skipped so one bad file never takes the
//! whole corpus offline.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::keyword::{KeywordIndexRecord, RECORD_VERSION};
use crate::models::DocumentName;
use crate::storage::{BlobStore, KEYWORD_INDEXES};

const RECORD_SUFFIX: &str = ".json";

#[derive(Clone)]
pub struct KeywordIndexStore {
    blobs: Arc<dyn BlobStore>,
}

/// Records loaded by [`KeywordIndexStore::load_all`], plus what was skipped.
#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<KeywordIndexRecord>,
    pub skipped: Vec<Error>,
}

impl KeywordIndexStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    pub fn record_name(document: &DocumentName) -> String {
        format!("{}{}", document, RECORD_SUFFIX)
    }

    /// Write `record`, replacing any previous record for the same document.
    pub async fn save(&self, record: &KeywordIndexRecord) -> Result<()> {
        let body = serde_json::to_vec(record).map_err(Error::storage)?;
        self.blobs
            .write(KEYWORD_INDEXES, &Self::record_name(&record.document), &body)
            .await
    }

    /// Read one record. `Ok(None)` if absent; decode failures are errors.
    pub async fn load(&self, document: &DocumentName) -> Result<Option<KeywordIndexRecord>> {
        let name = Self::record_name(document);
        match self.blobs.read(KEYWORD_INDEXES, &name).await? {
            Some(bytes) => decode(&name, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Load every record currently persisted.
    ///
    /// Fails only if the namespace cannot be listed. Unreadable or corrupt
    /// records are returned in [`LoadedRecords::skipped`].
    pub async fn load_all(&self) -> Result<LoadedRecords> {
        let names = self.blobs.list(KEYWORD_INDEXES).await?;
        let mut loaded = LoadedRecords::default();

        for name in names.iter().filter(|n| n.ends_with(RECORD_SUFFIX)) {
            let outcome = match self.blobs.read(KEYWORD_INDEXES, name).await {
                Ok(Some(bytes)) => decode(name, &bytes),
                // Deleted between list and read.
                Ok(None) => continue,
                Err(e) => Err(Error::CorruptRecord {
                    name: name.clone(),
                    reason: e.to_string(),
                }),
            };
            match outcome {
                Ok(record) => loaded.records.push(record),
                Err(e) => {
                    warn!(record = %name, error = %e, "skipping keyword record");
                    loaded.skipped.push(e);
                }
            }
        }

        debug!(
            loaded = loaded.records.len(),
            skipped = loaded.skipped.len(),
            "keyword records loaded"
        );
        Ok(loaded)
    }

    /// Remove the record for `document`. Returns whether one existed.
    pub async fn delete(&self, document: &DocumentName) -> Result<bool> {
        self.blobs
            .delete(KEYWORD_INDEXES, &Self::record_name(document))
            .await
    }

    pub async fn list_documents(&self) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .list(KEYWORD_INDEXES)
            .await?
            .into_iter()
            .filter_map(|n| n.strip_suffix(RECORD_SUFFIX).map(str::to_string))
            .collect())
    }
}

fn decode(name: &str, bytes: &[u8]) -> Result<KeywordIndexRecord> {
    let record: KeywordIndexRecord =
        serde_json::from_slice(bytes).map_err(|e| Error::CorruptRecord {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    if record.version != RECORD_VERSION {
        return Err(Error::CorruptRecord {
            name: name.to_string(),
            reason: format!("unsupported record version {}", record.version),
        });
    }
    Ok(record)
}
