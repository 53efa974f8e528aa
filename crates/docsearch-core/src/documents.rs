//! Raw uploads and parsed text, keyed by document name.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::DocumentName;
use crate::storage::{BlobStore, PARSED, UPLOADS};

const PARSED_SUFFIX: &str = ".md";

/// Which forms a delete actually removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemovedForms {
    pub upload: bool,
    pub parsed: bool,
}

#[derive(Clone)]
pub struct DocumentStore {
    blobs: Arc<dyn BlobStore>,
}

impl DocumentStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub async fn upload(&self, name: &DocumentName, bytes: &[u8]) -> Result<()> {
        self.blobs.write(UPLOADS, name.as_str(), bytes).await
    }

    pub async fn read_raw(&self, name: &DocumentName) -> Result<Vec<u8>> {
        self.blobs
            .read(UPLOADS, name.as_str())
            .await?
            .ok_or_else(|| Error::not_found("upload", name.as_str()))
    }

    pub async fn has_upload(&self, name: &DocumentName) -> Result<bool> {
        self.blobs.exists(UPLOADS, name.as_str()).await
    }

    /// Uploaded document names, sorted. Blobs whose names are not valid
    /// document names (written by something else) are ignored.
    pub async fn list_uploads(&self) -> Result<Vec<DocumentName>> {
        Ok(self
            .blobs
            .list(UPLOADS)
            .await?
            .iter()
            .filter_map(|n| DocumentName::new(n).ok())
            .collect())
    }

    /// Documents that have a parsed form, sorted.
    pub async fn list_parsed(&self) -> Result<Vec<DocumentName>> {
        Ok(self
            .blobs
            .list(PARSED)
            .await?
            .iter()
            .filter_map(|n| n.strip_suffix(PARSED_SUFFIX))
            .filter_map(|n| DocumentName::new(n).ok())
            .collect())
    }

    /// Create or overwrite the parsed form.
    pub async fn write_parsed(&self, name: &DocumentName, text: &str) -> Result<()> {
        self.blobs
            .write(PARSED, &parsed_key(name), text.as_bytes())
            .await
    }

    /// Read the parsed form.
    ///
    /// [`Error::DocumentNotParsed`] if only the upload exists,
    /// [`Error::NotFound`] if neither does.
    pub async fn read_parsed(&self, name: &DocumentName) -> Result<String> {
        match self.blobs.read(PARSED, &parsed_key(name)).await? {
            Some(bytes) => String::from_utf8(bytes).map_err(Error::storage),
            None if self.has_upload(name).await? => {
                Err(Error::DocumentNotParsed(name.to_string()))
            }
            None => Err(Error::not_found("document", name.as_str())),
        }
    }

    /// Remove both forms. Absent forms are not an error.
    pub async fn delete(&self, name: &DocumentName) -> Result<RemovedForms> {
        let upload = self.blobs.delete(UPLOADS, name.as_str()).await?;
        let parsed = self.blobs.delete(PARSED, &parsed_key(name)).await?;
        Ok(RemovedForms { upload, parsed })
    }
}

fn parsed_key(name: &DocumentName) -> String {
    format!("{}{}", name, PARSED_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryBlobStore;

    fn name(s: &str) -> DocumentName {
        DocumentName::new(s).unwrap()
    }

    fn store() -> DocumentStore {
        DocumentStore::new(Arc::new(InMemoryBlobStore::new()))
    }

    #[tokio::test]
    async fn test_upload_parse_lifecycle() {
        let docs = store();
        let n = name("report.pdf");

        assert!(matches!(
            docs.read_parsed(&n).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(docs.read_raw(&n).await, Err(Error::NotFound { .. })));

        docs.upload(&n, b"%PDF-1.4").await.unwrap();
        assert_eq!(docs.read_raw(&n).await.unwrap(), b"%PDF-1.4");
        assert!(matches!(
            docs.read_parsed(&n).await,
            Err(Error::DocumentNotParsed(_))
        ));

        docs.write_parsed(&n, "# Report").await.unwrap();
        docs.write_parsed(&n, "# Report v2").await.unwrap();
        assert_eq!(docs.read_parsed(&n).await.unwrap(), "# Report v2");

        assert_eq!(docs.list_uploads().await.unwrap(), vec![n.clone()]);
        assert_eq!(docs.list_parsed().await.unwrap(), vec![n.clone()]);
    }

    #[tokio::test]
    async fn test_delete_reports_forms() {
        let docs = store();
        let n = name("a.txt");
        docs.upload(&n, b"x").await.unwrap();
        docs.write_parsed(&n, "x").await.unwrap();

        assert_eq!(
            docs.delete(&n).await.unwrap(),
            RemovedForms {
                upload: true,
                parsed: true
            }
        );
        assert_eq!(docs.delete(&n).await.unwrap(), RemovedForms::default());
        assert!(docs.list_uploads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parsed_without_upload_is_readable() {
        let docs = store();
        let n = name("pasted.md");
        docs.write_parsed(&n, "hello").await.unwrap();
        assert_eq!(docs.read_parsed(&n).await.unwrap(), "hello");
        assert!(docs.list_uploads().await.unwrap().is_empty());
    }
}
