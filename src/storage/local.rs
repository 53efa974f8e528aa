//! Local-directory blob store.
//!
//! Each namespace is a subdirectory of the root; each blob is one file.
//! Writes go to `<root>/.tmp/<uuid>` first and are renamed into place, so a
//! reader never observes a half-written blob.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use docsearch_core::error::{Error, Result};
use docsearch_core::storage::BlobStore;

const TMP_DIR: &str = ".tmp";

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, namespace: &str, name: &str) -> Result<PathBuf> {
        check_segment(namespace)?;
        check_segment(name)?;
        Ok(self.root.join(namespace).join(name))
    }
}

/// Blob names arrive pre-validated, but the filesystem is the one backend
/// where a stray separator would escape the root.
fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\'])
        || segment == TMP_DIR
    {
        return Err(Error::invalid(format!("invalid blob name: '{}'", segment)));
    }
    Ok(())
}

fn io_err(path: &Path, e: std::io::Error) -> Error {
    Error::storage(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn backend(&self) -> &str {
        "local"
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>> {
        check_segment(namespace)?;
        let dir = self.root.join(namespace);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&dir, e))? {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, namespace: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(namespace, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn write(&self, namespace: &str, name: &str, content: &[u8]) -> Result<()> {
        let path = self.path(namespace, name)?;
        let tmp_dir = self.root.join(TMP_DIR);
        let dir = self.root.join(namespace);
        tokio::fs::create_dir_all(&tmp_dir)
            .await
            .map_err(|e| io_err(&tmp_dir, e))?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err(&dir, e))?;

        let tmp = tmp_dir.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&path, e));
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let path = self.path(namespace, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_list_delete() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path().to_path_buf());

        assert!(store.list("parsed_files").await.unwrap().is_empty());
        store.write("parsed_files", "b.md", b"two").await.unwrap();
        store.write("parsed_files", "a.md", b"one").await.unwrap();
        store.write("parsed_files", "a.md", b"uno").await.unwrap();

        assert_eq!(
            store.list("parsed_files").await.unwrap(),
            vec!["a.md", "b.md"]
        );
        assert_eq!(
            store.read("parsed_files", "a.md").await.unwrap().unwrap(),
            b"uno"
        );
        assert!(store.read("parsed_files", "zzz").await.unwrap().is_none());

        assert!(store.delete("parsed_files", "a.md").await.unwrap());
        assert!(!store.delete("parsed_files", "a.md").await.unwrap());
        assert_eq!(store.list("parsed_files").await.unwrap(), vec!["b.md"]);
    }

    #[tokio::test]
    async fn test_temp_files_do_not_leak_into_namespaces() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path().to_path_buf());
        store.write("ns", "x", b"1").await.unwrap();
        assert_eq!(store.list("ns").await.unwrap(), vec!["x"]);
        let leftover = std::fs::read_dir(tmp.path().join(TMP_DIR)).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path().to_path_buf());
        for bad in ["../x", "..", "a/b", ""] {
            assert!(store.write("ns", bad, b"1").await.is_err());
        }
        assert!(store.list("..").await.is_err());
    }
}
