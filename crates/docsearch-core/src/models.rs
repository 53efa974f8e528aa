//! Shared value types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_NAME_BYTES: usize = 255;

/// A validated document name.
///
/// Names double as blob keys in every storage backend, so they must be a
/// single path segment: non-empty, at most 255 bytes, no `/` or `\`, not
/// `.` or `..`, and free of control characters. Surrounding whitespace is
/// trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentName(String);

impl DocumentName {
    pub fn new(raw: &str) -> Result<Self> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(Error::invalid("document name must not be empty"));
        }
        if name.len() > MAX_NAME_BYTES {
            return Err(Error::invalid(format!(
                "document name exceeds {} bytes",
                MAX_NAME_BYTES
            )));
        }
        if name == "." || name == ".." {
            return Err(Error::invalid(format!("invalid document name: '{}'", name)));
        }
        if name.contains(['/', '\\']) || name.chars().any(char::is_control) {
            return Err(Error::invalid(format!(
                "document name must be a single path segment: '{}'",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.0.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        DocumentName::new(&value)
    }
}

impl From<DocumentName> for String {
    fn from(name: DocumentName) -> Self {
        name.0
    }
}

/// A paragraph-bounded slice of a document's parsed text, the unit stored
/// in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    /// Deterministic id: `<document>#<index>`.
    pub id: String,
    pub document: DocumentName,
    pub index: usize,
    pub text: String,
}

impl Passage {
    pub fn id_for(document: &DocumentName, index: usize) -> String {
        format!("{}#{}", document, index)
    }
}
