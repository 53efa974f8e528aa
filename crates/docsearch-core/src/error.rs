//! Error taxonomy shared by the core and its backends.
//!
//! Local failures (one record, one external call) are absorbed by the
//! engine and degrade its outcome; only [`Error::InvalidRequest`] and
//! whole-store failures reach callers of [`search`](crate::search).

use std::fmt::Display;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A document, upload or record is absent.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The text contains nothing to index.
    #[error("document '{0}' has no indexable text")]
    EmptyDocument(String),

    /// Ingestion was requested before a parsed form exists.
    #[error("document '{0}' has not been parsed")]
    DocumentNotParsed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A parsing, LLM, embedding or vector-database call failed or timed out.
    #[error("{service} call failed: {message}")]
    ExternalService { service: String, message: String },

    /// One keyword record could not be read or decoded.
    #[error("corrupt keyword record '{name}': {reason}")]
    CorruptRecord { name: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidRequest(message.into())
    }

    pub fn external(service: impl Into<String>, err: impl Display) -> Self {
        Error::ExternalService {
            service: service.into(),
            message: err.to_string(),
        }
    }

    pub fn storage(err: impl Display) -> Self {
        Error::Storage(err.to_string())
    }
}
