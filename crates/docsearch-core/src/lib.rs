//! # docsearch core
//!
//! Runtime-agnostic logic for docsearch: document names, tokenization,
//! per-document keyword records, the blob storage seam, the dense
//! retrieval seams, and the hybrid retrieval engine that fuses BM25 and
//! vector-similarity scores.
//!
//! This crate contains no tokio, reqwest or filesystem I/O. Concrete
//! storage backends and vendor clients live in the `docsearch` app crate
//! and plug in through [`storage::BlobStore`], [`dense::Embedder`] and
//! [`dense::VectorIndex`].

pub mod chunk;
pub mod dense;
pub mod documents;
pub mod error;
pub mod index_store;
pub mod keyword;
pub mod models;
pub mod search;
pub mod storage;
pub mod tokenize;

pub use error::{Error, Result};
pub use models::DocumentName;
