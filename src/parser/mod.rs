//! Turning uploaded bytes into markdown.
//!
//! | Provider | Type |
//! |----------|------|
//! | `local` | [`LocalParser`]: in-process extraction (txt, md, csv, pdf, docx, xlsx) |
//! | `llamaparse` | [`LlamaParser`]: LlamaParse cloud job (upload, poll, fetch markdown) |

pub mod llamaparse;
pub mod local;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use docsearch_core::error::Error;
use docsearch_core::DocumentName;

use crate::config::ParserConfig;

pub use llamaparse::LlamaParser;

#[async_trait]
pub trait Parser: Send + Sync {
    fn name(&self) -> &str;

    /// Convert the raw upload of `document` to markdown.
    async fn parse(&self, document: &DocumentName, bytes: &[u8]) -> Result<String>;
}

pub struct LocalParser;

#[async_trait]
impl Parser for LocalParser {
    fn name(&self) -> &str {
        "local"
    }

    async fn parse(&self, document: &DocumentName, bytes: &[u8]) -> Result<String> {
        let extension = document.extension().unwrap_or_default();
        let owned = bytes.to_vec();
        // PDF and OOXML decoding is CPU-bound.
        let extracted =
            tokio::task::spawn_blocking(move || local::extract_markdown(&owned, &extension))
                .await?;
        extracted.map_err(|reason| {
            Error::invalid(format!("cannot parse '{}': {}", document, reason)).into()
        })
    }
}

pub fn create_parser(config: &ParserConfig) -> Result<Arc<dyn Parser>> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalParser)),
        "llamaparse" => Ok(Arc::new(LlamaParser::new(config)?)),
        other => bail!("Unknown parser provider: '{}'", other),
    }
}
