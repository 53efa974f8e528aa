//! Application services: every operation the HTTP server and the CLI
//! expose, wired once from configuration.
//!
//! [`Services`] owns the stores, the retrieval engine, the ingestion
//! pipeline and the optional vendor clients. Both front ends call these
//! methods and only differ in how they render results and errors.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use docsearch_core::dense::DenseRetrieval;
use docsearch_core::documents::DocumentStore;
use docsearch_core::error::Error;
use docsearch_core::index_store::KeywordIndexStore;
use docsearch_core::keyword::Bm25Params;
use docsearch_core::search::{HybridSearcher, SearchOutcome, SearchParams, SearchRequest};
use docsearch_core::storage::BlobStore;
use docsearch_core::DocumentName;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::{
    create_generator, ContextPassage, Generator, DEFAULT_FAQS, DEFAULT_QUESTIONS, MAX_FAQS,
    MAX_QUESTIONS,
};
use crate::ingest::{IngestReport, Ingestor};
use crate::parser::{create_parser, Parser};
use crate::storage::create_blob_store;
use crate::vector_db::create_vector_index;

/// A search as callers phrase it, before validation.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: String,
    pub top_k: Option<usize>,
    pub documents: Vec<String>,
    pub debug: bool,
    pub answer: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    #[serde(flatten)]
    pub outcome: SearchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentListing {
    pub uploads: Vec<DocumentName>,
    pub parsed: Vec<DocumentName>,
    pub indexed: Vec<String>,
}

/// Which parts of a document a delete found and removed.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub document: DocumentName,
    pub upload: bool,
    pub parsed: bool,
    pub keyword_record: bool,
    pub vectors: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseReport {
    pub document: DocumentName,
    pub parser: String,
    pub content: String,
}

#[derive(Clone)]
pub struct Services {
    config: Arc<Config>,
    documents: DocumentStore,
    keywords: KeywordIndexStore,
    searcher: HybridSearcher,
    ingestor: Ingestor,
    parser: Arc<dyn Parser>,
    generator: Option<Arc<dyn Generator>>,
}

impl Services {
    /// Build every component named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let blobs = create_blob_store(&config.storage)?;
        let dense = match (
            create_embedder(&config.embedding)?,
            create_vector_index(&config.vector_db)?,
        ) {
            (Some(embedder), Some(index)) => {
                info!(
                    model = embedder.model_name(),
                    backend = index.backend(),
                    "dense retrieval enabled"
                );
                Some(DenseRetrieval::new(
                    embedder,
                    index,
                    config.embedding.batch_size,
                ))
            }
            _ => {
                info!("dense retrieval disabled, keyword-only search");
                None
            }
        };
        let parser = create_parser(&config.parser)?;
        let generator = create_generator(&config.generation)?;
        Ok(Self::assemble(config.clone(), blobs, dense, parser, generator))
    }

    /// Wire services from already-built components.
    pub fn assemble(
        config: Config,
        blobs: Arc<dyn BlobStore>,
        dense: Option<DenseRetrieval>,
        parser: Arc<dyn Parser>,
        generator: Option<Arc<dyn Generator>>,
    ) -> Self {
        let documents = DocumentStore::new(blobs.clone());
        let keywords = KeywordIndexStore::new(blobs);
        let r = &config.retrieval;
        let params = SearchParams {
            hybrid_alpha: r.hybrid_alpha,
            bm25: Bm25Params {
                k1: r.bm25_k1,
                b: r.bm25_b,
            },
            candidate_k_vector: r.candidate_k_vector,
            passage_chars: r.passage_chars,
        };
        let searcher = HybridSearcher::new(
            keywords.clone(),
            documents.clone(),
            dense.clone(),
            params,
        );
        let ingestor = Ingestor::new(
            documents.clone(),
            keywords.clone(),
            dense,
            config.chunking.max_tokens,
        );
        Self {
            config: Arc::new(config),
            documents,
            keywords,
            searcher,
            ingestor,
            parser,
            generator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn generator(&self) -> Result<&Arc<dyn Generator>> {
        self.generator
            .as_ref()
            .ok_or_else(|| Error::invalid("text generation is not configured").into())
    }

    /// Store raw bytes under `name`, replacing any previous upload.
    pub async fn upload(&self, name: &str, bytes: &[u8]) -> Result<DocumentName> {
        let document = DocumentName::new(name)?;
        let allowed = &self.config.documents.allowed_extensions;
        match document.extension() {
            Some(ext) if allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) => {}
            _ => {
                return Err(Error::invalid(format!(
                    "unsupported file type for '{}'; allowed: {}",
                    document,
                    allowed.join(", ")
                ))
                .into())
            }
        }
        if bytes.is_empty() {
            return Err(Error::invalid("upload is empty").into());
        }
        let max = self.config.documents.max_upload_bytes;
        if bytes.len() > max {
            return Err(Error::invalid(format!(
                "upload is {} bytes, limit is {}",
                bytes.len(),
                max
            ))
            .into());
        }

        self.documents.upload(&document, bytes).await?;
        info!(document = %document, bytes = bytes.len(), "uploaded");
        Ok(document)
    }

    pub async fn list(&self) -> Result<DocumentListing> {
        Ok(DocumentListing {
            uploads: self.documents.list_uploads().await?,
            parsed: self.documents.list_parsed().await?,
            indexed: self.keywords.list_documents().await?,
        })
    }

    /// Parse the upload of `name` and store the markdown as its parsed form.
    pub async fn parse(&self, name: &str) -> Result<ParseReport> {
        let document = DocumentName::new(name)?;
        let bytes = self.documents.read_raw(&document).await?;
        let content = self.parser.parse(&document, &bytes).await?;
        self.documents.write_parsed(&document, &content).await?;
        info!(document = %document, parser = self.parser.name(), chars = content.len(), "parsed");
        Ok(ParseReport {
            document,
            parser: self.parser.name().to_string(),
            content,
        })
    }

    pub async fn read_content(&self, name: &str) -> Result<String> {
        let document = DocumentName::new(name)?;
        Ok(self.documents.read_parsed(&document).await?)
    }

    /// Overwrite the parsed form with edited text.
    pub async fn save_content(&self, name: &str, content: &str) -> Result<DocumentName> {
        let document = DocumentName::new(name)?;
        self.documents.write_parsed(&document, content).await?;
        info!(document = %document, chars = content.len(), "saved edited content");
        Ok(document)
    }

    pub async fn save_and_ingest(&self, name: &str, content: &str) -> Result<IngestReport> {
        let document = self.save_content(name, content).await?;
        self.ingestor.ingest(&document).await
    }

    pub async fn ingest(&self, name: &str) -> Result<IngestReport> {
        let document = DocumentName::new(name)?;
        self.ingestor.ingest(&document).await
    }

    /// Remove every form of `name`. Deleting an unknown document succeeds
    /// and reports nothing removed.
    pub async fn delete(&self, name: &str) -> Result<DeleteReport> {
        let document = DocumentName::new(name)?;
        let indexes = self.ingestor.remove(&document).await?;
        let forms = self.documents.delete(&document).await?;
        info!(document = %document, upload = forms.upload, parsed = forms.parsed, "deleted");
        Ok(DeleteReport {
            document,
            upload: forms.upload,
            parsed: forms.parsed,
            keyword_record: indexes.keyword_record,
            vectors: indexes.vectors,
        })
    }

    /// Hybrid search, optionally followed by a generated answer over the
    /// top passages. A failed answer is logged and left out.
    pub async fn search(&self, query: SearchQuery) -> Result<SearchResponse> {
        let r = &self.config.retrieval;
        let documents = query
            .documents
            .iter()
            .map(|d| DocumentName::new(d))
            .collect::<docsearch_core::Result<Vec<_>>>()?;
        let request = SearchRequest::new(
            &query.query,
            query.top_k.unwrap_or(r.default_top_k),
            r.max_top_k,
        )?
        .with_documents(documents)
        .with_debug(query.debug);

        let generator = if query.answer {
            Some(self.generator()?)
        } else {
            None
        };

        let outcome = self.searcher.search(&request).await?;

        let answer = match generator {
            Some(generator) if !outcome.results.is_empty() => {
                let passages: Vec<ContextPassage> = outcome
                    .results
                    .iter()
                    .take(self.config.generation.answer_context)
                    .map(|item| ContextPassage {
                        document: item.document.clone(),
                        text: item.passage.clone(),
                    })
                    .collect();
                match generator.answer(request.query(), &passages).await {
                    Ok(answer) => Some(answer),
                    Err(e) => {
                        warn!(error = %format!("{:#}", e), "answer generation failed");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(SearchResponse { outcome, answer })
    }

    pub async fn summarize(&self, name: &str) -> Result<String> {
        let generator = self.generator()?;
        let text = self.read_content(name).await?;
        generator.summarize(&text).await
    }

    pub async fn questions(&self, name: &str, count: Option<usize>) -> Result<Vec<String>> {
        let count = check_count("count", count, DEFAULT_QUESTIONS, MAX_QUESTIONS)?;
        let generator = self.generator()?;
        let text = self.read_content(name).await?;
        generator.questions(&text, count).await
    }

    pub async fn faq(&self, name: &str, count: Option<usize>) -> Result<String> {
        let count = check_count("count", count, DEFAULT_FAQS, MAX_FAQS)?;
        let generator = self.generator()?;
        let text = self.read_content(name).await?;
        generator.faq(&text, count).await
    }
}

fn check_count(field: &str, count: Option<usize>, default: usize, max: usize) -> Result<usize> {
    let count = count.unwrap_or(default);
    if count == 0 || count > max {
        return Err(Error::invalid(format!(
            "{} must be between 1 and {}, got {}",
            field, max, count
        ))
        .into());
    }
    Ok(count)
}
