//! Configuration parsing and validation.
//!
//! docsearch is configured from a single TOML file (default
//! `./config/docsearch.toml`). Every section has defaults, so an empty file
//! gives a working keyword-only service storing data under `./data`.
//!
//! Secrets never come from the file: API keys are read from the
//! environment by the component that needs them (`OPENAI_API_KEY`,
//! `PINECONE_API_KEY`, `LLAMA_CLOUD_API_KEY`, `AWS_*`).
//!
//! # Example
//!
//! ```toml
//! [storage]
//! backend = "local"
//! root = "./data"
//!
//! [retrieval]
//! hybrid_alpha = 0.3
//! default_top_k = 5
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [vector_db]
//! provider = "pinecone"
//! host = "https://docs-abc123.svc.pinecone.io"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// `local`, `s3`, or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Base directory for the `local` backend.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            root: default_storage_root(),
            s3: None,
        }
    }
}

fn default_storage_backend() -> String {
    "local".to_string()
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_vendor_timeout")]
    pub timeout_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
    #[serde(default = "default_candidate_k_vector")]
    pub candidate_k_vector: usize,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_passage_chars")]
    pub passage_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_alpha: default_hybrid_alpha(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            candidate_k_vector: default_candidate_k_vector(),
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            passage_chars: default_passage_chars(),
        }
    }
}

fn default_hybrid_alpha() -> f64 {
    0.3
}
fn default_bm25_k1() -> f64 {
    1.2
}
fn default_bm25_b() -> f64 {
    0.75
}
fn default_candidate_k_vector() -> usize {
    20
}
fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    50
}
fn default_passage_chars() -> usize {
    480
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, or `hash`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_vendor_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            timeout_secs: default_vendor_timeout(),
            base_url: default_openai_base_url(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_vendor_timeout() -> u64 {
    10
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorDbConfig {
    /// `disabled`, `memory`, or `pinecone`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    /// Pinecone index host, e.g. `https://docs-abc123.svc.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_vendor_timeout")]
    pub timeout_secs: u64,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            host: None,
            namespace: String::new(),
            timeout_secs: default_vendor_timeout(),
        }
    }
}

impl VectorDbConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `disabled` or `openai`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// How many top results are given to the model as context.
    #[serde(default = "default_answer_context")]
    pub answer_context: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_chat_model(),
            timeout_secs: default_generation_timeout(),
            base_url: default_openai_base_url(),
            answer_context: default_answer_context(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_answer_context() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    /// `local` or `llamaparse`.
    #[serde(default = "default_parser")]
    pub provider: String,
    #[serde(default = "default_parser_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_llamaparse_base_url")]
    pub base_url: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            provider: default_parser(),
            timeout_secs: default_parser_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            base_url: default_llamaparse_base_url(),
        }
    }
}

fn default_parser() -> String {
    "local".to_string()
}
fn default_parser_timeout() -> u64 {
    120
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_llamaparse_base_url() -> String {
    "https://api.cloud.llamaindex.ai/api".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Lowercase extensions accepted on upload.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "docx", "txt", "md", "csv", "xlsx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.storage.backend.as_str() {
        "local" | "memory" => {}
        "s3" => {
            if config.storage.s3.is_none() {
                bail!("storage.s3 must be configured when storage.backend is 's3'");
            }
        }
        other => bail!(
            "Unknown storage backend: '{}'. Must be local, s3, or memory.",
            other
        ),
    }

    let r = &config.retrieval;
    if !(0.0..=1.0).contains(&r.hybrid_alpha) {
        bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }
    if r.bm25_k1 <= 0.0 {
        bail!("retrieval.bm25_k1 must be > 0");
    }
    if !(0.0..=1.0).contains(&r.bm25_b) {
        bail!("retrieval.bm25_b must be in [0.0, 1.0]");
    }
    if r.candidate_k_vector == 0 {
        bail!("retrieval.candidate_k_vector must be >= 1");
    }
    if r.default_top_k == 0 {
        bail!("retrieval.default_top_k must be >= 1");
    }
    if r.max_top_k < r.default_top_k {
        bail!("retrieval.max_top_k must be >= retrieval.default_top_k");
    }

    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    let e = &config.embedding;
    match e.provider.as_str() {
        "disabled" => {}
        "openai" | "hash" => {
            if e.dims.unwrap_or(0) == 0 {
                bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
            }
            if e.provider == "openai" && e.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
            if e.batch_size == 0 {
                bail!("embedding.batch_size must be > 0");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or hash.",
            other
        ),
    }

    match config.vector_db.provider.as_str() {
        "disabled" | "memory" => {}
        "pinecone" => {
            if config.vector_db.host.is_none() {
                bail!("vector_db.host must be specified when provider is 'pinecone'");
            }
        }
        other => bail!(
            "Unknown vector_db provider: '{}'. Must be disabled, memory, or pinecone.",
            other
        ),
    }
    if config.embedding.is_enabled() != config.vector_db.is_enabled() {
        bail!("embedding and vector_db must be enabled together");
    }

    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.parser.provider.as_str() {
        "local" | "llamaparse" => {}
        other => bail!(
            "Unknown parser provider: '{}'. Must be local or llamaparse.",
            other
        ),
    }

    if config.documents.allowed_extensions.is_empty() {
        bail!("documents.allowed_extensions must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let c = parse("").unwrap();
        assert_eq!(c.storage.backend, "local");
        assert_eq!(c.retrieval.hybrid_alpha, 0.3);
        assert_eq!(c.retrieval.bm25_k1, 1.2);
        assert_eq!(c.retrieval.bm25_b, 0.75);
        assert_eq!(c.chunking.max_tokens, 700);
        assert!(!c.embedding.is_enabled());
        assert_eq!(c.generation.timeout_secs, 60);
        assert_eq!(c.parser.timeout_secs, 120);
        assert_eq!(c.vector_db.timeout_secs, 10);
        assert!(c.documents.allowed_extensions.contains(&"xlsx".to_string()));
        assert_eq!(c.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(parse("[retrieval]\nhybrid_alpha = 1.5").is_err());
        assert!(parse("[retrieval]\nbm25_b = -0.1").is_err());
        assert!(parse("[retrieval]\nbm25_k1 = 0.0").is_err());
        assert!(parse("[retrieval]\ndefault_top_k = 10\nmax_top_k = 5").is_err());
        assert!(parse("[chunking]\nmax_tokens = 0").is_err());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse("[storage]\nbackend = \"ftp\"").is_err());
        assert!(parse("[storage]\nbackend = \"s3\"").is_err());
        assert!(parse("[parser]\nprovider = \"magic\"").is_err());
        assert!(parse("[generation]\nprovider = \"other\"").is_err());
    }

    #[test]
    fn test_dense_needs_both_halves() {
        let only_embed = "[embedding]\nprovider = \"hash\"\ndims = 64";
        assert!(parse(only_embed).is_err());

        let both = format!("{}\n[vector_db]\nprovider = \"memory\"", only_embed);
        let c = parse(&both).unwrap();
        assert!(c.embedding.is_enabled() && c.vector_db.is_enabled());

        assert!(parse("[embedding]\nprovider = \"openai\"\ndims = 8\n[vector_db]\nprovider = \"memory\"").is_err());
        assert!(parse("[vector_db]\nprovider = \"pinecone\"\n[embedding]\nprovider = \"hash\"\ndims = 8").is_err());
    }

    #[test]
    fn test_s3_section() {
        let c = parse("[storage]\nbackend = \"s3\"\n[storage.s3]\nbucket = \"docs\"\nprefix = \"prod/\"")
            .unwrap();
        let s3 = c.storage.s3.unwrap();
        assert_eq!(s3.bucket, "docs");
        assert_eq!(s3.region, "us-east-1");
        assert!(s3.endpoint_url.is_none());
    }

    #[test]
    fn test_example_config_is_valid() {
        let c = parse(include_str!("../config/docsearch.example.toml")).unwrap();
        assert_eq!(c.generation.answer_context, 3);
        assert_eq!(c.documents.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/docsearch.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
