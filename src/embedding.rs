//! Embedding providers.
//!
//! | Provider | Type | Notes |
//! |----------|------|-------|
//! | `openai` | [`OpenAIEmbedder`] | `POST {base_url}/embeddings`, key from `OPENAI_API_KEY` |
//! | `hash` | [`HashingEmbedder`] | offline feature hashing, no network |
//! | `disabled` | none | dense retrieval off |
//!
//! All providers implement [`Embedder`] from `docsearch-core`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use docsearch_core::dense::hashing::HashingEmbedder;
use docsearch_core::dense::Embedder;
use docsearch_core::error::{Error, Result as CoreResult};

use crate::config::EmbeddingConfig;
use crate::http;

pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        Ok(Self {
            model,
            dims,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key: http::api_key("OPENAI_API_KEY")?,
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::send_json("OpenAI embeddings", || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.call(texts)
            .await
            .map_err(|e| Error::external("embedding", format!("{:#}", e)))
    }
}

/// Parse `{"data": [{"index": 0, "embedding": [...]}, ...]}`, ordering by
/// `index` so output matches input order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing 'data' array"))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing 'embedding'"))?;
        let vec = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: non-numeric embedding"))?;
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Create the configured embedder, or `None` when embeddings are disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn Embedder>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAIEmbedder::new(config)?))),
        "hash" => Ok(Some(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(256),
        )))),
        other => bail!("Unknown embedding provider: '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_parse_response_rejects_malformed() {
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
        assert!(parse_openai_response(&serde_json::json!({"data": [{"index": 0}]})).is_err());
        assert!(parse_openai_response(
            &serde_json::json!({"data": [{"index": 0, "embedding": ["x"]}]})
        )
        .is_err());
    }

    #[test]
    fn test_create_disabled_and_hash() {
        assert!(create_embedder(&EmbeddingConfig::default()).unwrap().is_none());
        let cfg = EmbeddingConfig {
            provider: "hash".to_string(),
            dims: Some(32),
            ..EmbeddingConfig::default()
        };
        let e = create_embedder(&cfg).unwrap().unwrap();
        assert_eq!(e.dims(), 32);
        assert_eq!(e.model_name(), "hashing");
    }
}
