//! Vector database backends.
//!
//! - `pinecone`: [`PineconeIndex`] over the data-plane REST API
//!   (`/vectors/upsert`, `/query`, `/vectors/delete`), key from
//!   `PINECONE_API_KEY`.
//! - `memory`: [`InMemoryVectorIndex`] from `docsearch-core`; vectors are
//!   lost on restart.
//! - `disabled`: dense retrieval off.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use docsearch_core::dense::memory::InMemoryVectorIndex;
use docsearch_core::dense::{VectorEntry, VectorHit, VectorIndex};
use docsearch_core::error::{Error, Result as CoreResult};
use docsearch_core::DocumentName;

use crate::config::VectorDbConfig;
use crate::http;

/// Metadata text stored alongside each vector is cut to this many chars.
pub const METADATA_TEXT_CHARS: usize = 1000;
const UPSERT_BATCH: usize = 100;

pub struct PineconeIndex {
    host: String,
    namespace: String,
    api_key: String,
    client: reqwest::Client,
}

impl PineconeIndex {
    pub fn new(config: &VectorDbConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("vector_db.host required for Pinecone"))?;
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        Ok(Self {
            host,
            namespace: config.namespace.clone(),
            api_key: http::api_key("PINECONE_API_KEY")?,
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.host, path);
        http::send_json("Pinecone", || {
            self.client
                .post(&url)
                .header("Api-Key", &self.api_key)
                .json(&body)
        })
        .await
    }

    async fn delete_by_document(&self, document: &DocumentName) -> Result<()> {
        self.post(
            "/vectors/delete",
            json!({
                "namespace": self.namespace,
                "filter": {"document": {"$eq": document.as_str()}},
            }),
        )
        .await?;
        Ok(())
    }

    async fn upsert(&self, entries: &[VectorEntry]) -> Result<()> {
        for batch in entries.chunks(UPSERT_BATCH) {
            let vectors: Vec<serde_json::Value> = batch.iter().map(vector_json).collect();
            self.post(
                "/vectors/upsert",
                json!({"namespace": self.namespace, "vectors": vectors}),
            )
            .await?;
        }
        Ok(())
    }

    async fn query_raw(
        &self,
        vector: &[f32],
        top_n: usize,
        filter: Option<&[DocumentName]>,
    ) -> Result<Vec<VectorHit>> {
        let mut body = json!({
            "namespace": self.namespace,
            "vector": vector,
            "topK": top_n,
            "includeMetadata": true,
        });
        if let Some(docs) = filter {
            let names: Vec<&str> = docs.iter().map(|d| d.as_str()).collect();
            body["filter"] = json!({"document": {"$in": names}});
        }
        let json = self.post("/query", body).await?;
        parse_query_response(&json)
    }
}

fn vector_json(entry: &VectorEntry) -> serde_json::Value {
    let text: String = entry.passage.text.chars().take(METADATA_TEXT_CHARS).collect();
    json!({
        "id": entry.passage.id,
        "values": entry.vector,
        "metadata": {
            "document": entry.passage.document.as_str(),
            "text": text,
        },
    })
}

/// Matches without usable `document` metadata are dropped.
fn parse_query_response(json: &serde_json::Value) -> Result<Vec<VectorHit>> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Pinecone response: missing 'matches'"))?;

    Ok(matches
        .iter()
        .filter_map(|m| {
            let metadata = m.get("metadata")?;
            let document = DocumentName::new(metadata.get("document")?.as_str()?).ok()?;
            Some(VectorHit {
                id: m.get("id")?.as_str()?.to_string(),
                document,
                score: m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0),
                text: metadata
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect())
}

fn to_core(e: anyhow::Error) -> Error {
    Error::external("vector database", format!("{:#}", e))
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn backend(&self) -> &str {
        "pinecone"
    }

    async fn replace_document(
        &self,
        document: &DocumentName,
        entries: Vec<VectorEntry>,
    ) -> CoreResult<()> {
        self.delete_by_document(document).await.map_err(to_core)?;
        self.upsert(&entries).await.map_err(to_core)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_n: usize,
        filter: Option<&[DocumentName]>,
    ) -> CoreResult<Vec<VectorHit>> {
        self.query_raw(vector, top_n, filter).await.map_err(to_core)
    }

    async fn delete_document(&self, document: &DocumentName) -> CoreResult<()> {
        self.delete_by_document(document).await.map_err(to_core)
    }
}

/// Create the configured index, or `None` when the vector DB is disabled.
pub fn create_vector_index(config: &VectorDbConfig) -> Result<Option<Arc<dyn VectorIndex>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "memory" => Ok(Some(Arc::new(InMemoryVectorIndex::new()))),
        "pinecone" => Ok(Some(Arc::new(PineconeIndex::new(config)?))),
        other => bail!("Unknown vector_db provider: '{}'", other),
    }
}
