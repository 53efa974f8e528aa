//! LlamaParse cloud parsing.
//!
//! A parse is a job: upload the file, poll its status until it settles,
//! then fetch the markdown result. The whole exchange is bounded by
//! `parser.timeout_secs`.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::multipart;
use std::time::Duration;
use tracing::{debug, info};

use docsearch_core::error::Error;
use docsearch_core::DocumentName;

use super::Parser;
use crate::config::ParserConfig;
use crate::http;

/// Coarse state of a LlamaParse job.
#[derive(Debug, Clone, PartialEq, Eq)]
enum JobStatus {
    Pending,
    Success,
    Failed(String),
}

pub struct LlamaParser {
    base_url: String,
    api_key: String,
    timeout: Duration,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl LlamaParser {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: http::api_key("LLAMA_CLOUD_API_KEY")?,
            timeout: Duration::from_secs(config.timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            // Per-request bound; the job as a whole is bounded by `timeout`.
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn upload(&self, document: &DocumentName, bytes: &[u8]) -> Result<String> {
        let url = format!("{}/parsing/upload", self.base_url);
        let json = http::send_json("LlamaParse", || {
            let part = multipart::Part::bytes(bytes.to_vec()).file_name(document.to_string());
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .multipart(multipart::Form::new().part("file", part))
        })
        .await?;
        json.get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid LlamaParse response: missing job 'id'"))
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let url = format!("{}/parsing/job/{}", self.base_url, job_id);
        let json = http::send_json("LlamaParse", || {
            self.client.get(&url).bearer_auth(&self.api_key)
        })
        .await?;
        Ok(parse_status(&json))
    }

    async fn fetch_markdown(&self, job_id: &str) -> Result<String> {
        let url = format!("{}/parsing/job/{}/result/markdown", self.base_url, job_id);
        let json = http::send_json("LlamaParse", || {
            self.client.get(&url).bearer_auth(&self.api_key)
        })
        .await?;
        json.get("markdown")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid LlamaParse response: missing 'markdown'"))
    }

    async fn run_job(&self, document: &DocumentName, bytes: &[u8]) -> Result<String> {
        let job_id = self.upload(document, bytes).await?;
        info!(document = %document, job = %job_id, "LlamaParse job started");

        loop {
            match self.status(&job_id).await? {
                JobStatus::Success => break,
                JobStatus::Failed(reason) => bail!("LlamaParse job {} failed: {}", job_id, reason),
                JobStatus::Pending => {
                    debug!(job = %job_id, "LlamaParse job pending");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        self.fetch_markdown(&job_id).await
    }
}

fn parse_status(json: &serde_json::Value) -> JobStatus {
    match json.get("status").and_then(|s| s.as_str()) {
        Some("SUCCESS") => JobStatus::Success,
        Some(s @ ("ERROR" | "CANCELED")) => JobStatus::Failed(
            json.get("error_message")
                .and_then(|m| m.as_str())
                .unwrap_or(s)
                .to_string(),
        ),
        _ => JobStatus::Pending,
    }
}

#[async_trait]
impl Parser for LlamaParser {
    fn name(&self) -> &str {
        "llamaparse"
    }

    async fn parse(&self, document: &DocumentName, bytes: &[u8]) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.run_job(document, bytes)).await {
            Ok(Ok(markdown)) => Ok(markdown),
            Ok(Err(e)) => Err(Error::external("parser", format!("{:#}", e)).into()),
            Err(_) => Err(Error::external(
                "parser",
                format!("LlamaParse timed out after {}s", self.timeout.as_secs()),
            )
            .into()),
        }
    }
}
