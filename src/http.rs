//! Shared HTTP plumbing for vendor calls.
//!
//! Every outbound call (embeddings, chat, vector DB, parsing, S3) goes
//! through [`send_json`] or [`send`], which apply one retry policy:
//!
//! - HTTP 2xx → return the response
//! - HTTP 429 or 5xx → retry once after [`RETRY_BACKOFF`]
//! - Network error or timeout → retry once after [`RETRY_BACKOFF`]
//! - Other 4xx → fail immediately
//!
//! Per-call timeouts are set on the client by [`client`].

use anyhow::{anyhow, bail, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const MAX_ATTEMPTS: u32 = 2;
const ERROR_BODY_CHARS: usize = 500;

/// Build a client whose every request is bounded by `timeout_secs`.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Read an API key from the environment.
pub fn api_key(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| anyhow!("{} not set", var))
}

/// A vendor answered with a non-success status.
#[derive(Debug)]
pub struct StatusError {
    pub service: String,
    pub status: StatusCode,
    pub body: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} API error {}: {}", self.service, self.status, self.body)
    }
}

impl std::error::Error for StatusError {}

/// The HTTP status behind `err`, if it came from [`send`].
pub fn status_of(err: &anyhow::Error) -> Option<StatusCode> {
    err.downcast_ref::<StatusError>().map(|e| e.status)
}

fn retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send a request built by `build`, retrying once on transient failure.
///
/// `build` is called per attempt since a `RequestBuilder` is consumed by
/// sending. Returns the first successful response.
pub async fn send<F>(service: &str, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(RETRY_BACKOFF).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body = response.text().await.unwrap_or_default();
                let err = anyhow::Error::new(StatusError {
                    service: service.to_string(),
                    status,
                    body: body.chars().take(ERROR_BODY_CHARS).collect(),
                });
                if retryable(status) {
                    warn!(service, %status, attempt, "transient vendor error");
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                warn!(service, error = %e, attempt, "vendor request failed");
                last_err = Some(anyhow!("{} request failed: {}", service, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", service)))
}

/// [`send`] and decode the JSON body.
pub async fn send_json<F>(service: &str, build: F) -> Result<serde_json::Value>
where
    F: Fn() -> RequestBuilder,
{
    let response = send(service, build).await?;
    match response.json().await {
        Ok(json) => Ok(json),
        Err(e) => bail!("{} returned invalid JSON: {}", service, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(retryable(StatusCode::BAD_GATEWAY));
        assert!(!retryable(StatusCode::BAD_REQUEST));
        assert!(!retryable(StatusCode::UNAUTHORIZED));
        assert!(!retryable(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_after_retry() {
        let client = client(1).unwrap();
        let started = std::time::Instant::now();
        let err = send("test", || client.get("http://127.0.0.1:1/unreachable"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("test request failed"));
        assert!(started.elapsed() >= RETRY_BACKOFF);
    }
}
