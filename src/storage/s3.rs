//! S3-compatible blob store.
//!
//! Talks to the S3 REST API directly with AWS Signature V4, using only
//! `hmac` + `sha2` for signing. Blobs map to object keys
//! `<prefix><namespace>/<name>`; a write is a single `PutObject`, which S3
//! applies atomically.
//!
//! With `endpoint_url` set (MinIO, LocalStack) requests use path-style
//! addressing against that endpoint; otherwise virtual-hosted style against
//! `<bucket>.s3.<region>.amazonaws.com`.
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials)

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use sha2::{Digest, Sha256};

use docsearch_core::error::{Error, Result as CoreResult};
use docsearch_core::storage::BlobStore;

use crate::config::S3StorageConfig;
use crate::http;

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

pub struct S3BlobStore {
    config: S3StorageConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

/// Where requests go: scheme + host, and the path prefix before the key.
struct Endpoint {
    base_url: String,
    host: String,
    path_prefix: String,
}

impl S3BlobStore {
    pub fn new(config: S3StorageConfig) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        let client = http::client(config.timeout_secs)?;
        Ok(Self {
            config,
            creds,
            client,
        })
    }

    fn endpoint(&self) -> Endpoint {
        match &self.config.endpoint_url {
            Some(url) => {
                let trimmed = url.trim_end_matches('/');
                let host = trimmed
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .to_string();
                Endpoint {
                    base_url: trimmed.to_string(),
                    host,
                    path_prefix: format!("/{}", uri_encode(&self.config.bucket)),
                }
            }
            None => {
                let host = format!(
                    "{}.s3.{}.amazonaws.com",
                    self.config.bucket, self.config.region
                );
                Endpoint {
                    base_url: format!("https://{}", host),
                    host,
                    path_prefix: String::new(),
                }
            }
        }
    }

    fn namespace_prefix(&self, namespace: &str) -> String {
        format!("{}{}/", self.config.prefix, namespace)
    }

    fn key(&self, namespace: &str, name: &str) -> String {
        format!("{}{}", self.namespace_prefix(namespace), name)
    }

    /// Send one signed request. `key` is `None` for bucket-level calls.
    async fn request(
        &self,
        method: Method,
        key: Option<&str>,
        query: &[(String, String)],
        body: &[u8],
    ) -> Result<reqwest::Response> {
        let endpoint = self.endpoint();
        let encoded_key = key
            .map(|k| k.split('/').map(uri_encode).collect::<Vec<_>>().join("/"))
            .unwrap_or_default();
        let canonical_uri = format!("{}/{}", endpoint.path_prefix, encoded_key);

        let mut sorted = query.to_vec();
        sorted.sort();
        let canonical_query: String = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let payload_hash = hex_sha256(body);
        let signed = sign(
            &self.creds,
            &self.config.region,
            method.as_str(),
            &endpoint.host,
            &canonical_uri,
            &canonical_query,
            &payload_hash,
            Utc::now(),
        );

        let url = if canonical_query.is_empty() {
            format!("{}{}", endpoint.base_url, canonical_uri)
        } else {
            format!("{}{}?{}", endpoint.base_url, canonical_uri, canonical_query)
        };

        let build = || {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .body(body.to_vec());
            for (name, value) in &signed {
                req = req.header(name.as_str(), value.as_str());
            }
            req
        };
        http::send("S3", build).await
    }

    async fn list_keys(&self, namespace: &str) -> Result<Vec<String>> {
        let prefix = self.namespace_prefix(namespace);
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
                ("prefix".to_string(), prefix.clone()),
            ];
            if let Some(token) = &continuation {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self.request(Method::GET, None, &query, b"").await?;
            let xml = resp.text().await?;
            let page = parse_list_objects_response(&xml)?;
            names.extend(
                page.keys
                    .iter()
                    .filter_map(|k| k.strip_prefix(&prefix))
                    .filter(|n| !n.is_empty() && !n.contains('/'))
                    .map(str::to_string),
            );

            match (page.is_truncated, page.next_token) {
                (true, Some(token)) => continuation = Some(token),
                _ => break,
            }
        }

        names.sort();
        Ok(names)
    }
}

/// S3 answers 404 for a missing object; that is data, not a failure.
fn is_not_found(e: &anyhow::Error) -> bool {
    http::status_of(e) == Some(StatusCode::NOT_FOUND)
}

fn to_core(e: anyhow::Error) -> Error {
    Error::storage(format!("{:#}", e))
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn backend(&self) -> &str {
        "s3"
    }

    async fn list(&self, namespace: &str) -> CoreResult<Vec<String>> {
        self.list_keys(namespace).await.map_err(to_core)
    }

    async fn read(&self, namespace: &str, name: &str) -> CoreResult<Option<Vec<u8>>> {
        let key = self.key(namespace, name);
        match self.request(Method::GET, Some(&key), &[], b"").await {
            Ok(resp) => {
                let bytes = resp.bytes().await.map_err(Error::storage)?;
                Ok(Some(bytes.to_vec()))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(to_core(e)),
        }
    }

    async fn write(&self, namespace: &str, name: &str, content: &[u8]) -> CoreResult<()> {
        let key = self.key(namespace, name);
        self.request(Method::PUT, Some(&key), &[], content)
            .await
            .map(|_| ())
            .map_err(to_core)
    }

    async fn delete(&self, namespace: &str, name: &str) -> CoreResult<bool> {
        // DeleteObject succeeds for absent keys, so probe first to report
        // whether anything was removed.
        if !self.exists(namespace, name).await? {
            return Ok(false);
        }
        let key = self.key(namespace, name);
        match self.request(Method::DELETE, Some(&key), &[], b"").await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(to_core(e)),
        }
    }
}

// ============ AWS SigV4 ============

/// Compute SigV4 headers for one request.
///
/// Returns the headers to attach: `Authorization`, `x-amz-content-sha256`,
/// `x-amz-date`, and `x-amz-security-token` when a session token is set.
#[allow(clippy::too_many_arguments)]
fn sign(
    creds: &AwsCredentials,
    region: &str,
    method: &str,
    host: &str,
    canonical_uri: &str,
    canonical_query: &str,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = vec![
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    headers
        .into_iter()
        .filter(|(k, _)| k != "host")
        .chain(std::iter::once(("authorization".to_string(), authorization)))
        .collect()
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; everything but `A-Z a-z 0-9 - _ . ~` is escaped.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ ListObjectsV2 ============

struct ListPage {
    keys: Vec<String>,
    is_truncated: bool,
    next_token: Option<String>,
}

fn parse_list_objects_response(xml: &str) -> Result<ListPage> {
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut keys = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        if let Some(raw) = extract_xml_value(block, "Key") {
            let key = quick_xml::escape::unescape(&raw)
                .with_context(|| format!("bad key in ListObjectsV2 response: {}", raw))?;
            if !key.is_empty() && !key.ends_with('/') {
                keys.push(key.into_owned());
            }
        }
        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    Ok(ListPage {
        keys,
        is_truncated,
        next_token,
    })
}

/// Text content of the first `<tag>` (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}
