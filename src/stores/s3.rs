//! Amazon S3 document store.
//!
//! Objects are stored at `<prefix><key>` in the configured bucket using
//! signed `PutObject`, `GetObject`, and `DeleteObject` requests. Requests
//! are signed with AWS Signature Version 4, implemented directly with
//! `hmac` and `sha2`, so no AWS SDK is needed.
//!
//! Credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, and
//! optionally `AWS_SESSION_TOKEN`. A custom `endpoint_url` (MinIO,
//! LocalStack) switches to path-style addressing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docrag_core::store::DocumentStore;
use docrag_core::{RagError, RagResult};
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Digest, Sha256};

use super::check_key;
use crate::config::S3StorageConfig;

type HmacSha256 = Hmac<Sha256>;

// ============ AWS Credentials ============

#[derive(Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    pub fn from_env() -> Result<Self> {
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

    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: None,
        }
    }
}

// ============ Store ============

pub struct S3DocumentStore {
    config: S3StorageConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3DocumentStore {
    pub fn from_env(config: S3StorageConfig) -> Result<Self> {
        Ok(Self::new(config, AwsCredentials::from_env()?))
    }

    pub fn new(config: S3StorageConfig, creds: AwsCredentials) -> Self {
        Self {
            config,
            creds,
            client: reqwest::Client::new(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}{}", self.config.prefix, key)
    }

    /// Send one signed request for `key` and return the response.
    async fn send(&self, method: Method, key: &str, body: Vec<u8>) -> RagResult<reqwest::Response> {
        check_key(key)?;
        let object_key = self.object_key(key);
        let target = object_target(&self.config, &object_key);
        let signed = sign_request(
            &self.config.region,
            &self.creds,
            method.as_str(),
            &target,
            &body,
            Utc::now(),
        );

        let mut request = self
            .client
            .request(method, &target.url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date);
        if let Some(ref token) = self.creds.session_token {
            request = request.header("x-amz-security-token", token);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        request.send().await.map_err(|e| {
            RagError::StoreUnavailable(format!(
                "s3://{}/{}: {}",
                self.config.bucket, object_key, e
            ))
        })
    }

    fn status_error(&self, op: &str, key: &str, status: reqwest::StatusCode) -> RagError {
        if status == reqwest::StatusCode::NOT_FOUND {
            RagError::NotFound(format!("document '{}'", key))
        } else {
            RagError::StoreUnavailable(format!(
                "S3 {} failed (HTTP {}) for key '{}'",
                op, status, key
            ))
        }
    }
}

#[async_trait]
impl DocumentStore for S3DocumentStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> RagResult<()> {
        let resp = self.send(Method::PUT, key, bytes).await?;
        if !resp.status().is_success() {
            return Err(self.status_error("PutObject", key, resp.status()));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> RagResult<Vec<u8>> {
        let resp = self.send(Method::GET, key, Vec::new()).await?;
        if !resp.status().is_success() {
            return Err(self.status_error("GetObject", key, resp.status()));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("reading '{}': {}", key, e)))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &str) -> RagResult<()> {
        // DeleteObject succeeds for missing keys, so check existence first.
        let head = self.send(Method::HEAD, key, Vec::new()).await?;
        if !head.status().is_success() {
            return Err(self.status_error("HeadObject", key, head.status()));
        }
        let resp = self.send(Method::DELETE, key, Vec::new()).await?;
        if !resp.status().is_success() {
            return Err(self.status_error("DeleteObject", key, resp.status()));
        }
        Ok(())
    }
}

// ============ AWS SigV4 ============

struct ObjectTarget {
    url: String,
    host: String,
    canonical_uri: String,
}

/// Resolve URL, host header, and canonical URI for an object.
///
/// Without an endpoint override the virtual-hosted style
/// `<bucket>.s3.<region>.amazonaws.com/<key>` is used; with one, the
/// path-style `<endpoint>/<bucket>/<key>`.
fn object_target(config: &S3StorageConfig, object_key: &str) -> ObjectTarget {
    let encoded_key = object_key
        .split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/");

    match config.endpoint_url {
        Some(ref endpoint) => {
            let endpoint = endpoint.trim_end_matches('/');
            let host = endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .to_string();
            let canonical_uri = format!("/{}/{}", uri_encode(&config.bucket), encoded_key);
            ObjectTarget {
                url: format!("{}{}", endpoint, canonical_uri),
                host,
                canonical_uri,
            }
        }
        None => {
            let host = format!("{}.s3.{}.amazonaws.com", config.bucket, config.region);
            let canonical_uri = format!("/{}", encoded_key);
            ObjectTarget {
                url: format!("https://{}{}", host, canonical_uri),
                host,
                canonical_uri,
            }
        }
    }
}

struct SignedHeaders {
    authorization: String,
    payload_hash: String,
    amz_date: String,
}

fn sign_request(
    region: &str,
    creds: &AwsCredentials,
    method: &str,
    target: &ObjectTarget,
    body: &[u8],
    now: DateTime<Utc>,
) -> SignedHeaders {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(body);

    let mut headers = vec![
        ("host".to_string(), target.host.clone()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
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
        "{}\n{}\n\n{}\n{}\n{}",
        method, target.canonical_uri, canonical_headers, signed_headers, payload_hash
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

    SignedHeaders {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
        payload_hash,
        amz_date,
    }
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

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(endpoint: Option<&str>) -> S3StorageConfig {
        S3StorageConfig {
            bucket: "rag-uploads".into(),
            prefix: "docs/".into(),
            region: "us-east-1".into(),
            endpoint_url: endpoint.map(str::to_string),
        }
    }

    #[test]
    fn test_signing_key_matches_aws_example() {
        // From the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("report 2024.txt"), "report%202024.txt");
        assert_eq!(uri_encode("a~b_c-d.e"), "a~b_c-d.e");
    }

    #[test]
    fn test_virtual_hosted_target() {
        let target = object_target(&config(None), "docs/my file.txt");
        assert_eq!(target.host, "rag-uploads.s3.us-east-1.amazonaws.com");
        assert_eq!(target.canonical_uri, "/docs/my%20file.txt");
        assert_eq!(
            target.url,
            "https://rag-uploads.s3.us-east-1.amazonaws.com/docs/my%20file.txt"
        );
    }

    #[test]
    fn test_path_style_target_for_custom_endpoint() {
        let target = object_target(&config(Some("http://localhost:9000/")), "docs/a.txt");
        assert_eq!(target.host, "localhost:9000");
        assert_eq!(target.url, "http://localhost:9000/rag-uploads/docs/a.txt");
        assert_eq!(target.canonical_uri, "/rag-uploads/docs/a.txt");
    }

    #[test]
    fn test_authorization_header_shape() {
        let creds = AwsCredentials::new("AKIDEXAMPLE", "secret");
        let target = object_target(&config(None), "docs/a.txt");
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let signed = sign_request("us-east-1", &creds, "PUT", &target, b"hello", now);

        assert_eq!(signed.amz_date, "20240102T030405Z");
        assert_eq!(signed.payload_hash, hex_sha256(b"hello"));
        assert!(signed.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240102/us-east-1/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));

        // Deterministic for identical inputs.
        let again = sign_request("us-east-1", &creds, "PUT", &target, b"hello", now);
        assert_eq!(signed.authorization, again.authorization);
        let other = sign_request("us-east-1", &creds, "GET", &target, b"", now);
        assert_ne!(signed.authorization, other.authorization);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_before_network() {
        let store = S3DocumentStore::new(config(None), AwsCredentials::new("a", "b"));
        assert!(matches!(
            store.get("../x").await,
            Err(RagError::InvalidInput(_))
        ));
    }
}
