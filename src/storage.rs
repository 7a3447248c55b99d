//! Object storage download client.
//!
//! Fetches uploaded letter bytes by (bucket, key) using the S3 REST API with AWS
//! Signature V4 authentication. Signing is pure Rust (`hmac` + `sha2`), so the client
//! works against AWS as well as S3-compatible services (MinIO, LocalStack) via
//! `STORAGE_ENDPOINT`. Custom endpoints use path-style addressing; AWS uses
//! virtual-hosted addressing.
//!
//! Credentials are read from the environment at construction:
//! `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, and optionally `AWS_SESSION_TOKEN`.

use crate::config::get_config;
use futures_util::StreamExt;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while fetching object bytes.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Required storage credential was not present in the environment.
    #[error("Missing storage credential: {0}")]
    MissingCredential(String),
    /// HTTP layer failed before receiving a complete response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Storage responded with an unexpected status code.
    #[error("Unexpected storage response ({status}) for key '{key}'")]
    UnexpectedStatus {
        /// HTTP status returned by the storage service.
        status: StatusCode,
        /// Object key the request targeted.
        key: String,
    },
}

/// Signed HTTP client for object storage reads.
pub struct ObjectStorage {
    client: Client,
    region: String,
    endpoint: Option<String>,
    credentials: Credentials,
}

struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    fn from_env() -> Result<Self, StorageError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| StorageError::MissingCredential("AWS_ACCESS_KEY_ID".into()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| StorageError::MissingCredential("AWS_SECRET_ACCESS_KEY".into()))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

impl ObjectStorage {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, StorageError> {
        let config = get_config();
        let client = Client::builder().user_agent("letterflow/0.3").build()?;
        let credentials = Credentials::from_env()?;
        tracing::debug!(
            region = %config.storage_region,
            endpoint = ?config.storage_endpoint,
            "Initialized object storage client"
        );

        Ok(Self {
            client,
            region: config.storage_region.clone(),
            endpoint: config.storage_endpoint.clone(),
            credentials,
        })
    }

    /// Download one object and return its bytes as a single buffer.
    ///
    /// The response body is consumed as a stream and concatenated chunk by chunk.
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let encoded_key = key
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        let (url, host, canonical_uri) = self.object_address(bucket, &encoded_key);

        let now = OffsetDateTime::now_utc();
        let date_stamp = format!(
            "{:04}{:02}{:02}",
            now.year(),
            u8::from(now.month()),
            now.day()
        );
        let amz_date = format!(
            "{date_stamp}T{:02}{:02}{:02}Z",
            now.hour(),
            now.minute(),
            now.second()
        );
        let payload_hash = hex_sha256(b"");

        let mut headers = vec![
            ("host".to_string(), host),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        let canonical_request = format!(
            "GET\n{canonical_uri}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );
        let credential_scope = format!("{date_stamp}/{}/s3/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );
        let signing_key = derive_signing_key(
            &self.credentials.secret_access_key,
            &date_stamp,
            &self.region,
            "s3",
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id
        );

        let mut request = self
            .client
            .get(&url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(token) = &self.credentials.session_token {
            request = request.header("x-amz-security-token", token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(bucket, key, %status, "Storage fetch failed");
            return Err(StorageError::UnexpectedStatus {
                status,
                key: key.to_string(),
            });
        }

        let mut buffer = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        tracing::debug!(bucket, key, bytes = buffer.len(), "Object downloaded");
        Ok(buffer)
    }

    /// Resolve the request URL, the `host` header value, and the canonical URI to sign.
    fn object_address(&self, bucket: &str, encoded_key: &str) -> (String, String, String) {
        match &self.endpoint {
            Some(endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                let canonical_uri = format!("/{bucket}/{encoded_key}");
                (format!("{scheme}://{host}{canonical_uri}"), host, canonical_uri)
            }
            None => {
                let host = format!("{bucket}.s3.{}.amazonaws.com", self.region);
                let canonical_uri = format!("/{encoded_key}");
                (format!("https://{host}{canonical_uri}"), host, canonical_uri)
            }
        }
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the SigV4 signing key: date, region, service, then the fixed terminator.
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{secret_key}").as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encode a path segment per RFC 3986, leaving unreserved characters intact.
fn uri_encode(segment: &str) -> String {
    let mut encoded = String::new();
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
