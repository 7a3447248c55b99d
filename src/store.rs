//! Letter status store client.
//!
//! The store holds one durable record per uploaded letter, keyed by storage key. This
//! client performs the three status transitions the pipeline is allowed to make, each as
//! a single PATCH against the matching row. Records are created by the upload-acceptance
//! collaborator before the pipeline ever runs; this client never inserts or deletes.
//!
//! Every write bumps `updated_at`. `mark_complete` carries summary and patient reference
//! in the same atomic update, so a record can never hold a partial result.

use crate::config::get_config;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use time::OffsetDateTime;

/// Status values written to letter records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterStatus {
    /// The pipeline has claimed the letter and is working on it.
    Processing,
    /// Processing finished; summary and patient reference are set.
    Complete,
    /// The processing attempt failed; summary and patient reference are untouched.
    Error,
}

impl LetterStatus {
    /// Wire value stored in the record's `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Complete => "COMPLETE",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LetterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned while updating letter records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid letter store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Store responded with an unexpected status code.
    #[error("Unexpected letter store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// No letter record matched the storage key. The upload-acceptance collaborator
    /// creates records before upload, so this indicates a key mismatch.
    #[error("No letter record found for storage key '{key}'")]
    RecordNotFound {
        /// Storage key that matched no record.
        key: String,
    },
}

/// Lightweight HTTP client for letter record updates.
pub struct LetterStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl LetterStore {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, StoreError> {
        let config = get_config();
        let client = Client::builder().user_agent("letterflow/0.3").build()?;
        let base_url =
            normalize_base_url(&config.letter_store_url).map_err(StoreError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized letter store client");

        Ok(Self {
            client,
            base_url,
            api_key: config.letter_store_api_key.clone(),
        })
    }

    /// Transition the record to PROCESSING.
    pub async fn mark_processing(&self, key: &str) -> Result<(), StoreError> {
        self.update(
            key,
            json!({
                "status": LetterStatus::Processing.as_str(),
                "updated_at": current_timestamp_rfc3339(),
            }),
        )
        .await
    }

    /// Transition the record to COMPLETE, setting summary and patient reference in the
    /// same write.
    pub async fn mark_complete(
        &self,
        key: &str,
        summary: &str,
        patient_ref: &str,
    ) -> Result<(), StoreError> {
        self.update(
            key,
            json!({
                "status": LetterStatus::Complete.as_str(),
                "summary": summary,
                "patient_id": patient_ref,
                "updated_at": current_timestamp_rfc3339(),
            }),
        )
        .await
    }

    /// Transition the record to ERROR. Summary and patient reference are left untouched.
    pub async fn mark_error(&self, key: &str) -> Result<(), StoreError> {
        self.update(
            key,
            json!({
                "status": LetterStatus::Error.as_str(),
                "updated_at": current_timestamp_rfc3339(),
            }),
        )
        .await
    }

    /// Probe the store with a minimal read, for health reporting.
    pub async fn probe(&self) -> Result<(), StoreError> {
        let url = format!("{}/letters", self.base_url.trim_end_matches('/'));
        let mut request = self
            .client
            .get(url)
            .query(&[("select", "storage_key"), ("limit", "1")]);
        request = self.authorize(request);

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::UnexpectedStatus { status, body })
        }
    }

    /// Apply one atomic update to the record matching `key`.
    async fn update(&self, key: &str, fields: Value) -> Result<(), StoreError> {
        let url = format!("{}/letters", self.base_url.trim_end_matches('/'));
        let mut request = self
            .client
            .patch(url)
            .query(&[("storage_key", format!("eq.{key}"))])
            .header("Prefer", "return=representation")
            .json(&fields);
        request = self.authorize(request);

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(key, error = %error, "Letter store update failed");
            return Err(error);
        }

        let rows: Vec<Value> = response.json().await?;
        if rows.is_empty() {
            return Err(StoreError::RecordNotFound {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(api_key) if !api_key.is_empty() => request
                .header("apikey", api_key)
                .header("Authorization", format!("Bearer {api_key}")),
            _ => request,
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

/// Current timestamp formatted for record storage.
fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
