//! Patient registry lookup client.
//!
//! The registry is an external, read-only system exposing a PostgREST-style row filter
//! API. This client resolves a normalized patient identifier to the registry's internal
//! patient reference. The pipeline never creates patients: an unknown identifier is a
//! terminal failure for the letter being processed.

use crate::config::get_config;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Errors returned while resolving a patient identifier.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid registry URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Registry responded with an unexpected status code.
    #[error("Unexpected registry response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the registry.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// No patient row matched the identifier. Terminal: the patient must be
    /// registered before letters referencing them can be processed.
    #[error("No patient registered for identifier {identifier}")]
    NotFound {
        /// Identifier that failed to resolve.
        identifier: String,
    },
    /// More than one patient row matched the identifier. The registry is expected
    /// to enforce uniqueness; this client does not pick a winner.
    #[error("Identifier {identifier} matches {count} patients")]
    Ambiguous {
        /// Identifier that resolved ambiguously.
        identifier: String,
        /// Number of rows the registry returned.
        count: usize,
    },
}

#[derive(Deserialize)]
struct PatientRow {
    id: String,
}

/// Lightweight HTTP client for registry lookups.
pub struct RegistryService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RegistryService {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, RegistryError> {
        let config = get_config();
        let client = Client::builder().user_agent("letterflow/0.3").build()?;
        let base_url = normalize_base_url(&config.registry_url).map_err(RegistryError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized registry client");

        Ok(Self {
            client,
            base_url,
            api_key: config.registry_api_key.clone(),
        })
    }

    /// Resolve a normalized identifier to the registry's patient reference.
    pub async fn find_patient(&self, identifier: &str) -> Result<String, RegistryError> {
        let url = format!("{}/patients", self.base_url.trim_end_matches('/'));
        let mut request = self.client.get(url).query(&[
            ("select", "id".to_string()),
            ("identifier", format!("eq.{identifier}")),
        ]);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request
                .header("apikey", api_key)
                .header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = RegistryError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Registry lookup failed");
            return Err(error);
        }

        let rows: Vec<PatientRow> = response.json().await?;
        match rows.len() {
            0 => Err(RegistryError::NotFound {
                identifier: identifier.to_string(),
            }),
            1 => Ok(rows.into_iter().next().map(|row| row.id).unwrap_or_default()),
            count => Err(RegistryError::Ambiguous {
                identifier: identifier.to_string(),
                count,
            }),
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}
