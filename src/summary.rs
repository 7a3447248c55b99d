//! Abstractions for generating clinical-letter summaries via a hosted provider.
//!
//! The provider speaks a Messages-style generation API. The client submits the whole
//! prompt in one request and accepts only a complete text response; streaming and
//! partial output are rejected so a record never holds a truncated summary.

use crate::config::get_config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const DEFAULT_API_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Character budget applied to letter text before it is embedded in the prompt.
///
/// The cut is a fixed prefix at a char boundary; it makes no attempt to land on a
/// sentence or section break.
pub const DEFAULT_INPUT_BUDGET: usize = 10_000;

/// Errors surfaced while attempting summary generation.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Provider was unreachable.
    #[error("Summary provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed, or carried non-text content.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by summary providers.
#[async_trait]
pub trait SummaryClient: Send + Sync {
    /// Generate a summary of the supplied letter text.
    async fn generate_summary(&self, letter_text: &str) -> Result<String, SummaryError>;
}

/// Build a summary client based on configuration.
pub fn get_summary_client() -> Box<dyn SummaryClient + Send + Sync> {
    let config = get_config();
    let base_url = config
        .summary_api_url
        .clone()
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    Box::new(MessagesSummaryClient::new(
        base_url,
        config.summary_api_key.clone(),
        config.summary_model.clone(),
        config.summary_max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        config.summary_input_budget.unwrap_or(DEFAULT_INPUT_BUDGET),
    ))
}

/// Assemble the summarization prompt around a bounded prefix of the letter text.
pub(crate) fn build_letter_prompt(letter_text: &str, input_budget: usize) -> String {
    let prefix = truncate_chars(letter_text, input_budget);
    format!(
        "You are a medical assistant helping doctors quickly understand clinical letters.\n\n\
         Please summarize the following clinical letter concisely, highlighting:\n\
         - Key diagnoses or conditions\n\
         - Important findings or test results\n\
         - Recommended actions or follow-ups\n\
         - Any urgent concerns\n\
         - Date, time, and location of past appointments\n\n\
         Keep the summary under 300 words.\n\n\
         Clinical Letter:\n{prefix}"
    )
}

fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

struct MessagesSummaryClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    input_budget: usize,
}

impl MessagesSummaryClient {
    fn new(
        base_url: String,
        api_key: String,
        model: String,
        max_tokens: u32,
        input_budget: usize,
    ) -> Self {
        let http = Client::builder()
            .user_agent("letterflow/summary")
            .build()
            .expect("Failed to construct reqwest::Client for summarization");
        Self {
            http,
            base_url,
            api_key,
            model,
            max_tokens,
            input_budget,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl SummaryClient for MessagesSummaryClient {
    async fn generate_summary(&self, letter_text: &str) -> Result<String, SummaryError> {
        let prompt = build_letter_prompt(letter_text, self.input_budget);
        let payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                SummaryError::ProviderUnavailable(format!(
                    "failed to reach summary provider at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: MessagesResponse = response.json().await.map_err(|error| {
            SummaryError::InvalidResponse(format!("failed to decode provider response: {error}"))
        })?;

        let block = body
            .content
            .into_iter()
            .next()
            .ok_or_else(|| SummaryError::InvalidResponse("response carried no content".into()))?;
        if block.kind != "text" {
            return Err(SummaryError::InvalidResponse(format!(
                "unexpected content type '{}'",
                block.kind
            )));
        }

        block
            .text
            .map(|text| text.trim().to_string())
            .ok_or_else(|| SummaryError::InvalidResponse("text block missing body".into()))
    }
}
