//! Core data types and error definitions for the ingestion pipeline.

use crate::extract::DecodeError;
use crate::registry::RegistryError;
use crate::storage::StorageError;
use crate::store::StoreError;
use crate::summary::SummaryError;
use serde::Serialize;
use thiserror::Error;

/// Errors emitted while processing a single letter. Every variant is terminal for the
/// attempt: the pipeline performs no internal retries.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Object bytes could not be fetched from storage.
    #[error("Failed to fetch document: {0}")]
    Storage(#[from] StorageError),
    /// Document bytes could not be decoded into text.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Extracted text contained no patient identifier pattern.
    #[error("No patient identifier found in document")]
    NoIdentifier,
    /// Patient resolution failed (unknown or ambiguous identifier, or registry error).
    #[error("Failed to resolve patient: {0}")]
    Registry(#[from] RegistryError),
    /// Summary generation failed.
    #[error(transparent)]
    Summary(#[from] SummaryError),
    /// A status store update failed. The record keeps whatever status it last held.
    #[error("Letter store update failed: {0}")]
    Persistence(#[from] StoreError),
}

/// Terminal status of one document's pass through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The letter reached COMPLETE.
    Complete,
    /// The attempt failed; the record was marked ERROR where possible.
    Error,
}

/// Outcome of one document within a triggering batch.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    /// Normalized storage key of the document.
    pub storage_key: String,
    /// Terminal status of this attempt.
    pub status: OutcomeStatus,
    /// Failure description when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time spent on this document.
    pub elapsed_ms: u64,
}

/// Aggregate outcome for one triggering batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// Number of documents that reached COMPLETE.
    pub processed: usize,
    /// Number of documents whose attempt failed.
    pub failed: usize,
    /// Per-document outcomes in batch order.
    pub results: Vec<DocumentOutcome>,
}

/// Reachability snapshot for the letter store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealthSnapshot {
    /// Indicates whether the store endpoint responded successfully.
    pub reachable: bool,
    /// Optional diagnostic string captured when the store is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
