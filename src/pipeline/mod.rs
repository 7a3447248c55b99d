//! Letter ingestion pipeline: storage fetch, text extraction, patient resolution,
//! summarization, and status transitions.

mod service;
pub mod types;

pub use service::{PipelineApi, PipelineService};
pub use types::{BatchOutcome, DocumentOutcome, OutcomeStatus, ProcessError, StoreHealthSnapshot};
