//! Pipeline service coordinating storage, extraction, resolution, summarization, and
//! status writes.

use crate::{
    event::{UploadEvent, normalize_object_key},
    extract,
    identifier::extract_identifier,
    metrics::{IngestMetrics, MetricsSnapshot},
    pipeline::types::{
        BatchOutcome, DocumentOutcome, OutcomeStatus, ProcessError, StoreHealthSnapshot,
    },
    registry::RegistryService,
    storage::ObjectStorage,
    store::LetterStore,
    summary::{SummaryClient, get_summary_client},
};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Drives uploaded letters through the full ingestion pipeline.
///
/// The service owns long-lived handles to the storage, registry, store, and summary
/// clients plus the metrics registry, so the HTTP surface and the replay path reuse the
/// same components. Construct the service once near process start and share it through
/// an `Arc`.
///
/// The service is the only writer of letter status. Each document moves
/// PROCESSING → COMPLETE or PROCESSING → ERROR; a COMPLETE write carries summary and
/// patient reference atomically, and an ERROR write touches neither field.
pub struct PipelineService {
    storage: ObjectStorage,
    registry: RegistryService,
    store: LetterStore,
    summarizer: Box<dyn SummaryClient + Send + Sync>,
    metrics: Arc<IngestMetrics>,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, replay tooling).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Process every record in a notification batch, sequentially and independently.
    async fn process_event(&self, event: UploadEvent) -> BatchOutcome;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Probe the letter store and report reachability.
    async fn store_health(&self) -> StoreHealthSnapshot;
}

impl PipelineService {
    /// Build a new pipeline service, initializing backing clients from configuration.
    pub fn new() -> anyhow::Result<Self> {
        let storage = ObjectStorage::new().context("Failed to initialize storage client")?;
        let registry = RegistryService::new().context("Failed to initialize registry client")?;
        let store = LetterStore::new().context("Failed to initialize letter store client")?;
        let summarizer = get_summary_client();
        tracing::info!("Pipeline service initialized");

        Ok(Self {
            storage,
            registry,
            store,
            summarizer,
            metrics: Arc::new(IngestMetrics::new()),
        })
    }

    /// Process every record in a notification batch.
    ///
    /// Documents are handled one at a time, in order, each to its terminal status before
    /// the next begins. One document's failure never aborts the rest of the batch.
    pub async fn process_event(&self, event: UploadEvent) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for record in event.records {
            let bucket = record.s3.bucket.name;
            let key = normalize_object_key(&record.s3.object.key);
            tracing::info!(bucket = %bucket, key = %key, "Processing letter");

            let started = Instant::now();
            let result = self.process_document(&bucket, &key).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    self.metrics.record_completed();
                    tracing::info!(key = %key, elapsed_ms, "Letter processed");
                    outcome.processed += 1;
                    outcome.results.push(DocumentOutcome {
                        storage_key: key,
                        status: OutcomeStatus::Complete,
                        error: None,
                        elapsed_ms,
                    });
                }
                Err(error) => {
                    self.metrics.record_failed();
                    tracing::error!(key = %key, error = %error, elapsed_ms, "Letter processing failed");
                    outcome.failed += 1;
                    outcome.results.push(DocumentOutcome {
                        storage_key: key,
                        status: OutcomeStatus::Error,
                        error: Some(error.to_string()),
                        elapsed_ms,
                    });
                }
            }
        }
        outcome
    }

    /// Drive one document to a terminal status.
    ///
    /// If the PROCESSING write itself fails the record is left in its prior state and
    /// nothing else runs. Any later failure marks the record ERROR without touching
    /// summary or patient fields.
    async fn process_document(&self, bucket: &str, key: &str) -> Result<(), ProcessError> {
        self.store.mark_processing(key).await?;

        match self.run_attempt(bucket, key).await {
            Ok((summary, patient_ref)) => {
                self.store.mark_complete(key, &summary, &patient_ref).await?;
                Ok(())
            }
            Err(cause) => {
                if let Err(store_error) = self.store.mark_error(key).await {
                    // Record stays PROCESSING until a future re-trigger of the same key.
                    tracing::error!(key, error = %store_error, "Failed to record ERROR status");
                }
                Err(cause)
            }
        }
    }

    async fn run_attempt(&self, bucket: &str, key: &str) -> Result<(String, String), ProcessError> {
        let bytes = self.storage.download(bucket, key).await?;
        let text = extract::extract_text(&bytes)?;
        tracing::debug!(key, characters = text.len(), "Extracted letter text");

        let identifier = extract_identifier(&text).ok_or(ProcessError::NoIdentifier)?;
        tracing::debug!(key, identifier = %identifier, "Identifier extracted");

        let patient_ref = self.registry.find_patient(&identifier).await?;
        let summary = self.summarizer.generate_summary(&text).await?;
        Ok((summary, patient_ref))
    }

    /// Return the current ingestion metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Probe the letter store to surface a lightweight health snapshot.
    pub async fn store_health(&self) -> StoreHealthSnapshot {
        match self.store.probe().await {
            Ok(()) => StoreHealthSnapshot {
                reachable: true,
                error: None,
            },
            Err(error) => {
                tracing::warn!(error = %error, "Letter store health probe failed");
                StoreHealthSnapshot {
                    reachable: false,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn process_event(&self, event: UploadEvent) -> BatchOutcome {
        PipelineService::process_event(self, event).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineService::metrics_snapshot(self)
    }

    async fn store_health(&self) -> StoreHealthSnapshot {
        PipelineService::store_health(self).await
    }
}
