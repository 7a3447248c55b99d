//! HTTP surface for Letterflow.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /events` – Accept a batch of object-created notifications and run each
//!   document through the ingestion pipeline, returning per-document outcomes.
//! - `GET /metrics` – Observe ingestion counters.
//! - `GET /healthz` – Report letter store reachability.
//!
//! Processing happens inline within the request: the storage webhook's delivery timeout
//! is the wall-clock budget for the batch. Individual document failures are terminal
//! per-attempt and reported in the response body, not as an HTTP error: delivery itself
//! succeeded, and redelivery of the same event is safe by idempotent overwrite.

use crate::event::UploadEvent;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{BatchOutcome, PipelineApi, StoreHealthSnapshot};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use std::sync::Arc;

/// Build the HTTP router exposing the ingestion surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/events", post(handle_events::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/healthz", get(get_health::<S>))
        .with_state(service)
}

/// Run a notification batch through the pipeline and report per-document outcomes.
async fn handle_events<S>(
    State(service): State<Arc<S>>,
    Json(event): Json<UploadEvent>,
) -> Json<BatchOutcome>
where
    S: PipelineApi,
{
    let records = event.records.len();
    let outcome = service.process_event(event).await;
    tracing::info!(
        records,
        processed = outcome.processed,
        failed = outcome.failed,
        "Event batch handled"
    );
    Json(outcome)
}

/// Return a concise metrics snapshot with letter counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

/// Report letter store reachability.
async fn get_health<S>(State(service): State<Arc<S>>) -> Json<StoreHealthSnapshot>
where
    S: PipelineApi,
{
    Json(service.store_health().await)
}
