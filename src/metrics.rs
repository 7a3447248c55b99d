use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing letter ingestion activity.
#[derive(Default)]
pub struct IngestMetrics {
    letters_completed: AtomicU64,
    letters_failed: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a letter that reached COMPLETE.
    pub fn record_completed(&self) {
        self.letters_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a letter whose attempt ended in ERROR.
    pub fn record_failed(&self) {
        self.letters_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            letters_completed: self.letters_completed.load(Ordering::Relaxed),
            letters_failed: self.letters_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of letters processed to COMPLETE since startup.
    pub letters_completed: u64,
    /// Number of letters whose processing attempt failed since startup.
    pub letters_failed: u64,
}
