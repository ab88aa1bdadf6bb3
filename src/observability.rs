use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

use crate::extraction::ExtractionMethod;

/// Verification pipeline counters
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub runs_started: AtomicU64,
    pub verified: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub text_extractions: AtomicU64,
    pub visual_extractions: AtomicU64,
    pub manual_entries: AtomicU64,
    pub audit_failures: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extraction(&self, method: ExtractionMethod) {
        let counter = match method {
            ExtractionMethod::StructuredText => &self.text_extractions,
            ExtractionMethod::VisualCode => &self.visual_extractions,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_manual_entry(&self) {
        self.manual_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verified(&self) {
        self.verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: &str) {
        if kind == "cancelled" {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> PipelineStats {
        PipelineStats {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            verified: self.verified.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            text_extractions: self.text_extractions.load(Ordering::Relaxed),
            visual_extractions: self.visual_extractions.load(Ordering::Relaxed),
            manual_entries: self.manual_entries.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            runs = stats.runs_started,
            verified = stats.verified,
            failed = stats.failed,
            cancelled = stats.cancelled,
            text = stats.text_extractions,
            visual = stats.visual_extractions,
            manual = stats.manual_entries,
            audit_failures = stats.audit_failures,
            "Verification pipeline metrics"
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub runs_started: u64,
    pub verified: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub text_extractions: u64,
    pub visual_extractions: u64,
    pub manual_entries: u64,
    pub audit_failures: u64,
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> u128 {
        let duration_ms = self.start.elapsed().as_millis();
        info!(
            operation = self.operation,
            duration_ms = duration_ms,
            "Operation completed"
        );
        duration_ms
    }
}
