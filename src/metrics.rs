//! Per-type generation metrics and the end-of-run summary.

use std::time::Duration;
use streamgen_core::EntityKind;
use streamgen_sink::DeliveryStats;
use tracing::{info, warn};

/// Metrics for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationMetrics {
    pub entity_type: String,
    pub kind: EntityKind,
    /// Records produced by the generator or source
    pub records_generated: u64,
    /// Records handed to the sink
    pub messages_sent: u64,
    /// Sends the sink refused (delivery failures are in [`DeliveryStats`])
    pub send_failures: u64,
    pub duration: Duration,
}

impl GenerationMetrics {
    pub fn new(entity_type: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            entity_type: entity_type.into(),
            kind,
            records_generated: 0,
            messages_sent: 0,
            send_failures: 0,
            duration: Duration::ZERO,
        }
    }

    /// Calculate records per second.
    pub fn records_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.records_generated as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// A transactional worker that ended with an error.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerFailure {
    pub entity_type: String,
    pub reason: String,
}

/// Result of a whole generation run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Master types, in generation order
    pub masters: Vec<GenerationMetrics>,
    /// Transactional types, in generation order
    pub transactions: Vec<GenerationMetrics>,
    pub delivery: DeliveryStats,
    pub failures: Vec<WorkerFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Metrics for a type, master or transactional.
    pub fn metrics_for(&self, entity_type: &str) -> Option<&GenerationMetrics> {
        self.masters
            .iter()
            .chain(&self.transactions)
            .find(|m| m.entity_type == entity_type)
    }

    pub fn total_records(&self) -> u64 {
        self.masters
            .iter()
            .chain(&self.transactions)
            .map(|m| m.records_generated)
            .sum()
    }

    pub fn log(&self) {
        for m in self.masters.iter().chain(&self.transactions) {
            info!(
                "{:?} '{}': {} generated, {} sent, {} refused in {:?} ({:.1} records/sec)",
                m.kind,
                m.entity_type,
                m.records_generated,
                m.messages_sent,
                m.send_failures,
                m.duration,
                m.records_per_second()
            );
        }
        info!(
            "Delivery: {} sent, {} acknowledged, {} failed, {} in flight",
            self.delivery.sent,
            self.delivery.acknowledged,
            self.delivery.failed,
            self.delivery.in_flight
        );
        if self.delivery.queue_full > 0 {
            info!(
                "Transport queue was full {} time(s); those sends were retried",
                self.delivery.queue_full
            );
        }
        for failure in &self.failures {
            warn!("Worker '{}' failed: {}", failure.entity_type, failure.reason);
        }
    }
}
