use std::time::Duration;

use dix_types::{ErrorKind, IntentStatus};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::*;

/// Metrics collector for the dix settlement core.
///
/// Backed by process-wide statics, so every collector reports into the same
/// prometheus default registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_intent_created(&self) {
        INTENTS_CREATED.inc();
    }

    pub fn record_intent_duplicate(&self) {
        INTENT_DUPLICATES.inc();
    }

    /// Record a terminal intent status. Non-terminal statuses are ignored.
    pub fn record_intent_status(&self, status: IntentStatus) {
        if status.is_terminal() {
            INTENT_STATUS_COUNT.with_label_values(&[status.as_str()]).inc();
        }
    }

    pub fn record_intent_failure(&self, stage: &str) {
        INTENT_STATUS_COUNT
            .with_label_values(&[IntentStatus::Fail.as_str()])
            .inc();
        INTENT_FAILURES.with_label_values(&[stage]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_settlement(&self, flow: SettlementFlow, duration: Duration) {
        SETTLEMENT_DURATION
            .with_label_values(&[flow.as_str()])
            .observe(duration.as_millis() as f64);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ALIAS METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_alias_lookup(&self, source: LookupSource) {
        ALIAS_LOOKUPS.with_label_values(&[source.as_str()]).inc();
    }

    pub fn record_alias_registered(&self) {
        ALIAS_REGISTRATIONS.inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POOL METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_pool_event(&self, event: PoolEvent) {
        POOL_EVENTS.with_label_values(&[event.as_str()]).inc();

        match event {
            PoolEvent::Started => ACTIVE_POOLS.inc(),
            PoolEvent::Completed => ACTIVE_POOLS.dec(),
            _ => {}
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SYSTEM METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_error(&self, operation: &str, kind: ErrorKind) {
        OPERATION_ERRORS
            .with_label_values(&[operation, kind.as_str()])
            .inc();
    }

    pub fn record_log_event(&self, level: &str) {
        LOG_EVENTS.with_label_values(&[level]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Export metrics in Prometheus text format
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

/// Which flow a settlement belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementFlow {
    Payment,
    Contribution,
}

impl SettlementFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementFlow::Payment => "payment",
            SettlementFlow::Contribution => "contribution",
        }
    }
}

/// Where a username lookup was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    Cache,
    Registry,
    Miss,
}

impl LookupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupSource::Cache => "cache",
            LookupSource::Registry => "registry",
            LookupSource::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    Created,
    Joined,
    Started,
    Contribution,
    RoundAdvanced,
    Completed,
}

impl PoolEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolEvent::Created => "created",
            PoolEvent::Joined => "joined",
            PoolEvent::Started => "started",
            PoolEvent::Contribution => "contribution",
            PoolEvent::RoundAdvanced => "round_advanced",
            PoolEvent::Completed => "completed",
        }
    }
}

/// Metrics error types
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("tracing initialization error: {0}")]
    TracingInit(String),
}

impl MetricsError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new();
        assert!(collector.export_metrics().is_ok());
    }

    #[test]
    fn test_record_intent_metrics() {
        let collector = MetricsCollector::new();

        collector.record_intent_created();
        collector.record_intent_duplicate();
        collector.record_intent_status(IntentStatus::Done);
        collector.record_intent_failure("confirm");

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("dix_intents_created_total"));
        assert!(metrics.contains("dix_intent_duplicates_total"));
        assert!(metrics.contains("dix_intent_status_total"));
        assert!(metrics.contains("stage=\"confirm\""));
    }

    #[test]
    fn test_non_terminal_status_is_ignored() {
        let collector = MetricsCollector::new();
        let before = INTENT_STATUS_COUNT.with_label_values(&["sent"]).get();

        collector.record_intent_status(IntentStatus::Sent);

        assert_eq!(INTENT_STATUS_COUNT.with_label_values(&["sent"]).get(), before);
    }

    #[test]
    fn test_record_settlement_and_alias_metrics() {
        let collector = MetricsCollector::new();

        collector.record_settlement(SettlementFlow::Payment, Duration::from_millis(420));
        collector.record_settlement(SettlementFlow::Contribution, Duration::from_secs(2));
        collector.record_alias_lookup(LookupSource::Cache);
        collector.record_alias_lookup(LookupSource::Miss);

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("dix_settlement_duration_ms"));
        assert!(metrics.contains("flow=\"contribution\""));
        assert!(metrics.contains("source=\"miss\""));
    }

    #[test]
    fn test_pool_events() {
        let collector = MetricsCollector::new();

        collector.record_pool_event(PoolEvent::Created);
        collector.record_pool_event(PoolEvent::RoundAdvanced);
        collector.record_error("claim_pool", ErrorKind::Conflict);

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("event=\"round_advanced\""));
        assert!(metrics.contains("dix_pools_active"));
        assert!(metrics.contains("kind=\"conflict\""));
    }
}
