use ::tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::collector::{MetricsCollector, MetricsError};

/// Initialize JSON tracing at `log_level`. `RUST_LOG` overrides it.
pub fn init_tracing(log_level: &str) -> Result<(), MetricsError> {
    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(json_layer())
        .try_init()
        .map_err(|e| MetricsError::TracingInit(e.to_string()))
}

/// Like [`init_tracing`], and also count warning and error events
pub fn init_tracing_with_metrics(
    log_level: &str,
    collector: MetricsCollector,
) -> Result<(), MetricsError> {
    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(json_layer())
        .with(MetricsLayer::new(collector))
        .try_init()
        .map_err(|e| MetricsError::TracingInit(e.to_string()))
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

fn json_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .json()
}

/// Tracing layer that counts warning and error events
pub struct MetricsLayer {
    collector: MetricsCollector,
}

impl MetricsLayer {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for MetricsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::ERROR => self.collector.record_log_event("error"),
            Level::WARN => self.collector.record_log_event("warn"),
            _ => {}
        }
    }
}

/// Correlation ID for following one operation through the logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span for one facade operation on one subject (recipient, pool id, ...)
#[derive(Debug, Clone)]
pub struct OperationSpan {
    pub correlation_id: CorrelationId,
    pub operation: &'static str,
    pub subject: String,
}

impl OperationSpan {
    pub fn new(operation: &'static str, subject: impl Into<String>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            operation,
            subject: subject.into(),
        }
    }

    /// Span to instrument the operation's future with
    pub fn span(&self) -> ::tracing::Span {
        ::tracing::info_span!(
            "operation",
            correlation_id = %self.correlation_id,
            operation = self.operation,
            subject = %self.subject,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_generation() {
        let id1 = CorrelationId::new();
        let id2 = CorrelationId::new();

        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 36);
    }

    #[test]
    fn test_operation_span_creation() {
        let span = OperationSpan::new("pay", "alice");

        assert_eq!(span.operation, "pay");
        assert_eq!(span.subject, "alice");
    }

    #[test]
    fn test_second_init_fails() {
        // the first init may already have happened in another test
        let _ = init_tracing("info");
        let err = init_tracing("info").unwrap_err();
        assert!(matches!(err, MetricsError::TracingInit(_)));
    }
}
