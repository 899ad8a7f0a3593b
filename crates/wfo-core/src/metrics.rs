//! Pluggable gauge/histogram sink. The queue publishes `dlqSize` and oldest-
//! job-age gauges; the worker publishes a handler-duration histogram labeled
//! by tool. Publication failures must never affect control flow — callers
//! swallow the `Result` and log it instead of propagating it.

pub trait MetricSink: Send + Sync {
    fn gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);
    fn histogram(&self, name: &str, labels: &[(&str, &str)], value_ms: f64);
}

/// Emits every metric as a `tracing` event at `debug` level. Used as the
/// default sink when no external metrics backend is wired in.
#[derive(Default)]
pub struct TracingMetricSink;

impl MetricSink for TracingMetricSink {
    fn gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        tracing::debug!(metric = name, ?labels, value, "gauge");
    }

    fn histogram(&self, name: &str, labels: &[(&str, &str)], value_ms: f64) {
        tracing::debug!(metric = name, ?labels, value_ms, "histogram");
    }
}
