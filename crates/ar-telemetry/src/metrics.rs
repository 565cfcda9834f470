//! Prometheus text exposition.
//!
//! The engine registers its counters in the default registry when built
//! with its `metrics` feature; this module renders whatever is registered.

use prometheus::{Encoder, Registry, TextEncoder};

use crate::TelemetryError;

/// Render the default registry in the Prometheus text format.
pub fn render_metrics() -> Result<String, TelemetryError> {
    encode(&prometheus::gather())
}

/// Render a specific registry in the Prometheus text format.
pub fn render_registry(registry: &Registry) -> Result<String, TelemetryError> {
    encode(&registry.gather())
}

fn encode(families: &[prometheus::proto::MetricFamily]) -> Result<String, TelemetryError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(families, &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}
