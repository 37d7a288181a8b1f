//! Prometheus text export.
//!
//! `snq-consensus` registers its counters in the default registry when built
//! with its `metrics` feature; this module renders whatever is registered.

use prometheus::{Encoder, TextEncoder};

use crate::TelemetryError;

/// Render every metric in the default registry in the text exposition
/// format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsEncode(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsEncode(e.to_string()))
}
