//! # SNQ Telemetry
//!
//! Logging setup and metrics export for service node consensus.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snq_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SNQ_SERVICE_NAME` | `snq-node` | Service name attached to logs |
//! | `SNQ_LOG_LEVEL` | `info` | Log filter, falls back to `RUST_LOG` |
//! | `SNQ_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `SNQ_JSON_LOGS` | `false` | JSON instead of pretty output |
//! | `SNQ_NETWORK` | `testnet` | Network name |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::encode_metrics;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to encode metrics: {0}")]
    MetricsEncode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
