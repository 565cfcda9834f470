//! # Attribution Telemetry
//!
//! Logging and metrics exposition shared by the attribution binaries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ar_telemetry::{init_tracing, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     if let Err(e) = init_tracing(&config) {
//!         eprintln!("telemetry disabled: {e}");
//!     }
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `AR_SERVICE_NAME` | `attribution-reporting` | Service name in startup logs |
//! | `AR_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `AR_CONSOLE_OUTPUT` | `true` | Write logs to stderr |
//! | `AR_JSON_LOGS` | `false` | JSON formatted logs |

mod config;
mod logging;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
#[doc(hidden)]
pub use logging::__tracing;
pub use metrics::{render_metrics, render_registry};
pub use tracing_setup::{build_env_filter, init_test_tracing, init_tracing};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),

    #[error("Failed to encode metrics: {0}")]
    Metrics(String),
}
