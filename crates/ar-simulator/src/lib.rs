//! # Attribution Simulator
//!
//! Replays a timeline of source registrations, triggers and data clears
//! through an `AttributionManager` backed by the in-memory store, and
//! collects every result and every delivered report.
//!
//! ## Input
//!
//! ```json
//! {
//!   "seed": 7,
//!   "config": { "noise_enabled": false },
//!   "debug_cookie_origins": ["https://ads.example"],
//!   "events": [
//!     { "time": 1700000000000, "type": "source",
//!       "source_origin": "https://news.example",
//!       "reporting_origin": "https://ads.example",
//!       "source_type": "navigation",
//!       "registration": { "destination": "https://shop.example", "source_event_id": "1" } },
//!     { "time": 1700086400000, "type": "trigger",
//!       "destination_origin": "https://shop.example",
//!       "reporting_origin": "https://ads.example",
//!       "registration": { "event_trigger_data": [{ "trigger_data": "3" }] } }
//!   ]
//! }
//! ```
//!
//! Events run in time order (ties keep input order). Due reports are
//! delivered before each event and once more after the last one.

mod event;
mod runner;

pub use event::{SimulationEvent, SimulationEventKind, SimulationInput};
pub use runner::{
    run_simulation, AggregatableOutcome, EventLevelOutcome, SimulationOutput, SourceOutcome,
};

use ar_attribution::ConfigError;
use thiserror::Error;

/// Simulation setup failures. Per-event rejections are part of the output.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid simulation input: {0}")]
    InvalidInput(#[from] serde_json::Error),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Parses a JSON simulation input.
pub fn parse_input(json: &str) -> Result<SimulationInput, SimulationError> {
    Ok(serde_json::from_str(json)?)
}
