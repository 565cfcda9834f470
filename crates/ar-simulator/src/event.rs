//! Simulation input types.

use ar_attribution::{AttributionConfig, DataClearFilter, Origin, SourceType, Timestamp};
use serde::{Deserialize, Serialize};

fn default_seed() -> u64 {
    1
}

/// A full simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationInput {
    /// Seed for randomized response, delays and shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Engine configuration; `AttributionConfig::default()` when absent.
    #[serde(default)]
    pub config: Option<AttributionConfig>,
    /// Reporting origins with the debug cookie set.
    #[serde(default)]
    pub debug_cookie_origins: Vec<Origin>,
    pub events: Vec<SimulationEvent>,
}

/// One timeline entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    pub time: Timestamp,
    #[serde(flatten)]
    pub kind: SimulationEventKind,
}

/// What happens at a timeline entry.
///
/// `registration` is the header value: either a JSON object or the raw
/// header string (useful for malformed input).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulationEventKind {
    Source {
        source_origin: Origin,
        reporting_origin: Origin,
        source_type: SourceType,
        registration: serde_json::Value,
    },
    Trigger {
        destination_origin: Origin,
        reporting_origin: Origin,
        registration: serde_json::Value,
    },
    Clear {
        #[serde(default)]
        begin: Option<Timestamp>,
        #[serde(default)]
        end: Option<Timestamp>,
        #[serde(default)]
        origins: Option<Vec<Origin>>,
    },
}

impl SimulationEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Trigger { .. } => "trigger",
            Self::Clear { .. } => "clear",
        }
    }

    /// Filter for a `Clear` entry.
    pub fn clear_filter(&self) -> Option<DataClearFilter> {
        let Self::Clear { begin, end, origins } = self else {
            return None;
        };
        let all = DataClearFilter::all();
        Some(DataClearFilter {
            begin: begin.unwrap_or(all.begin),
            end: end.unwrap_or(all.end),
            origins: origins.as_ref().map(|o| o.iter().cloned().collect()),
        })
    }
}

/// Header text for a registration value.
pub(crate) fn header_text(registration: &serde_json::Value) -> String {
    match registration {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}
