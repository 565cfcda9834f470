//! Reports produced by attribution.
//!
//! A report is created when a trigger is attributed (or fabricated by the
//! noise mechanisms), waits until its report time, is handed to a sender and
//! is deleted on success or after the last failed attempt.

use super::entities::{
    AggregationCoordinator, Origin, Site, SourceId, SourceRegistrationTimeConfig, SourceType,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unguessable external report id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportId(pub Uuid);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Report kind. Each kind has its own per-destination capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportKind {
    EventLevel,
    AggregatableAttribution,
    NullAggregatable,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventLevel => "event_level",
            Self::AggregatableAttribution => "aggregatable_attribution",
            Self::NullAggregatable => "null_aggregatable",
        }
    }

    /// True for both aggregatable kinds; they share the delay configuration.
    pub fn is_aggregatable(&self) -> bool {
        !matches!(self, Self::EventLevel)
    }
}

/// One histogram bucket contribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramContribution {
    pub key: u128,
    pub value: u32,
}

/// Event-level payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventLevelData {
    pub source_id: SourceId,
    pub source_event_id: u64,
    pub source_type: SourceType,
    /// Trigger data reduced to the source category's cardinality.
    pub trigger_data: u64,
    pub priority: i64,
    pub randomized_trigger_rate: f64,
    /// Fabricated at source registration by randomized response.
    pub is_fake: bool,
}

/// Aggregatable attribution payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatableData {
    pub source_id: SourceId,
    pub source_time: Timestamp,
    pub contributions: Vec<HistogramContribution>,
    pub source_registration_time_config: SourceRegistrationTimeConfig,
    pub aggregation_coordinator: AggregationCoordinator,
    pub verification_token: Option<String>,
}

impl AggregatableData {
    /// Sum of all contribution values.
    pub fn budget_required(&self) -> u64 {
        self.contributions.iter().map(|c| u64::from(c.value)).sum()
    }
}

/// Null aggregatable payload: no source, no contributions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NullAggregatableData {
    /// Source registration time the report pretends to have.
    pub fake_source_time: Timestamp,
    pub source_registration_time_config: SourceRegistrationTimeConfig,
    pub aggregation_coordinator: AggregationCoordinator,
}

/// Kind-specific report payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReportData {
    EventLevel(EventLevelData),
    AggregatableAttribution(AggregatableData),
    NullAggregatable(NullAggregatableData),
}

/// A pending report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub destination_site: Site,
    pub reporting_origin: Origin,
    pub trigger_time: Timestamp,
    pub report_time: Timestamp,
    /// Report time assigned at creation, before any retry backoff.
    pub initial_report_time: Timestamp,
    pub failed_send_attempts: u32,
    pub source_debug_key: Option<u64>,
    pub trigger_debug_key: Option<u64>,
    pub data: ReportData,
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self.data {
            ReportData::EventLevel(_) => ReportKind::EventLevel,
            ReportData::AggregatableAttribution(_) => ReportKind::AggregatableAttribution,
            ReportData::NullAggregatable(_) => ReportKind::NullAggregatable,
        }
    }

    /// The attributed source, if any.
    pub fn source_id(&self) -> Option<SourceId> {
        match &self.data {
            ReportData::EventLevel(data) => Some(data.source_id),
            ReportData::AggregatableAttribution(data) => Some(data.source_id),
            ReportData::NullAggregatable(_) => None,
        }
    }

    pub fn event_level(&self) -> Option<&EventLevelData> {
        match &self.data {
            ReportData::EventLevel(data) => Some(data),
            _ => None,
        }
    }

    pub fn aggregatable(&self) -> Option<&AggregatableData> {
        match &self.data {
            ReportData::AggregatableAttribution(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        now >= self.report_time
    }

    /// True for reports fabricated at source registration.
    pub fn is_fake(&self) -> bool {
        self.event_level().is_some_and(|data| data.is_fake)
    }

    /// A debug copy is sent only when both sides supplied a debug key.
    pub fn has_debug_keys(&self) -> bool {
        self.source_debug_key.is_some() && self.trigger_debug_key.is_some()
    }

    /// Event-level eviction order: lower priority first, then older triggers.
    pub fn eviction_rank(&self) -> Option<(i64, Timestamp)> {
        self.event_level()
            .map(|data| (data.priority, self.trigger_time))
    }
}
