//! Core domain entities for attribution reporting.
//!
//! Sources are registered impressions/clicks; triggers are conversions
//! matched against them. Registration-time input (`StorableSource`) is kept
//! separate from the stamped record (`StoredSource`) the engine persists.

use super::filters::{FilterData, FilterPair};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Timestamp in milliseconds since UNIX epoch.
pub type Timestamp = u64;

/// One hour in milliseconds.
pub const HOUR_MS: u64 = 60 * 60 * 1000;

/// One day in milliseconds.
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// Aggregation key dictionary: key id -> 128-bit key piece.
pub type AggregationKeys = BTreeMap<String, u128>;

/// A serialized origin, e.g. `https://shop.example`.
///
/// Normalized to lowercase without a trailing slash so that equality is
/// byte equality.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Origin(String);

impl From<String> for Origin {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl Origin {
    /// Creates a normalized origin.
    pub fn new(origin: impl Into<String>) -> Self {
        let raw: String = origin.into();
        Self(raw.trim().trim_end_matches('/').to_ascii_lowercase())
    }

    /// Returns the serialized origin.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the scheme, defaulting to `https` when absent.
    pub fn scheme(&self) -> &str {
        self.0.split_once("://").map(|(s, _)| s).unwrap_or("https")
    }

    /// Returns the host without scheme, port or path.
    pub fn host(&self) -> &str {
        let rest = self.0.split_once("://").map(|(_, r)| r).unwrap_or(&self.0);
        let rest = rest.split('/').next().unwrap_or(rest);
        rest.split(':').next().unwrap_or(rest)
    }

    /// Returns the schemeful site this origin belongs to.
    pub fn site(&self) -> Site {
        Site::from_origin(self)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A schemeful site: scheme plus registrable domain.
///
/// The registrable domain is approximated by the last two host labels; a
/// public suffix list is a concern of the embedder.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Site(String);

impl Site {
    /// Derives the site of an origin.
    pub fn from_origin(origin: &Origin) -> Self {
        let host = origin.host();
        let is_ip = host.parse::<std::net::Ipv4Addr>().is_ok();
        let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
        let registrable = if is_ip || labels.len() <= 2 {
            host.to_string()
        } else {
            labels[labels.len() - 2..].join(".")
        };
        Self(format!("{}://{}", origin.scheme(), registrable))
    }

    /// Parses a site from an origin-like string (`https://a.b.example/path`).
    pub fn parse(raw: &str) -> Self {
        Self::from_origin(&Origin::new(raw))
    }

    /// Returns the serialized site.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage identifier of a persisted source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source category. Navigation sources (clicks) get more trigger-data
/// states and attributions than event sources (views).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Navigation,
    Event,
}

impl SourceType {
    /// Value exposed through the reserved `source_type` filter key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Event => "event",
        }
    }
}

/// Per-channel activity of a stored source.
///
/// `ExpiredByWindow` is never persisted; it is derived from the channel's
/// report window at read time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelState {
    #[default]
    Active,
    ExhaustedByCap,
    ExpiredByWindow,
    DeactivatedBySiteLimit,
}

impl ChannelState {
    /// Resolves the state at `now` given the channel's window deadline.
    pub fn at(self, now: Timestamp, window_deadline: Timestamp) -> Self {
        match self {
            Self::Active if now >= window_deadline => Self::ExpiredByWindow,
            other => other,
        }
    }
}

/// A fabricated event-level report committed at source registration.
///
/// Built exclusively from source metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeEventReport {
    /// Sanitized trigger data in `[0, cardinality)`.
    pub trigger_data: u64,
    /// Index of the report window this report belongs to.
    pub window_index: usize,
    /// Start of the chosen window, used as the fake trigger time.
    pub trigger_time: Timestamp,
    /// When the fake report becomes due.
    pub report_time: Timestamp,
}

/// Attribution logic fixed when the source is registered.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttributionLogic {
    /// Triggers produce real reports.
    #[default]
    Truthful,
    /// Only the precommitted reports are ever emitted. An empty list means
    /// the source is never attributed.
    Falsely(Vec<FakeEventReport>),
}

impl AttributionLogic {
    pub fn is_truthful(&self) -> bool {
        matches!(self, Self::Truthful)
    }

    /// True for a noised source with no fake reports.
    pub fn is_never(&self) -> bool {
        matches!(self, Self::Falsely(reports) if reports.is_empty())
    }
}

/// Parsed `Attribution-Reporting-Register-Source` header.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRegistration {
    pub source_event_id: u64,
    pub destination_sites: BTreeSet<Site>,
    /// Declared expiry duration in milliseconds.
    pub expiry: Option<u64>,
    /// Declared event-level report window duration in milliseconds.
    pub event_report_window: Option<u64>,
    /// Declared aggregatable report window duration in milliseconds.
    pub aggregatable_report_window: Option<u64>,
    pub priority: i64,
    pub filter_data: FilterData,
    pub debug_key: Option<u64>,
    pub aggregation_keys: AggregationKeys,
    pub debug_reporting: bool,
}

/// A source awaiting admission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorableSource {
    pub registration: SourceRegistration,
    pub source_origin: Origin,
    pub reporting_origin: Origin,
    pub source_type: SourceType,
    pub is_within_fenced_frame: bool,
}

impl StorableSource {
    pub fn new(
        registration: SourceRegistration,
        source_origin: Origin,
        reporting_origin: Origin,
        source_type: SourceType,
    ) -> Self {
        Self {
            registration,
            source_origin,
            reporting_origin,
            source_type,
            is_within_fenced_frame: false,
        }
    }

    pub fn source_site(&self) -> Site {
        self.source_origin.site()
    }
}

/// A persisted source with its stamped windows and per-channel state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSource {
    pub source_id: SourceId,
    pub source_event_id: u64,
    pub source_origin: Origin,
    pub source_site: Site,
    pub destination_sites: BTreeSet<Site>,
    pub reporting_origin: Origin,
    pub source_type: SourceType,
    pub source_time: Timestamp,
    pub expiry_time: Timestamp,
    pub event_report_window_time: Timestamp,
    pub aggregatable_report_window_time: Timestamp,
    pub priority: i64,
    pub filter_data: FilterData,
    pub debug_key: Option<u64>,
    pub aggregation_keys: AggregationKeys,
    pub attribution_logic: AttributionLogic,
    /// Randomized-response rate this source was noised with.
    pub randomized_trigger_rate: f64,
    pub event_level_state: ChannelState,
    pub aggregatable_state: ChannelState,
    pub num_event_attributions: u32,
    pub aggregatable_budget_consumed: u64,
    pub event_dedup_keys: Vec<u64>,
    pub aggregatable_dedup_keys: Vec<u64>,
}

impl StoredSource {
    /// Event-level channel state at `now`.
    pub fn event_level_state_at(&self, now: Timestamp) -> ChannelState {
        self.event_level_state.at(now, self.event_report_window_time)
    }

    /// Aggregatable channel state at `now`.
    pub fn aggregatable_state_at(&self, now: Timestamp) -> ChannelState {
        self.aggregatable_state
            .at(now, self.aggregatable_report_window_time)
    }

    /// True if either channel can still be attributed at `now`.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        now < self.expiry_time
            && (self.event_level_state_at(now) == ChannelState::Active
                || self.aggregatable_state_at(now) == ChannelState::Active)
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expiry_time
    }

    /// Deactivates both channels after losing the destination limit.
    pub fn deactivate_for_site_limit(&mut self) {
        self.event_level_state = ChannelState::DeactivatedBySiteLimit;
        self.aggregatable_state = ChannelState::DeactivatedBySiteLimit;
    }
}

/// One event-level trigger-data candidate.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventTriggerData {
    pub data: u64,
    pub priority: i64,
    pub dedup_key: Option<u64>,
    pub filters: FilterPair,
}

/// One aggregatable trigger-data descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregatableTriggerData {
    pub key_piece: u128,
    pub source_keys: BTreeSet<String>,
    pub filters: FilterPair,
}

/// An aggregatable dedup-key candidate.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregatableDedupKey {
    pub dedup_key: Option<u64>,
    pub filters: FilterPair,
}

/// Whether aggregatable reports reveal the source registration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRegistrationTimeConfig {
    #[default]
    Include,
    Exclude,
}

/// Aggregation coordinator selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregationCoordinator {
    #[default]
    #[serde(rename = "aws-cloud")]
    AwsCloud,
    #[serde(rename = "gcp-cloud")]
    GcpCloud,
}

impl AggregationCoordinator {
    pub fn parse(identifier: &str) -> Option<Self> {
        match identifier {
            "aws-cloud" => Some(Self::AwsCloud),
            "gcp-cloud" => Some(Self::GcpCloud),
            _ => None,
        }
    }
}

/// Parsed `Attribution-Reporting-Register-Trigger` header.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerRegistration {
    pub filters: FilterPair,
    pub debug_key: Option<u64>,
    pub event_triggers: Vec<EventTriggerData>,
    pub aggregatable_trigger_data: Vec<AggregatableTriggerData>,
    pub aggregatable_values: BTreeMap<String, u32>,
    pub aggregatable_dedup_keys: Vec<AggregatableDedupKey>,
    pub source_registration_time_config: SourceRegistrationTimeConfig,
    pub aggregation_coordinator: AggregationCoordinator,
    pub debug_reporting: bool,
}

impl TriggerRegistration {
    /// True if the trigger can produce aggregatable output at all.
    pub fn has_aggregatable_data(&self) -> bool {
        !self.aggregatable_values.is_empty()
    }
}

/// Verification token issued for a trigger, bound to the id its
/// aggregatable report will carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerVerification {
    pub token: String,
    pub report_id: uuid::Uuid,
}

/// A conversion. Transient: consumed when matched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionTrigger {
    pub registration: TriggerRegistration,
    pub destination_origin: Origin,
    pub reporting_origin: Origin,
    pub is_within_fenced_frame: bool,
    pub verifications: Vec<TriggerVerification>,
}

impl AttributionTrigger {
    pub fn new(
        registration: TriggerRegistration,
        destination_origin: Origin,
        reporting_origin: Origin,
    ) -> Self {
        Self {
            registration,
            destination_origin,
            reporting_origin,
            is_within_fenced_frame: false,
            verifications: Vec::new(),
        }
    }

    pub fn destination_site(&self) -> Site {
        self.destination_origin.site()
    }
}

/// Selects data removed by `clear_data`.
///
/// Records inside `[begin, end]` are removed when `origins` is `None` or when
/// one of the record's origins (or their sites) is listed.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataClearFilter {
    pub begin: Timestamp,
    pub end: Timestamp,
    pub origins: Option<BTreeSet<Origin>>,
}

impl DataClearFilter {
    /// Everything, at any time.
    pub fn all() -> Self {
        Self {
            begin: 0,
            end: Timestamp::MAX,
            origins: None,
        }
    }

    pub fn for_origins(origins: impl IntoIterator<Item = Origin>) -> Self {
        Self {
            origins: Some(origins.into_iter().collect()),
            ..Self::all()
        }
    }

    pub fn in_range(&self, time: Timestamp) -> bool {
        (self.begin..=self.end).contains(&time)
    }

    /// True if `time` is in range and any candidate origin or site matches.
    pub fn matches<'a>(
        &self,
        time: Timestamp,
        origins: impl IntoIterator<Item = &'a Origin>,
        sites: impl IntoIterator<Item = &'a Site>,
    ) -> bool {
        if !self.in_range(time) {
            return false;
        }
        let Some(filter) = &self.origins else {
            return true;
        };
        origins.into_iter().any(|o| filter.contains(o))
            || sites
                .into_iter()
                .any(|site| filter.iter().any(|o| &o.site() == site))
    }
}
