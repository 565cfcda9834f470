//! Outcome types of the engine's entry points.
//!
//! Rejections are ordinary values here. Every entry point returns one of
//! these results; none of them fail with an error.

use super::entities::{SourceId, StoredSource};
use super::report::{Report, ReportId};
use serde::{Deserialize, Serialize};

/// Source admission status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreSourceStatus {
    Success,
    /// Stored, with randomized response applied.
    SuccessNoised,
    InternalError,
    InsufficientSourceCapacity,
    InsufficientUniqueDestinationCapacity,
    ExcessiveReportingOrigins,
    ProhibitedByPolicy,
}

impl StoreSourceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::SuccessNoised)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SuccessNoised => "success_noised",
            Self::InternalError => "internal_error",
            Self::InsufficientSourceCapacity => "insufficient_source_capacity",
            Self::InsufficientUniqueDestinationCapacity => {
                "insufficient_unique_destination_capacity"
            }
            Self::ExcessiveReportingOrigins => "excessive_reporting_origins",
            Self::ProhibitedByPolicy => "prohibited_by_policy",
        }
    }
}

/// Result of `store_source`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreSourceResult {
    pub status: StoreSourceStatus,
    /// The stored source on success.
    pub source: Option<StoredSource>,
    /// Sources deactivated to make room under the destination limit.
    pub deactivated: Vec<SourceId>,
    /// Fake reports committed by randomized response.
    pub fake_reports: Vec<Report>,
}

impl StoreSourceResult {
    pub fn rejected(status: StoreSourceStatus) -> Self {
        Self {
            status,
            source: None,
            deactivated: Vec::new(),
            fake_reports: Vec::new(),
        }
    }
}

/// Event-level channel status for one trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventLevelStatus {
    Success,
    SuccessDroppedLowerPriority,
    InternalError,
    NoCapacityForDestination,
    NoMatchingImpressions,
    Deduplicated,
    ExcessiveAttributions,
    PriorityTooLow,
    NeverAttributedSource,
    ExcessiveReportingOrigins,
    NoMatchingSourceFilterData,
    ProhibitedByPolicy,
    NoMatchingConfigurations,
    ExcessiveReports,
    FalselyAttributedSource,
    ReportWindowPassed,
    NotRegistered,
}

impl EventLevelStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::SuccessDroppedLowerPriority)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SuccessDroppedLowerPriority => "success_dropped_lower_priority",
            Self::InternalError => "internal_error",
            Self::NoCapacityForDestination => "no_capacity_for_destination",
            Self::NoMatchingImpressions => "no_matching_impressions",
            Self::Deduplicated => "deduplicated",
            Self::ExcessiveAttributions => "excessive_attributions",
            Self::PriorityTooLow => "priority_too_low",
            Self::NeverAttributedSource => "never_attributed_source",
            Self::ExcessiveReportingOrigins => "excessive_reporting_origins",
            Self::NoMatchingSourceFilterData => "no_matching_source_filter_data",
            Self::ProhibitedByPolicy => "prohibited_by_policy",
            Self::NoMatchingConfigurations => "no_matching_configurations",
            Self::ExcessiveReports => "excessive_reports",
            Self::FalselyAttributedSource => "falsely_attributed_source",
            Self::ReportWindowPassed => "report_window_passed",
            Self::NotRegistered => "not_registered",
        }
    }
}

/// Aggregatable channel status for one trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregatableStatus {
    Success,
    InternalError,
    NoCapacityForDestination,
    NoMatchingImpressions,
    ExcessiveAttributions,
    ExcessiveReportingOrigins,
    NoHistograms,
    InsufficientBudget,
    NoMatchingSourceFilterData,
    NotRegistered,
    ProhibitedByPolicy,
    Deduplicated,
    ReportWindowPassed,
}

impl AggregatableStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::InternalError => "internal_error",
            Self::NoCapacityForDestination => "no_capacity_for_destination",
            Self::NoMatchingImpressions => "no_matching_impressions",
            Self::ExcessiveAttributions => "excessive_attributions",
            Self::ExcessiveReportingOrigins => "excessive_reporting_origins",
            Self::NoHistograms => "no_histograms",
            Self::InsufficientBudget => "insufficient_budget",
            Self::NoMatchingSourceFilterData => "no_matching_source_filter_data",
            Self::NotRegistered => "not_registered",
            Self::ProhibitedByPolicy => "prohibited_by_policy",
            Self::Deduplicated => "deduplicated",
            Self::ReportWindowPassed => "report_window_passed",
        }
    }
}

/// An event-level report evicted by a higher-priority one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplacedReport {
    pub report: Report,
    pub replaced_by: ReportId,
}

/// Result of `maybe_create_and_store_report`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateReportResult {
    pub event_level_status: EventLevelStatus,
    pub aggregatable_status: AggregatableStatus,
    pub new_event_level_report: Option<Report>,
    pub replaced_event_level_report: Option<ReplacedReport>,
    pub new_aggregatable_report: Option<Report>,
    /// Source the trigger was matched against, as stored after the trigger.
    pub source: Option<StoredSource>,
    pub null_aggregatable_reports: Vec<Report>,
}

impl CreateReportResult {
    pub fn new(event_level_status: EventLevelStatus, aggregatable_status: AggregatableStatus) -> Self {
        Self {
            event_level_status,
            aggregatable_status,
            new_event_level_report: None,
            replaced_event_level_report: None,
            new_aggregatable_report: None,
            source: None,
            null_aggregatable_reports: Vec::new(),
        }
    }

    /// Both channels rejected with the same reason.
    pub fn prohibited_by_policy() -> Self {
        Self::new(
            EventLevelStatus::ProhibitedByPolicy,
            AggregatableStatus::ProhibitedByPolicy,
        )
    }

    pub fn internal_error() -> Self {
        Self::new(EventLevelStatus::InternalError, AggregatableStatus::InternalError)
    }
}

/// Why the rate limiter denied an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateLimitDenial {
    ExcessiveAttributions,
    ExcessiveReportingOrigins,
}

/// Rate limiter verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateLimitResult {
    Allowed,
    NotAllowed(RateLimitDenial),
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}
