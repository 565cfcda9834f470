//! # Outbound Ports
//!
//! Dependencies of the engine on its environment.
//!
//! | Port | Implemented by |
//! |------|----------------|
//! | `AttributionStore` | `adapters::InMemoryAttributionStore`, embedder databases |
//! | `ReportSender` | embedder network stack, `adapters::RecordingReportSender` |
//! | `DebugCookieChecker` | embedder cookie jar, `adapters::StaticDebugCookieChecker` |
//! | `OperationPolicy` | embedder settings, `adapters::AllowAllPolicy` |
//! | `AttributionObserver` | UI / internals pages, `adapters::RecordingObserver` |

use crate::domain::entities::{
    AttributionTrigger, DataClearFilter, Origin, Site, SourceId, StorableSource, StoredSource,
    Timestamp,
};
use crate::domain::outcomes::{CreateReportResult, StoreSourceResult};
use crate::domain::rate_limiter::{RateLimitRow, RateLimitScope};
use crate::domain::report::{Report, ReportId, ReportKind};
use crate::error::{RegistrationError, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single write inside an atomic batch.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreOperation {
    PutSource(StoredSource),
    DeleteSource(SourceId),
    PutReport(Report),
    DeleteReport(ReportId),
    AppendRateLimit(RateLimitRow),
    DeleteRateLimits(DataClearFilter),
}

/// Durable storage of sources, reports and the rate-limit ledger.
///
/// Reads return owned copies; all engine writes go through
/// `atomic_batch_write` so one registration or trigger is applied entirely
/// or not at all.
pub trait AttributionStore: Send + Sync {
    /// Allocates the next source id.
    fn next_source_id(&mut self) -> SourceId;

    fn get_source(&self, id: SourceId) -> Result<Option<StoredSource>, StoreError>;

    /// Unexpired sources registered at or before `now` for this destination
    /// site and reporting origin.
    fn get_matching_sources(
        &self,
        destination_site: &Site,
        reporting_origin: &Origin,
        now: Timestamp,
    ) -> Result<Vec<StoredSource>, StoreError>;

    /// Unexpired sources registered by `source_origin`.
    fn sources_for_origin(
        &self,
        source_origin: &Origin,
        now: Timestamp,
    ) -> Result<Vec<StoredSource>, StoreError>;

    /// Unexpired sources for a (source site, reporting origin) pair.
    fn sources_for_site_and_reporting_origin(
        &self,
        source_site: &Site,
        reporting_origin: &Origin,
        now: Timestamp,
    ) -> Result<Vec<StoredSource>, StoreError>;

    fn all_sources(&self) -> Result<Vec<StoredSource>, StoreError>;

    fn put_source(&mut self, source: StoredSource) -> Result<(), StoreError>;

    fn get_report(&self, id: ReportId) -> Result<Option<Report>, StoreError>;

    /// Reports with `report_time <= now`, up to `limit`.
    fn get_due_reports(
        &self,
        now: Timestamp,
        limit: Option<usize>,
    ) -> Result<Vec<Report>, StoreError>;

    fn pending_reports_for_destination(
        &self,
        destination_site: &Site,
        kind: ReportKind,
    ) -> Result<Vec<Report>, StoreError>;

    fn all_reports(&self) -> Result<Vec<Report>, StoreError>;

    fn put_report(&mut self, report: Report) -> Result<(), StoreError>;

    /// Returns whether the report existed.
    fn delete_report(&mut self, id: ReportId) -> Result<bool, StoreError>;

    /// Bumps the failed-attempt count and reschedules. Returns the new count.
    fn increment_failed_attempts(
        &mut self,
        id: ReportId,
        next_report_time: Timestamp,
    ) -> Result<u32, StoreError>;

    fn append_rate_limit_row(&mut self, row: RateLimitRow) -> Result<(), StoreError>;

    fn rate_limit_rows(
        &self,
        scope: RateLimitScope,
        source_site: &Site,
        destination_site: &Site,
    ) -> Result<Vec<RateLimitRow>, StoreError>;

    /// Deletes rows with `time <= window_start` or `expiry_time <= now`.
    fn delete_expired_rate_limits(
        &mut self,
        window_start: Timestamp,
        now: Timestamp,
    ) -> Result<usize, StoreError>;

    /// Deletes expired sources with no pending reports.
    fn delete_expired_sources(&mut self, now: Timestamp) -> Result<usize, StoreError>;

    /// Applies all operations or none.
    fn atomic_batch_write(&mut self, operations: Vec<StoreOperation>) -> Result<(), StoreError>;
}

/// Delivery status reported by a sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
    Sent,
    /// Transient failure; retried with backoff.
    TransientFailure,
    /// Permanent failure; the report is dropped.
    Failure,
    /// Report was dropped before sending (e.g. by policy at send time).
    Dropped,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::TransientFailure => "transient_failure",
            Self::Failure => "failure",
            Self::Dropped => "dropped",
        }
    }
}

/// Outcome of one delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub status: SendStatus,
    pub http_code: Option<u16>,
}

impl SendOutcome {
    pub fn sent(http_code: u16) -> Self {
        Self {
            status: SendStatus::Sent,
            http_code: Some(http_code),
        }
    }

    pub fn transient_failure() -> Self {
        Self {
            status: SendStatus::TransientFailure,
            http_code: None,
        }
    }
}

/// Network delivery of reports.
#[async_trait]
pub trait ReportSender: Send + Sync {
    async fn send(&self, report: &Report, is_debug: bool) -> SendOutcome;
}

/// Debug-mode cookie check for a reporting origin.
pub trait DebugCookieChecker: Send + Sync {
    fn is_debug_cookie_set(&self, reporting_origin: &Origin) -> bool;
}

/// Kind of operation checked by `OperationPolicy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Source,
    Trigger,
    Report,
}

/// Context of an operation checked against embedder policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationContext<'a> {
    pub kind: OperationKind,
    pub source_origin: Option<&'a Origin>,
    pub destination_origin: Option<&'a Origin>,
    pub reporting_origin: &'a Origin,
}

/// Embedder veto, consulted first at every entry point.
pub trait OperationPolicy: Send + Sync {
    fn is_operation_allowed(&self, context: &OperationContext<'_>) -> bool;
}

/// Events produced by the manager, fired synchronously after the state change.
#[derive(Clone, Debug)]
pub enum AttributionEvent<'a> {
    SourcesChanged,
    ReportsChanged(ReportKind),
    SourceHandled {
        source: &'a StorableSource,
        cleared_debug_key: Option<u64>,
        result: &'a StoreSourceResult,
    },
    TriggerHandled {
        trigger: &'a AttributionTrigger,
        cleared_debug_key: Option<u64>,
        result: &'a CreateReportResult,
    },
    ReportSent {
        report: &'a Report,
        is_debug: bool,
        outcome: SendOutcome,
    },
    DebugReportSent {
        report: &'a Report,
        http_status: Option<u16>,
        time: Timestamp,
    },
    FailedSourceRegistration {
        header: &'a str,
        reporting_origin: &'a Origin,
        error: &'a RegistrationError,
    },
}

/// Observer of engine activity.
pub trait AttributionObserver: Send + Sync {
    fn on_event(&self, event: &AttributionEvent<'_>);
}
