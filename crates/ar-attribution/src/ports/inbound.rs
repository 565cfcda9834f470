//! # Inbound Port - AttributionApi
//!
//! Primary driving port exposing the attribution engine to the embedder.
//!
//! | Method | Called when |
//! |--------|-------------|
//! | `handle_source` / `handle_source_header` | a source registration response arrives |
//! | `handle_trigger` / `handle_trigger_header` | a trigger registration response arrives |
//! | `send_due_reports` | the delivery timer fires |
//! | `run_maintenance` | the embedder schedules housekeeping |
//! | `clear_data` | the user clears browsing data |

use crate::domain::{
    AttributionTrigger, CreateReportResult, DataClearFilter, Origin, Report, ReportKind, Site,
    SourceType, StorableSource, StoreSourceResult, StoredSource, Timestamp,
};
use crate::error::{AttributionResult, RegistrationError};
use crate::ports::outbound::ReportSender;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Tally of one `send_due_reports` pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub sent: usize,
    pub rescheduled: usize,
    pub dropped: usize,
    pub debug_sent: usize,
}

/// Counts removed by one `run_maintenance` pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceSummary {
    pub expired_sources: usize,
    pub expired_rate_limits: usize,
}

/// Primary API of the attribution engine.
///
/// Every entry point returns a definitive outcome. Rejections are values in
/// the result; `Err` is reserved for malformed headers and store failures on
/// the query paths.
///
/// # Example
///
/// ```rust,ignore
/// use ar_attribution::ports::AttributionApi;
///
/// async fn example(api: &impl AttributionApi, sender: &dyn ReportSender, now: u64) {
///     let result = api.handle_trigger(trigger, now);
///     let summary = api.send_due_reports(now + HOUR_MS, sender).await;
/// }
/// ```
#[async_trait]
pub trait AttributionApi: Send + Sync {
    /// Admits a parsed source registration.
    fn handle_source(&self, source: StorableSource, now: Timestamp) -> StoreSourceResult;

    /// Parses a source header and admits it.
    ///
    /// # Errors
    /// - `RegistrationError`: the header is malformed; observers are told
    fn handle_source_header(
        &self,
        header: &str,
        source_origin: Origin,
        reporting_origin: Origin,
        source_type: SourceType,
        now: Timestamp,
    ) -> Result<StoreSourceResult, RegistrationError>;

    /// Attributes a parsed trigger.
    fn handle_trigger(&self, trigger: AttributionTrigger, now: Timestamp) -> CreateReportResult;

    /// Parses a trigger header and attributes it.
    fn handle_trigger_header(
        &self,
        header: &str,
        destination_origin: Origin,
        reporting_origin: Origin,
        now: Timestamp,
    ) -> Result<CreateReportResult, RegistrationError>;

    /// Unexpired sources with at least one active channel.
    fn get_active_sources(&self, now: Timestamp) -> AttributionResult<Vec<StoredSource>>;

    /// Pending reports of one kind for a destination, in random order.
    fn get_pending_reports(
        &self,
        destination_site: &Site,
        kind: ReportKind,
    ) -> AttributionResult<Vec<Report>>;

    /// Hands every due report to `sender` and applies the outcomes.
    async fn send_due_reports(&self, now: Timestamp, sender: &dyn ReportSender)
        -> DeliverySummary;

    /// Deletes expired sources and rate-limit rows.
    fn run_maintenance(&self, now: Timestamp) -> AttributionResult<MaintenanceSummary>;

    /// Removes data selected by `filter`. Returns (sources, reports) removed.
    fn clear_data(&self, filter: &DataClearFilter) -> AttributionResult<(usize, usize)>;
}
