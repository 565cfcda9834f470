//! Observer adapters.
//!
//! `AttributionEvent` borrows from the manager's call frame, so recording
//! observers copy out an owned `RecordedEvent`.

use crate::domain::{AggregatableStatus, EventLevelStatus, ReportId, ReportKind, StoreSourceStatus};
use crate::error::RegistrationError;
use crate::ports::outbound::{AttributionEvent, AttributionObserver, SendStatus};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Owned snapshot of an `AttributionEvent`.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    SourcesChanged,
    ReportsChanged(ReportKind),
    SourceHandled {
        source_event_id: u64,
        status: StoreSourceStatus,
        cleared_debug_key: Option<u64>,
    },
    TriggerHandled {
        event_level_status: EventLevelStatus,
        aggregatable_status: AggregatableStatus,
        cleared_debug_key: Option<u64>,
    },
    ReportSent {
        report_id: ReportId,
        kind: ReportKind,
        is_debug: bool,
        status: SendStatus,
    },
    DebugReportSent {
        report_id: ReportId,
        http_status: Option<u16>,
    },
    FailedSourceRegistration {
        header: String,
        error: RegistrationError,
    },
}

impl From<&AttributionEvent<'_>> for RecordedEvent {
    fn from(event: &AttributionEvent<'_>) -> Self {
        match event {
            AttributionEvent::SourcesChanged => Self::SourcesChanged,
            AttributionEvent::ReportsChanged(kind) => Self::ReportsChanged(*kind),
            AttributionEvent::SourceHandled {
                source,
                cleared_debug_key,
                result,
            } => Self::SourceHandled {
                source_event_id: source.registration.source_event_id,
                status: result.status,
                cleared_debug_key: *cleared_debug_key,
            },
            AttributionEvent::TriggerHandled {
                cleared_debug_key,
                result,
                ..
            } => Self::TriggerHandled {
                event_level_status: result.event_level_status,
                aggregatable_status: result.aggregatable_status,
                cleared_debug_key: *cleared_debug_key,
            },
            AttributionEvent::ReportSent {
                report,
                is_debug,
                outcome,
            } => Self::ReportSent {
                report_id: report.id,
                kind: report.kind(),
                is_debug: *is_debug,
                status: outcome.status,
            },
            AttributionEvent::DebugReportSent {
                report,
                http_status,
                ..
            } => Self::DebugReportSent {
                report_id: report.id,
                http_status: *http_status,
            },
            AttributionEvent::FailedSourceRegistration { header, error, .. } => {
                Self::FailedSourceRegistration {
                    header: header.to_string(),
                    error: (*error).clone(),
                }
            }
        }
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl AttributionObserver for NoOpObserver {
    fn on_event(&self, _event: &AttributionEvent<'_>) {}
}

/// Observer that keeps every event, for tests and the simulator.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns the recorded events.
    pub fn take(&self) -> Vec<RecordedEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count(&self, predicate: impl Fn(&RecordedEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl AttributionObserver for RecordingObserver {
    fn on_event(&self, event: &AttributionEvent<'_>) {
        self.events.lock().push(RecordedEvent::from(event));
    }
}

/// Observer that mirrors events into `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AttributionObserver for TracingObserver {
    fn on_event(&self, event: &AttributionEvent<'_>) {
        match event {
            AttributionEvent::SourcesChanged => debug!("Sources changed"),
            AttributionEvent::ReportsChanged(kind) => {
                debug!(kind = kind.as_str(), "Reports changed")
            }
            AttributionEvent::SourceHandled { source, result, .. } => info!(
                source_event_id = source.registration.source_event_id,
                reporting_origin = %source.reporting_origin,
                status = result.status.as_str(),
                "Observed source"
            ),
            AttributionEvent::TriggerHandled { trigger, result, .. } => info!(
                reporting_origin = %trigger.reporting_origin,
                event_level_status = result.event_level_status.as_str(),
                aggregatable_status = result.aggregatable_status.as_str(),
                "Observed trigger"
            ),
            AttributionEvent::ReportSent {
                report,
                is_debug,
                outcome,
            } => info!(
                report_id = %report.id,
                kind = report.kind().as_str(),
                is_debug,
                status = outcome.status.as_str(),
                "Observed report delivery"
            ),
            AttributionEvent::DebugReportSent {
                report,
                http_status,
                ..
            } => debug!(report_id = %report.id, ?http_status, "Observed debug report"),
            AttributionEvent::FailedSourceRegistration {
                reporting_origin,
                error,
                ..
            } => info!(
                reporting_origin = %reporting_origin,
                error = %error,
                "Observed failed source registration"
            ),
        }
    }
}
