//! Attribution Manager - serialized entry point
//!
//! Wraps `AttributionStorage` in a single mutex, applies embedder policy and
//! debug-cookie rules, notifies observers and drives report delivery.
//!
//! ```text
//! handle_source ──► policy veto ──► clear debug key ──► [lock] store_source ──► observers
//! handle_trigger ─► policy veto ──► clear debug key ──► [lock] create reports ─► observers
//! send_due_reports: [lock] due reports ──► sender.send().await ──► [lock] apply outcomes
//! ```
//!
//! The storage lock is never held across an `.await` or an observer call.
//! Reports handed to the sender stay claimed until their outcome is applied,
//! so overlapping delivery passes never send the same report twice.

use crate::adapters::{AllowAllPolicy, StaticDebugCookieChecker};
use crate::domain::{
    AttributionConfig, AttributionStorage, AttributionTrigger, CreateReportResult,
    DataClearFilter, Origin, Report, ReportId, ReportKind, SendFailureOutcome, Site, SourceRegistration,
    SourceType, StorableSource, StoreSourceResult, StoreSourceStatus, StoredSource, Timestamp,
    TriggerRegistration,
};
use crate::error::{AttributionResult, RegistrationError};
use crate::metrics;
use crate::ports::inbound::{AttributionApi, DeliverySummary, MaintenanceSummary};
use crate::ports::outbound::{
    AttributionEvent, AttributionObserver, AttributionStore, DebugCookieChecker, OperationContext,
    OperationKind, OperationPolicy, ReportSender, SendOutcome, SendStatus,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Serialized attribution service.
pub struct AttributionManager<S: AttributionStore> {
    storage: Mutex<AttributionStorage<S>>,
    /// Reports claimed by a delivery pass. Only touched with `storage` held.
    in_flight: Mutex<HashSet<ReportId>>,
    observers: RwLock<Vec<Arc<dyn AttributionObserver>>>,
    policy: Arc<dyn OperationPolicy>,
    cookies: Arc<dyn DebugCookieChecker>,
}

impl<S: AttributionStore> AttributionManager<S> {
    /// Manager that allows every operation and sees no debug cookies.
    pub fn new(storage: AttributionStorage<S>) -> Self {
        Self {
            storage: Mutex::new(storage),
            in_flight: Mutex::new(HashSet::new()),
            observers: RwLock::new(Vec::new()),
            policy: Arc::new(AllowAllPolicy),
            cookies: Arc::new(StaticDebugCookieChecker::none()),
        }
    }

    pub fn with_operation_policy(mut self, policy: Arc<dyn OperationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cookie_checker(mut self, cookies: Arc<dyn DebugCookieChecker>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn add_observer(&self, observer: Arc<dyn AttributionObserver>) {
        self.observers.write().push(observer);
    }

    pub fn config(&self) -> AttributionConfig {
        self.storage.lock().config().clone()
    }

    /// Runs `f` with exclusive access to the engine.
    pub fn with_storage<R>(&self, f: impl FnOnce(&mut AttributionStorage<S>) -> R) -> R {
        f(&mut self.storage.lock())
    }

    fn notify(&self, event: AttributionEvent<'_>) {
        for observer in self.observers.read().iter() {
            observer.on_event(&event);
        }
    }

    /// Drops `debug_key` unless the reporting origin may see it.
    fn clear_debug_key(
        &self,
        debug_key: &mut Option<u64>,
        reporting_origin: &Origin,
        is_within_fenced_frame: bool,
    ) -> Option<u64> {
        if debug_key.is_none() {
            return None;
        }
        if is_within_fenced_frame || !self.cookies.is_debug_cookie_set(reporting_origin) {
            debug!(reporting_origin = %reporting_origin, "Debug key cleared");
            return debug_key.take();
        }
        None
    }

    fn source_allowed(&self, source: &StorableSource) -> bool {
        self.policy.is_operation_allowed(&OperationContext {
            kind: OperationKind::Source,
            source_origin: Some(&source.source_origin),
            destination_origin: None,
            reporting_origin: &source.reporting_origin,
        })
    }

    fn trigger_allowed(&self, trigger: &AttributionTrigger) -> bool {
        self.policy.is_operation_allowed(&OperationContext {
            kind: OperationKind::Trigger,
            source_origin: None,
            destination_origin: Some(&trigger.destination_origin),
            reporting_origin: &trigger.reporting_origin,
        })
    }

    fn report_allowed(&self, report: &Report) -> bool {
        self.policy.is_operation_allowed(&OperationContext {
            kind: OperationKind::Report,
            source_origin: None,
            destination_origin: None,
            reporting_origin: &report.reporting_origin,
        })
    }

    fn notify_trigger_changes(&self, result: &CreateReportResult) {
        if result.source.is_some() {
            self.notify(AttributionEvent::SourcesChanged);
        }
        if result.new_event_level_report.is_some() || result.replaced_event_level_report.is_some() {
            self.notify(AttributionEvent::ReportsChanged(ReportKind::EventLevel));
        }
        if result.new_aggregatable_report.is_some() {
            self.notify(AttributionEvent::ReportsChanged(
                ReportKind::AggregatableAttribution,
            ));
        }
        if !result.null_aggregatable_reports.is_empty() {
            self.notify(AttributionEvent::ReportsChanged(ReportKind::NullAggregatable));
        }
    }

    /// Applies a delivery outcome under the lock.
    fn apply_outcome(
        &self,
        report: &Report,
        outcome: SendOutcome,
        now: Timestamp,
        summary: &mut DeliverySummary,
    ) {
        let mut storage = self.storage.lock();
        let applied = match outcome.status {
            SendStatus::Sent => storage.delete_report(report.id).map(|_| summary.sent += 1),
            SendStatus::Failure | SendStatus::Dropped => {
                metrics::record_report_dropped();
                storage.delete_report(report.id).map(|_| summary.dropped += 1)
            }
            SendStatus::TransientFailure => {
                storage
                    .record_send_failure(report.id, now)
                    .map(|failure| match failure {
                        SendFailureOutcome::Rescheduled(_) => summary.rescheduled += 1,
                        SendFailureOutcome::Dropped => {
                            metrics::record_report_dropped();
                            summary.dropped += 1;
                        }
                    })
            }
        };
        self.in_flight.lock().remove(&report.id);
        drop(storage);
        if let Err(e) = applied {
            error!(report_id = %report.id, error = %e, "Failed to apply delivery outcome");
        }
    }

    /// Reads due reports and claims the ones no other pass is sending.
    fn claim_due_reports(&self, now: Timestamp) -> AttributionResult<Vec<Report>> {
        let storage = self.storage.lock();
        let due = storage.get_due_reports(now, None)?;
        let mut in_flight = self.in_flight.lock();
        Ok(due
            .into_iter()
            .filter(|report| in_flight.insert(report.id))
            .collect())
    }
}

#[async_trait]
impl<S: AttributionStore> AttributionApi for AttributionManager<S> {
    fn handle_source(&self, mut source: StorableSource, now: Timestamp) -> StoreSourceResult {
        if !self.source_allowed(&source) {
            warn!(
                source_origin = %source.source_origin,
                reporting_origin = %source.reporting_origin,
                "Source prohibited by policy"
            );
            let result = StoreSourceResult::rejected(StoreSourceStatus::ProhibitedByPolicy);
            metrics::record_source(result.status.as_str());
            self.notify(AttributionEvent::SourceHandled {
                source: &source,
                cleared_debug_key: None,
                result: &result,
            });
            return result;
        }

        let reporting_origin = source.reporting_origin.clone();
        let cleared_debug_key = self.clear_debug_key(
            &mut source.registration.debug_key,
            &reporting_origin,
            source.is_within_fenced_frame,
        );

        let result = self.storage.lock().store_source(&source, now);
        metrics::record_source(result.status.as_str());

        self.notify(AttributionEvent::SourceHandled {
            source: &source,
            cleared_debug_key,
            result: &result,
        });
        if result.status.is_success() {
            self.notify(AttributionEvent::SourcesChanged);
        }
        if !result.fake_reports.is_empty() {
            self.notify(AttributionEvent::ReportsChanged(ReportKind::EventLevel));
        }
        result
    }

    fn handle_source_header(
        &self,
        header: &str,
        source_origin: Origin,
        reporting_origin: Origin,
        source_type: SourceType,
        now: Timestamp,
    ) -> Result<StoreSourceResult, RegistrationError> {
        let max = self.storage.lock().config().max_destinations_per_source;
        let parsed = SourceRegistration::parse(header).and_then(|registration| {
            let count = registration.destination_sites.len();
            if count > max {
                return Err(RegistrationError::TooManyDestinations { count, max });
            }
            Ok(registration)
        });

        match parsed {
            Ok(registration) => Ok(self.handle_source(
                StorableSource::new(registration, source_origin, reporting_origin, source_type),
                now,
            )),
            Err(error) => {
                info!(
                    reporting_origin = %reporting_origin,
                    error = %error,
                    "Source registration rejected"
                );
                self.notify(AttributionEvent::FailedSourceRegistration {
                    header,
                    reporting_origin: &reporting_origin,
                    error: &error,
                });
                Err(error)
            }
        }
    }

    fn handle_trigger(&self, mut trigger: AttributionTrigger, now: Timestamp) -> CreateReportResult {
        if !self.trigger_allowed(&trigger) {
            warn!(
                destination = %trigger.destination_origin,
                reporting_origin = %trigger.reporting_origin,
                "Trigger prohibited by policy"
            );
            let result = CreateReportResult::prohibited_by_policy();
            metrics::record_trigger(
                result.event_level_status.as_str(),
                result.aggregatable_status.as_str(),
            );
            self.notify(AttributionEvent::TriggerHandled {
                trigger: &trigger,
                cleared_debug_key: None,
                result: &result,
            });
            return result;
        }

        let reporting_origin = trigger.reporting_origin.clone();
        let cleared_debug_key = self.clear_debug_key(
            &mut trigger.registration.debug_key,
            &reporting_origin,
            trigger.is_within_fenced_frame,
        );

        let result = self.storage.lock().maybe_create_and_store_report(&trigger, now);
        metrics::record_trigger(
            result.event_level_status.as_str(),
            result.aggregatable_status.as_str(),
        );
        metrics::record_null_reports(result.null_aggregatable_reports.len() as u64);

        self.notify(AttributionEvent::TriggerHandled {
            trigger: &trigger,
            cleared_debug_key,
            result: &result,
        });
        self.notify_trigger_changes(&result);
        result
    }

    fn handle_trigger_header(
        &self,
        header: &str,
        destination_origin: Origin,
        reporting_origin: Origin,
        now: Timestamp,
    ) -> Result<CreateReportResult, RegistrationError> {
        let registration = TriggerRegistration::parse(header).map_err(|error| {
            info!(
                reporting_origin = %reporting_origin,
                error = %error,
                "Trigger registration rejected"
            );
            error
        })?;
        Ok(self.handle_trigger(
            AttributionTrigger::new(registration, destination_origin, reporting_origin),
            now,
        ))
    }

    fn get_active_sources(&self, now: Timestamp) -> AttributionResult<Vec<StoredSource>> {
        Ok(self.storage.lock().get_active_sources(now)?)
    }

    fn get_pending_reports(
        &self,
        destination_site: &Site,
        kind: ReportKind,
    ) -> AttributionResult<Vec<Report>> {
        Ok(self
            .storage
            .lock()
            .get_pending_reports_for_destination(destination_site, kind)?)
    }

    async fn send_due_reports(
        &self,
        now: Timestamp,
        sender: &dyn ReportSender,
    ) -> DeliverySummary {
        let mut summary = DeliverySummary::default();
        let due = match self.claim_due_reports(now) {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to load due reports");
                return summary;
            }
        };

        for report in &due {
            let outcome = if self.report_allowed(report) {
                sender.send(report, false).await
            } else {
                SendOutcome {
                    status: SendStatus::Dropped,
                    http_code: None,
                }
            };

            if outcome.status == SendStatus::Sent && report.has_debug_keys() {
                let debug_outcome = sender.send(report, true).await;
                summary.debug_sent += 1;
                self.notify(AttributionEvent::DebugReportSent {
                    report,
                    http_status: debug_outcome.http_code,
                    time: now,
                });
            }

            self.apply_outcome(report, outcome, now, &mut summary);
            metrics::record_report_sent(report.kind().as_str(), outcome.status.as_str());
            debug!(
                report_id = %report.id,
                kind = report.kind().as_str(),
                status = outcome.status.as_str(),
                "Report delivery attempted"
            );

            self.notify(AttributionEvent::ReportSent {
                report,
                is_debug: false,
                outcome,
            });
            self.notify(AttributionEvent::ReportsChanged(report.kind()));
        }

        if !due.is_empty() {
            info!(
                sent = summary.sent,
                rescheduled = summary.rescheduled,
                dropped = summary.dropped,
                "Delivery pass finished"
            );
        }
        summary
    }

    fn run_maintenance(&self, now: Timestamp) -> AttributionResult<MaintenanceSummary> {
        let summary = {
            let mut storage = self.storage.lock();
            MaintenanceSummary {
                expired_sources: storage.delete_expired_sources(now)?,
                expired_rate_limits: storage.delete_expired_rate_limits(now)?,
            }
        };
        if summary.expired_sources > 0 {
            self.notify(AttributionEvent::SourcesChanged);
        }
        Ok(summary)
    }

    fn clear_data(&self, filter: &DataClearFilter) -> AttributionResult<(usize, usize)> {
        let cleared = self.storage.lock().clear_data(filter)?;
        self.notify(AttributionEvent::SourcesChanged);
        for kind in [
            ReportKind::EventLevel,
            ReportKind::AggregatableAttribution,
            ReportKind::NullAggregatable,
        ] {
            self.notify(AttributionEvent::ReportsChanged(kind));
        }
        Ok(cleared)
    }
}
