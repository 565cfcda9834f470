//! # Attribution Storage Engine
//!
//! Matches triggers to stored sources and owns the lifecycle of sources,
//! reports and rate-limit rows.
//!
//! ## Trigger flow
//!
//! ```text
//! trigger ──► candidate sources (destination, reporting origin, unexpired, active)
//!                 │  priority desc, newest first; first passing top-level filters wins
//!                 ├──► event-level channel ──► dedup ─► noise ─► rate limit ─► destination cap
//!                 ├──► aggregatable channel ─► dedup ─► histograms ─► rate limit ─► cap ─► budget
//!                 └──► null aggregatable reports (always)
//!                                  │
//!                       one atomic store batch
//! ```
//!
//! The engine takes `&mut self` and holds no locks; callers serialize access.
//! Every call receives `now` explicitly.

use super::config::AttributionConfig;
use super::entities::{
    AttributionLogic, AttributionTrigger, ChannelState, DataClearFilter, EventTriggerData,
    FakeEventReport, Site, SourceId, StorableSource, StoredSource, Timestamp,
};
use super::expiry::{effective_report_window, expiry_time, report_window_time};
use super::outcomes::{
    AggregatableStatus, CreateReportResult, EventLevelStatus, RateLimitDenial, RateLimitResult,
    ReplacedReport, StoreSourceResult, StoreSourceStatus,
};
use super::policy::AttributionPolicy;
use super::rate_limiter::RateLimiter;
use super::report::{
    AggregatableData, EventLevelData, HistogramContribution, Report, ReportData, ReportId,
    ReportKind,
};
use super::scheduler::{aggregatable_report_time, event_level_report_time, order_due, ReportScheduler};
use crate::error::{ConfigError, StoreError};
use crate::ports::outbound::{AttributionStore, StoreOperation};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// What happened to a report after a failed delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendFailureOutcome {
    Rescheduled(Timestamp),
    Dropped,
}

/// Event-level channel outcome before it is folded into the result.
struct EventLevelOutcome {
    status: EventLevelStatus,
    new_report: Option<Report>,
    replaced: Option<ReplacedReport>,
}

impl EventLevelOutcome {
    fn status(status: EventLevelStatus) -> Self {
        Self {
            status,
            new_report: None,
            replaced: None,
        }
    }
}

struct AggregatableOutcome {
    status: AggregatableStatus,
    new_report: Option<Report>,
}

impl AggregatableOutcome {
    fn status(status: AggregatableStatus) -> Self {
        Self {
            status,
            new_report: None,
        }
    }
}

/// The attribution engine over a store `S`.
pub struct AttributionStorage<S: AttributionStore> {
    store: S,
    config: AttributionConfig,
    policy: AttributionPolicy,
    rate_limiter: RateLimiter,
    scheduler: ReportScheduler,
}

impl<S: AttributionStore> AttributionStorage<S> {
    /// Engine with a deterministic policy seeded by `seed`.
    ///
    /// Fails when `config` does not pass [`AttributionConfig::validate`].
    pub fn new(store: S, config: AttributionConfig, seed: u64) -> Result<Self, ConfigError> {
        let policy = AttributionPolicy::new(config, seed)?;
        Ok(Self::with_policy(store, policy))
    }

    /// Engine around an existing policy; its configuration is shared.
    pub fn with_policy(store: S, policy: AttributionPolicy) -> Self {
        let config = policy.config().clone();
        Self {
            store,
            rate_limiter: RateLimiter::new(config.rate_limit),
            scheduler: ReportScheduler::new(config.retry),
            config,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }

    pub fn policy_mut(&mut self) -> &mut AttributionPolicy {
        &mut self.policy
    }

    // =========================================================================
    // SOURCES
    // =========================================================================

    /// Admits a source. Never fails; store errors become `InternalError`.
    pub fn store_source(&mut self, source: &StorableSource, now: Timestamp) -> StoreSourceResult {
        match self.try_store_source(source, now) {
            Ok(result) => {
                info!(
                    source_event_id = source.registration.source_event_id,
                    reporting_origin = %source.reporting_origin,
                    status = result.status.as_str(),
                    deactivated = result.deactivated.len(),
                    "Source handled"
                );
                result
            }
            Err(e) => {
                error!(
                    source_event_id = source.registration.source_event_id,
                    reporting_origin = %source.reporting_origin,
                    error = %e,
                    "Failed to store source"
                );
                StoreSourceResult::rejected(StoreSourceStatus::InternalError)
            }
        }
    }

    fn try_store_source(
        &mut self,
        source: &StorableSource,
        now: Timestamp,
    ) -> Result<StoreSourceResult, StoreError> {
        let registration = &source.registration;
        let source_site = source.source_site();

        let pending = self.store.sources_for_origin(&source.source_origin, now)?;
        if pending.len() >= self.config.max_sources_per_origin {
            debug!(
                source_origin = %source.source_origin,
                pending = pending.len(),
                "Source capacity exhausted"
            );
            return Ok(StoreSourceResult::rejected(
                StoreSourceStatus::InsufficientSourceCapacity,
            ));
        }

        for destination in &registration.destination_sites {
            let verdict = self.rate_limiter.allow_source(
                &self.store,
                &source_site,
                destination,
                &source.reporting_origin,
                now,
            )?;
            if !verdict.is_allowed() {
                return Ok(StoreSourceResult::rejected(
                    StoreSourceStatus::ExcessiveReportingOrigins,
                ));
            }
        }

        let deactivated = match self.sources_to_deactivate(source, &source_site, now)? {
            Some(deactivated) => deactivated,
            None => {
                return Ok(StoreSourceResult::rejected(
                    StoreSourceStatus::InsufficientUniqueDestinationCapacity,
                ))
            }
        };

        let source_id = self.store.next_source_id();
        let mut stored = self.stamp_source(source, source_id, source_site, now);
        stored.attribution_logic = self.policy.generate_randomized_response(&stored);

        let fake_reports: Vec<Report> = match &stored.attribution_logic {
            AttributionLogic::Truthful => Vec::new(),
            AttributionLogic::Falsely(fakes) => fakes
                .iter()
                .filter_map(|fake| self.fake_report(&stored, fake))
                .collect(),
        };
        let status = if stored.attribution_logic.is_truthful() {
            StoreSourceStatus::Success
        } else {
            StoreSourceStatus::SuccessNoised
        };

        let mut operations = Vec::new();
        for mut old in deactivated.iter().cloned() {
            old.deactivate_for_site_limit();
            operations.push(StoreOperation::PutSource(old));
        }
        operations.push(StoreOperation::PutSource(stored.clone()));
        operations.extend(fake_reports.iter().cloned().map(StoreOperation::PutReport));
        operations.extend(self.rate_limiter.record_source(&stored));
        self.store.atomic_batch_write(operations)?;

        Ok(StoreSourceResult {
            status,
            source: Some(stored),
            deactivated: deactivated.iter().map(|s| s.source_id).collect(),
            fake_reports,
        })
    }

    /// Oldest active sources that must give way so the (source site,
    /// reporting origin) pair stays within the destination limit. `None` if
    /// the new source alone is over the limit.
    fn sources_to_deactivate(
        &self,
        source: &StorableSource,
        source_site: &Site,
        now: Timestamp,
    ) -> Result<Option<Vec<StoredSource>>, StoreError> {
        let max = self.config.max_destinations_per_source_site_reporting_origin;
        let new_destinations = &source.registration.destination_sites;
        if new_destinations.len() > max {
            return Ok(None);
        }

        let mut existing: Vec<StoredSource> = self
            .store
            .sources_for_site_and_reporting_origin(source_site, &source.reporting_origin, now)?
            .into_iter()
            .filter(|s| s.is_active_at(now))
            .collect();
        existing.sort_by_key(|s| (s.source_time, s.source_id));

        let mut deactivated = Vec::new();
        loop {
            let distinct: BTreeSet<&Site> = existing
                .iter()
                .flat_map(|s| s.destination_sites.iter())
                .chain(new_destinations.iter())
                .collect();
            if distinct.len() <= max || existing.is_empty() {
                break;
            }
            deactivated.push(existing.remove(0));
        }
        Ok(Some(deactivated))
    }

    fn stamp_source(
        &self,
        source: &StorableSource,
        source_id: SourceId,
        source_site: Site,
        now: Timestamp,
    ) -> StoredSource {
        let registration = &source.registration;
        let expiry = expiry_time(registration.expiry, now, source.source_type);
        let event_window = effective_report_window(
            report_window_time(registration.event_report_window, now),
            expiry,
        );
        let aggregatable_window = effective_report_window(
            report_window_time(registration.aggregatable_report_window, now),
            expiry,
        );
        let randomized_trigger_rate = if self.config.noise_enabled {
            self.policy
                .randomized_response_rate(source.source_type, now, event_window)
        } else {
            0.0
        };

        StoredSource {
            source_id,
            source_event_id: registration.source_event_id,
            source_origin: source.source_origin.clone(),
            source_site,
            destination_sites: registration.destination_sites.clone(),
            reporting_origin: source.reporting_origin.clone(),
            source_type: source.source_type,
            source_time: now,
            expiry_time: expiry,
            event_report_window_time: event_window,
            aggregatable_report_window_time: aggregatable_window,
            priority: registration.priority,
            filter_data: registration.filter_data.clone(),
            debug_key: registration.debug_key,
            aggregation_keys: registration.aggregation_keys.clone(),
            attribution_logic: AttributionLogic::Truthful,
            randomized_trigger_rate,
            event_level_state: ChannelState::Active,
            aggregatable_state: ChannelState::Active,
            num_event_attributions: 0,
            aggregatable_budget_consumed: 0,
            event_dedup_keys: Vec::new(),
            aggregatable_dedup_keys: Vec::new(),
        }
    }

    fn fake_report(&mut self, source: &StoredSource, fake: &FakeEventReport) -> Option<Report> {
        let destination_site = source.destination_sites.iter().next()?.clone();
        Some(Report {
            id: self.policy.new_report_id(),
            destination_site,
            reporting_origin: source.reporting_origin.clone(),
            trigger_time: fake.trigger_time,
            report_time: fake.report_time,
            initial_report_time: fake.report_time,
            failed_send_attempts: 0,
            source_debug_key: source.debug_key,
            trigger_debug_key: None,
            data: ReportData::EventLevel(EventLevelData {
                source_id: source.source_id,
                source_event_id: source.source_event_id,
                source_type: source.source_type,
                trigger_data: fake.trigger_data,
                priority: 0,
                randomized_trigger_rate: source.randomized_trigger_rate,
                is_fake: true,
            }),
        })
    }

    // =========================================================================
    // TRIGGERS
    // =========================================================================

    /// Attributes a trigger. Never fails; store errors become `InternalError`
    /// for both channels and nothing is written.
    pub fn maybe_create_and_store_report(
        &mut self,
        trigger: &AttributionTrigger,
        now: Timestamp,
    ) -> CreateReportResult {
        match self.try_create_report(trigger, now) {
            Ok(result) => {
                info!(
                    destination = %trigger.destination_origin,
                    reporting_origin = %trigger.reporting_origin,
                    event_level_status = result.event_level_status.as_str(),
                    aggregatable_status = result.aggregatable_status.as_str(),
                    null_reports = result.null_aggregatable_reports.len(),
                    "Trigger handled"
                );
                result
            }
            Err(e) => {
                error!(
                    destination = %trigger.destination_origin,
                    reporting_origin = %trigger.reporting_origin,
                    error = %e,
                    "Failed to handle trigger"
                );
                CreateReportResult::internal_error()
            }
        }
    }

    fn try_create_report(
        &mut self,
        trigger: &AttributionTrigger,
        now: Timestamp,
    ) -> Result<CreateReportResult, StoreError> {
        let destination_site = trigger.destination_site();
        let registration = &trigger.registration;

        let mut candidates: Vec<StoredSource> = self
            .store
            .get_matching_sources(&destination_site, &trigger.reporting_origin, now)?
            .into_iter()
            .filter(|s| s.source_time <= now && s.is_active_at(now))
            .collect();
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.source_time.cmp(&a.source_time))
                .then(b.source_id.cmp(&a.source_id))
        });

        let mut operations = Vec::new();
        let mut result = if candidates.is_empty() {
            CreateReportResult::new(
                EventLevelStatus::NoMatchingImpressions,
                AggregatableStatus::NoMatchingImpressions,
            )
        } else if let Some(mut source) = candidates
            .into_iter()
            .find(|s| registration.filters.matches(s.source_type, &s.filter_data))
        {
            let rate_limit = self.rate_limiter.allow_attribution(
                &self.store,
                &source,
                &destination_site,
                &trigger.reporting_origin,
                now,
            )?;

            let event =
                self.evaluate_event_level(trigger, &mut source, rate_limit, now, &mut operations)?;
            let aggregatable =
                self.evaluate_aggregatable(trigger, &mut source, rate_limit, now, &mut operations)?;

            if event.new_report.is_some() || aggregatable.new_report.is_some() {
                operations.push(self.rate_limiter.record_attribution(
                    &source,
                    &destination_site,
                    &trigger.reporting_origin,
                    now,
                ));
            }
            operations.push(StoreOperation::PutSource(source.clone()));

            let mut result = CreateReportResult::new(event.status, aggregatable.status);
            result.new_event_level_report = event.new_report;
            result.replaced_event_level_report = event.replaced;
            result.new_aggregatable_report = aggregatable.new_report;
            result.source = Some(source);
            result
        } else {
            CreateReportResult::new(
                EventLevelStatus::NoMatchingSourceFilterData,
                AggregatableStatus::NoMatchingSourceFilterData,
            )
        };

        let attributed_source_time = result
            .new_aggregatable_report
            .as_ref()
            .and(result.source.as_ref())
            .map(|s| s.source_time);
        let null_reports = self.policy.null_aggregatable_reports(trigger, now, attributed_source_time);
        result.null_aggregatable_reports = self.cap_null_reports(&destination_site, null_reports)?;
        operations.extend(
            result
                .null_aggregatable_reports
                .iter()
                .cloned()
                .map(StoreOperation::PutReport),
        );

        self.store.atomic_batch_write(operations)?;
        Ok(result)
    }

    fn evaluate_event_level(
        &mut self,
        trigger: &AttributionTrigger,
        source: &mut StoredSource,
        rate_limit: RateLimitResult,
        now: Timestamp,
        operations: &mut Vec<StoreOperation>,
    ) -> Result<EventLevelOutcome, StoreError> {
        let registration = &trigger.registration;
        if registration.event_triggers.is_empty() {
            return Ok(EventLevelOutcome::status(EventLevelStatus::NotRegistered));
        }

        let Some(event_trigger) = registration
            .event_triggers
            .iter()
            .find(|e| e.filters.matches(source.source_type, &source.filter_data))
        else {
            return Ok(EventLevelOutcome::status(
                EventLevelStatus::NoMatchingConfigurations,
            ));
        };

        match source.event_level_state_at(now) {
            ChannelState::Active => {}
            ChannelState::ExpiredByWindow => {
                return Ok(EventLevelOutcome::status(EventLevelStatus::ReportWindowPassed))
            }
            ChannelState::ExhaustedByCap | ChannelState::DeactivatedBySiteLimit => {
                return Ok(EventLevelOutcome::status(EventLevelStatus::ExcessiveReports))
            }
        }

        if let Some(dedup_key) = event_trigger.dedup_key {
            if source.event_dedup_keys.contains(&dedup_key) {
                return Ok(EventLevelOutcome::status(EventLevelStatus::Deduplicated));
            }
        }

        if let AttributionLogic::Falsely(fakes) = &source.attribution_logic {
            let status = if fakes.is_empty() {
                EventLevelStatus::NeverAttributedSource
            } else {
                EventLevelStatus::FalselyAttributedSource
            };
            if let Some(dedup_key) = event_trigger.dedup_key {
                source.event_dedup_keys.push(dedup_key);
            }
            return Ok(EventLevelOutcome::status(status));
        }

        if let RateLimitResult::NotAllowed(denial) = rate_limit {
            return Ok(EventLevelOutcome::status(match denial {
                RateLimitDenial::ExcessiveAttributions => EventLevelStatus::ExcessiveAttributions,
                RateLimitDenial::ExcessiveReportingOrigins => {
                    EventLevelStatus::ExcessiveReportingOrigins
                }
            }));
        }

        let report = self.new_event_level_report(trigger, source, event_trigger, now);

        let mut replaced = None;
        let pending = self
            .store
            .pending_reports_for_destination(&report.destination_site, ReportKind::EventLevel)?;
        if pending.len() >= self.config.max_event_level_reports_per_destination {
            let lowest = pending
                .iter()
                .filter(|r| !r.is_fake() && r.report_time > now)
                .min_by_key(|r| (r.eviction_rank(), r.id));
            match lowest {
                None => {
                    return Ok(EventLevelOutcome::status(
                        EventLevelStatus::NoCapacityForDestination,
                    ))
                }
                Some(lowest) if report.eviction_rank() > lowest.eviction_rank() => {
                    debug!(
                        dropped = %lowest.id,
                        replacement = %report.id,
                        "Evicting lower priority event-level report"
                    );
                    operations.push(StoreOperation::DeleteReport(lowest.id));
                    replaced = Some(ReplacedReport {
                        report: lowest.clone(),
                        replaced_by: report.id,
                    });
                }
                Some(_) => {
                    return Ok(EventLevelOutcome::status(EventLevelStatus::PriorityTooLow))
                }
            }
        }

        if let Some(dedup_key) = event_trigger.dedup_key {
            source.event_dedup_keys.push(dedup_key);
        }
        source.num_event_attributions += 1;
        let limits = self.config.limits(source.source_type);
        if source.num_event_attributions >= limits.max_attributions_per_source {
            source.event_level_state = ChannelState::ExhaustedByCap;
        }

        operations.push(StoreOperation::PutReport(report.clone()));
        let status = if replaced.is_some() {
            EventLevelStatus::SuccessDroppedLowerPriority
        } else {
            EventLevelStatus::Success
        };
        Ok(EventLevelOutcome {
            status,
            new_report: Some(report),
            replaced,
        })
    }

    fn new_event_level_report(
        &mut self,
        trigger: &AttributionTrigger,
        source: &StoredSource,
        event_trigger: &EventTriggerData,
        now: Timestamp,
    ) -> Report {
        let cardinality = self.config.limits(source.source_type).trigger_data_cardinality;
        let delay = self.policy.report_delay(ReportKind::EventLevel);
        let report_time = event_level_report_time(source.event_report_window_time, now, delay);
        Report {
            id: self.policy.new_report_id(),
            destination_site: trigger.destination_site(),
            reporting_origin: trigger.reporting_origin.clone(),
            trigger_time: now,
            report_time,
            initial_report_time: report_time,
            failed_send_attempts: 0,
            source_debug_key: source.debug_key,
            trigger_debug_key: trigger.registration.debug_key,
            data: ReportData::EventLevel(EventLevelData {
                source_id: source.source_id,
                source_event_id: source.source_event_id,
                source_type: source.source_type,
                trigger_data: event_trigger.data % cardinality,
                priority: event_trigger.priority,
                randomized_trigger_rate: source.randomized_trigger_rate,
                is_fake: false,
            }),
        }
    }

    fn evaluate_aggregatable(
        &mut self,
        trigger: &AttributionTrigger,
        source: &mut StoredSource,
        rate_limit: RateLimitResult,
        now: Timestamp,
        operations: &mut Vec<StoreOperation>,
    ) -> Result<AggregatableOutcome, StoreError> {
        let registration = &trigger.registration;
        if !registration.has_aggregatable_data() {
            return Ok(AggregatableOutcome::status(AggregatableStatus::NotRegistered));
        }

        match source.aggregatable_state_at(now) {
            ChannelState::Active => {}
            ChannelState::ExpiredByWindow => {
                return Ok(AggregatableOutcome::status(
                    AggregatableStatus::ReportWindowPassed,
                ))
            }
            ChannelState::ExhaustedByCap => {
                return Ok(AggregatableOutcome::status(
                    AggregatableStatus::InsufficientBudget,
                ))
            }
            ChannelState::DeactivatedBySiteLimit => {
                return Ok(AggregatableOutcome::status(
                    AggregatableStatus::NoMatchingImpressions,
                ))
            }
        }

        let dedup_key = registration
            .aggregatable_dedup_keys
            .iter()
            .find(|d| d.filters.matches(source.source_type, &source.filter_data))
            .and_then(|d| d.dedup_key);
        if let Some(key) = dedup_key {
            if source.aggregatable_dedup_keys.contains(&key) {
                return Ok(AggregatableOutcome::status(AggregatableStatus::Deduplicated));
            }
        }

        let contributions = self.contributions(trigger, source);
        if contributions.is_empty() {
            return Ok(AggregatableOutcome::status(AggregatableStatus::NoHistograms));
        }

        if let RateLimitResult::NotAllowed(denial) = rate_limit {
            return Ok(AggregatableOutcome::status(match denial {
                RateLimitDenial::ExcessiveAttributions => AggregatableStatus::ExcessiveAttributions,
                RateLimitDenial::ExcessiveReportingOrigins => {
                    AggregatableStatus::ExcessiveReportingOrigins
                }
            }));
        }

        let destination_site = trigger.destination_site();
        let pending = self.store.pending_reports_for_destination(
            &destination_site,
            ReportKind::AggregatableAttribution,
        )?;
        if pending.len() >= self.config.max_aggregatable_reports_per_destination {
            return Ok(AggregatableOutcome::status(
                AggregatableStatus::NoCapacityForDestination,
            ));
        }

        let required: u64 = contributions.iter().map(|c| u64::from(c.value)).sum();
        let budget = self.config.aggregatable_budget_per_source;
        if source.aggregatable_budget_consumed.saturating_add(required) > budget {
            debug!(
                source_event_id = source.source_event_id,
                consumed = source.aggregatable_budget_consumed,
                required,
                "Aggregatable budget exceeded"
            );
            return Ok(AggregatableOutcome::status(
                AggregatableStatus::InsufficientBudget,
            ));
        }

        let mut verifications = trigger.verifications.clone();
        self.policy.shuffle_trigger_verifications(&mut verifications);
        let verification = verifications.into_iter().next();
        let id = match &verification {
            Some(v) => ReportId(v.report_id),
            None => self.policy.new_report_id(),
        };
        let delay = self.policy.report_delay(ReportKind::AggregatableAttribution);
        let report_time = aggregatable_report_time(now, delay);
        let report = Report {
            id,
            destination_site,
            reporting_origin: trigger.reporting_origin.clone(),
            trigger_time: now,
            report_time,
            initial_report_time: report_time,
            failed_send_attempts: 0,
            source_debug_key: source.debug_key,
            trigger_debug_key: registration.debug_key,
            data: ReportData::AggregatableAttribution(AggregatableData {
                source_id: source.source_id,
                source_time: source.source_time,
                contributions,
                source_registration_time_config: registration.source_registration_time_config,
                aggregation_coordinator: registration.aggregation_coordinator,
                verification_token: verification.map(|v| v.token),
            }),
        };

        source.aggregatable_budget_consumed += required;
        if let Some(key) = dedup_key {
            source.aggregatable_dedup_keys.push(key);
        }
        if source.aggregatable_budget_consumed >= budget {
            source.aggregatable_state = ChannelState::ExhaustedByCap;
        }

        operations.push(StoreOperation::PutReport(report.clone()));
        Ok(AggregatableOutcome {
            status: AggregatableStatus::Success,
            new_report: Some(report),
        })
    }

    /// Histogram contributions: trigger key pieces OR-ed into the matching
    /// source keys, paired with the trigger's value for each key.
    fn contributions(
        &self,
        trigger: &AttributionTrigger,
        source: &StoredSource,
    ) -> Vec<HistogramContribution> {
        let registration = &trigger.registration;
        let mut keys = source.aggregation_keys.clone();
        for data in &registration.aggregatable_trigger_data {
            if !data.filters.matches(source.source_type, &source.filter_data) {
                continue;
            }
            for source_key in &data.source_keys {
                if let Some(key) = keys.get_mut(source_key) {
                    *key |= data.key_piece;
                }
            }
        }

        keys.iter()
            .filter_map(|(id, key)| {
                registration
                    .aggregatable_values
                    .get(id)
                    .filter(|value| **value > 0)
                    .map(|value| HistogramContribution {
                        key: *key,
                        value: *value,
                    })
            })
            .collect()
    }

    fn cap_null_reports(
        &self,
        destination_site: &Site,
        mut reports: Vec<Report>,
    ) -> Result<Vec<Report>, StoreError> {
        let Some(cap) = self.config.max_null_aggregatable_reports_per_destination else {
            return Ok(reports);
        };
        if reports.is_empty() {
            return Ok(reports);
        }
        let pending = self
            .store
            .pending_reports_for_destination(destination_site, ReportKind::NullAggregatable)?
            .len();
        let room = cap.saturating_sub(pending);
        if reports.len() > room {
            warn!(
                destination = %destination_site,
                dropped = reports.len() - room,
                "Null report capacity reached"
            );
            reports.truncate(room);
        }
        Ok(reports)
    }

    // =========================================================================
    // REPORTS
    // =========================================================================

    /// Pending reports for a destination in random order.
    pub fn get_pending_reports_for_destination(
        &mut self,
        destination_site: &Site,
        kind: ReportKind,
    ) -> Result<Vec<Report>, StoreError> {
        let mut reports = self
            .store
            .pending_reports_for_destination(destination_site, kind)?;
        self.policy.shuffle_reports(&mut reports);
        Ok(reports)
    }

    /// Reports due at `now`, ascending by (report time, id).
    pub fn get_due_reports(
        &self,
        now: Timestamp,
        limit: Option<usize>,
    ) -> Result<Vec<Report>, StoreError> {
        let mut reports = self.store.get_due_reports(now, limit)?;
        order_due(&mut reports);
        Ok(reports)
    }

    pub fn get_report(&self, id: ReportId) -> Result<Option<Report>, StoreError> {
        self.store.get_report(id)
    }

    pub fn delete_report(&mut self, id: ReportId) -> Result<bool, StoreError> {
        self.store.delete_report(id)
    }

    /// Reschedules a report after a failed send, or drops it after the last
    /// attempt.
    pub fn record_send_failure(
        &mut self,
        id: ReportId,
        now: Timestamp,
    ) -> Result<SendFailureOutcome, StoreError> {
        let report = self
            .store
            .get_report(id)?
            .ok_or(StoreError::ReportNotFound(id))?;
        let attempts = report.failed_send_attempts + 1;

        match self.scheduler.retry_time(now, attempts) {
            Some(next) => {
                self.store.increment_failed_attempts(id, next)?;
                debug!(report_id = %id, attempts, next, "Report rescheduled");
                Ok(SendFailureOutcome::Rescheduled(next))
            }
            None => {
                self.store.delete_report(id)?;
                warn!(report_id = %id, attempts, "Report dropped after failed attempts");
                Ok(SendFailureOutcome::Dropped)
            }
        }
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Unexpired sources with at least one active channel.
    pub fn get_active_sources(&self, now: Timestamp) -> Result<Vec<StoredSource>, StoreError> {
        Ok(self
            .store
            .all_sources()?
            .into_iter()
            .filter(|s| s.is_active_at(now))
            .collect())
    }

    pub fn delete_expired_sources(&mut self, now: Timestamp) -> Result<usize, StoreError> {
        let deleted = self.store.delete_expired_sources(now)?;
        debug!(deleted, "Expired sources deleted");
        Ok(deleted)
    }

    pub fn delete_expired_rate_limits(&mut self, now: Timestamp) -> Result<usize, StoreError> {
        let deleted = self.rate_limiter.delete_expired(&mut self.store, now)?;
        debug!(deleted, "Expired rate limits deleted");
        Ok(deleted)
    }

    /// Removes sources, reports and rate-limit rows selected by `filter`.
    ///
    /// A cleared source takes its reports with it. Returns the number of
    /// sources and reports removed.
    pub fn clear_data(&mut self, filter: &DataClearFilter) -> Result<(usize, usize), StoreError> {
        let sources: Vec<SourceId> = self
            .store
            .all_sources()?
            .into_iter()
            .filter(|s| {
                filter.matches(
                    s.source_time,
                    [&s.source_origin, &s.reporting_origin],
                    s.destination_sites.iter(),
                )
            })
            .map(|s| s.source_id)
            .collect();
        let cleared: BTreeSet<SourceId> = sources.iter().copied().collect();

        let reports: Vec<ReportId> = self
            .store
            .all_reports()?
            .into_iter()
            .filter(|r| {
                r.source_id().is_some_and(|id| cleared.contains(&id))
                    || filter.matches(
                        r.trigger_time,
                        [&r.reporting_origin],
                        [&r.destination_site],
                    )
            })
            .map(|r| r.id)
            .collect();

        let mut operations: Vec<StoreOperation> = sources
            .iter()
            .copied()
            .map(StoreOperation::DeleteSource)
            .collect();
        operations.extend(reports.iter().copied().map(StoreOperation::DeleteReport));
        operations.push(StoreOperation::DeleteRateLimits(filter.clone()));
        self.store.atomic_batch_write(operations)?;

        info!(
            sources = sources.len(),
            reports = reports.len(),
            "Attribution data cleared"
        );
        Ok((sources.len(), reports.len()))
    }
}
