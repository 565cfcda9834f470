//! In-memory `AttributionStore`.
//!
//! Backs tests, the simulator and embedders without persistence. Secondary
//! indices mirror the lookups the engine performs:
//!
//! - sources by destination site and by expiry
//! - reports by source and by report time
//! - rate-limit rows by (scope, source site, destination site) and by time

use crate::domain::entities::{DataClearFilter, Origin, Site, SourceId, StoredSource, Timestamp};
use crate::domain::rate_limiter::{RateLimitRow, RateLimitScope};
use crate::domain::report::{Report, ReportId, ReportKind};
use crate::error::StoreError;
use crate::ports::outbound::{AttributionStore, StoreOperation};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type RateLimitKey = (RateLimitScope, Site, Site);

/// In-memory store with secondary indices.
#[derive(Default)]
pub struct InMemoryAttributionStore {
    next_source_id: u64,
    sources: HashMap<SourceId, StoredSource>,
    sources_by_destination: HashMap<Site, BTreeSet<SourceId>>,
    sources_by_expiry: BTreeSet<(Timestamp, SourceId)>,
    reports: HashMap<ReportId, Report>,
    reports_by_source: HashMap<SourceId, BTreeSet<ReportId>>,
    reports_by_time: BTreeSet<(Timestamp, ReportId)>,
    next_row_id: u64,
    rate_limits: BTreeMap<u64, RateLimitRow>,
    rate_limits_by_key: HashMap<RateLimitKey, BTreeSet<u64>>,
    rate_limits_by_time: BTreeSet<(Timestamp, u64)>,
    /// When set, every write fails. Used to exercise error paths.
    unavailable: bool,
}

impl InMemoryAttributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes all subsequent writes fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn report_count(&self) -> usize {
        self.reports.len()
    }

    pub fn rate_limit_count(&self) -> usize {
        self.rate_limits.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }
        Ok(())
    }

    fn unexpired_sources(
        &self,
        now: Timestamp,
        predicate: impl Fn(&StoredSource) -> bool,
    ) -> Vec<StoredSource> {
        let mut sources: Vec<StoredSource> = self
            .sources
            .values()
            .filter(|s| now < s.expiry_time && predicate(s))
            .cloned()
            .collect();
        sources.sort_by_key(|s| s.source_id);
        sources
    }

    fn insert_source(&mut self, source: StoredSource) {
        self.remove_source(source.source_id);
        for destination in &source.destination_sites {
            self.sources_by_destination
                .entry(destination.clone())
                .or_default()
                .insert(source.source_id);
        }
        self.sources_by_expiry
            .insert((source.expiry_time, source.source_id));
        self.sources.insert(source.source_id, source);
    }

    fn remove_source(&mut self, id: SourceId) -> Option<StoredSource> {
        let source = self.sources.remove(&id)?;
        for destination in &source.destination_sites {
            if let Some(ids) = self.sources_by_destination.get_mut(destination) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.sources_by_destination.remove(destination);
                }
            }
        }
        self.sources_by_expiry.remove(&(source.expiry_time, id));
        Some(source)
    }

    fn insert_report(&mut self, report: Report) {
        self.remove_report(report.id);
        if let Some(source_id) = report.source_id() {
            self.reports_by_source
                .entry(source_id)
                .or_default()
                .insert(report.id);
        }
        self.reports_by_time.insert((report.report_time, report.id));
        self.reports.insert(report.id, report);
    }

    fn remove_report(&mut self, id: ReportId) -> Option<Report> {
        let report = self.reports.remove(&id)?;
        if let Some(source_id) = report.source_id() {
            if let Some(ids) = self.reports_by_source.get_mut(&source_id) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.reports_by_source.remove(&source_id);
                }
            }
        }
        self.reports_by_time.remove(&(report.report_time, id));
        Some(report)
    }

    fn insert_rate_limit(&mut self, row: RateLimitRow) {
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rate_limits_by_key
            .entry((row.scope, row.source_site.clone(), row.destination_site.clone()))
            .or_default()
            .insert(id);
        self.rate_limits_by_time.insert((row.time, id));
        self.rate_limits.insert(id, row);
    }

    fn remove_rate_limit(&mut self, id: u64) {
        let Some(row) = self.rate_limits.remove(&id) else {
            return;
        };
        let key = (row.scope, row.source_site, row.destination_site);
        if let Some(ids) = self.rate_limits_by_key.get_mut(&key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.rate_limits_by_key.remove(&key);
            }
        }
        self.rate_limits_by_time.remove(&(row.time, id));
    }

    fn remove_rate_limits_matching(&mut self, filter: &DataClearFilter) -> usize {
        let doomed: Vec<u64> = self
            .rate_limits
            .iter()
            .filter(|(_, row)| {
                filter.matches(
                    row.time,
                    [&row.reporting_origin],
                    [&row.source_site, &row.destination_site],
                )
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.remove_rate_limit(*id);
        }
        doomed.len()
    }

    fn apply(&mut self, operation: StoreOperation) {
        match operation {
            StoreOperation::PutSource(source) => self.insert_source(source),
            StoreOperation::DeleteSource(id) => {
                self.remove_source(id);
            }
            StoreOperation::PutReport(report) => self.insert_report(report),
            StoreOperation::DeleteReport(id) => {
                self.remove_report(id);
            }
            StoreOperation::AppendRateLimit(row) => self.insert_rate_limit(row),
            StoreOperation::DeleteRateLimits(filter) => {
                self.remove_rate_limits_matching(&filter);
            }
        }
    }
}

impl AttributionStore for InMemoryAttributionStore {
    fn next_source_id(&mut self) -> SourceId {
        self.next_source_id += 1;
        SourceId(self.next_source_id)
    }

    fn get_source(&self, id: SourceId) -> Result<Option<StoredSource>, StoreError> {
        Ok(self.sources.get(&id).cloned())
    }

    fn get_matching_sources(
        &self,
        destination_site: &Site,
        reporting_origin: &Origin,
        now: Timestamp,
    ) -> Result<Vec<StoredSource>, StoreError> {
        let Some(ids) = self.sources_by_destination.get(destination_site) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.sources.get(id))
            .filter(|s| {
                &s.reporting_origin == reporting_origin
                    && s.source_time <= now
                    && now < s.expiry_time
            })
            .cloned()
            .collect())
    }

    fn sources_for_origin(
        &self,
        source_origin: &Origin,
        now: Timestamp,
    ) -> Result<Vec<StoredSource>, StoreError> {
        Ok(self.unexpired_sources(now, |s| &s.source_origin == source_origin))
    }

    fn sources_for_site_and_reporting_origin(
        &self,
        source_site: &Site,
        reporting_origin: &Origin,
        now: Timestamp,
    ) -> Result<Vec<StoredSource>, StoreError> {
        Ok(self.unexpired_sources(now, |s| {
            &s.source_site == source_site && &s.reporting_origin == reporting_origin
        }))
    }

    fn all_sources(&self) -> Result<Vec<StoredSource>, StoreError> {
        let mut sources: Vec<_> = self.sources.values().cloned().collect();
        sources.sort_by_key(|s| s.source_id);
        Ok(sources)
    }

    fn put_source(&mut self, source: StoredSource) -> Result<(), StoreError> {
        self.check_available()?;
        self.insert_source(source);
        Ok(())
    }

    fn get_report(&self, id: ReportId) -> Result<Option<Report>, StoreError> {
        Ok(self.reports.get(&id).cloned())
    }

    fn get_due_reports(
        &self,
        now: Timestamp,
        limit: Option<usize>,
    ) -> Result<Vec<Report>, StoreError> {
        let due = self
            .reports_by_time
            .iter()
            .take_while(|(time, _)| *time <= now)
            .filter_map(|(_, id)| self.reports.get(id))
            .cloned();
        Ok(match limit {
            Some(limit) => due.take(limit).collect(),
            None => due.collect(),
        })
    }

    fn pending_reports_for_destination(
        &self,
        destination_site: &Site,
        kind: ReportKind,
    ) -> Result<Vec<Report>, StoreError> {
        Ok(self
            .reports_by_time
            .iter()
            .filter_map(|(_, id)| self.reports.get(id))
            .filter(|r| r.kind() == kind && &r.destination_site == destination_site)
            .cloned()
            .collect())
    }

    fn all_reports(&self) -> Result<Vec<Report>, StoreError> {
        Ok(self
            .reports_by_time
            .iter()
            .filter_map(|(_, id)| self.reports.get(id))
            .cloned()
            .collect())
    }

    fn put_report(&mut self, report: Report) -> Result<(), StoreError> {
        self.check_available()?;
        self.insert_report(report);
        Ok(())
    }

    fn delete_report(&mut self, id: ReportId) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.remove_report(id).is_some())
    }

    fn increment_failed_attempts(
        &mut self,
        id: ReportId,
        next_report_time: Timestamp,
    ) -> Result<u32, StoreError> {
        self.check_available()?;
        let mut report = self
            .remove_report(id)
            .ok_or(StoreError::ReportNotFound(id))?;
        report.failed_send_attempts += 1;
        report.report_time = next_report_time;
        let attempts = report.failed_send_attempts;
        self.insert_report(report);
        Ok(attempts)
    }

    fn append_rate_limit_row(&mut self, row: RateLimitRow) -> Result<(), StoreError> {
        self.check_available()?;
        self.insert_rate_limit(row);
        Ok(())
    }

    fn rate_limit_rows(
        &self,
        scope: RateLimitScope,
        source_site: &Site,
        destination_site: &Site,
    ) -> Result<Vec<RateLimitRow>, StoreError> {
        let key = (scope, source_site.clone(), destination_site.clone());
        let Some(ids) = self.rate_limits_by_key.get(&key) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.rate_limits.get(id))
            .cloned()
            .collect())
    }

    fn delete_expired_rate_limits(
        &mut self,
        window_start: Timestamp,
        now: Timestamp,
    ) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut doomed: BTreeSet<u64> = self
            .rate_limits_by_time
            .iter()
            .take_while(|(time, _)| *time <= window_start)
            .map(|(_, id)| *id)
            .collect();
        doomed.extend(
            self.rate_limits
                .iter()
                .filter(|(_, row)| row.expiry_time <= now)
                .map(|(id, _)| *id),
        );
        for id in &doomed {
            self.remove_rate_limit(*id);
        }
        Ok(doomed.len())
    }

    fn delete_expired_sources(&mut self, now: Timestamp) -> Result<usize, StoreError> {
        self.check_available()?;
        let doomed: Vec<SourceId> = self
            .sources_by_expiry
            .iter()
            .take_while(|(expiry, _)| *expiry <= now)
            .map(|(_, id)| *id)
            .filter(|id| !self.reports_by_source.contains_key(id))
            .collect();
        for id in &doomed {
            self.remove_source(*id);
        }
        Ok(doomed.len())
    }

    fn atomic_batch_write(&mut self, operations: Vec<StoreOperation>) -> Result<(), StoreError> {
        // Nothing below can fail once availability is checked, so the batch
        // is all-or-nothing.
        self.check_available()?;
        for operation in operations {
            self.apply(operation);
        }
        Ok(())
    }
}
