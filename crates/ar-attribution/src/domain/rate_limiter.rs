//! # Rate Limiter
//!
//! Rolling-window limits over an append-only ledger of rows kept in the
//! store.
//!
//! | Scope | Keyed by | Limit |
//! |-------|----------|-------|
//! | `Source` | (source site, destination site) | distinct reporting origins |
//! | `Attribution` | (source site, destination site) | attributions, distinct reporting origins |
//!
//! A row counts while `time > now - window` and `expiry_time > now`. Expired
//! rows are filtered lazily; `delete_expired` only reclaims space.

use super::config::RateLimitConfig;
use super::entities::{Origin, Site, StoredSource, Timestamp};
use super::outcomes::{RateLimitDenial, RateLimitResult};
use crate::error::StoreError;
use crate::ports::outbound::{AttributionStore, StoreOperation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Ledger scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RateLimitScope {
    Source,
    Attribution,
}

/// One ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRow {
    pub scope: RateLimitScope,
    pub source_site: Site,
    pub destination_site: Site,
    pub reporting_origin: Origin,
    pub time: Timestamp,
    pub expiry_time: Timestamp,
}

impl RateLimitRow {
    /// True if the row still counts at `now`.
    pub fn is_active(&self, now: Timestamp, window_ms: u64) -> bool {
        self.time > now.saturating_sub(window_ms) && self.expiry_time > now
    }
}

/// Rolling-window limiter.
#[derive(Clone, Copy, Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }

    /// Checks a source registration for one destination.
    pub fn allow_source<S: AttributionStore>(
        &self,
        store: &S,
        source_site: &Site,
        destination_site: &Site,
        reporting_origin: &Origin,
        now: Timestamp,
    ) -> Result<RateLimitResult, StoreError> {
        let rows = store.rate_limit_rows(RateLimitScope::Source, source_site, destination_site)?;
        let origins = self.active_origins(&rows, now);

        if origins.contains(reporting_origin)
            || origins.len() < self.config.max_source_registration_reporting_origins
        {
            return Ok(RateLimitResult::Allowed);
        }

        debug!(
            source_site = %source_site,
            destination_site = %destination_site,
            reporting_origin = %reporting_origin,
            "Source registration rate limited"
        );
        Ok(RateLimitResult::NotAllowed(
            RateLimitDenial::ExcessiveReportingOrigins,
        ))
    }

    /// Checks an attribution of `source` for a trigger.
    pub fn allow_attribution<S: AttributionStore>(
        &self,
        store: &S,
        source: &StoredSource,
        destination_site: &Site,
        reporting_origin: &Origin,
        now: Timestamp,
    ) -> Result<RateLimitResult, StoreError> {
        let rows = store.rate_limit_rows(
            RateLimitScope::Attribution,
            &source.source_site,
            destination_site,
        )?;

        let active = rows
            .iter()
            .filter(|row| row.is_active(now, self.config.time_window_ms))
            .count();
        if active >= self.config.max_attributions {
            return Ok(RateLimitResult::NotAllowed(
                RateLimitDenial::ExcessiveAttributions,
            ));
        }

        let origins = self.active_origins(&rows, now);
        if !origins.contains(reporting_origin)
            && origins.len() >= self.config.max_attribution_reporting_origins
        {
            return Ok(RateLimitResult::NotAllowed(
                RateLimitDenial::ExcessiveReportingOrigins,
            ));
        }

        Ok(RateLimitResult::Allowed)
    }

    /// Source-scope rows for a newly stored source, one per destination.
    pub fn record_source(&self, source: &StoredSource) -> Vec<StoreOperation> {
        source
            .destination_sites
            .iter()
            .map(|destination_site| {
                StoreOperation::AppendRateLimit(RateLimitRow {
                    scope: RateLimitScope::Source,
                    source_site: source.source_site.clone(),
                    destination_site: destination_site.clone(),
                    reporting_origin: source.reporting_origin.clone(),
                    time: source.source_time,
                    expiry_time: source.expiry_time,
                })
            })
            .collect()
    }

    /// Attribution-scope row for a trigger that produced a report.
    ///
    /// Attribution rows outlive their source; only the window bounds them.
    pub fn record_attribution(
        &self,
        source: &StoredSource,
        destination_site: &Site,
        reporting_origin: &Origin,
        now: Timestamp,
    ) -> StoreOperation {
        StoreOperation::AppendRateLimit(RateLimitRow {
            scope: RateLimitScope::Attribution,
            source_site: source.source_site.clone(),
            destination_site: destination_site.clone(),
            reporting_origin: reporting_origin.clone(),
            time: now,
            expiry_time: now.saturating_add(self.config.time_window_ms),
        })
    }

    /// Eagerly drops rows that no longer count.
    pub fn delete_expired<S: AttributionStore>(
        &self,
        store: &mut S,
        now: Timestamp,
    ) -> Result<usize, StoreError> {
        store.delete_expired_rate_limits(now.saturating_sub(self.config.time_window_ms), now)
    }

    fn active_origins<'a>(&self, rows: &'a [RateLimitRow], now: Timestamp) -> BTreeSet<&'a Origin> {
        rows.iter()
            .filter(|row| row.is_active(now, self.config.time_window_ms))
            .map(|row| &row.reporting_origin)
            .collect()
    }
}
