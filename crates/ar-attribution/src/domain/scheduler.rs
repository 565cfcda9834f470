//! Report scheduling: report times, due ordering and retry backoff.
//!
//! Delays are drawn by `AttributionPolicy::report_delay`; the functions here
//! are pure so the same arithmetic applies to real, fake and null reports.

use super::config::RetryConfig;
use super::entities::Timestamp;
use super::report::Report;

/// Event-level report time: the trigger time, capped at the event-level
/// window, plus `delay`.
pub fn event_level_report_time(
    event_report_window_time: Timestamp,
    trigger_time: Timestamp,
    delay: u64,
) -> Timestamp {
    trigger_time
        .min(event_report_window_time)
        .saturating_add(delay)
}

/// Aggregatable (and null) report time.
pub fn aggregatable_report_time(trigger_time: Timestamp, delay: u64) -> Timestamp {
    trigger_time.saturating_add(delay)
}

/// Sorts reports ascending by (report time, id).
pub fn order_due(reports: &mut [Report]) {
    reports.sort_by(|a, b| (a.report_time, a.id).cmp(&(b.report_time, b.id)));
}

/// Retry policy for failed deliveries.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReportScheduler {
    retry: RetryConfig,
}

impl ReportScheduler {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    /// Next attempt time after `failed_attempts` failures, or `None` once the
    /// report should be dropped.
    pub fn retry_time(&self, now: Timestamp, failed_attempts: u32) -> Option<Timestamp> {
        if failed_attempts == 0 {
            return Some(now);
        }
        if failed_attempts >= self.retry.max_send_attempts {
            return None;
        }
        let backoff = self
            .retry
            .backoff_multiplier
            .saturating_pow(failed_attempts - 1)
            .saturating_mul(self.retry.initial_retry_delay_ms);
        Some(now.saturating_add(backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Origin, Site, SourceId, SourceType, DAY_MS};
    use crate::domain::report::{EventLevelData, ReportData, ReportId};
    use uuid::Uuid;

    const MINUTE_MS: u64 = 60 * 1000;

    fn report(report_time: Timestamp, id: u128) -> Report {
        Report {
            id: ReportId(Uuid::from_u128(id)),
            destination_site: Site::parse("https://shop.example"),
            reporting_origin: Origin::new("https://ads.example"),
            trigger_time: 0,
            report_time,
            initial_report_time: report_time,
            failed_send_attempts: 0,
            source_debug_key: None,
            trigger_debug_key: None,
            data: ReportData::EventLevel(EventLevelData {
                source_id: SourceId(1),
                source_event_id: 1,
                source_type: SourceType::Event,
                trigger_data: 0,
                priority: 0,
                randomized_trigger_rate: 0.0,
                is_fake: false,
            }),
        }
    }

    #[test]
    fn test_event_level_report_time() {
        assert_eq!(event_level_report_time(30 * DAY_MS, 5 * DAY_MS, 10), 5 * DAY_MS + 10);
        assert_eq!(event_level_report_time(2 * DAY_MS, 5 * DAY_MS, 10), 2 * DAY_MS + 10);
    }

    #[test]
    fn test_aggregatable_report_time() {
        assert_eq!(aggregatable_report_time(1_000, 600), 1_600);
    }

    #[test]
    fn test_order_due_breaks_ties_by_id() {
        let mut reports = vec![report(20, 1), report(10, 9), report(10, 3)];
        order_due(&mut reports);
        let order: Vec<_> = reports.iter().map(|r| r.id.0.as_u128()).collect();
        assert_eq!(order, vec![3, 9, 1]);
    }

    #[test]
    fn test_retry_backoff() {
        let scheduler = ReportScheduler::default();
        assert_eq!(scheduler.retry_time(0, 1), Some(5 * MINUTE_MS));
        assert_eq!(scheduler.retry_time(0, 2), Some(15 * MINUTE_MS));
        assert_eq!(scheduler.retry_time(0, 3), None);
    }
}
