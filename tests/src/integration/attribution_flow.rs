//! # Attribution Flow
//!
//! Source and trigger headers matched end to end:
//!
//! 1. Event source, trigger five days later, one delayed report
//! 2. Deduplication keys on both channels
//! 3. Priority eviction at the per-destination cap
//! 4. All-or-nothing aggregatable budget
//! 5. Filter mismatches and header validation

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use ar_attribution::{
        AggregatableStatus, AttributionApi, AttributionConfig, EventLevelStatus,
        RegistrationError, Report, ReportKind, Site, SourceType, StoreSourceStatus, DAY_MS,
        HOUR_MS,
    };

    const MINUTE_MS: u64 = 60 * 1000;

    fn shop_site() -> Site {
        Site::parse("https://shop.example")
    }

    fn pending(manager: &TestManager, kind: ReportKind) -> Vec<Report> {
        manager.get_pending_reports(&shop_site(), kind).unwrap()
    }

    fn register_navigation(manager: &TestManager, event_id: u64, priority: i64, time: u64) {
        let result = manager
            .handle_source_header(
                &source_header(event_id, priority),
                news(),
                ads(),
                SourceType::Navigation,
                time,
            )
            .unwrap();
        assert_eq!(result.status, StoreSourceStatus::Success);
    }

    /// Runs the five-day scenario and returns its only report.
    fn five_day_scenario(seed: u64) -> Report {
        let (manager, _) = manager_with(AttributionConfig::for_testing(), seed);
        let source = manager
            .handle_source_header(
                r#"{"destination": "https://shop.example", "source_event_id": "1"}"#,
                news(),
                ads(),
                SourceType::Event,
                T,
            )
            .unwrap()
            .source
            .unwrap();
        assert_eq!(source.expiry_time, T + 30 * DAY_MS);
        assert_eq!(source.event_report_window_time, T + 30 * DAY_MS);

        let result = manager
            .handle_trigger_header(
                &event_trigger_header(5, 0, Some(77)),
                shop(),
                ads(),
                T + 5 * DAY_MS,
            )
            .unwrap();
        assert_eq!(result.event_level_status, EventLevelStatus::Success);
        assert_eq!(result.aggregatable_status, AggregatableStatus::NotRegistered);

        let reports = pending(&manager, ReportKind::EventLevel);
        assert_eq!(reports.len(), 1);
        reports.into_iter().next().unwrap()
    }

    #[test]
    fn test_event_source_triggered_after_five_days() {
        let first = five_day_scenario(1);
        assert_eq!(first.report_time, T + 5 * DAY_MS + HOUR_MS);
        assert_eq!(first.trigger_time, T + 5 * DAY_MS);
        // Event sources report one bit of trigger data.
        assert_eq!(first.event_level().unwrap().trigger_data, 1);

        let second = five_day_scenario(2);
        assert_ne!(first.id, second.id);
        assert_eq!(Report { id: first.id, ..second }, first);
    }

    #[test]
    fn test_deduplication_keys() {
        let (manager, _) = manager();
        register_navigation(&manager, 1, 0, T);

        let header = event_trigger_header(3, 0, Some(9));
        let first = manager
            .handle_trigger_header(&header, shop(), ads(), T + DAY_MS)
            .unwrap();
        assert_eq!(first.event_level_status, EventLevelStatus::Success);

        let second = manager
            .handle_trigger_header(&header, shop(), ads(), T + DAY_MS + 1)
            .unwrap();
        assert_eq!(second.event_level_status, EventLevelStatus::Deduplicated);
        assert_eq!(pending(&manager, ReportKind::EventLevel).len(), 1);

        let aggregatable = aggregatable_trigger_header(&[("campaign", 10)], Some(4));
        let first = manager
            .handle_trigger_header(&aggregatable, shop(), ads(), T + DAY_MS + 2)
            .unwrap();
        assert_eq!(first.aggregatable_status, AggregatableStatus::Success);
        let second = manager
            .handle_trigger_header(&aggregatable, shop(), ads(), T + DAY_MS + 3)
            .unwrap();
        assert_eq!(second.aggregatable_status, AggregatableStatus::Deduplicated);
        assert_eq!(pending(&manager, ReportKind::AggregatableAttribution).len(), 1);
    }

    #[test]
    fn test_eviction_keeps_highest_priorities() {
        let mut config = AttributionConfig::for_testing();
        config.max_event_level_reports_per_destination = 3;
        config.navigation.max_attributions_per_source = 10;
        let (manager, _) = manager_with(config, 5);
        register_navigation(&manager, 1, 0, T);

        let start = T + DAY_MS;
        for (i, priority) in [5, 1, 3].into_iter().enumerate() {
            let result = manager
                .handle_trigger_header(
                    &event_trigger_header(i as u64, priority, None),
                    shop(),
                    ads(),
                    start + i as u64 * MINUTE_MS,
                )
                .unwrap();
            assert_eq!(result.event_level_status, EventLevelStatus::Success);
        }

        let result = manager
            .handle_trigger_header(
                &event_trigger_header(7, 4, None),
                shop(),
                ads(),
                start + 3 * MINUTE_MS,
            )
            .unwrap();
        assert_eq!(
            result.event_level_status,
            EventLevelStatus::SuccessDroppedLowerPriority
        );
        let new_report = result.new_event_level_report.unwrap();
        let replaced = result.replaced_event_level_report.unwrap();
        assert_eq!(replaced.report.event_level().unwrap().priority, 1);
        assert_eq!(replaced.replaced_by, new_report.id);

        let mut priorities: Vec<i64> = pending(&manager, ReportKind::EventLevel)
            .iter()
            .map(|r| r.event_level().unwrap().priority)
            .collect();
        priorities.sort_unstable();
        assert_eq!(priorities, vec![3, 4, 5]);

        let too_low = manager
            .handle_trigger_header(
                &event_trigger_header(2, 0, None),
                shop(),
                ads(),
                start + 4 * MINUTE_MS,
            )
            .unwrap();
        assert_eq!(too_low.event_level_status, EventLevelStatus::PriorityTooLow);
        assert_eq!(pending(&manager, ReportKind::EventLevel).len(), 3);
    }

    #[test]
    fn test_aggregatable_budget_is_all_or_nothing() {
        let (manager, _) = manager();
        register_navigation(&manager, 1, 0, T);

        let handle = |values: &[(&str, u32)], time: u64| {
            manager
                .handle_trigger_header(&aggregatable_trigger_header(values, None), shop(), ads(), time)
                .unwrap()
        };

        let first = handle(&[("campaign", 40_000)], T + DAY_MS);
        assert_eq!(first.aggregatable_status, AggregatableStatus::Success);
        assert_eq!(first.event_level_status, EventLevelStatus::NotRegistered);
        let contributions = first
            .new_aggregatable_report
            .unwrap()
            .aggregatable()
            .unwrap()
            .contributions
            .clone();
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0].key, 0x559);

        // 20_000 + 10_000 exceeds the remaining 25_536: nothing is contributed.
        let over = handle(&[("campaign", 20_000), ("geo", 10_000)], T + DAY_MS + 1);
        assert_eq!(over.aggregatable_status, AggregatableStatus::InsufficientBudget);
        assert!(over.new_aggregatable_report.is_none());
        assert_eq!(pending(&manager, ReportKind::AggregatableAttribution).len(), 1);

        let exact = handle(&[("campaign", 25_536)], T + DAY_MS + 2);
        assert_eq!(exact.aggregatable_status, AggregatableStatus::Success);

        let exhausted = handle(&[("geo", 1)], T + DAY_MS + 3);
        assert_eq!(
            exhausted.aggregatable_status,
            AggregatableStatus::InsufficientBudget
        );
        assert_eq!(pending(&manager, ReportKind::AggregatableAttribution).len(), 2);
    }

    #[test]
    fn test_trigger_filters_against_source_filter_data() {
        let (manager, _) = manager();
        register_navigation(&manager, 1, 0, T);

        let mismatch = manager
            .handle_trigger_header(
                r#"{"filters": {"product": ["hats"]}, "event_trigger_data": [{"trigger_data": "1"}]}"#,
                shop(),
                ads(),
                T + DAY_MS,
            )
            .unwrap();
        assert_eq!(
            mismatch.event_level_status,
            EventLevelStatus::NoMatchingSourceFilterData
        );

        let wrong_type = manager
            .handle_trigger_header(
                r#"{"filters": {"source_type": ["event"]}, "event_trigger_data": [{"trigger_data": "1"}]}"#,
                shop(),
                ads(),
                T + DAY_MS,
            )
            .unwrap();
        assert_eq!(
            wrong_type.event_level_status,
            EventLevelStatus::NoMatchingSourceFilterData
        );

        let matching = manager
            .handle_trigger_header(
                r#"{"filters": {"product": ["shoes", "hats"]}, "event_trigger_data": [{"trigger_data": "1"}]}"#,
                shop(),
                ads(),
                T + DAY_MS,
            )
            .unwrap();
        assert_eq!(matching.event_level_status, EventLevelStatus::Success);
    }

    #[test]
    fn test_highest_priority_source_wins() {
        let (manager, _) = manager();
        register_navigation(&manager, 1, 10, T);
        register_navigation(&manager, 2, 0, T + 1);

        let result = manager
            .handle_trigger_header(&event_trigger_header(1, 0, None), shop(), ads(), T + DAY_MS)
            .unwrap();
        assert_eq!(
            result.new_event_level_report.unwrap().event_level().unwrap().source_event_id,
            1
        );
    }

    #[test]
    fn test_too_many_destinations_rejected() {
        let (manager, _) = manager();
        let header = r#"{"destination": ["https://a.example", "https://b.example",
            "https://c.example", "https://d.example"]}"#;
        let error = manager
            .handle_source_header(header, news(), ads(), SourceType::Event, T)
            .unwrap_err();
        assert!(matches!(
            error,
            RegistrationError::TooManyDestinations { count: 4, .. }
        ));
        assert!(manager.get_active_sources(T).unwrap().is_empty());
    }
}
