//! # Report Delivery
//!
//! Due reports handed to an async sender: success, transient failures with
//! backoff, debug copies and embedder vetoes at send time.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use ar_attribution::{
        AttributionApi, BlockOriginsPolicy, OperationKind, RecordedEvent, RecordingReportSender,
        ReportKind, SendStatus, Site, SourceType, StaticDebugCookieChecker, DAY_MS, HOUR_MS,
    };
    use std::sync::Arc;

    const MINUTE_MS: u64 = 60 * 1000;

    /// Due time of the single event-level report created by `attribute`.
    const REPORT_TIME: u64 = T + DAY_MS + HOUR_MS;

    fn attribute(manager: &TestManager) {
        manager
            .handle_source_header(&source_header(1, 0), news(), ads(), SourceType::Navigation, T)
            .unwrap();
        let result = manager
            .handle_trigger_header(&event_trigger_header(2, 0, None), shop(), ads(), T + DAY_MS)
            .unwrap();
        assert_eq!(result.new_event_level_report.unwrap().report_time, REPORT_TIME);
    }

    fn pending_count(manager: &TestManager) -> usize {
        manager
            .get_pending_reports(&Site::parse("https://shop.example"), ReportKind::EventLevel)
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_reports_wait_until_due() {
        let (manager, observer) = manager();
        attribute(&manager);
        let sender = RecordingReportSender::new();

        let early = manager.send_due_reports(REPORT_TIME - 1, &sender).await;
        assert_eq!(early.sent, 0);
        assert!(sender.sent().is_empty());

        let due = manager.send_due_reports(REPORT_TIME, &sender).await;
        assert_eq!(due.sent, 1);
        assert_eq!(pending_count(&manager), 0);
        assert_eq!(
            observer.count(|e| matches!(
                e,
                RecordedEvent::ReportSent { status: SendStatus::Sent, is_debug: false, .. }
            )),
            1
        );
    }

    #[tokio::test]
    async fn test_transient_failures_back_off_then_drop() {
        let (manager, _) = manager();
        attribute(&manager);
        let sender = RecordingReportSender::new();
        sender.fail_next(3);

        let first = manager.send_due_reports(REPORT_TIME, &sender).await;
        assert_eq!(first.rescheduled, 1);

        // Retried 5 minutes later, then 15 minutes after that.
        let second_attempt = REPORT_TIME + 5 * MINUTE_MS;
        let idle = manager.send_due_reports(second_attempt - 1, &sender).await;
        assert_eq!(idle, Default::default());

        let second = manager.send_due_reports(second_attempt, &sender).await;
        assert_eq!(second.rescheduled, 1);

        let third = manager
            .send_due_reports(second_attempt + 15 * MINUTE_MS, &sender)
            .await;
        assert_eq!(third.dropped, 1);
        assert_eq!(pending_count(&manager), 0);

        let attempts = sender.sent();
        assert_eq!(attempts.len(), 3);
        assert!(attempts
            .iter()
            .all(|a| a.outcome.status == SendStatus::TransientFailure));
        assert!(sender.delivered_ids().is_empty());
    }

    #[tokio::test]
    async fn test_debug_copy_follows_successful_send() {
        let (manager, observer) = manager();
        let manager = manager.with_cookie_checker(Arc::new(StaticDebugCookieChecker::all()));
        attribute(&manager);
        let sender = RecordingReportSender::new();

        let summary = manager.send_due_reports(REPORT_TIME, &sender).await;
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.debug_sent, 1);

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent.iter().filter(|s| s.is_debug).count(), 1);
        assert_eq!(sent[0].report.source_debug_key, Some(100));
        assert_eq!(
            observer.count(|e| matches!(e, RecordedEvent::DebugReportSent { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_no_debug_copy_after_failed_send() {
        let (manager, _) = manager();
        let manager = manager.with_cookie_checker(Arc::new(StaticDebugCookieChecker::all()));
        attribute(&manager);
        let sender = RecordingReportSender::new();
        sender.fail_next(1);

        let summary = manager.send_due_reports(REPORT_TIME, &sender).await;
        assert_eq!(summary.rescheduled, 1);
        assert_eq!(summary.debug_sent, 0);
        assert!(sender.sent().iter().all(|s| !s.is_debug));
    }

    #[tokio::test]
    async fn test_policy_drops_reports_at_send_time() {
        let (manager, observer) = manager();
        let manager = manager.with_operation_policy(Arc::new(
            BlockOriginsPolicy::new([ads()]).for_kinds([OperationKind::Report]),
        ));
        attribute(&manager);
        let sender = RecordingReportSender::new();

        let summary = manager.send_due_reports(REPORT_TIME, &sender).await;
        assert_eq!(summary.dropped, 1);
        assert!(sender.sent().is_empty());
        assert_eq!(pending_count(&manager), 0);
        assert_eq!(
            observer.count(|e| matches!(
                e,
                RecordedEvent::ReportSent { status: SendStatus::Dropped, .. }
            )),
            1
        );
    }

    #[tokio::test]
    async fn test_maintenance_removes_expired_sources() {
        let (manager, _) = manager();
        let header = r#"{"destination": "https://shop.example", "expiry": "86400"}"#;
        manager
            .handle_source_header(header, news(), ads(), SourceType::Navigation, T)
            .unwrap();
        assert_eq!(manager.get_active_sources(T).unwrap().len(), 1);

        let summary = manager.run_maintenance(T + 2 * DAY_MS).unwrap();
        assert_eq!(summary.expired_sources, 1);
        assert!(manager.get_active_sources(T).unwrap().is_empty());
    }
}
