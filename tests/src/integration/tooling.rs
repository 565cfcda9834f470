//! # Tooling
//!
//! The simulator driving the engine from a JSON timeline, and the telemetry
//! crate rendering the engine's counters.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use ar_attribution::{
        AttributionApi, EventLevelStatus, ReportId, ReportKind, SourceType, StoreSourceStatus,
        DAY_MS, HOUR_MS,
    };
    use ar_simulator::{parse_input, run_simulation, SimulationOutput};
    use ar_telemetry::{init_test_tracing, render_metrics, TelemetryConfig};
    use serde_json::json;
    use uuid::Uuid;

    fn timeline(seed: u64) -> String {
        json!({
            "seed": seed,
            "config": { "noise_enabled": false },
            "events": [
                { "time": T, "type": "source",
                  "source_origin": "https://news.example",
                  "reporting_origin": "https://ads.example",
                  "source_type": "event",
                  "registration": { "destination": "https://shop.example", "source_event_id": "42" } },
                { "time": T + 5 * DAY_MS, "type": "trigger",
                  "destination_origin": "https://shop.example",
                  "reporting_origin": "https://ads.example",
                  "registration": { "event_trigger_data": [{ "trigger_data": "1", "deduplication_key": "3" }] } },
                { "time": T + 5 * DAY_MS + 1, "type": "trigger",
                  "destination_origin": "https://shop.example",
                  "reporting_origin": "https://ads.example",
                  "registration": { "event_trigger_data": [{ "trigger_data": "1", "deduplication_key": "3" }] } }
            ]
        })
        .to_string()
    }

    /// Replaces every report id so runs with different seeds compare equal.
    fn without_ids(mut output: SimulationOutput) -> SimulationOutput {
        let nil = ReportId(Uuid::nil());
        for report in output.reports_sent.iter_mut().chain(output.debug_reports.iter_mut()) {
            report.id = nil;
        }
        for outcome in &mut output.event_level_results {
            outcome.report_id = outcome.report_id.map(|_| nil);
            outcome.replaced_report_id = outcome.replaced_report_id.map(|_| nil);
        }
        for outcome in &mut output.aggregatable_results {
            outcome.report_id = outcome.report_id.map(|_| nil);
        }
        output
    }

    #[tokio::test]
    async fn test_simulated_timeline() {
        let output = run_simulation(parse_input(&timeline(1)).unwrap())
            .await
            .unwrap();

        assert_eq!(output.source_results[0].status, Some(StoreSourceStatus::Success));
        let statuses: Vec<_> = output
            .event_level_results
            .iter()
            .map(|o| o.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                Some(EventLevelStatus::Success),
                Some(EventLevelStatus::Deduplicated)
            ]
        );

        assert_eq!(output.reports_sent.len(), 1);
        let report = &output.reports_sent[0];
        assert_eq!(report.kind(), ReportKind::EventLevel);
        assert_eq!(report.report_time, T + 5 * DAY_MS + HOUR_MS);
        assert_eq!(report.event_level().unwrap().source_event_id, 42);
    }

    #[tokio::test]
    async fn test_seeds_only_change_report_ids() {
        let first = run_simulation(parse_input(&timeline(1)).unwrap()).await.unwrap();
        let again = run_simulation(parse_input(&timeline(1)).unwrap()).await.unwrap();
        let other = run_simulation(parse_input(&timeline(2)).unwrap()).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first.reports_sent[0].id, other.reports_sent[0].id);
        assert_eq!(without_ids(first), without_ids(other));
    }

    #[test]
    fn test_output_is_json_serializable() {
        let output = SimulationOutput::default();
        let text = serde_json::to_string(&output).unwrap();
        assert!(text.contains("\"reports_sent\":[]"));
    }

    #[test]
    fn test_engine_counters_are_exposed() {
        init_test_tracing();
        let (manager, _) = manager();
        manager
            .handle_source_header(&source_header(1, 0), news(), ads(), SourceType::Event, T)
            .unwrap();

        let text = render_metrics().unwrap();
        assert!(text.contains("attribution_sources_total"));
        assert!(text.contains("status=\"success\""));
    }

    #[test]
    fn test_telemetry_config_for_testing() {
        let config = TelemetryConfig::for_testing();
        assert_eq!(config.log_level, "warn");
        assert!(!config.json_logs);
    }
}
