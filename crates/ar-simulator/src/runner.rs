//! Timeline runner.

use std::sync::Arc;

use ar_attribution::{
    AggregatableStatus, AttributionApi, AttributionManager, AttributionStorage,
    EventLevelStatus, InMemoryAttributionStore, Origin, RecordingReportSender, Report, ReportId,
    StaticDebugCookieChecker, StoreSourceStatus, Timestamp,
};
use ar_telemetry::log_event;
use serde::{Deserialize, Serialize};

use crate::event::{header_text, SimulationEventKind, SimulationInput};
use crate::SimulationError;

/// Result of one source event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub time: Timestamp,
    pub reporting_origin: Origin,
    pub source_event_id: Option<u64>,
    /// Admission status; `None` when the header was rejected.
    pub status: Option<StoreSourceStatus>,
    pub fake_reports: usize,
    pub error: Option<String>,
}

/// Event-level result of one trigger event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventLevelOutcome {
    pub time: Timestamp,
    pub reporting_origin: Origin,
    pub status: Option<EventLevelStatus>,
    pub report_id: Option<ReportId>,
    pub replaced_report_id: Option<ReportId>,
    pub error: Option<String>,
}

/// Aggregatable result of one trigger event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatableOutcome {
    pub time: Timestamp,
    pub reporting_origin: Origin,
    pub status: Option<AggregatableStatus>,
    pub report_id: Option<ReportId>,
    pub null_reports: usize,
    pub error: Option<String>,
}

/// Everything observed during a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub event_level_results: Vec<EventLevelOutcome>,
    pub aggregatable_results: Vec<AggregatableOutcome>,
    pub source_results: Vec<SourceOutcome>,
    /// Reports delivered, in delivery order.
    pub reports_sent: Vec<Report>,
    /// Debug copies delivered alongside reports with debug keys.
    pub debug_reports: Vec<Report>,
}

/// Runs `input` to completion.
pub async fn run_simulation(input: SimulationInput) -> Result<SimulationOutput, SimulationError> {
    let config = input.config.unwrap_or_default();
    let storage = AttributionStorage::new(InMemoryAttributionStore::new(), config, input.seed)?;
    let manager = AttributionManager::new(storage).with_cookie_checker(Arc::new(
        StaticDebugCookieChecker::with_origins(input.debug_cookie_origins),
    ));
    let sender = RecordingReportSender::new();

    let mut events = input.events;
    events.sort_by_key(|event| event.time);

    let mut output = SimulationOutput::default();
    for event in events {
        let now = event.time;
        manager.send_due_reports(now, &sender).await;
        log_event!(debug, "simulator", "Replaying event", time = now, kind = event.kind.name());

        match &event.kind {
            SimulationEventKind::Source {
                source_origin,
                reporting_origin,
                source_type,
                registration,
            } => {
                let outcome = match manager.handle_source_header(
                    &header_text(registration),
                    source_origin.clone(),
                    reporting_origin.clone(),
                    *source_type,
                    now,
                ) {
                    Ok(result) => SourceOutcome {
                        time: now,
                        reporting_origin: reporting_origin.clone(),
                        source_event_id: result.source.as_ref().map(|s| s.source_event_id),
                        status: Some(result.status),
                        fake_reports: result.fake_reports.len(),
                        error: None,
                    },
                    Err(error) => SourceOutcome {
                        time: now,
                        reporting_origin: reporting_origin.clone(),
                        source_event_id: None,
                        status: None,
                        fake_reports: 0,
                        error: Some(error.to_string()),
                    },
                };
                output.source_results.push(outcome);
            }
            SimulationEventKind::Trigger {
                destination_origin,
                reporting_origin,
                registration,
            } => {
                match manager.handle_trigger_header(
                    &header_text(registration),
                    destination_origin.clone(),
                    reporting_origin.clone(),
                    now,
                ) {
                    Ok(result) => {
                        output.event_level_results.push(EventLevelOutcome {
                            time: now,
                            reporting_origin: reporting_origin.clone(),
                            status: Some(result.event_level_status),
                            report_id: result.new_event_level_report.as_ref().map(|r| r.id),
                            replaced_report_id: result
                                .replaced_event_level_report
                                .as_ref()
                                .map(|r| r.report.id),
                            error: None,
                        });
                        output.aggregatable_results.push(AggregatableOutcome {
                            time: now,
                            reporting_origin: reporting_origin.clone(),
                            status: Some(result.aggregatable_status),
                            report_id: result.new_aggregatable_report.as_ref().map(|r| r.id),
                            null_reports: result.null_aggregatable_reports.len(),
                            error: None,
                        });
                    }
                    Err(error) => {
                        let message = error.to_string();
                        output.event_level_results.push(EventLevelOutcome {
                            time: now,
                            reporting_origin: reporting_origin.clone(),
                            status: None,
                            report_id: None,
                            replaced_report_id: None,
                            error: Some(message.clone()),
                        });
                        output.aggregatable_results.push(AggregatableOutcome {
                            time: now,
                            reporting_origin: reporting_origin.clone(),
                            status: None,
                            report_id: None,
                            null_reports: 0,
                            error: Some(message),
                        });
                    }
                }
            }
            SimulationEventKind::Clear { .. } => {
                let Some(filter) = event.kind.clear_filter() else {
                    continue;
                };
                match manager.clear_data(&filter) {
                    Ok((sources, reports)) => log_event!(
                        info,
                        "simulator",
                        "Data cleared",
                        time = now,
                        sources = sources,
                        reports = reports
                    ),
                    Err(e) => log_event!(
                        error,
                        "simulator",
                        "Data clear failed",
                        time = now,
                        error = %e
                    ),
                }
            }
        }
    }

    // Drain everything still pending, whatever its report time.
    manager.send_due_reports(Timestamp::MAX, &sender).await;

    for sent in sender.take() {
        if sent.is_debug {
            output.debug_reports.push(sent.report);
        } else {
            output.reports_sent.push(sent.report);
        }
    }

    log_event!(
        info,
        "simulator",
        "Simulation finished",
        sources = output.source_results.len(),
        triggers = output.event_level_results.len(),
        reports_sent = output.reports_sent.len(),
        debug_reports = output.debug_reports.len()
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_input;
    use ar_attribution::{ReportKind, DAY_MS};
    use serde_json::json;

    const T: Timestamp = 1_700_000_000_000;

    fn input(events: serde_json::Value) -> SimulationInput {
        parse_input(
            &json!({
                "seed": 3,
                "config": { "noise_enabled": false },
                "events": events,
            })
            .to_string(),
        )
        .unwrap()
    }

    fn source(time: Timestamp, event_id: &str) -> serde_json::Value {
        json!({
            "time": time, "type": "source",
            "source_origin": "https://news.example",
            "reporting_origin": "https://ads.example",
            "source_type": "navigation",
            "registration": {
                "destination": "https://shop.example",
                "source_event_id": event_id,
                "debug_key": "11"
            }
        })
    }

    fn trigger(time: Timestamp, trigger_data: &str) -> serde_json::Value {
        json!({
            "time": time, "type": "trigger",
            "destination_origin": "https://shop.example",
            "reporting_origin": "https://ads.example",
            "registration": { "event_trigger_data": [{ "trigger_data": trigger_data }] }
        })
    }

    #[tokio::test]
    async fn test_source_then_trigger_delivers_one_report() {
        let output = run_simulation(input(json!([
            trigger(T + DAY_MS, "3"),
            source(T, "5"),
        ])))
        .await
        .unwrap();

        // Events are replayed in time order.
        assert_eq!(output.source_results.len(), 1);
        assert_eq!(output.source_results[0].status, Some(StoreSourceStatus::Success));
        assert_eq!(output.source_results[0].source_event_id, Some(5));
        assert_eq!(
            output.event_level_results[0].status,
            Some(EventLevelStatus::Success)
        );
        assert_eq!(
            output.aggregatable_results[0].status,
            Some(AggregatableStatus::NotRegistered)
        );

        assert_eq!(output.reports_sent.len(), 1);
        let report = &output.reports_sent[0];
        assert_eq!(report.kind(), ReportKind::EventLevel);
        assert_eq!(Some(report.id), output.event_level_results[0].report_id);
        assert!(output.debug_reports.is_empty());
    }

    #[tokio::test]
    async fn test_debug_cookie_produces_debug_copies() {
        let mut input = input(json!([source(T, "5"), trigger(T + DAY_MS, "1")]));
        input.debug_cookie_origins = vec![Origin::new("https://ads.example")];

        let output = run_simulation(input).await.unwrap();
        assert_eq!(output.reports_sent.len(), 1);
        assert_eq!(output.debug_reports.len(), 1);
        assert_eq!(output.debug_reports[0].source_debug_key, Some(11));
    }

    #[tokio::test]
    async fn test_malformed_header_is_reported_not_fatal() {
        let output = run_simulation(input(json!([
            {
                "time": T, "type": "source",
                "source_origin": "https://news.example",
                "reporting_origin": "https://ads.example",
                "source_type": "event",
                "registration": "{not json"
            },
            trigger(T + DAY_MS, "1"),
        ])))
        .await
        .unwrap();

        assert_eq!(output.source_results[0].status, None);
        assert!(output.source_results[0].error.is_some());
        assert_eq!(
            output.event_level_results[0].status,
            Some(EventLevelStatus::NoMatchingImpressions)
        );
        assert!(output.reports_sent.is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_pending_reports() {
        let output = run_simulation(input(json!([
            source(T, "5"),
            trigger(T + DAY_MS, "1"),
            { "time": T + DAY_MS + 1, "type": "clear" },
        ])))
        .await
        .unwrap();

        assert_eq!(
            output.event_level_results[0].status,
            Some(EventLevelStatus::Success)
        );
        assert!(output.reports_sent.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut input = input(json!([]));
        let mut config = input.config.take().unwrap();
        config.randomized_response_epsilon = -1.0;
        input.config = Some(config);

        assert!(matches!(
            run_simulation(input).await,
            Err(SimulationError::InvalidConfig(_))
        ));
    }
}
