//! # Trigger Handling Benchmarks
//!
//! Claims to validate:
//! - Matching cost grows with candidate sources for one destination, not
//!   with the total number of stored sources
//! - Null-report generation stays cheap at the full 31-day lookback
//!
//! Conditions:
//! - Up to 1000 sources for the trigger's destination
//! - Sources spread over 50 unrelated destinations

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use ar_attribution::{
    AggregatableTriggerData, AttributionConfig, AttributionStorage, AttributionTrigger,
    EventTriggerData, FilterPair, InMemoryAttributionStore, Origin, Site, SourceRegistration,
    SourceType, StorableSource, TriggerRegistration, DAY_MS,
};
use criterion::{black_box, BenchmarkId, Criterion, Throughput};

use crate::fixtures::T;

pub type BenchEngine = AttributionStorage<InMemoryAttributionStore>;

/// Capacities large enough that nothing is rejected while populating.
pub fn bench_config() -> AttributionConfig {
    let mut config = AttributionConfig {
        max_sources_per_origin: 100_000,
        max_destinations_per_source_site_reporting_origin: 100_000,
        max_event_level_reports_per_destination: 100_000,
        max_aggregatable_reports_per_destination: 100_000,
        noise_enabled: false,
        ..AttributionConfig::default()
    };
    config.rate_limit.max_attributions = 1_000_000;
    config.rate_limit.max_source_registration_reporting_origins = 100_000;
    config
}

/// Engine holding `matching` sources for `https://shop.example` and
/// `unrelated` sources spread over other destinations.
pub fn populated_engine(config: AttributionConfig, matching: usize, unrelated: usize) -> BenchEngine {
    let mut engine = AttributionStorage::new(InMemoryAttributionStore::new(), config, 7)
        .expect("bench config is valid");
    for i in 0..matching + unrelated {
        let destination = if i < matching {
            "https://shop.example".to_string()
        } else {
            format!("https://shop-{}.example", i % 50)
        };
        let registration = SourceRegistration {
            source_event_id: i as u64,
            destination_sites: BTreeSet::from([Site::parse(&destination)]),
            priority: (i % 7) as i64,
            aggregation_keys: BTreeMap::from([("campaign".to_string(), 0x159)]),
            ..SourceRegistration::default()
        };
        let source = StorableSource::new(
            registration,
            Origin::new(format!("https://publisher-{}.example", i % 10)),
            Origin::new("https://ads.example"),
            SourceType::Navigation,
        );
        engine.store_source(&source, T + i as u64);
    }
    engine
}

/// Trigger with one event-level entry and one aggregatable contribution.
pub fn mixed_trigger() -> AttributionTrigger {
    AttributionTrigger::new(
        TriggerRegistration {
            event_triggers: vec![EventTriggerData {
                data: 3,
                priority: 1,
                dedup_key: None,
                filters: FilterPair::default(),
            }],
            aggregatable_trigger_data: vec![AggregatableTriggerData {
                key_piece: 0x400,
                source_keys: BTreeSet::from(["campaign".to_string()]),
                filters: FilterPair::default(),
            }],
            aggregatable_values: BTreeMap::from([("campaign".to_string(), 1)]),
            ..TriggerRegistration::default()
        },
        Origin::new("https://shop.example"),
        Origin::new("https://ads.example"),
    )
}

pub fn bench_trigger_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigger-matching");
    group.measurement_time(Duration::from_secs(5));

    for matching in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("candidates", matching),
            &matching,
            |b, &matching| {
                let trigger = mixed_trigger();
                b.iter_batched(
                    || populated_engine(bench_config(), matching, 500),
                    |mut engine| {
                        black_box(engine.maybe_create_and_store_report(&trigger, T + DAY_MS))
                    },
                    criterion::BatchSize::LargeInput,
                )
            },
        );
    }
    group.finish();
}

pub fn bench_null_reports(c: &mut Criterion) {
    let mut group = c.benchmark_group("null-reports");
    let config = AttributionConfig {
        noise_enabled: true,
        null_report_rate_include_source_registration_time: 1.0,
        ..bench_config()
    };
    let trigger = mixed_trigger();

    group.bench_function("unattributed_full_lookback", |b| {
        b.iter_batched(
            || populated_engine(config.clone(), 0, 0),
            |mut engine| black_box(engine.maybe_create_and_store_report(&trigger, T + DAY_MS)),
            criterion::BatchSize::SmallInput,
        )
    });
    group.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ar_attribution::{AggregatableStatus, EventLevelStatus, StoreSourceStatus};

    #[test]
    fn test_populated_engine_accepts_every_source() {
        let engine = populated_engine(bench_config(), 20, 30);
        assert_eq!(engine.store().source_count(), 50);
        assert_eq!(engine.get_active_sources(T + 100).unwrap().len(), 50);
    }

    #[test]
    fn test_mixed_trigger_attributes_both_channels() {
        let mut engine = populated_engine(bench_config(), 5, 5);
        let result = engine.maybe_create_and_store_report(&mixed_trigger(), T + DAY_MS);
        assert_eq!(result.event_level_status, EventLevelStatus::Success);
        assert_eq!(result.aggregatable_status, AggregatableStatus::Success);

        let mut fresh = populated_engine(bench_config(), 0, 0);
        let stored = fresh.store_source(
            &StorableSource::new(
                SourceRegistration {
                    destination_sites: BTreeSet::from([Site::parse("https://shop.example")]),
                    ..SourceRegistration::default()
                },
                Origin::new("https://news.example"),
                Origin::new("https://ads.example"),
                SourceType::Event,
            ),
            T,
        );
        assert_eq!(stored.status, StoreSourceStatus::Success);
    }
}
