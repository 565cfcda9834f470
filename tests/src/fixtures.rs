//! Shared fixtures for integration scenarios and benchmarks.

use std::sync::Arc;

use ar_attribution::{
    AttributionConfig, AttributionManager, AttributionStorage, InMemoryAttributionStore, Origin,
    RecordingObserver, Timestamp,
};

/// Fixed wall-clock origin of every scenario.
pub const T: Timestamp = 1_700_000_000_000;

pub type TestManager = AttributionManager<InMemoryAttributionStore>;

pub fn news() -> Origin {
    Origin::new("https://news.example")
}

pub fn shop() -> Origin {
    Origin::new("https://shop.example")
}

pub fn ads() -> Origin {
    Origin::new("https://ads.example")
}

/// Manager over an empty in-memory store, with a recording observer attached.
pub fn manager_with(config: AttributionConfig, seed: u64) -> (TestManager, Arc<RecordingObserver>) {
    let storage = AttributionStorage::new(InMemoryAttributionStore::new(), config, seed)
        .expect("fixture config is valid");
    let manager = AttributionManager::new(storage);
    let observer = Arc::new(RecordingObserver::new());
    manager.add_observer(observer.clone());
    (manager, observer)
}

/// Noise-free manager with small capacities.
pub fn manager() -> (TestManager, Arc<RecordingObserver>) {
    manager_with(AttributionConfig::for_testing(), 42)
}

/// Source header for `https://shop.example`.
pub fn source_header(source_event_id: u64, priority: i64) -> String {
    serde_json::json!({
        "destination": "https://shop.example",
        "source_event_id": source_event_id.to_string(),
        "priority": priority.to_string(),
        "debug_key": "100",
        "filter_data": { "product": ["shoes"] },
        "aggregation_keys": { "campaign": "0x159", "geo": "0x5" }
    })
    .to_string()
}

/// Trigger header with one event-level entry.
pub fn event_trigger_header(trigger_data: u64, priority: i64, dedup_key: Option<u64>) -> String {
    let mut entry = serde_json::json!({
        "trigger_data": trigger_data.to_string(),
        "priority": priority.to_string(),
    });
    if let Some(key) = dedup_key {
        entry["deduplication_key"] = serde_json::json!(key.to_string());
    }
    serde_json::json!({ "event_trigger_data": [entry] }).to_string()
}

/// Trigger header contributing `values` (key id, value) to the aggregatable channel.
pub fn aggregatable_trigger_header(values: &[(&str, u32)], dedup_key: Option<u64>) -> String {
    let source_keys: Vec<&str> = values.iter().map(|(key, _)| *key).collect();
    let values: serde_json::Map<String, serde_json::Value> = values
        .iter()
        .map(|(key, value)| (key.to_string(), serde_json::json!(value)))
        .collect();
    let mut header = serde_json::json!({
        "aggregatable_trigger_data": [{ "key_piece": "0x400", "source_keys": source_keys }],
        "aggregatable_values": values,
    });
    if let Some(key) = dedup_key {
        header["aggregatable_deduplication_keys"] =
            serde_json::json!([{ "deduplication_key": key.to_string() }]);
    }
    header.to_string()
}
