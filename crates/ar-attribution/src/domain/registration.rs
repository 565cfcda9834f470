//! Registration header parsing.
//!
//! `Attribution-Reporting-Register-Source` and `-Trigger` headers are JSON
//! dictionaries. Integer ids travel as strings to survive 64-bit precision
//! loss in JavaScript; plain JSON numbers are accepted too. Durations are
//! declared in seconds and stored in milliseconds.

use super::entities::{
    AggregatableDedupKey, AggregatableTriggerData, AggregationCoordinator, AggregationKeys,
    EventTriggerData, Site, SourceRegistration, SourceRegistrationTimeConfig, TriggerRegistration,
};
use super::filters::{FilterConfig, FilterData, FilterPair, SOURCE_TYPE_FILTER_KEY};
use crate::error::RegistrationError;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Destinations accepted in one source header.
pub const MAX_DESTINATIONS_PER_SOURCE: usize = 3;

/// Keys in a filter dictionary.
pub const MAX_FILTER_KEYS: usize = 50;

/// Entries in `aggregation_keys` and `aggregatable_values`.
pub const MAX_AGGREGATION_KEYS: usize = 20;

/// Entries in `event_trigger_data`.
pub const MAX_EVENT_TRIGGERS: usize = 10;

/// Largest value a single aggregatable key may contribute.
pub const MAX_AGGREGATABLE_VALUE: u64 = 65_536;

type Object = Map<String, Value>;

impl SourceRegistration {
    /// Parses a source registration header.
    pub fn parse(json: &str) -> Result<Self, RegistrationError> {
        let root = parse_root(json)?;

        let destination_sites = parse_destinations(root.get("destination"))?;
        let filter_data = match root.get("filter_data") {
            None => FilterData::new(),
            Some(value) => parse_filter_data(value)?,
        };

        Ok(Self {
            source_event_id: opt_u64(&root, "source_event_id")?.unwrap_or(0),
            destination_sites,
            expiry: opt_seconds(&root, "expiry")?,
            event_report_window: opt_seconds(&root, "event_report_window")?,
            aggregatable_report_window: opt_seconds(&root, "aggregatable_report_window")?,
            priority: opt_i64(&root, "priority")?.unwrap_or(0),
            filter_data,
            debug_key: opt_u64(&root, "debug_key")?,
            aggregation_keys: parse_aggregation_keys(root.get("aggregation_keys"))?,
            debug_reporting: opt_bool(&root, "debug_reporting")?,
        })
    }
}

impl TriggerRegistration {
    /// Parses a trigger registration header.
    pub fn parse(json: &str) -> Result<Self, RegistrationError> {
        let root = parse_root(json)?;

        let source_registration_time_config = match root.get("aggregatable_source_registration_time") {
            None => SourceRegistrationTimeConfig::default(),
            Some(Value::String(s)) if s == "include" => SourceRegistrationTimeConfig::Include,
            Some(Value::String(s)) if s == "exclude" => SourceRegistrationTimeConfig::Exclude,
            Some(_) => {
                return Err(RegistrationError::WrongType {
                    field: "aggregatable_source_registration_time",
                })
            }
        };

        let aggregation_coordinator = match root.get("aggregation_coordinator_identifier") {
            None => AggregationCoordinator::default(),
            Some(Value::String(s)) => AggregationCoordinator::parse(s)
                .ok_or_else(|| RegistrationError::UnknownCoordinator(s.clone()))?,
            Some(_) => {
                return Err(RegistrationError::WrongType {
                    field: "aggregation_coordinator_identifier",
                })
            }
        };

        Ok(Self {
            filters: parse_filter_pair(&root)?,
            debug_key: opt_u64(&root, "debug_key")?,
            event_triggers: parse_event_triggers(root.get("event_trigger_data"))?,
            aggregatable_trigger_data: parse_aggregatable_trigger_data(
                root.get("aggregatable_trigger_data"),
            )?,
            aggregatable_values: parse_aggregatable_values(root.get("aggregatable_values"))?,
            aggregatable_dedup_keys: parse_aggregatable_dedup_keys(
                root.get("aggregatable_deduplication_keys"),
            )?,
            source_registration_time_config,
            aggregation_coordinator,
            debug_reporting: opt_bool(&root, "debug_reporting")?,
        })
    }
}

fn parse_root(json: &str) -> Result<Object, RegistrationError> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RegistrationError::RootWrongType),
        Err(e) => Err(RegistrationError::InvalidJson(e.to_string())),
    }
}

fn parse_destinations(value: Option<&Value>) -> Result<BTreeSet<Site>, RegistrationError> {
    let raw: Vec<&str> = match value {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().ok_or(RegistrationError::DestinationMissing))
            .collect::<Result<_, _>>()?,
        _ => return Err(RegistrationError::DestinationMissing),
    };

    if let Some(bad) = raw.iter().find(|s| !s.contains("://")) {
        return Err(RegistrationError::InvalidDestination((*bad).to_string()));
    }
    let sites: BTreeSet<Site> = raw.into_iter().map(Site::parse).collect();
    if sites.is_empty() {
        return Err(RegistrationError::DestinationMissing);
    }
    if sites.len() > MAX_DESTINATIONS_PER_SOURCE {
        return Err(RegistrationError::TooManyDestinations {
            count: sites.len(),
            max: MAX_DESTINATIONS_PER_SOURCE,
        });
    }
    Ok(sites)
}

fn parse_filter_data(value: &Value) -> Result<FilterData, RegistrationError> {
    let map = value
        .as_object()
        .ok_or(RegistrationError::WrongType { field: "filter_data" })?;
    check_filter_keys(map.len())?;

    let mut data = FilterData::new();
    for (key, values) in map {
        if key == SOURCE_TYPE_FILTER_KEY || key.starts_with('_') {
            return Err(RegistrationError::ReservedFilterKey { key: key.clone() });
        }
        data.insert(key.clone(), string_set(values, "filter_data")?);
    }
    Ok(data)
}

/// `filters` / `not_filters` of an object: a dictionary or a list of them.
fn parse_filter_pair(object: &Object) -> Result<FilterPair, RegistrationError> {
    Ok(FilterPair::new(
        parse_filter_list(object.get("filters"), "filters")?,
        parse_filter_list(object.get("not_filters"), "not_filters")?,
    ))
}

fn parse_filter_list(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Vec<FilterConfig>, RegistrationError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(vec![parse_filter_config(map, field)?]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or(RegistrationError::WrongType { field })
                    .and_then(|map| parse_filter_config(map, field))
            })
            .collect(),
        Some(_) => Err(RegistrationError::WrongType { field }),
    }
}

fn parse_filter_config(map: &Object, field: &'static str) -> Result<FilterConfig, RegistrationError> {
    check_filter_keys(map.len())?;
    let mut config = FilterConfig::new();
    for (key, values) in map {
        config.insert(key.clone(), string_set(values, field)?);
    }
    Ok(config)
}

fn check_filter_keys(count: usize) -> Result<(), RegistrationError> {
    if count > MAX_FILTER_KEYS {
        return Err(RegistrationError::TooManyFilterKeys {
            count,
            max: MAX_FILTER_KEYS,
        });
    }
    Ok(())
}

fn string_set(value: &Value, field: &'static str) -> Result<BTreeSet<String>, RegistrationError> {
    value
        .as_array()
        .ok_or(RegistrationError::WrongType { field })?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or(RegistrationError::WrongType { field })
        })
        .collect()
}

fn parse_aggregation_keys(value: Option<&Value>) -> Result<AggregationKeys, RegistrationError> {
    let Some(value) = value else {
        return Ok(AggregationKeys::new());
    };
    let map = value.as_object().ok_or(RegistrationError::WrongType {
        field: "aggregation_keys",
    })?;
    if map.len() > MAX_AGGREGATION_KEYS {
        return Err(RegistrationError::TooManyAggregationKeys {
            count: map.len(),
            max: MAX_AGGREGATION_KEYS,
        });
    }

    map.iter()
        .map(|(id, piece)| -> Result<(String, u128), RegistrationError> {
            let key = piece
                .as_str()
                .and_then(parse_key_piece)
                .ok_or_else(|| RegistrationError::InvalidAggregationKey { key: id.clone() })?;
            Ok((id.clone(), key))
        })
        .collect()
}

/// Parses a `0x`-prefixed 128-bit hex key piece.
pub fn parse_key_piece(raw: &str) -> Option<u128> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    if digits.is_empty() || digits.len() > 32 {
        return None;
    }
    u128::from_str_radix(digits, 16).ok()
}

fn parse_event_triggers(value: Option<&Value>) -> Result<Vec<EventTriggerData>, RegistrationError> {
    let items = match value {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(RegistrationError::WrongType {
                field: "event_trigger_data",
            })
        }
    };
    if items.len() > MAX_EVENT_TRIGGERS {
        return Err(RegistrationError::TooManyEventTriggers {
            count: items.len(),
            max: MAX_EVENT_TRIGGERS,
        });
    }

    items
        .iter()
        .map(|item| -> Result<EventTriggerData, RegistrationError> {
            let object = item.as_object().ok_or(RegistrationError::WrongType {
                field: "event_trigger_data",
            })?;
            Ok(EventTriggerData {
                data: opt_u64(object, "trigger_data")?.unwrap_or(0),
                priority: opt_i64(object, "priority")?.unwrap_or(0),
                dedup_key: opt_u64(object, "deduplication_key")?,
                filters: parse_filter_pair(object)?,
            })
        })
        .collect()
}

fn parse_aggregatable_trigger_data(
    value: Option<&Value>,
) -> Result<Vec<AggregatableTriggerData>, RegistrationError> {
    const FIELD: &str = "aggregatable_trigger_data";
    let items = match value {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(RegistrationError::WrongType { field: FIELD }),
    };

    items
        .iter()
        .map(|item| -> Result<AggregatableTriggerData, RegistrationError> {
            let object = item
                .as_object()
                .ok_or(RegistrationError::WrongType { field: FIELD })?;
            let raw_piece = object
                .get("key_piece")
                .and_then(Value::as_str)
                .ok_or(RegistrationError::WrongType { field: "key_piece" })?;
            let key_piece = parse_key_piece(raw_piece).ok_or_else(|| {
                RegistrationError::InvalidAggregationKey {
                    key: raw_piece.to_string(),
                }
            })?;
            let source_keys = match object.get("source_keys") {
                None => BTreeSet::new(),
                Some(keys) => string_set(keys, "source_keys")?,
            };
            Ok(AggregatableTriggerData {
                key_piece,
                source_keys,
                filters: parse_filter_pair(object)?,
            })
        })
        .collect()
}

fn parse_aggregatable_values(
    value: Option<&Value>,
) -> Result<BTreeMap<String, u32>, RegistrationError> {
    const FIELD: &str = "aggregatable_values";
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };
    let map = value
        .as_object()
        .ok_or(RegistrationError::WrongType { field: FIELD })?;
    if map.len() > MAX_AGGREGATION_KEYS {
        return Err(RegistrationError::TooManyAggregationKeys {
            count: map.len(),
            max: MAX_AGGREGATION_KEYS,
        });
    }

    map.iter()
        .map(|(key, raw)| -> Result<(String, u32), RegistrationError> {
            let value = raw
                .as_u64()
                .ok_or(RegistrationError::InvalidInteger { field: FIELD })?;
            if value == 0 || value > MAX_AGGREGATABLE_VALUE {
                return Err(RegistrationError::AggregatableValueOutOfRange {
                    key: key.clone(),
                    value,
                });
            }
            // Bounded by MAX_AGGREGATABLE_VALUE above.
            Ok((key.clone(), value as u32))
        })
        .collect()
}

fn parse_aggregatable_dedup_keys(
    value: Option<&Value>,
) -> Result<Vec<AggregatableDedupKey>, RegistrationError> {
    const FIELD: &str = "aggregatable_deduplication_keys";
    let items = match value {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(RegistrationError::WrongType { field: FIELD }),
    };

    items
        .iter()
        .map(|item| -> Result<AggregatableDedupKey, RegistrationError> {
            let object = item
                .as_object()
                .ok_or(RegistrationError::WrongType { field: FIELD })?;
            Ok(AggregatableDedupKey {
                dedup_key: opt_u64(object, "deduplication_key")?,
                filters: parse_filter_pair(object)?,
            })
        })
        .collect()
}

fn opt_u64(object: &Object, field: &'static str) -> Result<Option<u64>, RegistrationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| RegistrationError::InvalidInteger { field }),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or(RegistrationError::InvalidInteger { field }),
        Some(_) => Err(RegistrationError::WrongType { field }),
    }
}

fn opt_i64(object: &Object, field: &'static str) -> Result<Option<i64>, RegistrationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| RegistrationError::InvalidInteger { field }),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or(RegistrationError::InvalidInteger { field }),
        Some(_) => Err(RegistrationError::WrongType { field }),
    }
}

/// Duration declared in seconds, returned in milliseconds.
fn opt_seconds(object: &Object, field: &'static str) -> Result<Option<u64>, RegistrationError> {
    Ok(opt_u64(object, field)?.map(|seconds| seconds.saturating_mul(1000)))
}

fn opt_bool(object: &Object, field: &'static str) -> Result<bool, RegistrationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(RegistrationError::WrongType { field }),
    }
}
