//! Filter data and filter matching.
//!
//! Sources carry `FilterData` (key -> set of values). Triggers carry a
//! `FilterPair`: a positive list (`filters`) and a negated list
//! (`not_filters`). Each list matches if it is empty or if any of its
//! configs matches.
//!
//! A single config matches when, for every key present on both sides, the
//! value sets intersect (positive) or are disjoint (negated). An empty value
//! list on the trigger side matches only an empty set on the source side.

use super::entities::SourceType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reserved filter key populated from the source category.
pub const SOURCE_TYPE_FILTER_KEY: &str = "source_type";

/// Filter data attached to a source.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterData(BTreeMap<String, BTreeSet<String>>);

impl FilterData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` under `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.entry(key.into()).or_default().insert(value.into());
        self
    }

    /// Adds an (possibly empty) value list under `key`.
    pub fn insert(&mut self, key: impl Into<String>, values: BTreeSet<String>) {
        self.0.insert(key.into(), values);
    }

    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One filter config: key -> accepted values.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterConfig(BTreeMap<String, BTreeSet<String>>);

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.entry(key.into()).or_default().insert(value.into());
        self
    }

    /// Adds a key with no values; matches only sources with an empty list.
    pub fn with_empty(mut self, key: impl Into<String>) -> Self {
        self.0.entry(key.into()).or_default();
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, values: BTreeSet<String>) {
        self.0.insert(key.into(), values);
    }

    fn matches(&self, source_type: SourceType, data: &FilterData, negated: bool) -> bool {
        let source_type_values: BTreeSet<String> =
            std::iter::once(source_type.as_str().to_string()).collect();

        for (key, trigger_values) in &self.0 {
            let source_values = if key == SOURCE_TYPE_FILTER_KEY {
                &source_type_values
            } else {
                match data.get(key) {
                    Some(values) => values,
                    None => continue,
                }
            };

            let matched = if trigger_values.is_empty() {
                source_values.is_empty()
            } else {
                trigger_values.iter().any(|v| source_values.contains(v))
            };

            if matched == negated {
                return false;
            }
        }
        true
    }
}

/// Positive and negated filters of a trigger (or trigger component).
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterPair {
    pub positive: Vec<FilterConfig>,
    pub negative: Vec<FilterConfig>,
}

impl FilterPair {
    pub fn new(positive: Vec<FilterConfig>, negative: Vec<FilterConfig>) -> Self {
        Self { positive, negative }
    }

    /// Matches against a source's category and filter data.
    pub fn matches(&self, source_type: SourceType, data: &FilterData) -> bool {
        list_matches(&self.positive, source_type, data, false)
            && list_matches(&self.negative, source_type, data, true)
    }
}

fn list_matches(
    configs: &[FilterConfig],
    source_type: SourceType,
    data: &FilterData,
    negated: bool,
) -> bool {
    configs.is_empty()
        || configs
            .iter()
            .any(|config| config.matches(source_type, data, negated))
}
