//! Engine configuration.
//!
//! Immutable bundle of limits shared by the rate limiter, the storage engine
//! and the privacy primitives. Defaults follow the production values; see
//! `for_testing()` for a small, noise-free variant.
//!
//! # Example
//!
//! ```
//! use ar_attribution::domain::AttributionConfig;
//!
//! let config = AttributionConfig::from_json(r#"{ "max_sources_per_origin": 16 }"#).unwrap();
//! assert_eq!(config.max_sources_per_origin, 16);
//! assert_eq!(config.aggregatable_budget_per_source, 65_536);
//! ```

use super::entities::{SourceType, DAY_MS, HOUR_MS};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Limits that differ per source category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTypeLimits {
    /// Event-level reports a single source may produce.
    pub max_attributions_per_source: u32,
    /// Number of distinct trigger-data values reported.
    pub trigger_data_cardinality: u64,
}

/// Rolling-window rate limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Rolling window length (ms).
    pub time_window_ms: u64,
    /// Distinct reporting origins registering sources per
    /// (source site, destination site).
    pub max_source_registration_reporting_origins: usize,
    /// Distinct reporting origins attributing per (source site, destination site).
    pub max_attribution_reporting_origins: usize,
    /// Attributions per (source site, destination site).
    pub max_attributions: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            time_window_ms: 30 * DAY_MS,
            max_source_registration_reporting_origins: 100,
            max_attribution_reporting_origins: 10,
            max_attributions: 100,
        }
    }
}

/// Report delay: `min_delay_ms` plus a uniform draw in `[0, delay_span_ms]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDelayConfig {
    pub min_delay_ms: u64,
    pub delay_span_ms: u64,
}

/// Delivery retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts (including the first) before a report is dropped.
    pub max_send_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub backoff_multiplier: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_send_attempts: 3,
            initial_retry_delay_ms: 5 * 60 * 1000,
            backoff_multiplier: 3,
        }
    }
}

/// Attribution engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Pending (unexpired) sources per source origin.
    pub max_sources_per_origin: usize,
    /// Distinct destination sites of active sources per
    /// (source site, reporting origin).
    pub max_destinations_per_source_site_reporting_origin: usize,
    /// Destinations a single registration may list.
    pub max_destinations_per_source: usize,
    pub navigation: SourceTypeLimits,
    pub event: SourceTypeLimits,
    pub max_event_level_reports_per_destination: usize,
    pub max_aggregatable_reports_per_destination: usize,
    /// `None` leaves null reports uncapped.
    pub max_null_aggregatable_reports_per_destination: Option<usize>,
    /// Sum of aggregatable values a single source may contribute.
    pub aggregatable_budget_per_source: u64,
    pub rate_limit: RateLimitConfig,
    pub event_level_delay: ReportDelayConfig,
    pub aggregatable_delay: ReportDelayConfig,
    /// Disables randomized response, null reports and delay jitter when false.
    pub noise_enabled: bool,
    pub randomized_response_epsilon: f64,
    /// Per lookback day, when the source registration time is included.
    pub null_report_rate_include_source_registration_time: f64,
    /// Once per unattributed trigger, when the source registration time is excluded.
    pub null_report_rate_exclude_source_registration_time: f64,
    pub retry: RetryConfig,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            max_sources_per_origin: 1024,
            max_destinations_per_source_site_reporting_origin: 100,
            max_destinations_per_source: 3,
            navigation: SourceTypeLimits {
                max_attributions_per_source: 3,
                trigger_data_cardinality: 8,
            },
            event: SourceTypeLimits {
                max_attributions_per_source: 1,
                trigger_data_cardinality: 2,
            },
            max_event_level_reports_per_destination: 1024,
            max_aggregatable_reports_per_destination: 1024,
            max_null_aggregatable_reports_per_destination: None,
            aggregatable_budget_per_source: 65_536,
            rate_limit: RateLimitConfig::default(),
            event_level_delay: ReportDelayConfig {
                min_delay_ms: HOUR_MS,
                delay_span_ms: HOUR_MS,
            },
            aggregatable_delay: ReportDelayConfig {
                min_delay_ms: 10 * 60 * 1000,
                delay_span_ms: 50 * 60 * 1000,
            },
            noise_enabled: true,
            randomized_response_epsilon: 14.0,
            null_report_rate_include_source_registration_time: 0.008,
            null_report_rate_exclude_source_registration_time: 0.05,
            retry: RetryConfig::default(),
        }
    }
}

impl AttributionConfig {
    /// Small limits and no noise, for deterministic tests.
    pub fn for_testing() -> Self {
        Self {
            max_sources_per_origin: 16,
            max_event_level_reports_per_destination: 8,
            max_aggregatable_reports_per_destination: 8,
            noise_enabled: false,
            ..Default::default()
        }
    }

    /// Parses and validates a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidJson(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Limits for a source category.
    pub fn limits(&self, source_type: SourceType) -> SourceTypeLimits {
        match source_type {
            SourceType::Navigation => self.navigation,
            SourceType::Event => self.event,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            (
                "null_report_rate_include_source_registration_time",
                self.null_report_rate_include_source_registration_time,
            ),
            (
                "null_report_rate_exclude_source_registration_time",
                self.null_report_rate_exclude_source_registration_time,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { field, value });
            }
        }

        if !self.randomized_response_epsilon.is_finite() || self.randomized_response_epsilon < 0.0
        {
            return Err(ConfigError::InvalidEpsilon(self.randomized_response_epsilon));
        }

        let positive = [
            ("max_sources_per_origin", self.max_sources_per_origin as u64),
            (
                "max_destinations_per_source_site_reporting_origin",
                self.max_destinations_per_source_site_reporting_origin as u64,
            ),
            ("max_destinations_per_source", self.max_destinations_per_source as u64),
            (
                "navigation.max_attributions_per_source",
                self.navigation.max_attributions_per_source as u64,
            ),
            (
                "navigation.trigger_data_cardinality",
                self.navigation.trigger_data_cardinality,
            ),
            (
                "event.max_attributions_per_source",
                self.event.max_attributions_per_source as u64,
            ),
            ("event.trigger_data_cardinality", self.event.trigger_data_cardinality),
            ("rate_limit.time_window_ms", self.rate_limit.time_window_ms),
            ("retry.max_send_attempts", self.retry.max_send_attempts as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::MustBePositive { field });
            }
        }

        Ok(())
    }
}
