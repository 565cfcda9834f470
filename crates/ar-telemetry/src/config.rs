//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration for attribution binaries and test harnesses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to startup logs
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive such as `ar_attribution=debug`
    pub log_level: String,

    /// Whether to write log lines to stderr at all
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "attribution-reporting".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `AR_SERVICE_NAME`: Service name (default: attribution-reporting)
    /// - `AR_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `AR_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `AR_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("AR_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("AR_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            console_output: lookup("AR_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.console_output),
            json_logs: lookup("AR_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.json_logs),
        }
    }

    /// Quiet configuration for tests: warnings only, plain text.
    pub fn for_testing() -> Self {
        Self {
            log_level: "warn".to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "attribution-reporting");
        assert_eq!(config.log_level, "info");
        assert!(config.console_output);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = TelemetryConfig::from_lookup(lookup_from(&[
            ("AR_SERVICE_NAME", "simulator"),
            ("AR_LOG_LEVEL", "ar_attribution=debug"),
            ("AR_JSON_LOGS", "1"),
            ("AR_CONSOLE_OUTPUT", "FALSE"),
        ]));
        assert_eq!(config.service_name, "simulator");
        assert_eq!(config.log_level, "ar_attribution=debug");
        assert!(config.json_logs);
        assert!(!config.console_output);
    }

    #[test]
    fn test_rust_log_fallback() {
        let config = TelemetryConfig::from_lookup(lookup_from(&[("RUST_LOG", "trace")]));
        assert_eq!(config.log_level, "trace");

        let config = TelemetryConfig::from_lookup(lookup_from(&[
            ("AR_LOG_LEVEL", "warn"),
            ("RUST_LOG", "trace"),
        ]));
        assert_eq!(config.log_level, "warn");
    }
}
