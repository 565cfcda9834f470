//! # Attribution Metrics
//!
//! Prometheus metrics for monitoring admission, attribution and delivery.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! ar-attribution = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `attribution_sources_total` - Counter of handled sources (by status)
//! - `attribution_triggers_total` - Counter of trigger outcomes (by channel, status)
//! - `attribution_reports_sent_total` - Counter of delivery outcomes (by kind, status)
//! - `attribution_null_reports_total` - Counter of null aggregatable reports emitted
//! - `attribution_reports_dropped_total` - Counter of reports dropped after retries

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Handled sources, labeled by status
    pub static ref SOURCES: IntCounterVec = register_int_counter_vec!(
        "attribution_sources_total",
        "Total number of source registrations handled",
        &["status"]
    )
    .expect("Failed to create SOURCES metric");

    /// Trigger outcomes, labeled by channel and status
    pub static ref TRIGGERS: IntCounterVec = register_int_counter_vec!(
        "attribution_triggers_total",
        "Total number of trigger outcomes per channel",
        &["channel", "status"]
    )
    .expect("Failed to create TRIGGERS metric");

    /// Delivery outcomes, labeled by report kind and send status
    pub static ref REPORTS_SENT: IntCounterVec = register_int_counter_vec!(
        "attribution_reports_sent_total",
        "Total number of report delivery attempts",
        &["kind", "status"]
    )
    .expect("Failed to create REPORTS_SENT metric");

    pub static ref NULL_REPORTS: IntCounter = register_int_counter!(
        "attribution_null_reports_total",
        "Total number of null aggregatable reports emitted"
    )
    .expect("Failed to create NULL_REPORTS metric");

    pub static ref REPORTS_DROPPED: IntCounter = register_int_counter!(
        "attribution_reports_dropped_total",
        "Total number of reports dropped after failed delivery"
    )
    .expect("Failed to create REPORTS_DROPPED metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a handled source
#[cfg(feature = "metrics")]
pub fn record_source(status: &str) {
    SOURCES.with_label_values(&[status]).inc();
}

/// Record both channel outcomes of a trigger
#[cfg(feature = "metrics")]
pub fn record_trigger(event_level_status: &str, aggregatable_status: &str) {
    TRIGGERS
        .with_label_values(&["event_level", event_level_status])
        .inc();
    TRIGGERS
        .with_label_values(&["aggregatable", aggregatable_status])
        .inc();
}

#[cfg(feature = "metrics")]
pub fn record_report_sent(kind: &str, status: &str) {
    REPORTS_SENT.with_label_values(&[kind, status]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_null_reports(count: u64) {
    NULL_REPORTS.inc_by(count);
}

#[cfg(feature = "metrics")]
pub fn record_report_dropped() {
    REPORTS_DROPPED.inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_source(_status: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_trigger(_event_level_status: &str, _aggregatable_status: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_report_sent(_kind: &str, _status: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_null_reports(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_report_dropped() {}
