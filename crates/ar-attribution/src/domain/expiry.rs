//! # Time & Expiry Calculator
//!
//! Pure functions stamping a source's expiry and report-window deadlines.
//!
//! | Function | Clamp | Day rounding |
//! |----------|-------|--------------|
//! | `expiry_time` | [1 d, 30 d], default 30 d | Event sources only (nearest day) |
//! | `report_window_time` | [1 d, 30 d], `None` when absent | never |
//!
//! The rounding asymmetry is intentional: only the expiry of event sources is
//! coarsened.

use super::entities::{SourceType, Timestamp, DAY_MS};

/// Shortest accepted expiry / report window.
pub const MIN_EXPIRY_MS: u64 = DAY_MS;

/// Longest accepted expiry / report window, also the default expiry.
pub const MAX_EXPIRY_MS: u64 = 30 * DAY_MS;

/// Early report deadlines of navigation sources, relative to source time.
pub const NAVIGATION_EARLY_DEADLINES_MS: [u64; 2] = [2 * DAY_MS, 7 * DAY_MS];

/// Computes the source expiry.
pub fn expiry_time(
    declared: Option<u64>,
    source_time: Timestamp,
    source_type: SourceType,
) -> Timestamp {
    let duration = declared
        .unwrap_or(MAX_EXPIRY_MS)
        .clamp(MIN_EXPIRY_MS, MAX_EXPIRY_MS);

    let duration = match source_type {
        SourceType::Event => round_to_nearest_day(duration),
        SourceType::Navigation => duration,
    };

    source_time.saturating_add(duration)
}

/// Computes a declared report window deadline. Never rounded.
pub fn report_window_time(declared: Option<u64>, source_time: Timestamp) -> Option<Timestamp> {
    declared.map(|window| source_time.saturating_add(window.clamp(MIN_EXPIRY_MS, MAX_EXPIRY_MS)))
}

/// Falls back to the expiry and never lets a window outlive the source.
pub fn effective_report_window(window: Option<Timestamp>, expiry: Timestamp) -> Timestamp {
    window.map_or(expiry, |w| w.min(expiry))
}

/// Event-level report window deadlines of a source, ascending.
///
/// Navigation sources get the early deadlines that fall strictly before the
/// window end; every source ends with the window end itself.
pub fn report_window_deadlines(
    source_type: SourceType,
    source_time: Timestamp,
    window_time: Timestamp,
) -> Vec<Timestamp> {
    let mut deadlines = Vec::with_capacity(NAVIGATION_EARLY_DEADLINES_MS.len() + 1);
    if source_type == SourceType::Navigation {
        deadlines.extend(
            NAVIGATION_EARLY_DEADLINES_MS
                .iter()
                .map(|offset| source_time.saturating_add(*offset))
                .filter(|deadline| *deadline < window_time),
        );
    }
    deadlines.push(window_time);
    deadlines
}

fn round_to_nearest_day(duration: u64) -> u64 {
    ((duration + DAY_MS / 2) / DAY_MS) * DAY_MS
}
