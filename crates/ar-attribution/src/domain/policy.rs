//! # Privacy primitives
//!
//! `AttributionPolicy` owns the engine's randomness. Every decision that
//! shapes stored state or reports (randomized response, null reports, delays,
//! verification order and report ids) is drawn from one seeded `StdRng`, so a
//! run is replayable given the seed. Shuffling reports for callers that read
//! pending reports uses a second generator derived from the same seed, so
//! reads never shift later draws.
//!
//! ## Randomized response
//!
//! ```text
//! states = C(k + c·w, k)        k: max reports, c: trigger-data cardinality,
//!                               w: report windows
//! rate   = states / (states - 1 + e^ε)
//! ```
//!
//! With probability `rate` the source is noised: a uniform output state is
//! decoded into stars and bars and the source is committed to exactly those
//! fake reports (possibly none) for its lifetime.

use super::combinatorics::{bars_preceding_each_star, binomial, k_combination_at_index};
use super::config::AttributionConfig;
use crate::error::ConfigError;
use super::entities::{
    AttributionLogic, AttributionTrigger, FakeEventReport, SourceRegistrationTimeConfig,
    SourceType, StoredSource, Timestamp, TriggerVerification, DAY_MS,
};
use super::expiry::report_window_deadlines;
use super::report::{NullAggregatableData, Report, ReportData, ReportId, ReportKind};
use super::scheduler::{aggregatable_report_time, event_level_report_time};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Days before the trigger a null report may claim as source time.
pub const MAX_NULL_REPORT_LOOKBACK_DAYS: u64 = 30;

/// Mixed into the seed of the exposure shuffle generator.
const EXPOSURE_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Randomized, replayable privacy decisions.
pub struct AttributionPolicy {
    config: AttributionConfig,
    rng: StdRng,
    exposure_rng: StdRng,
}

impl AttributionPolicy {
    /// Deterministic policy for a fixed seed.
    pub fn new(config: AttributionConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            exposure_rng: StdRng::seed_from_u64(seed ^ EXPOSURE_SEED_SALT),
        })
    }

    /// Policy seeded from OS entropy.
    pub fn from_entropy(config: AttributionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            rng: StdRng::from_entropy(),
            exposure_rng: StdRng::from_entropy(),
        })
    }

    pub fn config(&self) -> &AttributionConfig {
        &self.config
    }

    /// Output states of randomized response for `num_windows` report windows.
    pub fn num_states(&self, source_type: SourceType, num_windows: usize) -> u64 {
        let limits = self.config.limits(source_type);
        let stars = u64::from(limits.max_attributions_per_source);
        let bars = limits
            .trigger_data_cardinality
            .saturating_mul(num_windows as u64);
        binomial(stars.saturating_add(bars), stars)
    }

    /// Probability that a source with this event-level window is noised.
    pub fn randomized_response_rate(
        &self,
        source_type: SourceType,
        source_time: Timestamp,
        event_report_window_time: Timestamp,
    ) -> f64 {
        let windows =
            report_window_deadlines(source_type, source_time, event_report_window_time).len();
        let states = self.num_states(source_type, windows) as f64;
        let rate = states / (states - 1.0 + self.config.randomized_response_epsilon.exp());
        rate.clamp(0.0, 1.0)
    }

    /// Draws the attribution logic of a freshly stamped source.
    ///
    /// Only source metadata (category, times, limits) feeds the draw.
    pub fn generate_randomized_response(&mut self, source: &StoredSource) -> AttributionLogic {
        if !self.config.noise_enabled {
            return AttributionLogic::Truthful;
        }

        let rate = self.randomized_response_rate(
            source.source_type,
            source.source_time,
            source.event_report_window_time,
        );
        if !self.rng.gen_bool(rate) {
            return AttributionLogic::Truthful;
        }

        let deadlines = report_window_deadlines(
            source.source_type,
            source.source_time,
            source.event_report_window_time,
        );
        let states = self.num_states(source.source_type, deadlines.len());
        if states == 0 {
            return AttributionLogic::Truthful;
        }

        let limits = self.config.limits(source.source_type);
        let cardinality = limits.trigger_data_cardinality;
        let state = self.rng.gen_range(0..states);
        let stars = k_combination_at_index(state, u64::from(limits.max_attributions_per_source));

        let mut fakes = Vec::new();
        for bars in bars_preceding_each_star(&stars) {
            // No bar before the star: this report slot stays empty.
            if bars == 0 {
                continue;
            }
            let slot = bars - 1;
            let window_index = (slot / cardinality) as usize;
            let Some(&deadline) = deadlines.get(window_index) else {
                continue;
            };
            let window_start = match window_index {
                0 => source.source_time,
                i => deadlines[i - 1],
            };
            let delay = self.report_delay(ReportKind::EventLevel);
            fakes.push(FakeEventReport {
                trigger_data: slot % cardinality,
                window_index,
                trigger_time: window_start,
                report_time: event_level_report_time(deadline, deadline, delay),
            });
        }

        debug!(
            source_event_id = source.source_event_id,
            fake_reports = fakes.len(),
            "Source noised by randomized response"
        );
        AttributionLogic::Falsely(fakes)
    }

    /// Chaff aggregatable reports for a trigger, generated whether or not it
    /// was attributed.
    pub fn null_aggregatable_reports(
        &mut self,
        trigger: &AttributionTrigger,
        trigger_time: Timestamp,
        attributed_source_time: Option<Timestamp>,
    ) -> Vec<Report> {
        let registration = &trigger.registration;
        if !self.config.noise_enabled || !registration.has_aggregatable_data() {
            return Vec::new();
        }

        let mut fake_source_times = Vec::new();
        match registration.source_registration_time_config {
            SourceRegistrationTimeConfig::Include => {
                let rate = self.config.null_report_rate_include_source_registration_time;
                let trigger_day = floor_to_day(trigger_time);
                let attributed_day = attributed_source_time
                    .map(|t| trigger_day.saturating_sub(floor_to_day(t)) / DAY_MS);
                for day in 0..=MAX_NULL_REPORT_LOOKBACK_DAYS {
                    if Some(day) == attributed_day {
                        continue;
                    }
                    if self.rng.gen_bool(rate) {
                        fake_source_times.push(trigger_day.saturating_sub(day * DAY_MS));
                    }
                }
            }
            SourceRegistrationTimeConfig::Exclude => {
                let rate = self.config.null_report_rate_exclude_source_registration_time;
                if attributed_source_time.is_none() && self.rng.gen_bool(rate) {
                    fake_source_times.push(trigger_time);
                }
            }
        }

        fake_source_times
            .into_iter()
            .map(|fake_source_time| self.null_report(trigger, trigger_time, fake_source_time))
            .collect()
    }

    fn null_report(
        &mut self,
        trigger: &AttributionTrigger,
        trigger_time: Timestamp,
        fake_source_time: Timestamp,
    ) -> Report {
        let report_time =
            aggregatable_report_time(trigger_time, self.report_delay(ReportKind::NullAggregatable));
        Report {
            id: self.new_report_id(),
            destination_site: trigger.destination_site(),
            reporting_origin: trigger.reporting_origin.clone(),
            trigger_time,
            report_time,
            initial_report_time: report_time,
            failed_send_attempts: 0,
            source_debug_key: None,
            trigger_debug_key: trigger.registration.debug_key,
            data: ReportData::NullAggregatable(NullAggregatableData {
                fake_source_time,
                source_registration_time_config: trigger
                    .registration
                    .source_registration_time_config,
                aggregation_coordinator: trigger.registration.aggregation_coordinator,
            }),
        }
    }

    /// Delay added to a report's base time.
    pub fn report_delay(&mut self, kind: ReportKind) -> u64 {
        let delay = if kind.is_aggregatable() {
            self.config.aggregatable_delay
        } else {
            self.config.event_level_delay
        };
        if !self.config.noise_enabled || delay.delay_span_ms == 0 {
            return delay.min_delay_ms;
        }
        delay
            .min_delay_ms
            .saturating_add(self.rng.gen_range(0..=delay.delay_span_ms))
    }

    /// Shuffles reports handed out to readers. Leaves the decision RNG alone.
    pub fn shuffle_reports(&mut self, reports: &mut [Report]) {
        reports.shuffle(&mut self.exposure_rng);
    }

    pub fn shuffle_trigger_verifications(&mut self, verifications: &mut [TriggerVerification]) {
        verifications.shuffle(&mut self.rng);
    }

    /// Fresh v4 UUID drawn from the policy RNG.
    pub fn new_report_id(&mut self) -> ReportId {
        ReportId(uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid())
    }
}

fn floor_to_day(time: Timestamp) -> Timestamp {
    time - time % DAY_MS
}
