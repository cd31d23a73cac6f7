use std::{ops::Range, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use snafu::ensure;

use crate::error::{
    ConfigurationError, InvalidAlpha, InvalidDegradationRange, InvalidThreshold, ZeroBufferCapacity,
};

const fn default_glitch_threshold() -> f64 {
    0.7
}

const fn default_dampening_alpha() -> f64 {
    0.3
}

const fn default_degradation_min() -> f64 {
    0.2
}

const fn default_degradation_max() -> f64 {
    0.5
}

const fn default_max_ticks() -> usize {
    15
}

const fn default_tick_interval() -> Duration {
    Duration::from_secs(4)
}

const fn default_grace_period() -> Duration {
    Duration::from_secs(10)
}

const fn default_buffer_capacity() -> usize {
    8
}

const fn default_explain_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Simulation configuration.
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SimulationConfig {
    /// Health below which a degraded service starts cascading to its dependents.
    ///
    /// Must be within `(0, 1]`. Defaults to `0.7`.
    #[serde(default = "default_glitch_threshold")]
    pub glitch_threshold: f64,

    /// Dampening factor applied to the knock-on degradation of impacted dependents.
    ///
    /// Each impacted dependent loses `alpha * (threshold - root_health)`. Defaults to `0.3`.
    #[serde(default = "default_dampening_alpha")]
    pub dampening_alpha: f64,

    /// Lower bound (inclusive) of the per-tick degradation magnitude.
    ///
    /// Defaults to `0.2`.
    #[serde(default = "default_degradation_min")]
    pub degradation_min: f64,

    /// Upper bound (exclusive) of the per-tick degradation magnitude.
    ///
    /// Defaults to `0.5`.
    #[serde(default = "default_degradation_max")]
    pub degradation_max: f64,

    /// Number of ticks to run before completing.
    ///
    /// Defaults to 15.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: usize,

    /// Time to wait between ticks.
    ///
    /// Defaults to 4 seconds.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "tick_interval_ms", default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// Maximum random delay added on top of the tick interval.
    ///
    /// Defaults to zero (no jitter).
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "tick_jitter_ms", default)]
    pub tick_jitter: Duration,

    /// How long to keep the incident stream open after the last tick, so a slow consumer can drain it.
    ///
    /// Defaults to 10 seconds.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "grace_period_ms", default = "default_grace_period")]
    pub grace_period: Duration,

    /// Number of incidents that can be buffered before the simulation waits for the consumer.
    ///
    /// Defaults to 8.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Maximum time to wait for an incident explanation.
    ///
    /// Defaults to 30 seconds.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "explain_timeout_ms", default = "default_explain_timeout")]
    pub explain_timeout: Duration,

    /// Fixed seed for glitch decisions.
    ///
    /// When unset, decisions are seeded from the operating system's entropy source and every run is different.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SimulationConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// If the glitch threshold, dampening factor, degradation range, or buffer capacity are invalid, an error is
    /// returned.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ensure!(
            self.glitch_threshold > 0.0 && self.glitch_threshold <= 1.0,
            InvalidThreshold {
                value: self.glitch_threshold
            }
        );
        ensure!(
            self.dampening_alpha.is_finite() && self.dampening_alpha >= 0.0,
            InvalidAlpha {
                value: self.dampening_alpha
            }
        );
        ensure!(
            self.degradation_min.is_finite()
                && self.degradation_max.is_finite()
                && self.degradation_min >= 0.0
                && self.degradation_min <= self.degradation_max,
            InvalidDegradationRange {
                min: self.degradation_min,
                max: self.degradation_max,
            }
        );
        ensure!(self.buffer_capacity > 0, ZeroBufferCapacity);

        Ok(())
    }

    /// Returns the range that per-tick degradation magnitudes are drawn from.
    pub fn degradation_range(&self) -> Range<f64> {
        self.degradation_min..self.degradation_max
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            glitch_threshold: default_glitch_threshold(),
            dampening_alpha: default_dampening_alpha(),
            degradation_min: default_degradation_min(),
            degradation_max: default_degradation_max(),
            max_ticks: default_max_ticks(),
            tick_interval: default_tick_interval(),
            tick_jitter: Duration::ZERO,
            grace_period: default_grace_period(),
            buffer_capacity: default_buffer_capacity(),
            explain_timeout: default_explain_timeout(),
            seed: None,
        }
    }
}
