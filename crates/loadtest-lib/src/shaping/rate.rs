//! Diurnal request-rate model
//!
//! Maps elapsed simulated minutes onto a daily curve with a main peak at
//! noon and a smaller one in the early evening.

use super::{gaussian, symmetric_uniform, ShapeError};
use crate::models::RateState;
use rand::Rng;
use std::time::Duration;

pub const MINUTES_PER_DAY: f64 = 1440.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Parameters of the diurnal curve
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeConfig {
    /// Real run length that one simulated day is compressed into
    pub total_run_time: Duration,
    /// Baseline request rate (requests per minute)
    pub base_rate: f64,
    /// Height of the primary peak above the baseline rate
    pub peak_amplitude: f64,
    /// Baseline user count for the user-count curve
    pub base_users: f64,
    /// Height of the primary peak above the baseline user count
    pub user_peak_amplitude: f64,
    /// Half-width of the uniform noise added to every value
    pub noise_range: f64,
    /// Minute-of-day centers of the two peaks
    pub peak_centers: (f64, f64),
    /// Standard deviation of both peaks, in minutes
    pub peak_width: f64,
    /// Height of the second peak relative to the first
    pub secondary_peak_ratio: f64,
    /// Half-width of the uniform shift applied to each peak center per call
    pub center_jitter: f64,
    /// Delay used when the rate collapses to zero
    pub fallback_wait: Duration,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            total_run_time: Duration::from_secs(86_400),
            base_rate: 50.0,
            peak_amplitude: 30.0,
            base_users: 50.0,
            user_peak_amplitude: 30.0,
            noise_range: 5.0,
            peak_centers: (720.0, 1080.0),
            peak_width: 120.0,
            secondary_peak_ratio: 0.5,
            center_jitter: 10.0,
            fallback_wait: Duration::from_secs(60),
        }
    }
}

impl ShapeConfig {
    /// Check parameters for values the curve cannot handle
    pub fn validate(&self) -> Result<(), ShapeError> {
        if self.total_run_time.is_zero() {
            return Err(invalid("total_run_time", "must be greater than zero"));
        }
        if !(self.peak_width.is_finite() && self.peak_width > 0.0) {
            return Err(invalid("peak_width", "must be a positive number"));
        }
        if !(self.noise_range.is_finite() && self.noise_range >= 0.0) {
            return Err(invalid("noise_range", "must be zero or positive"));
        }
        if !(self.center_jitter.is_finite() && self.center_jitter >= 0.0) {
            return Err(invalid("center_jitter", "must be zero or positive"));
        }
        if self.fallback_wait.is_zero() {
            return Err(invalid("fallback_wait", "must be greater than zero"));
        }
        Ok(())
    }

    /// Ratio of a simulated day to the real run length
    ///
    /// Computed in floating point: a run time that does not divide a day
    /// evenly keeps its fractional factor instead of being truncated.
    pub fn time_scale(&self) -> f64 {
        SECONDS_PER_DAY / self.total_run_time.as_secs_f64()
    }

    /// Simulated minutes elapsed after `elapsed` real time
    pub fn simulated_minutes(&self, elapsed: Duration) -> f64 {
        elapsed.as_secs_f64() * self.time_scale() / 60.0
    }
}

fn invalid(name: &'static str, reason: &str) -> ShapeError {
    ShapeError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

/// Compute the target rate and inter-request delay at a point of the day
///
/// Both peak centers are jittered independently on every call and uniform
/// noise is added on top. The result is never negative.
pub fn compute_rate<R: Rng + ?Sized>(
    elapsed_minutes: f64,
    config: &ShapeConfig,
    rng: &mut R,
) -> RateState {
    let minute_of_day = elapsed_minutes.rem_euclid(MINUTES_PER_DAY);

    let shift1 = symmetric_uniform(rng, config.center_jitter);
    let shift2 = symmetric_uniform(rng, config.center_jitter);

    let peak1 = gaussian(minute_of_day, config.peak_centers.0 + shift1, config.peak_width);
    let peak2 = config.secondary_peak_ratio
        * gaussian(minute_of_day, config.peak_centers.1 + shift2, config.peak_width);

    let noise = symmetric_uniform(rng, config.noise_range);

    // f64::max also maps a NaN rate to zero
    let rate = (config.base_rate + config.peak_amplitude * (peak1 + peak2) + noise).max(0.0);

    let wait_time = if rate > 0.0 {
        Duration::try_from_secs_f64(60.0 / rate).unwrap_or(config.fallback_wait)
    } else {
        config.fallback_wait
    };

    RateState { rate, wait_time }
}

/// Rate model bound to its configuration and random source
#[derive(Debug, Clone)]
pub struct RateShaper<R> {
    config: ShapeConfig,
    rng: R,
}

impl<R: Rng> RateShaper<R> {
    pub fn new(config: ShapeConfig, rng: R) -> Result<Self, ShapeError> {
        config.validate()?;
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &ShapeConfig {
        &self.config
    }

    /// Rate at an absolute minute of the simulated day
    pub fn at_minute(&mut self, elapsed_minutes: f64) -> RateState {
        compute_rate(elapsed_minutes, &self.config, &mut self.rng)
    }

    /// Rate after `elapsed` real time, with the day compressed into the run
    pub fn at_elapsed(&mut self, elapsed: Duration) -> RateState {
        let minutes = self.config.simulated_minutes(elapsed);
        self.at_minute(minutes)
    }
}
