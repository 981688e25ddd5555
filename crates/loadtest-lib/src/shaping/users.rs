//! User-count curve for compressed runs
//!
//! Produces the number of concurrent virtual users to run at each second of
//! a run that replays a whole simulated day.

use super::{gaussian, symmetric_uniform, ShapeConfig, ShapeError, MINUTES_PER_DAY};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;

/// User count and spawn rate for one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UserTick {
    pub user_count: u32,
    pub spawn_rate: f64,
}

/// Diurnal user-count shape
#[derive(Debug, Clone)]
pub struct UserShape {
    config: ShapeConfig,
}

impl UserShape {
    pub fn new(config: ShapeConfig) -> Result<Self, ShapeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ShapeConfig {
        &self.config
    }

    /// User count at `run_time` into the run, or `None` once the run is over
    pub fn tick<R: Rng + ?Sized>(&self, run_time: Duration, rng: &mut R) -> Option<UserTick> {
        if run_time > self.config.total_run_time {
            return None;
        }

        let scaled_secs = run_time.as_secs_f64() * self.config.time_scale();
        let minute = (scaled_secs / 60.0).floor().rem_euclid(MINUTES_PER_DAY);

        let (center1, center2) = self.config.peak_centers;
        let peak1 = gaussian(minute, center1, self.config.peak_width);
        let peak2 =
            self.config.secondary_peak_ratio * gaussian(minute, center2, self.config.peak_width);

        let noise = symmetric_uniform(rng, self.config.noise_range);
        let users = (self.config.base_users + self.config.user_peak_amplitude * (peak1 + peak2)
            + noise)
            .max(0.0);

        let user_count = users as u32;
        Some(UserTick {
            user_count,
            spawn_rate: f64::from(user_count),
        })
    }

    /// Sample the shape every `step` from the start to the end of the run
    pub fn series<R: Rng + ?Sized>(&self, step: Duration, rng: &mut R) -> Vec<(Duration, UserTick)> {
        let step = if step.is_zero() {
            Duration::from_secs(1)
        } else {
            step
        };

        let mut points = Vec::new();
        let mut t = Duration::ZERO;
        while let Some(tick) = self.tick(t, rng) {
            points.push((t, tick));
            t += step;
        }
        points
    }
}
