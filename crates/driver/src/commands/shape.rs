//! Simulated user-count curve

use anyhow::{bail, Result};
use loadtest_lib::{ShapeConfig, UserShape};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

use crate::output::{print_shape, OutputFormat, ShapeRow};

pub struct ShapeOptions {
    pub run_time: Duration,
    pub step: Duration,
    pub base_users: f64,
    pub peak_users: f64,
    pub noise: f64,
    pub seed: Option<u64>,
}

/// Sample the user-count curve over a compressed run
pub fn shape_rows(options: &ShapeOptions) -> Result<Vec<ShapeRow>> {
    if options.step.is_zero() {
        bail!("step must be greater than zero");
    }

    let config = ShapeConfig {
        total_run_time: options.run_time,
        base_users: options.base_users,
        user_peak_amplitude: options.peak_users,
        noise_range: options.noise,
        ..ShapeConfig::default()
    };
    let shape = UserShape::new(config)?;

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    Ok(shape
        .series(options.step, &mut rng)
        .into_iter()
        .map(|(t, tick)| ShapeRow::new(t, shape.config().simulated_minutes(t), &tick))
        .collect())
}

pub fn show_shape(options: &ShapeOptions, format: OutputFormat) -> Result<()> {
    let rows = shape_rows(options)?;
    let mut stdout = std::io::stdout().lock();
    print_shape(&mut stdout, &rows, format)
}
