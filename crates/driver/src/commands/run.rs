//! Traffic generation command

use anyhow::Result;
use colored::Colorize;
use loadtest_lib::{EndpointWeightTable, ShapeConfig};
use std::time::Duration;

use crate::output::{print_progress, print_summary, OutputFormat};
use crate::runner::{self, ClockMode, RunSettings};

/// Interval between progress lines in interactive mode
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

pub struct RunOptions {
    pub host: String,
    pub headless: bool,
    pub run_time: Duration,
    pub users: u32,
    pub clock: ClockMode,
    pub weights: EndpointWeightTable,
    pub request_timeout: Duration,
    pub seed: Option<u64>,
}

/// Drive traffic and print the summary; returns whether any request failed
pub async fn run_traffic(options: RunOptions, format: OutputFormat) -> Result<bool> {
    let progress_every = (!options.headless).then_some(PROGRESS_INTERVAL);
    if !options.headless {
        println!(
            "{} {} for {}s with {} user(s)",
            "Driving".bold(),
            options.host.cyan(),
            options.run_time.as_secs(),
            options.users
        );
    }

    let settings = RunSettings {
        host: options.host,
        users: options.users,
        run_time: options.run_time,
        clock: options.clock,
        weights: options.weights,
        shape: ShapeConfig::default(),
        request_timeout: options.request_timeout,
        seed: options.seed,
    };

    let summary = runner::run(settings, progress_every, |p| print_progress(&p)).await?;

    let mut stdout = std::io::stdout().lock();
    print_summary(&mut stdout, &summary, format)?;

    Ok(summary.has_failures())
}
