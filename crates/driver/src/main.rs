//! Diurnal traffic driver
//!
//! Generates synthetic shop traffic whose pace follows a two-peak daily
//! curve, and prints the simulated user-count shape of compressed runs.

mod client;
mod commands;
mod operations;
mod output;
mod runner;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{convert, run as run_cmd, shape};
use loadtest_lib::EndpointWeightTable;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Diurnal traffic driver
#[derive(Parser)]
#[command(name = "diurnal-driver")]
#[command(author, version, about = "Diurnal traffic driver for microservice load tests", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate traffic against a target host
    Run(RunArgs),

    /// Print the simulated user-count curve of a compressed run
    Shape(ShapeArgs),

    /// Rescale an exported run of one service onto a simulated day
    Convert(ConvertArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Base URL of the target frontend
    #[arg(long, env = "DRIVER_HOST")]
    pub host: String,

    /// Run without live progress output
    #[arg(long)]
    pub headless: bool,

    /// Run length, e.g. 600, 90s, 10m, 1h30m
    #[arg(long, default_value = "1h", value_parser = runner::parse_run_time)]
    pub run_time: Duration,

    /// Number of concurrent virtual users
    #[arg(long, short, env = "DRIVER_USERS", default_value_t = 1)]
    pub users: u32,

    /// Time of day the rate curve follows
    #[arg(long, value_enum, default_value = "wall")]
    pub clock: runner::ClockMode,

    /// Operation weights, e.g. index=1,browseProduct=10
    #[arg(long, env = "DRIVER_WEIGHTS")]
    pub weights: Option<EndpointWeightTable>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout: u64,

    /// Seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct ShapeArgs {
    /// Run length the simulated day is compressed into
    #[arg(long, default_value = "24h", value_parser = runner::parse_run_time)]
    pub run_time: Duration,

    /// Distance between printed points
    #[arg(long, default_value = "1h", value_parser = runner::parse_run_time)]
    pub step: Duration,

    /// Baseline user count
    #[arg(long, default_value_t = 50.0)]
    pub base_users: f64,

    /// Users added at the primary peak
    #[arg(long, default_value_t = 30.0)]
    pub peak_users: f64,

    /// Half-width of the uniform noise on the user count
    #[arg(long, default_value_t = 5.0)]
    pub noise: f64,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Samples exported by the orchestrator
    #[arg(long, short, default_value = "data.csv")]
    pub input: PathBuf,

    /// Where to write the rescaled rows
    #[arg(long, short, default_value = "data_24_hours.csv")]
    pub output: PathBuf,

    /// Keep pods whose name contains this text (case-insensitive)
    #[arg(long, default_value = "recommendationservice")]
    pub pod: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let options = run_cmd::RunOptions {
                host: args.host,
                headless: args.headless,
                run_time: args.run_time,
                users: args.users,
                clock: args.clock,
                weights: args.weights.unwrap_or_default(),
                request_timeout: Duration::from_secs(args.request_timeout),
                seed: args.seed,
            };
            let failed = run_cmd::run_traffic(options, cli.format).await?;
            if failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Shape(args) => {
            let options = shape::ShapeOptions {
                run_time: args.run_time,
                step: args.step,
                base_users: args.base_users,
                peak_users: args.peak_users,
                noise: args.noise,
                seed: args.seed,
            };
            shape::show_shape(&options, cli.format)?;
        }
        Commands::Convert(args) => {
            let options = convert::ConvertOptions {
                input: args.input,
                output: args.output,
                pod: args.pod,
            };
            convert::convert(&options)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
