//! Orchestrator configuration

use anyhow::{bail, Context, Result};
use loadtest_lib::{DriverCommand, OrchestratorConfig, SamplerConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding an explicit config file path
pub const CONFIG_PATH_ENV: &str = "ORCH_CONFIG";

/// Config file looked up in the working directory (any supported extension)
const DEFAULT_CONFIG_NAME: &str = "load-orchestrator";

/// Orchestrator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Base URL of the cluster metrics API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Cluster whose pods are sampled
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    /// Seconds between resource polls
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval_secs: u64,

    /// Upper bound on one resource poll, in milliseconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    /// Seconds to keep sampling after the driver exits
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Seconds to wait for the sampler to stop
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,

    /// Kill the driver after this many seconds (unset: wait indefinitely)
    #[serde(default)]
    pub driver_timeout_secs: Option<u64>,

    /// Traffic driver executable
    #[serde(default = "default_driver_program")]
    pub driver_program: String,

    /// Extra arguments appended to the driver invocation
    #[serde(default)]
    pub driver_args: Vec<String>,

    /// Service the driver sends traffic to
    #[serde(default = "default_target_host")]
    pub target_host: String,

    /// Duration of the driver run in seconds
    #[serde(default = "default_run_time")]
    pub run_time_secs: u64,

    /// Where collected samples are written
    #[serde(default = "default_csv_out")]
    pub csv_out: PathBuf,

    /// Status API port for health/metrics
    #[serde(default = "default_status_port")]
    pub status_port: u16,
}

fn default_api_base() -> String {
    "http://10.109.226.4:5000".to_string()
}

fn default_cluster_id() -> String {
    "cluster1".to_string()
}

fn default_sampling_interval() -> u64 {
    2
}

fn default_fetch_timeout() -> u64 {
    1000
}

fn default_grace_period() -> u64 {
    10
}

fn default_join_timeout() -> u64 {
    5
}

fn default_driver_program() -> String {
    "diurnal-driver".to_string()
}

fn default_target_host() -> String {
    "http://10.103.178.157:80".to_string()
}

fn default_run_time() -> u64 {
    86_400
}

fn default_csv_out() -> PathBuf {
    PathBuf::from("data.csv")
}

fn default_status_port() -> u16 {
    9102
}

impl RunConfig {
    /// Load configuration from an optional file and `ORCH_*` environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref())
    }

    /// Load with an explicit config file; `None` looks for `load-orchestrator.*`
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("ORCH")
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("driver_args"),
            )
            .build()
            .context("failed to read orchestrator configuration")?;

        let run_config: RunConfig = config
            .try_deserialize()
            .context("invalid orchestrator configuration")?;
        run_config.validate()?;
        Ok(run_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sampling_interval_secs == 0 {
            bail!("sampling_interval_secs must be greater than zero");
        }
        if self.fetch_timeout_ms == 0 {
            bail!("fetch_timeout_ms must be greater than zero");
        }
        if self.fetch_timeout() >= self.sampling_interval() {
            bail!(
                "fetch_timeout_ms ({}) must be shorter than the sampling interval ({}s)",
                self.fetch_timeout_ms,
                self.sampling_interval_secs
            );
        }
        if self.join_timeout_secs == 0 {
            bail!("join_timeout_secs must be greater than zero");
        }
        if self.run_time_secs == 0 {
            bail!("run_time_secs must be greater than zero");
        }
        if self.driver_timeout_secs == Some(0) {
            bail!("driver_timeout_secs must be greater than zero when set");
        }
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            sampler: SamplerConfig {
                interval: self.sampling_interval(),
                fetch_timeout: self.fetch_timeout(),
                ..SamplerConfig::default()
            },
            grace_period: Duration::from_secs(self.grace_period_secs),
            join_timeout: Duration::from_secs(self.join_timeout_secs),
            driver_timeout: self.driver_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn driver_command(&self) -> DriverCommand {
        DriverCommand::diurnal(
            self.driver_program.as_str(),
            &self.target_host,
            Duration::from_secs(self.run_time_secs),
        )
        .args(self.driver_args.iter().cloned())
    }
}
