//! Load test orchestration
//!
//! Coordinates one run: background resource sampling alongside a traffic
//! driver process, followed by a bounded shutdown of the sampler and the
//! handoff of everything collected to an exporter.

mod driver;
mod run;


pub use driver::{DriverCommand, DriverProcess};
pub use run::{CompletedRun, Orchestrator, OrchestratorConfig};

use crate::sampler::SamplerConfigError;
use thiserror::Error;

/// Errors that abort a run
///
/// Everything else that can go wrong during a run is recorded on the
/// `RunResult` instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to launch traffic driver `{program}`: {source}")]
    DriverLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sampler configuration: {0}")]
    Sampler(#[from] SamplerConfigError),

    #[error("sampler join timeout must be greater than zero")]
    ZeroJoinTimeout,
}
