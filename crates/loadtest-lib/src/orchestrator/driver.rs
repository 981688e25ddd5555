//! Traffic driver process handle

use super::OrchestratorError;
use crate::models::DriverOutcome;
use serde::{Deserialize, Serialize};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Program and arguments used to launch the traffic driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl DriverCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Headless diurnal driver run against `host` for `run_time`
    pub fn diurnal(program: impl Into<String>, host: &str, run_time: Duration) -> Self {
        Self::new(program).args([
            "run".to_string(),
            "--host".to_string(),
            host.to_string(),
            "--headless".to_string(),
            "--run-time".to_string(),
            format!("{}s", run_time.as_secs().max(1)),
        ])
    }

    /// Shell-like rendering for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Owned handle to a running traffic driver
///
/// The child is killed if the handle is dropped before it exits.
pub struct DriverProcess {
    child: Child,
    program: String,
}

impl DriverProcess {
    /// Launch the driver; its output goes to the orchestrator's own streams
    pub fn spawn(command: &DriverCommand) -> Result<Self, OrchestratorError> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OrchestratorError::DriverLaunch {
                program: command.program.clone(),
                source,
            })?;

        debug!(program = %command.program, pid = ?child.id(), "Spawned traffic driver");

        Ok(Self {
            child,
            program: command.program.clone(),
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wait for the driver to exit on its own
    pub async fn wait(&mut self) -> std::io::Result<DriverOutcome> {
        let status = self.child.wait().await?;
        Ok(outcome_from_status(status))
    }

    /// Kill the driver and reap it
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Wait for exit, killing the driver once `limit` elapses
    ///
    /// `None` waits without bound.
    pub async fn wait_with_timeout(
        &mut self,
        limit: Option<Duration>,
    ) -> std::io::Result<DriverOutcome> {
        let Some(limit) = limit else {
            return self.wait().await;
        };

        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(status) => Ok(outcome_from_status(status?)),
            Err(_) => {
                warn!(
                    program = %self.program,
                    timeout_secs = limit.as_secs_f64(),
                    "Traffic driver exceeded its timeout, killing it"
                );
                self.child.kill().await?;
                Ok(DriverOutcome::TimedOut)
            }
        }
    }
}

fn outcome_from_status(status: ExitStatus) -> DriverOutcome {
    match status.code() {
        Some(code) => DriverOutcome::Exited { code },
        None => DriverOutcome::Signaled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diurnal_command_arguments() {
        let cmd = DriverCommand::diurnal(
            "diurnal-driver",
            "http://10.103.178.157:80",
            Duration::from_secs(600),
        );
        assert_eq!(
            cmd.display(),
            "diurnal-driver run --host http://10.103.178.157:80 --headless --run-time 600s"
        );
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let cmd = DriverCommand::new("/nonexistent/diurnal-driver");
        let err = DriverProcess::spawn(&cmd).err().unwrap();
        assert!(matches!(err, OrchestratorError::DriverLaunch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_observed() {
        let cmd = DriverCommand::new("sh").args(["-c", "exit 7"]);
        let mut driver = DriverProcess::spawn(&cmd).unwrap();
        assert_eq!(driver.wait().await.unwrap(), DriverOutcome::Exited { code: 7 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_passed_to_driver() {
        let cmd = DriverCommand::new("sh")
            .args(["-c", "test \"$DRIVER_MODE\" = headless"])
            .env("DRIVER_MODE", "headless");
        let mut driver = DriverProcess::spawn(&cmd).unwrap();
        assert!(driver.wait().await.unwrap().is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_with_timeout_kills_driver() {
        let cmd = DriverCommand::new("sleep").arg("5");
        let mut driver = DriverProcess::spawn(&cmd).unwrap();

        let started = std::time::Instant::now();
        let outcome = driver
            .wait_with_timeout(Some(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(outcome, DriverOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
