//! Control-plane readiness check.
//!
//! Runs the server binary's own status subcommand against the instance's SQL
//! address. Its combined output is appended to the instance capture buffer
//! so a failed wait leaves a trail.

use crate::{ProbeError, ProbeResult, ProbeTarget, ReadinessCheck};
use async_trait::async_trait;
use benchvisor_output::StreamType;
use benchvisor_process::CommandSpec;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ControlPlaneCheck {
    binary: PathBuf,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl ControlPlaneCheck {
    pub fn new(binary: impl Into<PathBuf>, check_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            env: Vec::new(),
            timeout: check_timeout,
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// `<bin> node status --insecure --host=<host> --port=<sql port>`
    pub fn command(&self, target: &ProbeTarget) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .args(["node", "status", "--insecure"])
            .arg(format!("--host={}", target.host))
            .arg(format!("--port={}", target.sql_port))
            .envs(self.env.iter().cloned())
    }
}

#[async_trait]
impl ReadinessCheck for ControlPlaneCheck {
    fn name(&self) -> &'static str {
        "control-plane"
    }

    async fn check(&self, target: &ProbeTarget) -> ProbeResult<()> {
        let spec = self.command(target);
        let id = target.instance.to_string();
        debug!(instance = %id, command = %spec, "Running control probe");

        let mut cmd = spec.to_command();
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        // The child is spawned with kill_on_drop, so an elapsed timeout also
        // kills it.
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProbeError::ControlFailed {
                    id,
                    reason: format!("failed to run {}: {}", spec.program().display(), e),
                })
            }
            Err(_) => return Err(ProbeError::Timeout { id }),
        };

        target.capture.append(StreamType::Probe, &output.stdout);
        target.capture.append(StreamType::Probe, &output.stderr);

        if output.status.success() {
            Ok(())
        } else {
            Err(ProbeError::ControlFailed {
                id,
                reason: output.status.to_string(),
            })
        }
    }
}
