//! Shutdown supervisor.
//!
//! Per instance: SIGTERM, wait up to the grace period, then SIGKILL and wait
//! without a bound. Ephemeral directories are removed afterwards whatever
//! happened. A second shutdown of the same instance is a no-op.

use crate::instance::Instance;
use benchvisor_common::{InstanceName, ProcessResult};
use benchvisor_instance_state::InstanceState;
use benchvisor_process::{force_kill, terminate_gracefully, ExitMonitor, ExitOutcome};
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What teardown observed. Never changes the verdict of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub instance: InstanceName,
    /// SIGKILL was needed
    pub forced: bool,
    pub final_state: InstanceState,
    /// Exit status of the server, when one was running
    pub exit_status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShutdownSupervisor {
    grace_period: Duration,
}

impl ShutdownSupervisor {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Shut every instance down concurrently
    pub async fn shutdown_all(&self, instances: &mut [Instance]) -> Vec<ShutdownReport> {
        join_all(instances.iter_mut().map(|instance| self.shutdown(instance))).await
    }

    pub async fn shutdown(&self, instance: &mut Instance) -> ShutdownReport {
        if instance.state().current_state() == InstanceState::CleanedUp {
            debug!(instance = %instance.name(), "already cleaned up");
            return report(instance, None);
        }

        let exit_status = match instance.take_process() {
            Some(monitor) => Some(self.stop_process(instance, monitor).await.to_string()),
            None => None,
        };

        instance.drain_collectors().await;
        instance.remove_paths();
        let name = instance.name().clone();
        advance(&name, instance.state_mut().mark_cleaned_up());

        let report = report(instance, exit_status);
        if report.forced {
            warn!(instance = %report.instance, "Instance had to be killed after the grace period");
        } else {
            info!(instance = %report.instance, status = ?report.exit_status, "Instance shut down");
        }
        report
    }

    async fn stop_process(&self, instance: &mut Instance, mut monitor: ExitMonitor) -> ExitOutcome {
        let name = instance.name().clone();

        if let Some(outcome) = monitor.exited() {
            debug!(instance = %name, status = %outcome, "process already exited");
            advance(&name, instance.state_mut().mark_exited(outcome.to_string()));
            return outcome;
        }

        let pid = monitor.pid();
        info!(instance = %name, pid, grace = ?self.grace_period, "Sending SIGTERM");
        if let Err(e) = terminate_gracefully(pid) {
            warn!(instance = %name, error = %e, "graceful termination failed");
        }
        advance(&name, instance.state_mut().mark_graceful_signal_sent());

        let outcome = match monitor.wait_timeout(self.grace_period).await {
            Some(outcome) => outcome,
            None => {
                warn!(instance = %name, pid, "Grace period elapsed; sending SIGKILL");
                if let Err(e) = force_kill(pid) {
                    warn!(instance = %name, error = %e, "forced termination failed");
                }
                advance(&name, instance.state_mut().mark_force_kill_sent());
                monitor.wait().await
            }
        };

        advance(&name, instance.state_mut().mark_exited(outcome.to_string()));
        outcome
    }
}

fn report(instance: &Instance, exit_status: Option<String>) -> ShutdownReport {
    let state = instance.state();
    let exit_status = exit_status.or_else(|| {
        state
            .state_history()
            .iter()
            .rev()
            .find(|t| t.to_state == InstanceState::Exited)
            .and_then(|t| t.reason.clone())
    });

    ShutdownReport {
        instance: instance.name().clone(),
        forced: state.visited(InstanceState::ForceKillSent),
        final_state: state.current_state(),
        exit_status,
    }
}

fn advance(instance: &InstanceName, result: ProcessResult<()>) {
    if let Err(e) = result {
        debug!(instance = %instance, error = %e, "state transition skipped");
    }
}
