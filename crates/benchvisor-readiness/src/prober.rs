//! Readiness prober - polls one instance until every check passes

use crate::control::ControlPlaneCheck;
use crate::http::DiagnosticHttpCheck;
use crate::{ProbeResult, ProbeTarget, ReadinessCheck};
use benchvisor_common::CrashPolicy;
use benchvisor_process::{ExitOutcome, ExitWatch};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Prober configuration
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Pause before each attempt, including the first
    pub interval: Duration,

    /// Upper bound for a single check
    pub check_timeout: Duration,

    /// What to do when the server process is seen to have exited
    pub crash_policy: CrashPolicy,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            check_timeout: Duration::from_secs(10),
            crash_policy: CrashPolicy::Retry,
        }
    }
}

/// How a probe loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// All checks passed on attempt number `attempts`
    Ready { attempts: u32 },
    /// The probe was cancelled before the instance became ready
    Cancelled,
    /// The server exited and the crash policy is fail-fast
    Exited(ExitOutcome),
}

/// Runs a fixed list of checks against one instance at a fixed interval
pub struct ReadinessProber {
    checks: Vec<Arc<dyn ReadinessCheck>>,
    config: ProberConfig,
}

impl std::fmt::Debug for ReadinessProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessProber")
            .field("checks", &self.checks.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

impl ReadinessProber {
    pub fn new(config: ProberConfig) -> Self {
        Self {
            checks: Vec::new(),
            config,
        }
    }

    /// The control-plane status command followed by the diagnostic endpoint
    pub fn standard(binary: impl Into<PathBuf>, env: Vec<(String, String)>, config: ProberConfig) -> Self {
        let control = ControlPlaneCheck::new(binary, config.check_timeout).with_env(env);
        let http = DiagnosticHttpCheck::new(config.check_timeout);
        Self::new(config).with_check(control).with_check(http)
    }

    pub fn with_check(mut self, check: impl ReadinessCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    /// Run every check once, stopping at the first failure
    pub async fn probe_once(&self, target: &ProbeTarget) -> ProbeResult<()> {
        for check in &self.checks {
            check.check(target).await?;
        }
        Ok(())
    }

    /// Poll `target` until it is ready, the token is cancelled, or (under
    /// the fail-fast policy) its process exits.
    pub async fn wait_ready(&self, target: ProbeTarget, cancel: CancellationToken) -> ProbeOutcome {
        let fail_fast = self.config.crash_policy == CrashPolicy::FailFast;
        let mut exit = target.exit.clone();
        let mut attempts = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ProbeOutcome::Cancelled,
                outcome = wait_exit(&mut exit), if fail_fast => {
                    warn!(instance = %target.instance, status = %outcome, "Instance exited before becoming ready");
                    return ProbeOutcome::Exited(outcome);
                }
                _ = sleep(self.config.interval) => {}
            }

            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ProbeOutcome::Cancelled,
                result = self.probe_once(&target) => result,
            };

            match result {
                Ok(()) => {
                    info!(instance = %target.instance, attempts, "Instance is ready");
                    return ProbeOutcome::Ready { attempts };
                }
                Err(e) => {
                    debug!(instance = %target.instance, attempt = attempts, error = %e, "Instance not ready yet");
                }
            }
        }
    }
}

/// Resolves when the watched process exits; never resolves without a watch
async fn wait_exit(exit: &mut Option<ExitWatch>) -> ExitOutcome {
    match exit {
        Some(watch) => watch.wait().await,
        None => std::future::pending().await,
    }
}
