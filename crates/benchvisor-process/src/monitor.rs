//! Exit monitoring.
//!
//! The spawned [`Child`] is moved into a background task that waits for it
//! (which also reaps it, so no zombie is left behind) and publishes the exit
//! outcome on a `watch` channel. Everything else (readiness probes, the
//! shutdown supervisor) observes the process through cheap [`ExitWatch`]
//! clones and signals it by PID.

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How a monitored process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(ExitStatus),
    /// Waiting on the child failed or the monitor went away.
    Unknown,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(status) if status.success())
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(status) => write!(f, "{}", status),
            ExitOutcome::Unknown => write!(f, "exit status unknown"),
        }
    }
}

/// Read side of an exit monitor.
#[derive(Debug, Clone)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ExitOutcome>>,
}

impl ExitWatch {
    /// The exit outcome, if the process has already exited.
    pub fn exited(&self) -> Option<ExitOutcome> {
        *self.rx.borrow()
    }

    /// Wait until the process exits.
    pub async fn wait(&mut self) -> ExitOutcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(ExitOutcome::Unknown),
            Err(_) => ExitOutcome::Unknown,
        }
    }
}

/// Owns a running child through its wait task.
#[derive(Debug)]
pub struct ExitMonitor {
    id: String,
    pid: u32,
    watch: ExitWatch,
    task: Option<JoinHandle<()>>,
}

impl ExitMonitor {
    /// Take ownership of `child` and start waiting for it.
    pub fn spawn(id: impl Into<String>, mut child: Child) -> std::io::Result<Self> {
        let id = id.into();
        let pid = child.id().ok_or_else(|| {
            std::io::Error::other(format!("process {} exited before its PID was read", id))
        })?;

        let (tx, rx) = watch::channel(None);
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => {
                    debug!(process = %task_id, %status, "process exited");
                    ExitOutcome::Exited(status)
                }
                Err(e) => {
                    warn!(process = %task_id, error = %e, "failed to wait for process");
                    ExitOutcome::Unknown
                }
            };
            tx.send_replace(Some(outcome));
        });

        Ok(Self {
            id,
            pid,
            watch: ExitWatch { rx },
            task: Some(task),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn watch(&self) -> ExitWatch {
        self.watch.clone()
    }

    pub fn exited(&self) -> Option<ExitOutcome> {
        self.watch.exited()
    }

    pub async fn wait(&mut self) -> ExitOutcome {
        self.watch.wait().await
    }

    /// Wait for exit for at most `limit`. `None` means the process is still
    /// running.
    pub async fn wait_timeout(&mut self, limit: Duration) -> Option<ExitOutcome> {
        tokio::time::timeout(limit, self.watch.wait()).await.ok()
    }
}

impl Drop for ExitMonitor {
    fn drop(&mut self) {
        if self.exited().is_none() {
            warn!(process = %self.id, pid = self.pid, "exit monitor dropped while process running; killing");
            if let Err(e) = crate::terminate::force_kill(self.pid) {
                debug!(process = %self.id, error = %e, "kill on drop failed");
            }
        }
        // Aborting the wait task drops the child, which was spawned with
        // kill_on_drop and is reaped by the runtime.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
