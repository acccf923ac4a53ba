//! Cluster wait-fence.
//!
//! One probe task per instance, all bounded by a single deadline. The fence
//! succeeds only when every instance reported ready before the deadline.
//! Outstanding probe tasks are cancelled and joined before it returns, on
//! every path.

use crate::prober::{ProbeOutcome, ReadinessProber};
use crate::ProbeTarget;
use benchvisor_common::{HarnessError, InstanceName, Phase};
use benchvisor_output::OutputCapture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lines of instance output logged when the fence times out
const TIMEOUT_TAIL_LINES: usize = 20;

/// Summary of a successful wait
#[derive(Debug, Clone)]
pub struct FenceReport {
    pub ready: Vec<InstanceName>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct WaitFence {
    prober: Arc<ReadinessProber>,
    deadline: Duration,
}

impl WaitFence {
    pub fn new(prober: Arc<ReadinessProber>, deadline: Duration) -> Self {
        Self { prober, deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Wait until every target is ready.
    ///
    /// Fails with [`HarnessError::ReadinessTimeout`] naming the instances that
    /// were still pending at the deadline, or with
    /// [`HarnessError::InstanceExited`] when a fail-fast probe saw its server
    /// die.
    pub async fn wait_all(&self, targets: Vec<ProbeTarget>) -> Result<FenceReport, HarnessError> {
        let start = Instant::now();
        let cancel = CancellationToken::new();
        let mut set = JoinSet::new();
        let mut pending: Vec<InstanceName> = Vec::with_capacity(targets.len());
        let mut captures: Vec<(InstanceName, OutputCapture)> = Vec::with_capacity(targets.len());
        let mut ready = Vec::with_capacity(targets.len());

        for target in targets {
            pending.push(target.instance.clone());
            captures.push((target.instance.clone(), target.capture.clone()));

            let prober = Arc::clone(&self.prober);
            let token = cancel.child_token();
            set.spawn(async move {
                let instance = target.instance.clone();
                let outcome = prober.wait_ready(target, token).await;
                (instance, outcome)
            });
        }

        info!(instances = pending.len(), deadline = ?self.deadline, "Waiting for cluster readiness");

        let waited = tokio::time::timeout(self.deadline, async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((instance, ProbeOutcome::Ready { .. })) => {
                        pending.retain(|p| *p != instance);
                        ready.push(instance);
                    }
                    Ok((instance, ProbeOutcome::Exited(outcome))) => {
                        return Err(HarnessError::InstanceExited {
                            instance,
                            status: outcome.to_string(),
                        });
                    }
                    Ok((_, ProbeOutcome::Cancelled)) => {}
                    Err(e) => {
                        return Err(HarnessError::Panicked {
                            phase: Phase::Readiness,
                            message: e.to_string(),
                        });
                    }
                }
            }
            Ok(())
        })
        .await;

        cancel.cancel();
        set.shutdown().await;

        match waited {
            Ok(Ok(())) if pending.is_empty() => {
                let elapsed = start.elapsed();
                info!(elapsed = ?elapsed, "Cluster is ready");
                Ok(FenceReport { ready, elapsed })
            }
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) | Err(_) => {
                for (instance, capture) in captures.iter().filter(|(i, _)| pending.contains(i)) {
                    warn!(instance = %instance, "Instance not ready at deadline; recent output follows");
                    for line in capture.tail(TIMEOUT_TAIL_LINES) {
                        warn!(instance = %instance, "{}", line);
                    }
                }
                Err(HarnessError::ReadinessTimeout {
                    deadline: self.deadline,
                    pending,
                })
            }
        }
    }
}
