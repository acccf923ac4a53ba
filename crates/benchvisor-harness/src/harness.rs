//! The benchmark pipeline.
//!
//! `launch → wait-fence → init → run`, followed by the shutdown supervisor
//! on every exit path: success, error, panic inside a phase, or an external
//! abort.

use crate::config::ResolvedConfig;
use crate::instance::Instance;
use crate::launcher::Launcher;
use crate::runner::{RunReport, WorkloadRunner};
use crate::shutdown::{ShutdownReport, ShutdownSupervisor};
use benchvisor_common::{HarnessError, Phase};
use benchvisor_readiness::{ReadinessProber, WaitFence};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Exit code for a run interrupted from outside
pub const EXIT_CODE_ABORTED: i32 = 130;

/// Result of a run together with what teardown observed
#[derive(Debug)]
pub struct HarnessOutcome {
    pub result: Result<RunReport, HarnessError>,
    pub shutdown: Vec<ShutdownReport>,
}

impl HarnessOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn exit_code(&self) -> i32 {
        match &self.result {
            Ok(_) => 0,
            Err(e) if e.is_aborted() => EXIT_CODE_ABORTED,
            Err(_) => 1,
        }
    }
}

#[derive(Debug)]
pub struct Harness {
    config: Arc<ResolvedConfig>,
    abort: CancellationToken,
    #[cfg(test)]
    panic_on_enter: Option<Phase>,
}

impl Harness {
    pub fn new(config: ResolvedConfig) -> Self {
        Self {
            config: Arc::new(config),
            abort: CancellationToken::new(),
            #[cfg(test)]
            panic_on_enter: None,
        }
    }

    /// Use an externally owned token to abort the run (e.g. on Ctrl-C)
    pub fn with_abort_token(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Run the whole pipeline. Teardown always happens before this returns.
    pub async fn run(&self) -> HarnessOutcome {
        let mut instances: Vec<Instance> = Vec::new();
        let stage = Mutex::new(Phase::Launch);

        let result = {
            let pipeline = AssertUnwindSafe(self.drive(&mut instances, &stage)).catch_unwind();
            tokio::select! {
                biased;
                _ = self.abort.cancelled() => {
                    let phase = *stage.lock();
                    warn!(%phase, "Run aborted");
                    Err(HarnessError::Aborted { phase })
                }
                joined = pipeline => match joined {
                    Ok(result) => result,
                    Err(panic) => {
                        let phase = *stage.lock();
                        let message = panic_message(panic.as_ref());
                        error!(%phase, %message, "Pipeline panicked");
                        Err(HarnessError::Panicked { phase, message })
                    }
                },
            }
        };

        *stage.lock() = Phase::Shutdown;
        info!("Shutting down cluster");
        let shutdown = ShutdownSupervisor::new(self.config.grace_period)
            .shutdown_all(&mut instances)
            .await;

        match &result {
            Ok(report) => info!(workload = report.workload, elapsed = ?report.elapsed, "Benchmark complete"),
            Err(e) => error!(phase = %e.phase(), error = %e, "Benchmark failed"),
        }

        HarnessOutcome { result, shutdown }
    }

    async fn drive(&self, instances: &mut Vec<Instance>, stage: &Mutex<Phase>) -> Result<RunReport, HarnessError> {
        let config = &self.config;
        let scaled = config.workload().scale(config.procs_per_inst)?;

        self.enter(stage, Phase::Launch);
        info!(workload = config.workload().kind(), "Launching cluster");
        let launcher = Launcher::new(Arc::clone(config));
        instances.push(launcher.describe(0)?);
        for instance in instances.iter_mut() {
            launcher.launch(instance)?;
        }

        self.enter(stage, Phase::Readiness);
        let prober = ReadinessProber::standard(&config.binary, config.extra_env.clone(), config.prober.clone());
        let fence = WaitFence::new(Arc::new(prober), config.readiness_timeout);
        fence
            .wait_all(instances.iter().map(Instance::probe_target).collect())
            .await?;

        let pgurls: Vec<String> = instances.iter().map(Instance::pgurl).collect();
        let runner = WorkloadRunner::new(Arc::clone(config));

        self.enter(stage, Phase::Init);
        runner.init(&scaled, &pgurls).await?;

        self.enter(stage, Phase::Run);
        runner.run(&scaled, &pgurls).await
    }
}

impl Harness {
    fn enter(&self, stage: &Mutex<Phase>, phase: Phase) {
        *stage.lock() = phase;
        #[cfg(test)]
        {
            if self.panic_on_enter == Some(phase) {
                panic!("injected failure entering {phase} phase");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
