//! Workload runner: the init phase followed by the timed run phase.

use crate::config::ResolvedConfig;
use crate::workload::{init_command, run_command, ScaledParams};
use benchvisor_common::{HarnessError, Phase};
use benchvisor_process::CommandSpec;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Bytes of driver stderr kept in a phase error
const STDERR_TAIL_BYTES: usize = 4096;

/// Outcome of a successful benchmark
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub workload: &'static str,
    pub scaled: ScaledParams,
    /// Duration of the run phase only
    pub elapsed: Duration,
}

impl RunReport {
    /// The single machine-readable line printed on success
    pub fn result_line(&self) -> String {
        format!("[RESULT] total elapsed time: {:.4} s", self.elapsed.as_secs_f64())
    }
}

#[derive(Debug, Clone)]
pub struct WorkloadRunner {
    config: Arc<ResolvedConfig>,
}

impl WorkloadRunner {
    pub fn new(config: Arc<ResolvedConfig>) -> Self {
        Self { config }
    }

    /// Extra environment plus the driver's GOMAXPROCS
    fn with_driver_env(&self, spec: CommandSpec) -> CommandSpec {
        let parallelism = self
            .config
            .workload()
            .driver_parallelism(self.config.procs_per_inst, self.config.host_parallelism);
        spec.envs(self.config.extra_env.iter().cloned())
            .env("GOMAXPROCS", parallelism.to_string())
    }

    pub fn init_command(&self, scaled: &ScaledParams, pgurls: &[String]) -> CommandSpec {
        self.with_driver_env(init_command(&self.config.binary, self.config.workload(), scaled, pgurls))
    }

    pub fn run_command(&self, scaled: &ScaledParams, pgurls: &[String]) -> CommandSpec {
        self.with_driver_env(run_command(&self.config.binary, self.config.workload(), scaled, pgurls))
    }

    /// Bootstrap schema and data
    pub async fn init(&self, scaled: &ScaledParams, pgurls: &[String]) -> Result<(), HarnessError> {
        info!(
            workload = self.config.workload().kind(),
            warehouses = ?scaled.warehouses,
            "Initializing workload"
        );
        run_phase(Phase::Init, &self.init_command(scaled, pgurls)).await?;
        Ok(())
    }

    /// Run the timed phase and report its duration
    pub async fn run(&self, scaled: &ScaledParams, pgurls: &[String]) -> Result<RunReport, HarnessError> {
        let workload = self.config.workload();
        info!(
            workload = workload.kind(),
            procs = scaled.procs_per_inst,
            max_ops = scaled.max_ops,
            concurrency = ?scaled.concurrency,
            "Running workload"
        );

        let elapsed = run_phase(Phase::Run, &self.run_command(scaled, pgurls)).await?;
        info!(workload = workload.kind(), elapsed = ?elapsed, "Workload finished");

        Ok(RunReport {
            workload: workload.kind(),
            scaled: *scaled,
            elapsed,
        })
    }
}

/// Run one driver invocation to completion, timing it from just before the
/// spawn to just after the exit.
///
/// stdout is discarded; stderr is drained while the driver runs and only its
/// tail is kept.
async fn run_phase(phase: Phase, spec: &CommandSpec) -> Result<Duration, HarnessError> {
    let mut cmd = spec.to_command();
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| {
        HarnessError::phase_failed(
            phase,
            format!("failed to start {}: {}", spec.program().display(), e),
            "",
        )
    })?;

    let stderr = child.stderr.take();
    let (status, tail) = tokio::join!(child.wait(), async {
        match stderr {
            Some(stderr) => read_tail(stderr, STDERR_TAIL_BYTES).await,
            None => StderrTail::new(STDERR_TAIL_BYTES),
        }
    });
    let elapsed = start.elapsed();

    let status = status.map_err(|e| {
        HarnessError::phase_failed(
            phase,
            format!("failed to wait for driver: {}", e),
            tail.to_string_lossy(),
        )
    })?;
    if !status.success() {
        return Err(HarnessError::phase_failed(
            phase,
            status.to_string(),
            tail.to_string_lossy(),
        ));
    }

    Ok(elapsed)
}

/// Last `limit` bytes of a stream. Holds at most twice the limit.
#[derive(Debug)]
struct StderrTail {
    buf: Vec<u8>,
    limit: usize,
}

impl StderrTail {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit * 2),
            limit,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.limit {
            self.buf.clear();
            self.buf.extend_from_slice(&chunk[chunk.len() - self.limit..]);
            return;
        }
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > self.limit * 2 {
            let excess = self.buf.len() - self.limit;
            self.buf.drain(..excess);
        }
    }

    fn tail(&self) -> &[u8] {
        let start = self.buf.len().saturating_sub(self.limit);
        &self.buf[start..]
    }

    fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.tail()).into_owned()
    }
}

async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> StderrTail {
    let mut tail = StderrTail::new(limit);
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => tail.push(&chunk[..n]),
            Err(e) => {
                debug!(error = %e, "stopped reading driver stderr");
                break;
            }
        }
    }
    tail
}
