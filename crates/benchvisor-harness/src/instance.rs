//! Instance descriptor: everything the harness owns for one launched server.

use crate::workload::pgurl;
use benchvisor_common::{ConfigError, InstanceName};
use benchvisor_instance_state::{InstanceState, InstanceStateMachine};
use benchvisor_output::OutputCapture;
use benchvisor_process::ExitMonitor;
use benchvisor_readiness::ProbeTarget;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long teardown waits for the output copy tasks to drain
const COLLECTOR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Ports of instance `index`: SQL at `base + 2*index`, diagnostics right
/// above it.
pub fn instance_ports(base_port: u16, index: usize) -> Result<(u16, u16), ConfigError> {
    let sql = u32::try_from(index)
        .ok()
        .and_then(|i| i.checked_mul(2))
        .and_then(|offset| offset.checked_add(u32::from(base_port)))
        .and_then(|p| u16::try_from(p).ok());
    let http = sql.and_then(|p| p.checked_add(1));

    match (sql, http) {
        (Some(sql), Some(http)) => Ok((sql, http)),
        _ => Err(ConfigError::invalid_value(
            "base_port",
            format!("instance {} does not fit above port {}", index, base_port),
        )),
    }
}

/// Owned record of one supervised server.
///
/// Created before anything touches the filesystem so that teardown can
/// always find, and remove, whatever a partial launch left behind.
#[derive(Debug)]
pub struct Instance {
    name: InstanceName,
    host: String,
    sql_port: u16,
    http_port: u16,
    store_dir: PathBuf,
    log_dir: PathBuf,
    capture: OutputCapture,
    process: Option<ExitMonitor>,
    collectors: Vec<JoinHandle<()>>,
    collector_cancel: CancellationToken,
    state: InstanceStateMachine,
}

impl Instance {
    pub fn new(
        name: InstanceName,
        host: impl Into<String>,
        (sql_port, http_port): (u16, u16),
        tmp_root: &Path,
    ) -> Self {
        let store_dir = tmp_root.join(name.as_str());
        let log_dir = tmp_root.join(format!("{}-log", name));
        let state = InstanceStateMachine::new(name.as_str());

        Self {
            name,
            host: host.into(),
            sql_port,
            http_port,
            store_dir,
            log_dir,
            capture: OutputCapture::default(),
            process: None,
            collectors: Vec::new(),
            collector_cancel: CancellationToken::new(),
            state,
        }
    }

    pub fn name(&self) -> &InstanceName {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn sql_port(&self) -> u16 {
        self.sql_port
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn sql_addr(&self) -> String {
        format!("{}:{}", self.host, self.sql_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    pub fn pgurl(&self) -> String {
        pgurl(&self.host, self.sql_port)
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn capture(&self) -> &OutputCapture {
        &self.capture
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(ExitMonitor::pid)
    }

    pub fn state(&self) -> &InstanceStateMachine {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut InstanceStateMachine {
        &mut self.state
    }

    pub(crate) fn collector_token(&self) -> CancellationToken {
        self.collector_cancel.child_token()
    }

    /// Everything a readiness probe needs, detached from the descriptor
    pub fn probe_target(&self) -> ProbeTarget {
        let target = ProbeTarget::new(self.name.clone(), self.host.clone(), self.sql_port, self.http_port)
            .with_capture(self.capture.clone());
        match &self.process {
            Some(monitor) => target.with_exit_watch(monitor.watch()),
            None => target,
        }
    }

    /// Record a freshly spawned server
    pub(crate) fn attach_process(&mut self, monitor: ExitMonitor, collectors: Vec<JoinHandle<()>>) {
        self.process = Some(monitor);
        self.collectors = collectors;
        if let Err(e) = self.state.mark_running() {
            debug!(instance = %self.name, error = %e, "unexpected state on attach");
        }
    }

    pub(crate) fn take_process(&mut self) -> Option<ExitMonitor> {
        self.process.take()
    }

    /// Wait for the output copy tasks to reach EOF, cancelling them if they
    /// do not finish in time.
    pub(crate) async fn drain_collectors(&mut self) {
        for task in self.collectors.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(COLLECTOR_DRAIN_TIMEOUT, task).await.is_err() {
                debug!(instance = %self.name, "output copy did not finish; cancelling");
                abort.abort();
            }
        }
        self.collector_cancel.cancel();
    }

    /// Remove both ephemeral directories. Errors are logged and ignored.
    pub fn remove_paths(&self) {
        for dir in [&self.store_dir, &self.log_dir] {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => debug!(instance = %self.name, path = %dir.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => debug!(
                    instance = %self.name,
                    path = %dir.display(),
                    error = %e,
                    "failed to remove ephemeral directory"
                ),
            }
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if self.state.current_state() == InstanceState::CleanedUp {
            return;
        }
        // Async teardown never ran: the monitor kills the process on drop
        if let Some(monitor) = self.process.take() {
            debug!(instance = %self.name, pid = monitor.pid(), "dropping live instance");
            drop(monitor);
        }
        self.collector_cancel.cancel();
        self.remove_paths();
    }
}
