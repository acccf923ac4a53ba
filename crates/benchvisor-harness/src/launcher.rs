//! Launcher: ephemeral directories, argument assembly and server spawn.

use crate::config::{ResolvedConfig, DEFAULT_INSTANCE_NAME};
use crate::instance::{instance_ports, Instance};
use benchvisor_common::{HarnessError, InstanceName};
use benchvisor_output::StreamType;
use benchvisor_process::{spawn_piped, CommandSpec, ExitMonitor};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Launcher {
    config: Arc<ResolvedConfig>,
}

impl Launcher {
    pub fn new(config: Arc<ResolvedConfig>) -> Self {
        Self { config }
    }

    pub fn instance_name(index: usize) -> InstanceName {
        if index == 0 {
            InstanceName::from(DEFAULT_INSTANCE_NAME)
        } else {
            InstanceName::new(format!("{}-{}", DEFAULT_INSTANCE_NAME, index + 1))
        }
    }

    /// Build the descriptor for instance `index` without touching the disk
    pub fn describe(&self, index: usize) -> Result<Instance, HarnessError> {
        let ports = instance_ports(self.config.base_port, index)?;
        Ok(Instance::new(
            Self::instance_name(index),
            self.config.host.clone(),
            ports,
            &self.config.tmp_root,
        ))
    }

    /// `<bin> start-single-node --insecure --listen-addr ... --log-dir ...`
    /// with `GOMAXPROCS` pinned to the resolved parallelism.
    pub fn server_command(&self, instance: &Instance) -> CommandSpec {
        CommandSpec::new(&self.config.binary)
            .args(["start-single-node", "--insecure"])
            .args(["--listen-addr".to_string(), instance.sql_addr()])
            .args(["--http-addr".to_string(), instance.http_addr()])
            .args(["--cache", self.config.workload().cache_fraction()])
            .arg("--store")
            .arg(path_arg(instance.store_dir()))
            .arg("--log-dir")
            .arg(path_arg(instance.log_dir()))
            .envs(self.config.extra_env.iter().cloned())
            .env("GOMAXPROCS", self.config.procs_per_inst.to_string())
    }

    /// Create the ephemeral directories and start the server.
    ///
    /// On failure the descriptor keeps whatever was created so the caller's
    /// teardown removes it. There is no retry.
    pub fn launch(&self, instance: &mut Instance) -> Result<(), HarnessError> {
        prepare_dir(instance.store_dir()).map_err(|e| HarnessError::launch(instance.name().clone(), e))?;
        prepare_dir(instance.log_dir()).map_err(|e| HarnessError::launch(instance.name().clone(), e))?;

        let spec = self.server_command(instance);
        info!(instance = %instance.name(), procs = self.config.procs_per_inst, "Starting server");
        debug!(instance = %instance.name(), command = %spec, "Server command");

        let mut child = spawn_piped(&spec).map_err(|e| HarnessError::launch(instance.name().clone(), e))?;

        let mut collectors = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            collectors.push(instance.capture().collect_from_stream(
                instance.name().as_str(),
                stdout,
                StreamType::Stdout,
                instance.collector_token(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            collectors.push(instance.capture().collect_from_stream(
                instance.name().as_str(),
                stderr,
                StreamType::Stderr,
                instance.collector_token(),
            ));
        }

        let monitor = ExitMonitor::spawn(instance.name().as_str(), child)
            .map_err(|e| HarnessError::launch(instance.name().clone(), e))?;
        info!(instance = %instance.name(), pid = monitor.pid(), addr = %instance.sql_addr(), "Server started");
        instance.attach_process(monitor, collectors);
        Ok(())
    }
}

/// Start from an empty directory, discarding leftovers of an earlier run
fn prepare_dir(dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!(path = %dir.display(), "removed stale directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(dir)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
