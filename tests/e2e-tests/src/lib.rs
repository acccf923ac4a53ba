// E2E test helpers for benchvisor

use benchvisor_harness::{HarnessConfig, ResolvedConfig, WorkloadConfig};
use std::env;
use std::net::TcpListener;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Host parallelism reported to the resolver in tests
pub const TEST_HOST_PARALLELISM: usize = 4;

/// Get the path to the fakeroach binary built alongside the tests
pub fn get_fakeroach_path() -> PathBuf {
    let mut path = env::current_exe()
        .expect("Failed to get current exe path")
        .parent()
        .expect("Failed to get parent dir")
        .to_path_buf();

    // If we're in deps/, go up one level
    if path.ends_with("deps") {
        path.pop();
    }

    path.push("fakeroach");

    if !path.exists() {
        panic!("fakeroach binary not found at: {}", path.display());
    }

    path
}

/// Find a base port whose successor is free as well
pub fn free_port_pair() -> u16 {
    for _ in 0..50 {
        let first = TcpListener::bind("127.0.0.1:0").expect("Failed to bind ephemeral port");
        let port = first.local_addr().expect("Failed to read local addr").port();
        if port >= u16::MAX - 1 {
            continue;
        }
        if TcpListener::bind(("127.0.0.1", port + 1)).is_ok() {
            return port;
        }
    }
    panic!("No free port pair found");
}

/// Isolated directories for one scenario.
///
/// `tmp` is handed to the harness as its base directory; the invocation
/// record lives elsewhere so `tmp` can be checked for leftovers.
pub struct TestEnv {
    tmp: tempfile::TempDir,
    scratch: tempfile::TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            tmp: tempfile::tempdir().expect("Failed to create tmp dir"),
            scratch: tempfile::tempdir().expect("Failed to create scratch dir"),
        }
    }

    pub fn tmp(&self) -> &Path {
        self.tmp.path()
    }

    pub fn record_path(&self) -> PathBuf {
        self.scratch.path().join("invocations.log")
    }

    /// Config pointing at fakeroach with short timings
    pub fn config(&self, workload: WorkloadConfig) -> HarnessConfig {
        let mut config = HarnessConfig {
            host: "127.0.0.1".to_string(),
            cockroach_bin: Some(get_fakeroach_path()),
            tmp_dir: Some(self.tmp().to_path_buf()),
            procs_per_inst: 2,
            base_port: free_port_pair(),
            probe_interval: Duration::from_millis(100),
            check_timeout: Duration::from_secs(5),
            readiness_timeout: Duration::from_secs(20),
            grace_period: Duration::from_secs(5),
            workload,
            ..HarnessConfig::default()
        };
        config.env.insert(
            "FAKEROACH_RECORD".to_string(),
            self.record_path().display().to_string(),
        );
        config
    }

    pub fn resolve(&self, config: &HarnessConfig) -> ResolvedConfig {
        config
            .resolve_with(None, NonZeroUsize::new(TEST_HOST_PARALLELISM))
            .expect("Failed to resolve config")
    }

    /// Every fakeroach invocation, in order
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(self.record_path())
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Invocations whose arguments start with `prefix` (e.g. "workload run")
    pub fn invocations_of(&self, prefix: &str) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|line| {
                line.split_once(' ')
                    .map(|(_, args)| args.starts_with(prefix))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Entries left in the harness base directory
    pub fn leftovers(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.tmp())
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
