//! Workload strategies.
//!
//! Every workload kind drives the same two phases (init, then timed run)
//! through the server binary's `workload` subcommand. A [`Workload`] supplies
//! only what differs between kinds: its flags, its per-core scaling rule and
//! the parallelism handed to the driver.

use benchvisor_common::ConfigError;
use benchvisor_process::CommandSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Seed passed to every randomized driver knob
pub const WORKLOAD_SEED: u64 = 42;

/// Read percentages accepted by the KV workload
pub const ALLOWED_READ_PERCENTS: &[u32] = &[0, 50, 95];

/// Absolute workload intensity for one run: configured per-core bases
/// multiplied by the resolved parallelism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledParams {
    pub procs_per_inst: usize,
    pub max_ops: u64,
    pub warehouses: Option<u64>,
    pub concurrency: Option<u64>,
}

/// Multiply a per-core base by `procs`, failing instead of wrapping.
pub fn scale(field: &'static str, base: u64, procs: usize) -> Result<u64, ConfigError> {
    u64::try_from(procs)
        .ok()
        .and_then(|factor| base.checked_mul(factor))
        .ok_or(ConfigError::Overflow {
            field,
            base,
            factor: procs,
        })
}

pub trait Workload: fmt::Debug + Send + Sync {
    /// Driver subcommand name (`kv`, `tpcc`)
    fn kind(&self) -> &'static str;

    /// Fraction of memory the server may use for its cache
    fn cache_fraction(&self) -> &'static str;

    fn scale(&self, procs_per_inst: usize) -> Result<ScaledParams, ConfigError>;

    /// Flags for `workload init <kind>`, before the connection URLs
    fn init_flags(&self, scaled: &ScaledParams) -> Vec<String>;

    /// Flags for `workload run <kind>`, before `--max-ops` and the URLs
    fn run_flags(&self, scaled: &ScaledParams) -> Vec<String>;

    /// GOMAXPROCS handed to the driver processes
    fn driver_parallelism(&self, procs_per_inst: usize, host_parallelism: usize) -> usize;
}

/// Key-value workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvConfig {
    #[serde(default = "default_read_percent")]
    pub read_percent: u32,

    /// Operation cap per core
    #[serde(default = "default_kv_max_ops")]
    pub max_ops: u64,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            read_percent: default_read_percent(),
            max_ops: default_kv_max_ops(),
        }
    }
}

impl Workload for KvConfig {
    fn kind(&self) -> &'static str {
        "kv"
    }

    fn cache_fraction(&self) -> &'static str {
        "0.25"
    }

    fn scale(&self, procs_per_inst: usize) -> Result<ScaledParams, ConfigError> {
        Ok(ScaledParams {
            procs_per_inst,
            max_ops: scale("max_ops", self.max_ops, procs_per_inst)?,
            warehouses: None,
            concurrency: None,
        })
    }

    fn init_flags(&self, _scaled: &ScaledParams) -> Vec<String> {
        Vec::new()
    }

    fn run_flags(&self, _scaled: &ScaledParams) -> Vec<String> {
        vec![
            format!("--read-percent={}", self.read_percent),
            "--min-block-bytes=128".to_string(),
            "--max-block-bytes=128".to_string(),
            "--concurrency=2000".to_string(),
            "--ramp=10s".to_string(),
            "--scatter".to_string(),
            "--splits=5".to_string(),
        ]
    }

    fn driver_parallelism(&self, procs_per_inst: usize, _host_parallelism: usize) -> usize {
        procs_per_inst
    }
}

/// TPC-C workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpccConfig {
    /// Warehouses per core
    #[serde(default = "default_warehouses")]
    pub warehouses: u64,

    /// Concurrent workers per core
    #[serde(default = "default_concurrency")]
    pub concurrency: u64,

    /// Operation cap per core
    #[serde(default = "default_tpcc_max_ops")]
    pub max_ops: u64,
}

impl Default for TpccConfig {
    fn default() -> Self {
        Self {
            warehouses: default_warehouses(),
            concurrency: default_concurrency(),
            max_ops: default_tpcc_max_ops(),
        }
    }
}

impl Workload for TpccConfig {
    fn kind(&self) -> &'static str {
        "tpcc"
    }

    fn cache_fraction(&self) -> &'static str {
        "0.5"
    }

    fn scale(&self, procs_per_inst: usize) -> Result<ScaledParams, ConfigError> {
        Ok(ScaledParams {
            procs_per_inst,
            max_ops: scale("max_ops", self.max_ops, procs_per_inst)?,
            warehouses: Some(scale("warehouses", self.warehouses, procs_per_inst)?),
            concurrency: Some(scale("concurrency", self.concurrency, procs_per_inst)?),
        })
    }

    fn init_flags(&self, scaled: &ScaledParams) -> Vec<String> {
        vec![
            format!("--warehouses={}", scaled.warehouses.unwrap_or(self.warehouses)),
            format!("--seed={}", WORKLOAD_SEED),
        ]
    }

    fn run_flags(&self, scaled: &ScaledParams) -> Vec<String> {
        vec![
            format!("--warehouses={}", scaled.warehouses.unwrap_or(self.warehouses)),
            format!("--concurrency={}", scaled.concurrency.unwrap_or(self.concurrency)),
            "--wait=0".to_string(),
            "--method=cache_statement".to_string(),
            "--ramp=10s".to_string(),
            "--split".to_string(),
            "--scatter".to_string(),
        ]
    }

    fn driver_parallelism(&self, _procs_per_inst: usize, host_parallelism: usize) -> usize {
        host_parallelism
    }
}

/// Workload selection, tagged by `kind` in YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkloadConfig {
    Kv(KvConfig),
    Tpcc(TpccConfig),
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig::Kv(KvConfig::default())
    }
}

impl WorkloadConfig {
    pub fn as_workload(&self) -> &dyn Workload {
        match self {
            WorkloadConfig::Kv(kv) => kv,
            WorkloadConfig::Tpcc(tpcc) => tpcc,
        }
    }
}

/// `postgres://root@<host>:<port>?sslmode=disable`
pub fn pgurl(host: &str, sql_port: u16) -> String {
    format!("postgres://root@{}:{}?sslmode=disable", host, sql_port)
}

/// `<bin> workload init <kind> <init flags> <pgurls...>`
pub fn init_command(
    binary: &Path,
    workload: &dyn Workload,
    scaled: &ScaledParams,
    pgurls: &[String],
) -> CommandSpec {
    CommandSpec::new(binary)
        .args(["workload", "init", workload.kind()])
        .args(workload.init_flags(scaled))
        .args(pgurls.iter().cloned())
}

/// `<bin> workload run <kind> <run flags> --seed=42 [--max-ops=N] <pgurls...>`
///
/// `--max-ops` is left out when the scaled cap is zero, meaning unbounded.
pub fn run_command(
    binary: &Path,
    workload: &dyn Workload,
    scaled: &ScaledParams,
    pgurls: &[String],
) -> CommandSpec {
    let mut spec = CommandSpec::new(binary)
        .args(["workload", "run", workload.kind()])
        .args(workload.run_flags(scaled))
        .arg(format!("--seed={}", WORKLOAD_SEED));
    if scaled.max_ops > 0 {
        spec = spec.arg(format!("--max-ops={}", scaled.max_ops));
    }
    spec.args(pgurls.iter().cloned())
}

fn default_read_percent() -> u32 {
    50
}

fn default_kv_max_ops() -> u64 {
    2_000_000
}

fn default_warehouses() -> u64 {
    1
}

fn default_concurrency() -> u64 {
    200
}

fn default_tpcc_max_ops() -> u64 {
    40_000
}
