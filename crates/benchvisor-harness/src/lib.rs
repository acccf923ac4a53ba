//! # Benchvisor Harness
//!
//! Supervises an ephemeral single-node server and drives a benchmark
//! workload against it.
//!
//! The pipeline is `config → launch → wait-fence → init → run → shutdown`.
//! Shutdown runs on every exit path, so the server process and its
//! ephemeral directories never outlive a run.
//!
//! ```no_run
//! use benchvisor_harness::{Harness, HarnessConfig};
//!
//! # async fn example() -> Result<(), benchvisor_common::ConfigError> {
//! let config = HarnessConfig::load_from_file("bench.yaml")?.resolve()?;
//! let outcome = Harness::new(config).run().await;
//! if let Ok(report) = &outcome.result {
//!     println!("{}", report.result_line());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod harness;
pub mod instance;
pub mod launcher;
pub mod runner;
pub mod shutdown;
pub mod workload;

pub use config::{parse_duration, HarnessConfig, ResolvedConfig, COCKROACH_BIN_ENV, DEFAULT_INSTANCE_NAME};
pub use harness::{Harness, HarnessOutcome, EXIT_CODE_ABORTED};
pub use instance::Instance;
pub use launcher::Launcher;
pub use runner::{RunReport, WorkloadRunner};
pub use shutdown::{ShutdownReport, ShutdownSupervisor};
pub use workload::{
    KvConfig, ScaledParams, TpccConfig, Workload, WorkloadConfig, ALLOWED_READ_PERCENTS, WORKLOAD_SEED,
};
