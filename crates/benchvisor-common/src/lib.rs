//! # Benchvisor Common
//!
//! Types shared across the benchvisor crates: the harness error taxonomy,
//! low-level process errors and the small identifiers that flow between the
//! launcher, the readiness fence and the shutdown supervisor.

pub mod errors;
pub mod types;

pub use errors::{ConfigError, HarnessError, ProcessError, ProcessResult, Result};
pub use types::{CrashPolicy, InstanceName, Phase};
