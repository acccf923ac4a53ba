//! # Benchvisor Process
//!
//! Low-level process operations used by the harness:
//! - Building and spawning commands with piped output
//! - Graceful and forced termination signals
//! - Exit monitoring that owns the child and reaps it
//! - Executable checks for binaries supplied through the environment

pub mod execute;
pub mod monitor;
pub mod terminate;
pub mod validation;

pub use execute::*;
pub use monitor::*;
pub use terminate::*;
pub use validation::*;
