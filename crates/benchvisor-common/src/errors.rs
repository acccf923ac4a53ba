//! Error types for the harness.
//!
//! Fatal failures of a run are reported as [`HarnessError`]; each variant
//! knows which pipeline [`Phase`] it belongs to so the CLI can print a single
//! diagnostic line naming the failing stage. Low-level signal
//! primitives use the narrower [`ProcessError`].

use crate::types::{InstanceName, Phase};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Invalid or incomplete run parameters. Always raised before anything is
/// launched or written to disk.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("read percent must be one of {allowed:?}, got {value}")]
    InvalidReadPercent { value: u32, allowed: &'static [u32] },

    #[error("server binary not specified; use --cockroachdb-bin or set {env_var}")]
    MissingBinary { env_var: &'static str },

    #[error("{env_var} is set but not an executable file: {path}")]
    BinaryNotExecutable { env_var: &'static str, path: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("{field} overflows when scaled by {factor} threads (base {base})")]
    Overflow {
        field: &'static str,
        base: u64,
        factor: usize,
    },

    #[error("failed to load config file {path}: {reason}")]
    File { path: String, reason: String },
}

impl ConfigError {
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Fatal error of a harness run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start instance \"{instance}\": {source}")]
    Launch {
        instance: InstanceName,
        #[source]
        source: std::io::Error,
    },

    #[error("timeout waiting for cluster after {deadline:?} (not ready: {})", join_names(.pending))]
    ReadinessTimeout {
        deadline: Duration,
        pending: Vec<InstanceName>,
    },

    #[error("instance \"{instance}\" exited before becoming ready ({status})")]
    InstanceExited {
        instance: InstanceName,
        status: String,
    },

    #[error("{phase} phase failed: {reason}{}", stderr_suffix(.stderr))]
    Phase {
        phase: Phase,
        reason: String,
        stderr: String,
    },

    #[error("run aborted during {phase} phase")]
    Aborted { phase: Phase },

    #[error("{phase} phase panicked: {message}")]
    Panicked { phase: Phase, message: String },
}

impl HarnessError {
    pub fn launch(instance: InstanceName, source: std::io::Error) -> Self {
        Self::Launch { instance, source }
    }

    pub fn phase_failed(phase: Phase, reason: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Phase {
            phase,
            reason: reason.into(),
            stderr: stderr.into(),
        }
    }

    /// The pipeline stage this error aborted.
    pub fn phase(&self) -> Phase {
        match self {
            HarnessError::Config(_) => Phase::Config,
            HarnessError::Launch { .. } => Phase::Launch,
            HarnessError::ReadinessTimeout { .. } | HarnessError::InstanceExited { .. } => {
                Phase::Readiness
            }
            HarnessError::Phase { phase, .. }
            | HarnessError::Aborted { phase }
            | HarnessError::Panicked { phase, .. } => *phase,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, HarnessError::Aborted { .. })
    }
}

fn join_names(names: &[InstanceName]) -> String {
    names
        .iter()
        .map(InstanceName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(", stderr: {}", trimmed)
    }
}

// ==============================================================================
// Process Primitive Errors
// ==============================================================================

/// Errors from the low-level signal primitives and the instance state
/// machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Failed to send {signal} to PID {pid}: {reason}")]
    SignalFailed {
        pid: u32,
        signal: &'static str,
        reason: String,
    },

    #[error("Operation not supported on this platform: {operation}")]
    Unsupported { operation: &'static str },

    #[error("Invalid state transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },
}

impl ProcessError {
    pub fn signal_failed(pid: u32, signal: &'static str, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            pid,
            signal,
            reason: reason.into(),
        }
    }

    pub fn invalid_transition(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Result type for process primitives.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
