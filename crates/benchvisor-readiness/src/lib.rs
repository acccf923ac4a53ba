//! # Benchvisor Readiness
//!
//! Readiness probing for supervised instances.
//!
//! This crate provides:
//! - The [`ReadinessCheck`] seam with control-plane and diagnostic HTTP checks
//! - A per-instance [`ReadinessProber`] polling until ready or cancelled
//! - The [`WaitFence`] bounding all probes by one global deadline

pub mod control;
pub mod fence;
pub mod http;
pub mod prober;

use async_trait::async_trait;
use benchvisor_common::InstanceName;
use benchvisor_output::OutputCapture;
use benchvisor_process::ExitWatch;
use thiserror::Error;

/// A single failed readiness check. Never fatal on its own; the prober
/// retries until the fence deadline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("control probe failed for {id}: {reason}")]
    ControlFailed { id: String, reason: String },

    #[error("diagnostic endpoint connection failed: {id} - {reason}")]
    ConnectionFailed { id: String, reason: String },

    #[error("readiness check timeout: {id}")]
    Timeout { id: String },

    #[error("diagnostic endpoint invalid response: {id} - {response}")]
    InvalidResponse { id: String, response: String },
}

/// Result type for readiness checks.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Everything a probe needs to know about one instance.
///
/// Cloned into each probe task; the instance descriptor itself stays with
/// the harness.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub instance: InstanceName,
    pub host: String,
    pub sql_port: u16,
    pub http_port: u16,
    /// Exit notifications of the server process, when one is running
    pub exit: Option<ExitWatch>,
    /// Instance output buffer; control probe output is appended here
    pub capture: OutputCapture,
}

impl ProbeTarget {
    pub fn new(instance: InstanceName, host: impl Into<String>, sql_port: u16, http_port: u16) -> Self {
        Self {
            instance,
            host: host.into(),
            sql_port,
            http_port,
            exit: None,
            capture: OutputCapture::default(),
        }
    }

    pub fn with_exit_watch(mut self, exit: ExitWatch) -> Self {
        self.exit = Some(exit);
        self
    }

    pub fn with_capture(mut self, capture: OutputCapture) -> Self {
        self.capture = capture;
        self
    }
}

/// One readiness predicate. An instance is ready when every configured
/// check passes in the same attempt.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &'static str;

    async fn check(&self, target: &ProbeTarget) -> ProbeResult<()>;
}

// Re-export main types
pub use control::ControlPlaneCheck;
pub use fence::{FenceReport, WaitFence};
pub use http::{DiagnosticHttpCheck, DEFAULT_DIAGNOSTIC_PATH};
pub use prober::{ProbeOutcome, ProberConfig, ReadinessProber};
