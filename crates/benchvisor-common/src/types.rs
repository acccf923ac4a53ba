//! Core identifiers used throughout the harness.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical name of a supervised instance.
///
/// The name also determines the on-disk names of the instance's ephemeral
/// directories, so it is kept as a dedicated type rather than a bare string.
///
/// # Example
/// ```
/// use benchvisor_common::InstanceName;
///
/// let name = InstanceName::from("roach-node");
/// assert_eq!(name.as_str(), "roach-node");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceName(String);

impl InstanceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage a run is in. Used to label fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Config,
    Launch,
    Readiness,
    Init,
    Run,
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Config => write!(f, "config"),
            Phase::Launch => write!(f, "launch"),
            Phase::Readiness => write!(f, "readiness"),
            Phase::Init => write!(f, "init"),
            Phase::Run => write!(f, "run"),
            Phase::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// What a readiness probe does when the server process has already exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrashPolicy {
    /// Keep probing until the fence deadline, exactly like a slow start.
    #[default]
    Retry,
    /// Fail the fence as soon as the process is observed to have exited.
    FailFast,
}

impl fmt::Display for CrashPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrashPolicy::Retry => write!(f, "retry"),
            CrashPolicy::FailFast => write!(f, "fail-fast"),
        }
    }
}
