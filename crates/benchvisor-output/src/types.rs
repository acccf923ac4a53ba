//! Core types for output capture

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a captured line came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdout,
    Stderr,
    /// Output of a readiness probe command run against the instance
    Probe,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::Stdout => write!(f, "stdout"),
            StreamType::Stderr => write!(f, "stderr"),
            StreamType::Probe => write!(f, "probe"),
        }
    }
}

/// One line of captured output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedLine {
    pub timestamp: DateTime<Utc>,
    pub stream: StreamType,
    pub line: String,
}

impl std::fmt::Display for CapturedLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.stream, self.line)
    }
}
