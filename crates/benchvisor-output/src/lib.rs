//! # Benchvisor Output
//!
//! Capture of subprocess output for supervised instances.
//!
//! This crate provides:
//! - A bounded, shareable buffer combining stdout, stderr and probe output
//! - Stream-copy tasks feeding the buffer until EOF or cancellation

pub mod capture;
pub mod types;

// Re-export main types
pub use capture::{OutputCapture, DEFAULT_MAX_LINES};
pub use types::{CapturedLine, StreamType};
