//! Combined output capture for one supervised instance

use crate::types::{CapturedLine, StreamType};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lines kept per instance when no explicit limit is given
pub const DEFAULT_MAX_LINES: usize = 10_000;

/// Shared, bounded buffer holding an instance's stdout, stderr and probe
/// output in arrival order.
///
/// Clones share the same buffer. Writers are the stream-copy tasks of the
/// owning process and the control probe of the same instance. When the limit
/// is reached the oldest lines are discarded.
#[derive(Debug, Clone)]
pub struct OutputCapture {
    inner: Arc<Mutex<CaptureBuffer>>,
}

#[derive(Debug)]
struct CaptureBuffer {
    lines: VecDeque<CapturedLine>,
    max_lines: usize,
    dropped: u64,
}

impl Default for OutputCapture {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl OutputCapture {
    pub fn new(max_lines: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureBuffer {
                lines: VecDeque::new(),
                max_lines: max_lines.max(1),
                dropped: 0,
            })),
        }
    }

    /// Append one line
    pub fn push_line(&self, stream: StreamType, line: impl Into<String>) {
        let mut buffer = self.inner.lock();
        if buffer.lines.len() == buffer.max_lines {
            buffer.lines.pop_front();
            buffer.dropped += 1;
        }
        buffer.lines.push_back(CapturedLine {
            timestamp: Utc::now(),
            stream,
            line: line.into(),
        });
    }

    /// Append a block of output (e.g. a probe command's stdout), line by line
    pub fn append(&self, stream: StreamType, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines() {
            self.push_line(stream, line);
        }
    }

    /// Copy `stream` into the buffer line by line until EOF or cancellation.
    ///
    /// Returns the handle of the copy task so the owner can join it during
    /// teardown.
    pub fn collect_from_stream(
        &self,
        instance: &str,
        stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
        stream_type: StreamType,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let capture = self.clone();
        let instance = instance.to_string();

        tokio::spawn(async move {
            debug!(instance = %instance, stream = %stream_type, "output copy started");
            let mut lines = BufReader::new(stream).lines();
            let mut line_num = 0u64;

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!(instance = %instance, "output copy cancelled");
                        break;
                    }
                    result = lines.next_line() => {
                        match result {
                            Ok(Some(line)) => {
                                line_num += 1;
                                capture.push_line(stream_type, line);
                            }
                            Ok(None) => break,
                            Err(e) => {
                                warn!(
                                    instance = %instance,
                                    stream = %stream_type,
                                    error = %e,
                                    "Error reading process output"
                                );
                                break;
                            }
                        }
                    }
                }
            }

            debug!(instance = %instance, stream = %stream_type, lines = line_num, "output copy finished");
        })
    }

    /// Everything captured so far, one line per entry with its stream tag
    pub fn contents(&self) -> String {
        let buffer = self.inner.lock();
        let mut out = String::new();
        for line in &buffer.lines {
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out
    }

    /// The last `n` captured lines, oldest first
    pub fn tail(&self, n: usize) -> Vec<CapturedLine> {
        let buffer = self.inner.lock();
        let skip = buffer.lines.len().saturating_sub(n);
        buffer.lines.iter().skip(skip).cloned().collect()
    }

    /// Captured lines from a single stream
    pub fn lines_from(&self, stream: StreamType) -> Vec<String> {
        self.inner
            .lock()
            .lines
            .iter()
            .filter(|l| l.stream == stream)
            .map(|l| l.line.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lines.is_empty()
    }

    /// Number of lines discarded because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}
