//! Progress module
//!
//! Upload progress is pushed to a [`ProgressReporter`] once per stream chunk.
//! Reporters are invoked on the transfer path, so they must return quickly;
//! [`IndicatifProgressReporter`] draws a bar per file on a terminal, and
//! [`TracingProgressReporter`] hands updates to a background task that logs
//! them.

mod bars;
mod reporter;

pub use bars::IndicatifProgressReporter;
pub use reporter::{TracingProgressReporter, DEFAULT_RENDER_INTERVAL};

/// Bytes transferred so far for one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    pub fn new(bytes_sent: u64, total_bytes: u64) -> Self {
        Self {
            bytes_sent,
            total_bytes,
        }
    }

    /// Completed fraction in `0.0..=1.0`; an empty file counts as complete
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_sent as f64 / self.total_bytes as f64).min(1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_sent >= self.total_bytes
    }
}

/// Observer for upload progress
///
/// Called synchronously from the body stream on every chunk. Implementations
/// must not block or perform slow I/O inline.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, file_name: &str, progress: TransferProgress);
}

/// Reporter that discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressReporter;

impl ProgressReporter for NoopProgressReporter {
    fn on_progress(&self, _file_name: &str, _progress: TransferProgress) {}
}
