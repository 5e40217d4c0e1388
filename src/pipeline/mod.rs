// src/pipeline/mod.rs

//! Derived streams built on top of [`ProcessEvents`](crate::stream::ProcessEvents).
//!
//! - [`extract`]: pluggable error-line recognition (`ErrorExtractor`).
//! - [`lines`]: reassembles stdout chunks into lines (`LineFramer`).
//! - [`scan`]: the pure accumulator (`TailState`) that folds raw events,
//!   remembers the last error line and translates terminal events.
//! - [`log_tail`]: the `LogTail` stream (scan, one item per line, skip-first-N).
//! - [`retry`]: subscriber-side resubscription with backoff.

use std::sync::Arc;

use thiserror::Error;

use crate::errors::ProcstreamError;

pub mod extract;
pub mod lines;
pub mod log_tail;
pub mod retry;
pub mod scan;

pub use extract::{ErrorExtractor, DEFAULT_ERROR_MARKER, DEFAULT_ERROR_PATTERN};
pub use lines::{strip_line_terminator, LineFramer};
pub use log_tail::{LogTail, LogTailBuilder};
pub use retry::{retrying, RetryPolicy};
pub use scan::{Folded, TailState};
pub use crate::types::ExitPolicy;

/// Terminal failure of a derived stream.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// The process exited when it should not have. The message is the last
    /// error line seen on stdout, or empty when there was none.
    #[error("{message}")]
    Exited {
        message: String,
        code: i32,
        signal: Option<String>,
    },

    /// The process could not be started (or observed).
    #[error("process failed to start: {0}")]
    Spawn(Arc<ProcstreamError>),

    /// The upstream event sequence broke its contract.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl From<ProcstreamError> for PipelineError {
    fn from(err: ProcstreamError) -> Self {
        PipelineError::Spawn(Arc::new(err))
    }
}
