// src/stream/mod.rs

//! Structured process lifecycle events.
//!
//! A spawned process is observed as a finite, ordered stream of
//! [`ProcessEvent`]s ending in exactly one terminal event. The stream itself
//! lives in [`source`].

use std::process::ExitStatus;
use std::sync::Arc;

use crate::errors::ProcstreamError;

pub mod source;

pub use source::{ProcessEventSource, ProcessEvents};

/// One thing that happened to an observed process.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// A chunk of standard output, as delivered by the OS.
    Stdout { data: Vec<u8> },
    /// A chunk of standard error, as delivered by the OS.
    Stderr { data: Vec<u8> },
    /// The process exited. `code` is -1 when it was killed by a signal.
    Exit { code: i32, signal: Option<String> },
    /// The process could not be started, or could not be waited on.
    SpawnError { cause: Arc<ProcstreamError> },
}

impl ProcessEvent {
    pub fn stdout(data: impl Into<Vec<u8>>) -> Self {
        ProcessEvent::Stdout { data: data.into() }
    }

    pub fn stderr(data: impl Into<Vec<u8>>) -> Self {
        ProcessEvent::Stderr { data: data.into() }
    }

    pub fn exit(code: i32) -> Self {
        ProcessEvent::Exit { code, signal: None }
    }

    pub fn spawn_error(cause: ProcstreamError) -> Self {
        ProcessEvent::SpawnError {
            cause: Arc::new(cause),
        }
    }

    /// Translate an OS exit status.
    pub fn from_status(status: ExitStatus) -> Self {
        ProcessEvent::Exit {
            code: status.code().unwrap_or(-1),
            signal: signal_name(&status),
        }
    }

    /// Exit and spawn errors close the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessEvent::Exit { .. } | ProcessEvent::SpawnError { .. })
    }

    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessEvent::Stdout { .. } => "stdout",
            ProcessEvent::Stderr { .. } => "stderr",
            ProcessEvent::Exit { .. } => "exit",
            ProcessEvent::SpawnError { .. } => "spawn-error",
        }
    }
}

#[cfg(unix)]
fn signal_name(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    let signo = status.signal()?;
    Some(match nix::sys::signal::Signal::try_from(signo) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("SIG{signo}"),
    })
}

#[cfg(not(unix))]
fn signal_name(_status: &ExitStatus) -> Option<String> {
    None
}
