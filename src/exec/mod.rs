// src/exec/mod.rs

//! Process launching.
//!
//! - [`launcher`] provides the `ProcessLauncher` trait, the production
//!   `TokioLauncher` built on `tokio::process::Command`, and the
//!   `ProcessHandle` it returns.
//! - [`nice`] provides `NiceSpawner`, which rewrites the invocation to run
//!   under a niceness helper when the `CapabilityCache` says it exists.

pub mod launcher;
pub mod nice;

pub use launcher::{HandleId, ProcessHandle, ProcessLauncher, SpawnOptions, TokioLauncher};
pub use nice::{rewrite_invocation, NiceSettings, NiceSpawner, NICE_COMMAND};
