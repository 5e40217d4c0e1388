// src/exec/nice.rs

//! Priority-aware spawning.
//!
//! Before launching, the spawner asks the [`CapabilityCache`] whether the
//! niceness helper exists and, if so, runs `helper command args...` instead of
//! `command args...`. Nothing else about the launch changes.

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::Result;
use crate::probe::CapabilityCache;

use super::launcher::{ProcessHandle, ProcessLauncher, SpawnOptions};

/// Default CPU-priority helper.
pub const NICE_COMMAND: &str = "nice";

/// Default I/O-priority helper arguments (idle class).
pub const DEFAULT_IO_HELPER_ARGS: [&str; 2] = ["-c", "3"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NiceSettings {
    /// When false the helpers are never probed nor prepended.
    pub enabled: bool,
    pub helper: String,
    /// Optional I/O scheduling helper (e.g. `ionice`), prepended in front of
    /// `helper` when available.
    pub io_helper: Option<String>,
    pub io_helper_args: Vec<String>,
}

impl Default for NiceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            helper: NICE_COMMAND.to_string(),
            io_helper: None,
            io_helper_args: DEFAULT_IO_HELPER_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Build the argv actually launched.
///
/// - no helpers: `[command, ...args]`
/// - `helper`: `[helper, command, ...args]`
/// - `io_helper` too: `[io_helper, ...io_args, helper, command, ...args]`
pub fn rewrite_invocation(
    command: &str,
    args: &[String],
    helper: Option<&str>,
    io_helper: Option<(&str, &[String])>,
) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 4);

    if let Some((io, io_args)) = io_helper {
        argv.push(io.to_string());
        argv.extend(io_args.iter().cloned());
    }
    if let Some(helper) = helper {
        argv.push(helper.to_string());
    }
    argv.push(command.to_string());
    argv.extend(args.iter().cloned());

    argv
}

/// Spawns commands at lowered priority when the helper is installed.
pub struct NiceSpawner {
    cache: Arc<CapabilityCache>,
    launcher: Arc<dyn ProcessLauncher>,
    settings: NiceSettings,
}

impl std::fmt::Debug for NiceSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NiceSpawner")
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl NiceSpawner {
    pub fn new(
        cache: Arc<CapabilityCache>,
        launcher: Arc<dyn ProcessLauncher>,
        settings: NiceSettings,
    ) -> Self {
        Self {
            cache,
            launcher,
            settings,
        }
    }

    /// Work out the final argv, probing the helpers through the cache.
    pub async fn plan(&self, command: &str, args: &[String]) -> Vec<String> {
        if !self.settings.enabled {
            return rewrite_invocation(command, args, None, None);
        }

        let helper = self.settings.helper.as_str();
        let helper = self.cache.probe(helper).await.then_some(helper);

        let io_helper = match self.settings.io_helper.as_deref() {
            Some(io) if self.cache.probe(io).await => {
                Some((io, self.settings.io_helper_args.as_slice()))
            }
            _ => None,
        };

        debug!(
            command,
            niced = helper.is_some(),
            io_niced = io_helper.is_some(),
            "resolved priority helpers"
        );

        rewrite_invocation(command, args, helper, io_helper)
    }

    /// Launch `command args...`, at lower priority when possible.
    ///
    /// Only the (cached) probe is awaited; the returned handle is live and the
    /// process runs independently. Launch errors are returned unchanged.
    pub async fn spawn(
        &self,
        command: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> Result<ProcessHandle> {
        let argv = self.plan(command, args).await;
        let (program, rest) = argv
            .split_first()
            .map(|(program, rest)| (program.as_str(), rest))
            .unwrap_or((command, args));

        info!(command, program, "spawning process");
        self.launcher.launch(program, rest, options)
    }
}
