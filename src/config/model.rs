// src/config/model.rs

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::exec::{NiceSettings, SpawnOptions};
use crate::pipeline::{ErrorExtractor, LogTailBuilder, RetryPolicy, DEFAULT_ERROR_PATTERN};
use crate::probe::CacheSettings;
use crate::types::ExitPolicy;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [nice]
/// helper = "nice"
///
/// [tail]
/// command = "adb"
/// args = ["logcat", "-v", "long", "-T", "1"]
/// skip = 1
///
/// [retry]
/// max_attempts = 5
/// ```
///
/// Only `[tail].command` is mandatory.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub nice: NiceSection,

    pub tail: TailSection,

    #[serde(default)]
    pub retry: RetrySection,
}

/// `[nice]` section: priority helpers and the probe cache.
#[derive(Debug, Clone, Deserialize)]
pub struct NiceSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_helper")]
    pub helper: String,

    /// e.g. `"ionice"`; unset by default.
    #[serde(default)]
    pub io_helper: Option<String>,

    #[serde(default = "default_io_helper_args")]
    pub io_helper_args: Vec<String>,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for NiceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            helper: default_helper(),
            io_helper: None,
            io_helper_args: default_io_helper_args(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// `[tail]` section: what to run and how to read it.
#[derive(Debug, Clone, Deserialize)]
pub struct TailSection {
    /// Executable name or path, passed through untouched.
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the process.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Leading stdout items to drop.
    #[serde(default)]
    pub skip: usize,

    /// Regex recognising error lines on stdout; group 1 is the context.
    #[serde(default = "default_error_pattern")]
    pub error_pattern: String,

    #[serde(default)]
    pub exit_policy: ExitPolicy,
}

impl TailSection {
    pub fn for_command(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            skip: 0,
            error_pattern: default_error_pattern(),
            exit_policy: ExitPolicy::default(),
        }
    }
}

/// `[retry]` section: resubscription after failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive failures tolerated; unset retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: None,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_helper() -> String {
    crate::exec::NICE_COMMAND.to_string()
}

fn default_io_helper_args() -> Vec<String> {
    NiceSettings::default().io_helper_args
}

fn default_cache_ttl_secs() -> u64 {
    crate::probe::cache::DEFAULT_TTL.as_secs()
}

fn default_cache_capacity() -> usize {
    crate::probe::cache::DEFAULT_CAPACITY
}

fn default_error_pattern() -> String {
    DEFAULT_ERROR_PATTERN.to_string()
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Validated configuration. Build it through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub nice: NiceSection,
    pub tail: TailSection,
    pub retry: RetrySection,
    error_regex: Regex,
}

impl ConfigFile {
    /// Assemble from parts that have already been validated.
    pub(crate) fn new_unchecked(
        nice: NiceSection,
        tail: TailSection,
        retry: RetrySection,
        error_regex: Regex,
    ) -> Self {
        Self {
            nice,
            tail,
            retry,
            error_regex,
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.nice.cache_ttl_secs),
            capacity: NonZeroUsize::new(self.nice.cache_capacity)
                .unwrap_or(CacheSettings::default().capacity),
        }
    }

    pub fn nice_settings(&self) -> NiceSettings {
        NiceSettings {
            enabled: self.nice.enabled,
            helper: self.nice.helper.clone(),
            io_helper: self.nice.io_helper.clone(),
            io_helper_args: self.nice.io_helper_args.clone(),
        }
    }

    pub fn spawn_options(&self) -> SpawnOptions {
        SpawnOptions {
            cwd: self.tail.cwd.clone(),
            env: Vec::new(),
        }
    }

    pub fn error_extractor(&self) -> ErrorExtractor {
        ErrorExtractor::regex(self.error_regex.clone())
    }

    pub fn log_tail_builder(&self) -> LogTailBuilder {
        LogTailBuilder::new()
            .skip(self.tail.skip)
            .extractor(self.error_extractor())
            .exit_policy(self.tail.exit_policy)
    }

    /// `RetryPolicy::never()` when retries are disabled.
    pub fn retry_policy(&self) -> RetryPolicy {
        if !self.retry.enabled {
            return RetryPolicy::never();
        }
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            multiplier: self.retry.multiplier,
        }
    }
}
