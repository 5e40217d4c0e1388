// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::ExitPolicy;

/// Command-line arguments for `procstream`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procstream",
    version,
    about = "Tail a long-running process at low priority and surface its errors.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Procstream.toml` in the current working directory. When the
    /// file is missing and a command is given after `--`, built-in defaults
    /// are used.
    #[arg(long, value_name = "PATH", default_value = "Procstream.toml")]
    pub config: String,

    /// Subscribe once; do not resubscribe after a failure.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCSTREAM_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve config and helpers, print the final invocation, don't spawn.
    #[arg(long)]
    pub dry_run: bool,

    /// Number of leading stdout lines to drop (overrides `[tail].skip`).
    #[arg(long, value_name = "N")]
    pub skip: Option<usize>,

    /// Which exits count as failures: `any` or `nonzero` (overrides
    /// `[tail].exit_policy`).
    #[arg(long, value_name = "POLICY")]
    pub exit_policy: Option<ExitPolicy>,

    /// Spawn the command directly, without the priority helper.
    #[arg(long)]
    pub no_nice: bool,

    /// Command to tail (overrides `[tail].command` and `[tail].args`).
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
