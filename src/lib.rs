// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod probe;
pub mod stream;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::exec::{NiceSpawner, ProcessLauncher, SpawnOptions, TokioLauncher};
use crate::pipeline::{retrying, LogTail, LogTailBuilder, RetryPolicy};
use crate::probe::{CapabilityCache, WhichResolver};
use crate::stream::{ProcessEventSource, ProcessEvents};

/// How long Ctrl-C waits for the tailed process to be killed and reaped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Spawn `command args...` through `spawner` and return a live log tail of it.
///
/// The process is started by the subscription itself, so each call starts a
/// new process.
pub fn subscribe_tail(
    spawner: Arc<NiceSpawner>,
    command: String,
    args: Vec<String>,
    options: SpawnOptions,
    builder: &LogTailBuilder,
) -> errors::Result<LogTail<ProcessEvents>> {
    let mut source = ProcessEventSource::new(async move {
        spawner.spawn(&command, &args, &options).await
    });
    let events = source.subscribe()?;
    Ok(builder.build(events))
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (plus CLI overrides)
/// - capability cache / priority-aware spawner
/// - the log tail with resubscription
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;

    let cache = Arc::new(CapabilityCache::new(
        Arc::new(WhichResolver::new()),
        cfg.cache_settings(),
    ));
    let launcher = TokioLauncher::new();
    let spawner = Arc::new(NiceSpawner::new(
        cache,
        Arc::new(launcher.clone()) as Arc<dyn ProcessLauncher>,
        cfg.nice_settings(),
    ));

    if args.dry_run {
        print_dry_run(&cfg, &spawner).await;
        return Ok(());
    }

    let policy = if args.once {
        RetryPolicy::never()
    } else {
        cfg.retry_policy()
    };

    let builder = cfg.log_tail_builder();
    let command = cfg.tail.command.clone();
    let command_args = cfg.tail.args.clone();
    let options = cfg.spawn_options();

    info!(command = %command, args = ?command_args, "tailing process");

    let mut lines = retrying(
        move || {
            subscribe_tail(
                Arc::clone(&spawner),
                command.clone(),
                command_args.clone(),
                options.clone(),
                &builder,
            )
        },
        policy,
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    error!(error = %e, "failed to listen for Ctrl+C");
                }
                info!("interrupted; stopping");
                // Dropping the stream cancels the live subscription; wait for
                // its process to be reaped.
                drop(lines);
                if tokio::time::timeout(SHUTDOWN_GRACE, launcher.wait_idle()).await.is_err() {
                    warn!(
                        live = launcher.live_handles(),
                        "process still running after shutdown grace period"
                    );
                }
                return Ok(());
            }
            item = lines.next() => match item {
                Some(Ok(line)) => println!("{line}"),
                Some(Err(err)) => {
                    error!(error = %err, "process stream failed");
                    return Err(err).context(format!("tailing '{}' failed", cfg.tail.command));
                }
                None => {
                    info!("process stream completed");
                    return Ok(());
                }
            },
        }
    }
}

/// Load the config file, or fall back to defaults for a command given on the
/// command line, then apply CLI overrides.
fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let path = PathBuf::from(&args.config);

    let mut cfg = if path.exists() {
        load_and_validate(&path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?
    } else if let Some((command, rest)) = args.command.split_first() {
        debug!(path = %path.display(), "config file not found; using defaults");
        ConfigFile::for_command(command.clone(), rest.to_vec())?
    } else {
        bail!(
            "config file '{}' not found and no command given after `--`",
            path.display()
        );
    };

    if let Some((command, rest)) = args.command.split_first() {
        cfg.tail.command = command.clone();
        cfg.tail.args = rest.to_vec();
    }
    if let Some(skip) = args.skip {
        cfg.tail.skip = skip;
    }
    if let Some(policy) = args.exit_policy {
        cfg.tail.exit_policy = policy;
    }
    if args.no_nice {
        cfg.nice.enabled = false;
    }

    Ok(cfg)
}

/// Dry-run output: resolved invocation and stream settings.
async fn print_dry_run(cfg: &ConfigFile, spawner: &NiceSpawner) {
    let argv = spawner.plan(&cfg.tail.command, &cfg.tail.args).await;

    println!("procstream dry-run");
    println!("  invocation: {}", argv.join(" "));
    if let Some(cwd) = &cfg.tail.cwd {
        println!("  cwd: {}", cwd.display());
    }
    println!("  skip: {}", cfg.tail.skip);
    println!("  error_pattern: {}", cfg.tail.error_pattern);
    println!("  exit_policy: {:?}", cfg.tail.exit_policy);

    let retry = cfg.retry_policy();
    match retry.max_attempts {
        Some(max) => println!("  retry: up to {max} consecutive failures"),
        None => println!("  retry: unbounded"),
    }

    debug!("dry-run complete (no execution)");
}
