// src/probe/resolver.rs

//! Pluggable PATH resolution.
//!
//! The cache talks to a `PathResolver` instead of calling `which` directly, so
//! tests can count lookups, simulate slow resolvers, or inject failures.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tracing::trace;

use crate::errors::{ProcstreamError, Result};

/// Resolves a bare command name to an executable path.
///
/// "Not found" is a normal answer (`Ok(None)`); `Err` is reserved for the
/// lookup itself breaking (unreadable `PATH`, cwd gone, blocking pool gone).
pub trait PathResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PathBuf>>> + Send + 'a>>;
}

/// Production resolver: searches `PATH` with the `which` crate.
///
/// The search touches the filesystem, so it runs on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct WhichResolver;

impl WhichResolver {
    pub fn new() -> Self {
        Self
    }
}

impl PathResolver for WhichResolver {
    fn resolve<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PathBuf>>> + Send + 'a>> {
        let command = command.to_string();

        Box::pin(async move {
            let lookup = command.clone();
            let found = tokio::task::spawn_blocking(move || which::which(lookup))
                .await
                .map_err(anyhow::Error::from)?;

            match found {
                Ok(path) => {
                    trace!(command = %command, path = %path.display(), "which: resolved");
                    Ok(Some(path))
                }
                Err(which::Error::CannotFindBinaryPath) => Ok(None),
                Err(e) => Err(ProcstreamError::Other(anyhow::Error::new(e))),
            }
        })
    }
}
