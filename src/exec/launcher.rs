// src/exec/launcher.rs

//! Process-launch primitive and the handle it hands out.
//!
//! The spawner talks to a `ProcessLauncher` instead of `tokio::process`
//! directly, so tests can record the final argv or simulate launch failures
//! while production uses [`TokioLauncher`].

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::errors::{ProcstreamError, Result};

/// Crate-unique identity of a launched process, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Extra knobs passed through to the OS launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Working directory for the child; inherits ours when `None`.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

/// Live OS process, owned by whoever consumes its output.
///
/// Dropping the handle kills the child if it is still running
/// (`kill_on_drop`) and releases its slot in the launcher's live count.
pub struct ProcessHandle {
    id: HandleId,
    pid: Option<u32>,
    program: String,
    child: Child,
    _live: LiveGuard,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    fn new(child: Child, program: String, live: Arc<LiveCount>) -> Self {
        Self {
            id: HandleId::next(),
            pid: child.id(),
            program,
            child,
            _live: LiveGuard::acquire(live),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// OS pid, captured at launch.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Program actually executed (the helper when the invocation was rewritten).
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the process to exit and reap it.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Kill the process and reap it.
    pub async fn kill(&mut self) -> Result<()> {
        Ok(self.child.kill().await?)
    }
}

/// Handles launched and not yet released, with a wake-up for `wait_idle`.
#[derive(Debug, Default)]
struct LiveCount {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the owning launcher's live count when the handle goes away.
struct LiveGuard(Arc<LiveCount>);

impl LiveGuard {
    fn acquire(live: Arc<LiveCount>) -> Self {
        live.count.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Trait abstracting how an argv becomes a running process.
///
/// Launching is synchronous: either the executable starts and a handle comes
/// back, or the launch error is returned to the caller as is.
pub trait ProcessLauncher: Send + Sync {
    fn launch(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> Result<ProcessHandle>;
}

/// Production launcher backed by `tokio::process::Command`.
///
/// stdout/stderr are piped for the event source, stdin is closed, and the
/// child is killed if its handle is dropped while it is still running.
#[derive(Debug, Clone, Default)]
pub struct TokioLauncher {
    live: Arc<LiveCount>,
}

impl TokioLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles launched here that have not been released yet.
    pub fn live_handles(&self) -> usize {
        self.live.count.load(Ordering::SeqCst)
    }

    /// Resolve once every handle launched here has been released.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.live.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.live_handles() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl ProcessLauncher for TokioLauncher {
    fn launch(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> Result<ProcessHandle> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|source| ProcstreamError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let handle = ProcessHandle::new(child, program.to_string(), Arc::clone(&self.live));
        info!(
            handle_id = %handle.id(),
            pid = ?handle.pid(),
            program,
            ?args,
            "process launched"
        );
        debug!(live = self.live_handles(), "live process handles");

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let launcher = TokioLauncher::new();
        let err = launcher
            .launch("procstream-no-such-binary-91c2", &[], &SpawnOptions::default())
            .expect_err("launch must fail");

        match err {
            ProcstreamError::Spawn { program, source } => {
                assert_eq!(program, "procstream-no-such-binary-91c2");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected Spawn error, got {other:?}"),
        }
        assert_eq!(launcher.live_handles(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn live_count_tracks_handle_lifetime() {
        let launcher = TokioLauncher::new();
        let args = vec!["-c".to_string(), "exit 0".to_string()];

        let mut handle = launcher
            .launch("sh", &args, &SpawnOptions::default())
            .expect("sh should launch");
        assert_eq!(launcher.live_handles(), 1);

        let status = handle.wait().await.expect("wait");
        assert!(status.success());
        drop(handle);

        assert_eq!(launcher.live_handles(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn wait_idle_resolves_when_last_handle_is_released() {
        let launcher = TokioLauncher::new();
        launcher.wait_idle().await;

        let args = vec!["-c".to_string(), "exec sleep 30".to_string()];
        let mut handle = launcher
            .launch("sh", &args, &SpawnOptions::default())
            .expect("sh should launch");

        let waiter = {
            let launcher = launcher.clone();
            tokio::spawn(async move { launcher.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        handle.kill().await.expect("kill");
        drop(handle);

        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("wait_idle should resolve")
            .expect("waiter task");
    }

    #[test]
    fn handle_ids_are_unique() {
        let a = HandleId::next();
        let b = HandleId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
