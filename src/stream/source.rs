// src/stream/source.rs

//! Cold, single-subscriber event stream over one spawned process.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::ExitStatus;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::errors::{ProcstreamError, Result};
use crate::exec::ProcessHandle;

use super::ProcessEvent;

/// Events buffered between the driver task and the subscriber. When full, the
/// driver stops reading and the OS pipe applies backpressure to the child.
const EVENT_BUFFER: usize = 64;

/// Bytes read from a pipe per event at most.
const CHUNK_SIZE: usize = 8 * 1024;

/// How long output may still be read after the child has exited.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(250);

type SpawnFuture = Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send>>;

/// Observes one process: nothing is spawned until [`subscribe`] is called,
/// and the events can be consumed exactly once.
///
/// [`subscribe`]: ProcessEventSource::subscribe
pub struct ProcessEventSource {
    pending: Option<SpawnFuture>,
}

impl std::fmt::Debug for ProcessEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEventSource")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

impl ProcessEventSource {
    /// Wrap a spawn that has not happened yet. The future is only polled
    /// after subscription.
    pub fn new<F>(spawn: F) -> Self
    where
        F: Future<Output = Result<ProcessHandle>> + Send + 'static,
    {
        Self {
            pending: Some(Box::pin(spawn)),
        }
    }

    /// Wrap a process that is already running.
    pub fn from_handle(handle: ProcessHandle) -> Self {
        Self::new(async move { Ok(handle) })
    }

    pub fn is_subscribed(&self) -> bool {
        self.pending.is_none()
    }

    /// Start the spawn and return its event stream.
    ///
    /// A second call fails with [`ProcstreamError::AlreadySubscribed`]; the
    /// events of a process are never replayed.
    pub fn subscribe(&mut self) -> Result<ProcessEvents> {
        let spawn = self.pending.take().ok_or(ProcstreamError::AlreadySubscribed)?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let driver = tokio::spawn(drive(spawn, tx, cancel_rx));

        Ok(ProcessEvents {
            rx,
            cancel: Some(cancel_tx),
            driver: Some(driver),
        })
    }
}

/// Live subscription to a [`ProcessEventSource`].
///
/// Yields events in arrival order and ends right after the terminal event.
/// Dropping it early kills the process in the background; call
/// [`unsubscribe`](ProcessEvents::unsubscribe) to wait until the process has
/// been killed and reaped.
#[derive(Debug)]
pub struct ProcessEvents {
    rx: mpsc::Receiver<ProcessEvent>,
    cancel: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl ProcessEvents {
    /// Stop observing: kill the process (if still running), reap it and
    /// release its handle before returning.
    pub async fn unsubscribe(mut self) {
        self.rx.close();
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!(error = %e, "process event driver ended abnormally");
            }
        }
    }
}

impl Stream for ProcessEvents {
    type Item = ProcessEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ProcessEvents {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

/// Outcome of pumping the pipes.
enum Pump {
    /// The child exited; its output has been drained.
    Exited(Result<ExitStatus>),
    /// The subscriber went away.
    Cancelled,
}

/// Background task owning the process for the lifetime of one subscription.
///
/// Exactly one terminal event is sent on every path that reaches the
/// subscriber; when the subscriber is gone the process is killed instead.
async fn drive(
    spawn: SpawnFuture,
    tx: mpsc::Sender<ProcessEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut handle = tokio::select! {
        spawned = spawn => match spawned {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "process failed to spawn");
                let _ = tx.send(ProcessEvent::spawn_error(err)).await;
                return;
            }
        },
        _ = &mut cancel_rx => {
            debug!("unsubscribed before the process was spawned");
            return;
        }
    };

    let id = handle.id();
    let pid = handle.pid();
    debug!(handle_id = %id, ?pid, "observing process");

    let status = match pump_output(&mut handle, &tx, &mut cancel_rx).await {
        Pump::Exited(status) => status,
        Pump::Cancelled => {
            release(handle).await;
            return;
        }
    };

    let event = match status {
        Ok(status) => {
            let event = ProcessEvent::from_status(status);
            if let ProcessEvent::Exit { code, signal } = &event {
                info!(handle_id = %id, ?pid, exit_code = code, ?signal, "process exited");
            }
            event
        }
        Err(err) => {
            error!(handle_id = %id, ?pid, error = %err, "waiting for process failed");
            ProcessEvent::spawn_error(err)
        }
    };

    drop(handle);
    let _ = tx.send(event).await;
}

/// Forward stdout/stderr chunks as they arrive until the child has exited
/// and its pipes are drained.
///
/// The exit is watched alongside the reads. Once it is known, the pipes get
/// [`EXIT_DRAIN_GRACE`] to reach EOF; a descendant still holding them open
/// is not waited for.
async fn pump_output(
    handle: &mut ProcessHandle,
    tx: &mpsc::Sender<ProcessEvent>,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> Pump {
    let id = handle.id();
    let mut stdout = handle.take_stdout();
    let mut stderr = handle.take_stderr();
    let mut out_buf = vec![0u8; CHUNK_SIZE];
    let mut err_buf = vec![0u8; CHUNK_SIZE];
    let mut status: Option<Result<ExitStatus>> = None;
    let mut drain_until: Option<Instant> = None;

    loop {
        if stdout.is_none() && stderr.is_none() {
            if let Some(status) = status.take() {
                return Pump::Exited(status);
            }
        }

        let event = tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf) => match read {
                Ok(0) => {
                    stdout = None;
                    continue;
                }
                Ok(n) => ProcessEvent::stdout(&out_buf[..n]),
                Err(e) => {
                    warn!(handle_id = %id, error = %e, "reading stdout failed; closing pipe");
                    stdout = None;
                    continue;
                }
            },
            read = read_chunk(&mut stderr, &mut err_buf) => match read {
                Ok(0) => {
                    stderr = None;
                    continue;
                }
                Ok(n) => ProcessEvent::stderr(&err_buf[..n]),
                Err(e) => {
                    warn!(handle_id = %id, error = %e, "reading stderr failed; closing pipe");
                    stderr = None;
                    continue;
                }
            },
            waited = handle.wait(), if status.is_none() => {
                status = Some(waited);
                drain_until = Some(Instant::now() + EXIT_DRAIN_GRACE);
                continue;
            }
            _ = sleep_until_some(drain_until) => {
                debug!(handle_id = %id, "pipes still open after exit; a descendant holds them");
                stdout = None;
                stderr = None;
                continue;
            }
            _ = &mut *cancel_rx => return Pump::Cancelled,
        };

        if tx.send(event).await.is_err() {
            return Pump::Cancelled;
        }
    }
}

/// Sleep until `deadline`; never resolves without one.
async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Read from a pipe that may already be closed; a closed pipe never resolves.
async fn read_chunk<R>(pipe: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(pipe) => pipe.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn release(mut handle: ProcessHandle) {
    let id = handle.id();
    let pid = handle.pid();
    info!(handle_id = %id, ?pid, "subscriber went away; killing process");

    if let Err(e) = handle.kill().await {
        debug!(handle_id = %id, ?pid, error = %e, "kill failed (process already gone?)");
    }
    drop(handle);
    debug!(handle_id = %id, "process handle released");
}
