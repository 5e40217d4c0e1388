//! Test doubles for the process seams: PATH resolution, launching and the
//! event stream itself.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{self, Stream};
use procstream::errors::{ProcstreamError, Result};
use procstream::exec::{ProcessHandle, ProcessLauncher, SpawnOptions, TokioLauncher};
use procstream::probe::PathResolver;
use procstream::stream::ProcessEvent;

/// Resolver that knows a fixed set of commands and counts lookups.
#[derive(Debug, Default)]
pub struct FakeResolver {
    installed: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn with(installed: &[&str]) -> Self {
        Self {
            installed: installed.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PathResolver for FakeResolver {
    fn resolve<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PathBuf>>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .installed
                .contains(command)
                .then(|| PathBuf::from(format!("/usr/bin/{command}"))))
        })
    }
}

/// What a [`RecordingLauncher`] does after recording the argv.
#[derive(Debug, Clone)]
enum LaunchMode {
    /// Fail every launch as if the program did not exist.
    Fail,
    /// Launch `program args...` for real.
    Passthrough(TokioLauncher),
    /// Launch a fixed `sh -c <script>` whatever was asked for.
    Script(TokioLauncher, String),
}

/// Launcher that records every argv it is asked to start.
#[derive(Debug, Clone)]
pub struct RecordingLauncher {
    mode: LaunchMode,
    launches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingLauncher {
    pub fn failing() -> Self {
        Self::with_mode(LaunchMode::Fail)
    }

    pub fn passthrough() -> Self {
        Self::with_mode(LaunchMode::Passthrough(TokioLauncher::new()))
    }

    /// Ignore the requested argv and run `sh -c script` instead.
    pub fn script(script: &str) -> Self {
        Self::with_mode(LaunchMode::Script(TokioLauncher::new(), script.to_string()))
    }

    fn with_mode(mode: LaunchMode) -> Self {
        Self {
            mode,
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every argv launched so far, program first.
    pub fn launches(&self) -> Vec<Vec<String>> {
        self.launches.lock().expect("launch log poisoned").clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().expect("launch log poisoned").len()
    }

    /// Handles still alive in the inner launcher (0 for a failing launcher).
    pub fn live_handles(&self) -> usize {
        match &self.mode {
            LaunchMode::Fail => 0,
            LaunchMode::Passthrough(inner) | LaunchMode::Script(inner, _) => inner.live_handles(),
        }
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> Result<ProcessHandle> {
        let mut argv = vec![program.to_string()];
        argv.extend(args.iter().cloned());
        self.launches.lock().expect("launch log poisoned").push(argv);

        match &self.mode {
            LaunchMode::Fail => Err(ProcstreamError::Spawn {
                program: program.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
            }),
            LaunchMode::Passthrough(inner) => inner.launch(program, args, options),
            LaunchMode::Script(inner, script) => {
                inner.launch("sh", &["-c".to_string(), script.clone()], options)
            }
        }
    }
}

/// Scripted upstream for derived streams.
pub fn scripted(events: Vec<ProcessEvent>) -> impl Stream<Item = ProcessEvent> + Unpin {
    stream::iter(events)
}

/// Stdout lines followed by an exit with `code`.
pub fn lines_then_exit(lines: &[&str], code: i32) -> Vec<ProcessEvent> {
    let mut events: Vec<ProcessEvent> = lines
        .iter()
        .map(|line| ProcessEvent::stdout(format!("{line}\n")))
        .collect();
    events.push(ProcessEvent::exit(code));
    events
}
