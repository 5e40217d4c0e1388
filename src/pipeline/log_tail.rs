// src/pipeline/log_tail.rs

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{ready, Stream, StreamExt};
use tracing::{debug, trace};

use crate::stream::{ProcessEvent, ProcessEvents};
use crate::types::ExitPolicy;

use super::extract::ErrorExtractor;
use super::scan::{Folded, TailState};
use super::PipelineError;

/// Configuration for a [`LogTail`].
#[derive(Debug, Clone, Default)]
pub struct LogTailBuilder {
    skip: usize,
    extractor: ErrorExtractor,
    policy: ExitPolicy,
}

impl LogTailBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the first `count` stdout lines (e.g. a replayed history entry).
    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    pub fn extractor(mut self, extractor: ErrorExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build<S>(&self, upstream: S) -> LogTail<S>
    where
        S: Stream<Item = ProcessEvent> + Unpin,
    {
        LogTail {
            upstream,
            state: TailState::new(),
            extractor: self.extractor.clone(),
            policy: self.policy,
            skip_remaining: self.skip,
            outcome: None,
            finished: false,
        }
    }
}

/// Live tail of a process's stdout.
///
/// Yields one item per stdout line, terminator stripped, after skipping the
/// configured number of leading lines. stderr is consumed silently. The
/// stream ends either cleanly (allowed exit) or with exactly one `Err`
/// carrying the last error line seen on stdout; lines completed by the final
/// chunk are always yielded before that.
#[derive(Debug)]
pub struct LogTail<S> {
    upstream: S,
    state: TailState,
    extractor: ErrorExtractor,
    policy: ExitPolicy,
    skip_remaining: usize,
    /// Terminal outcome, held back until queued lines are out.
    outcome: Option<Result<(), PipelineError>>,
    finished: bool,
}

impl<S> LogTail<S> {
    /// Last error context seen so far.
    pub fn last_error(&self) -> Option<&str> {
        self.state.last_error.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl LogTail<ProcessEvents> {
    /// Stop tailing and tear down the underlying process.
    pub async fn unsubscribe(self) {
        debug!("log tail unsubscribed");
        self.upstream.unsubscribe().await;
    }
}

impl<S> Stream for LogTail<S>
where
    S: Stream<Item = ProcessEvent> + Unpin,
{
    type Item = Result<String, PipelineError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            if let Some(line) = this.state.next_line() {
                if this.skip_remaining > 0 {
                    this.skip_remaining -= 1;
                    trace!(remaining = this.skip_remaining, "skipping leading line");
                    continue;
                }
                return Poll::Ready(Some(Ok(line)));
            }

            if let Some(outcome) = this.outcome.take() {
                this.finished = true;
                return Poll::Ready(outcome.err().map(Err));
            }

            let Some(event) = ready!(this.upstream.poll_next_unpin(cx)) else {
                this.outcome = Some(Err(this.state.missing_terminal(&this.extractor)));
                continue;
            };
            trace!(kind = event.kind(), "log tail received event");

            match this.state.fold(event, &this.extractor, this.policy) {
                Ok(Folded::Continue) => {}
                Ok(Folded::Completed) => this.outcome = Some(Ok(())),
                Err(err) => this.outcome = Some(Err(err)),
            }
        }
    }
}
