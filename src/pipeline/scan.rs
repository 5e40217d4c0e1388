// src/pipeline/scan.rs

//! Pure accumulator for derived streams.
//!
//! `TailState::fold` consumes one [`ProcessEvent`] at a time and either keeps
//! going, completes cleanly, or produces the stream's terminal error. Stdout
//! is framed into lines first; completed lines queue up in the state and are
//! drained with [`TailState::next_line`]. It has no Tokio types, channels or
//! processes, so every rule is unit tested here.

use std::collections::VecDeque;

use crate::stream::ProcessEvent;
use crate::types::ExitPolicy;

use super::extract::ErrorExtractor;
use super::lines::LineFramer;
use super::PipelineError;

/// Result of folding one non-failing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folded {
    /// The sequence goes on.
    Continue,
    /// Clean exit; the sequence is complete once queued lines are drained.
    Completed,
}

/// Accumulator for one subscription.
#[derive(Debug, Clone, Default)]
pub struct TailState {
    /// Most recent non-terminal event.
    pub current: Option<ProcessEvent>,
    /// Context of the most recent stdout error line.
    pub last_error: Option<String>,
    framer: LineFramer,
    ready: VecDeque<String>,
    terminated: bool,
}

impl TailState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Has a terminal event been folded already?
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Next complete stdout line, in order.
    pub fn next_line(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    pub fn fold(
        &mut self,
        event: ProcessEvent,
        extractor: &ErrorExtractor,
        policy: ExitPolicy,
    ) -> Result<Folded, PipelineError> {
        if self.terminated {
            return Err(PipelineError::ProtocolViolation(format!(
                "{} event received after the terminal event",
                event.kind()
            )));
        }

        match event {
            ProcessEvent::Stdout { ref data } => {
                for line in self.framer.push(data) {
                    self.accept_line(line, extractor);
                }
                self.current = Some(event);
                Ok(Folded::Continue)
            }
            ProcessEvent::Stderr { .. } => {
                self.current = Some(event);
                Ok(Folded::Continue)
            }
            ProcessEvent::Exit { code, signal } => {
                self.terminate(extractor);
                if policy.is_clean_exit(code, signal.as_deref()) {
                    Ok(Folded::Completed)
                } else {
                    Err(PipelineError::Exited {
                        message: self.last_error.clone().unwrap_or_default(),
                        code,
                        signal,
                    })
                }
            }
            ProcessEvent::SpawnError { cause } => {
                self.terminate(extractor);
                Err(PipelineError::Spawn(cause))
            }
        }
    }

    /// Error raised when the upstream ends without a terminal event. Any
    /// unterminated stdout is still queued as a last line.
    pub fn missing_terminal(&mut self, extractor: &ErrorExtractor) -> PipelineError {
        self.terminate(extractor);
        PipelineError::ProtocolViolation(
            "event stream ended without an exit or spawn-error event".to_string(),
        )
    }

    fn terminate(&mut self, extractor: &ErrorExtractor) {
        self.terminated = true;
        self.current = None;
        if let Some(rest) = self.framer.finish() {
            self.accept_line(rest, extractor);
        }
    }

    fn accept_line(&mut self, line: String, extractor: &ErrorExtractor) {
        // Error lines show up on stdout for the tools we tail. A newer error
        // line replaces the context; ordinary lines keep it.
        if let Some(context) = extractor.extract(&line) {
            self.last_error = Some(context);
        }
        self.ready.push_back(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::errors::ProcstreamError;

    fn fold_all(
        events: Vec<ProcessEvent>,
        policy: ExitPolicy,
    ) -> (TailState, Result<Folded, PipelineError>) {
        let extractor = ErrorExtractor::default();
        let mut state = TailState::new();
        let mut last = Ok(Folded::Continue);
        for event in events {
            last = state.fold(event, &extractor, policy);
            if last.is_err() {
                break;
            }
        }
        (state, last)
    }

    fn drain(state: &mut TailState) -> Vec<String> {
        std::iter::from_fn(|| state.next_line()).collect()
    }

    #[test]
    fn error_context_survives_later_normal_lines() {
        let (_, result) = fold_all(
            vec![
                ProcessEvent::stdout("ERROR: disk full\n"),
                ProcessEvent::stdout("normal line\n"),
                ProcessEvent::exit(1),
            ],
            ExitPolicy::Any,
        );

        match result {
            Err(PipelineError::Exited { message, code, .. }) => {
                assert_eq!(message, "disk full");
                assert_eq!(code, 1);
            }
            other => panic!("expected Exited, got {other:?}"),
        }
    }

    #[test]
    fn error_line_split_across_chunks_is_reassembled() {
        let (mut state, result) = fold_all(
            vec![
                ProcessEvent::stdout("ERROR: di"),
                ProcessEvent::stdout("sk full\n"),
                ProcessEvent::exit(1),
            ],
            ExitPolicy::Any,
        );

        match result {
            Err(PipelineError::Exited { message, .. }) => assert_eq!(message, "disk full"),
            other => panic!("expected Exited, got {other:?}"),
        }
        assert_eq!(drain(&mut state), vec!["ERROR: disk full"]);
    }

    #[test]
    fn one_chunk_yields_every_line_and_last_error_wins() {
        let (mut state, _) = fold_all(
            vec![ProcessEvent::stdout("ERROR: first\nsomething\nERROR: second\ntrailing\n")],
            ExitPolicy::Any,
        );

        assert_eq!(state.last_error.as_deref(), Some("second"));
        assert_eq!(
            drain(&mut state),
            vec!["ERROR: first", "something", "ERROR: second", "trailing"]
        );
    }

    #[test]
    fn unterminated_error_line_counts_at_exit() {
        let (mut state, result) = fold_all(
            vec![ProcessEvent::stdout("ok\nERROR: no newline"), ProcessEvent::exit(2)],
            ExitPolicy::Any,
        );

        assert!(matches!(
            result,
            Err(PipelineError::Exited { ref message, code: 2, .. }) if message == "no newline"
        ));
        assert_eq!(drain(&mut state), vec!["ok", "ERROR: no newline"]);
    }

    #[test]
    fn exit_without_error_line_has_empty_message() {
        let (_, result) = fold_all(
            vec![ProcessEvent::stdout("normal line\n"), ProcessEvent::exit(1)],
            ExitPolicy::Any,
        );

        match result {
            Err(err @ PipelineError::Exited { .. }) => assert_eq!(err.to_string(), ""),
            other => panic!("expected Exited, got {other:?}"),
        }
    }

    #[test]
    fn newer_error_line_replaces_context() {
        let (state, _) = fold_all(
            vec![
                ProcessEvent::stdout("ERROR: first\n"),
                ProcessEvent::stdout("ERROR: second\n"),
            ],
            ExitPolicy::Any,
        );
        assert_eq!(state.last_error.as_deref(), Some("second"));
    }

    #[test]
    fn stderr_does_not_touch_context() {
        let (mut state, _) = fold_all(
            vec![
                ProcessEvent::stdout("ERROR: from stdout\n"),
                ProcessEvent::stderr("ERROR: from stderr\n"),
            ],
            ExitPolicy::Any,
        );
        assert_eq!(state.last_error.as_deref(), Some("from stdout"));
        assert!(matches!(state.current, Some(ProcessEvent::Stderr { .. })));
        assert_eq!(drain(&mut state), vec!["ERROR: from stdout"]);
    }

    #[test]
    fn clean_exit_completes_under_nonzero_policy() {
        let (state, result) = fold_all(
            vec![ProcessEvent::stdout("ok\n"), ProcessEvent::exit(0)],
            ExitPolicy::NonZero,
        );
        assert_eq!(result.unwrap(), Folded::Completed);
        assert!(state.is_terminated());
    }

    #[test]
    fn zero_exit_still_fails_under_any_policy() {
        let (_, result) = fold_all(vec![ProcessEvent::exit(0)], ExitPolicy::Any);
        assert!(matches!(result, Err(PipelineError::Exited { code: 0, .. })));
    }

    #[test]
    fn spawn_error_becomes_spawn_failure() {
        let (_, result) = fold_all(
            vec![ProcessEvent::spawn_error(ProcstreamError::AlreadySubscribed)],
            ExitPolicy::Any,
        );
        assert!(matches!(result, Err(PipelineError::Spawn(_))));
    }

    #[test]
    fn event_after_terminal_is_protocol_violation() {
        let extractor = ErrorExtractor::default();
        let mut state = TailState::new();

        let _ = state.fold(ProcessEvent::exit(0), &extractor, ExitPolicy::NonZero);
        let after = state.fold(ProcessEvent::stdout("late\n"), &extractor, ExitPolicy::NonZero);

        match after {
            Err(PipelineError::ProtocolViolation(msg)) => assert!(msg.contains("stdout")),
            other => panic!("expected ProtocolViolation, got {other:?}"),
        }
    }
}
