// src/pipeline/retry.rs

//! Resubscribe-on-failure for derived streams.
//!
//! The event source is cold and never restarts itself. Retrying means asking
//! a factory for a brand-new subscription (and therefore a new spawn) after
//! the previous one failed. This wrapper sits outside the core, on the
//! subscriber's side.

use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tracing::{info, warn};

use crate::errors::Result;

use super::PipelineError;

type TailItem = std::result::Result<String, PipelineError>;

/// When and how fast to resubscribe.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive failed subscriptions allowed; `None` retries forever.
    /// A subscription that delivered at least one item resets the count.
    pub max_attempts: Option<u32>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Subscribe once; surface the first failure.
    pub fn never() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    /// May another subscription be made after `failures` consecutive failures?
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }

    /// Delay before the retry following the `failures`-th consecutive failure
    /// (1-based): `initial * multiplier^(failures - 1)`, capped at `max`.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

struct RetryState<F, S> {
    subscribe: F,
    current: Option<S>,
    policy: RetryPolicy,
    failures: u32,
    delivered: bool,
    done: bool,
}

impl<F, S> RetryState<F, S> {
    /// Record a failure; returns the delay before retrying, or `None` when
    /// the policy is exhausted.
    fn on_failure(&mut self, err: &PipelineError) -> Option<Duration> {
        self.current = None;
        if self.delivered {
            self.failures = 0;
        }
        self.delivered = false;
        self.failures = self.failures.saturating_add(1);

        if !self.policy.allows_retry(self.failures) {
            warn!(failures = self.failures, error = %err, "giving up; retry policy exhausted");
            return None;
        }

        let delay = self.policy.backoff_for(self.failures);
        warn!(
            attempt = self.failures,
            error = %err,
            backoff_ms = delay.as_millis() as u64,
            "subscription failed; resubscribing"
        );
        Some(delay)
    }
}

/// Wrap a subscription factory so failures trigger a fresh subscription.
///
/// - Items of the current subscription are forwarded as they come.
/// - A failure (a factory error or an `Err` item) is followed by a backoff and a
///   new call to `subscribe`, until the policy is exhausted; then the last
///   failure is yielded and the stream ends.
/// - A subscription that ends cleanly ends the whole stream.
/// - Dropping the returned stream drops the current subscription; for a
///   process-backed tail that kills the child in the background.
pub fn retrying<F, S>(subscribe: F, policy: RetryPolicy) -> BoxStream<'static, TailItem>
where
    F: FnMut() -> Result<S> + Send + 'static,
    S: Stream<Item = TailItem> + Unpin + Send + 'static,
{
    let state = RetryState {
        subscribe,
        current: None,
        policy,
        failures: 0,
        delivered: false,
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.done {
                return None;
            }

            if st.current.is_none() {
                match (st.subscribe)() {
                    Ok(fresh) => st.current = Some(fresh),
                    Err(err) => {
                        let err = PipelineError::from(err);
                        match st.on_failure(&err) {
                            Some(delay) => {
                                tokio::time::sleep(delay).await;
                                continue;
                            }
                            None => {
                                st.done = true;
                                return Some((Err(err), st));
                            }
                        }
                    }
                }
            }

            let Some(current) = st.current.as_mut() else {
                continue;
            };
            let next = current.next().await;

            match next {
                Some(Ok(item)) => {
                    st.delivered = true;
                    return Some((Ok(item), st));
                }
                Some(Err(err)) => match st.on_failure(&err) {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        st.done = true;
                        return Some((Err(err), st));
                    }
                },
                None => {
                    info!("subscription completed; not resubscribing");
                    st.done = true;
                    return None;
                }
            }
        }
    })
    .boxed()
}
