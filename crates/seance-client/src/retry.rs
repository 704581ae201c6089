//! Fixed-backoff retry policy for audio connection attempts.
//!
//! The policy holds at most one pending retry. Scheduling while a retry is
//! pending is refused, so a burst of failures cannot fan out into several
//! concurrent retry timers.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Outcome of [`RetryPolicy::schedule`].
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// Caller should fire a retry after `delay`, unless `token` is cancelled.
    Scheduled {
        attempt: u32,
        delay: Duration,
        token: CancellationToken,
    },
    /// A retry is already waiting; nothing to do.
    AlreadyPending,
    /// The attempt cap was reached.
    Exhausted { attempts: u32 },
}

#[derive(Debug)]
pub struct RetryPolicy {
    backoff: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
    pending: Option<CancellationToken>,
}

impl RetryPolicy {
    /// `max_attempts: None` retries until cancelled.
    pub fn new(backoff: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            backoff,
            max_attempts,
            attempts: 0,
            pending: None,
        }
    }

    /// Reserves the single retry slot.
    ///
    /// The returned token is a child of `parent`, so disposing the parent
    /// cancels the pending retry.
    pub fn schedule(&mut self, parent: &CancellationToken) -> RetryDecision {
        if self.is_pending() {
            return RetryDecision::AlreadyPending;
        }
        if let Some(max) = self.max_attempts {
            if self.attempts >= max {
                return RetryDecision::Exhausted {
                    attempts: self.attempts,
                };
            }
        }
        self.attempts = self.attempts.saturating_add(1);
        let token = parent.child_token();
        self.pending = Some(token.clone());
        RetryDecision::Scheduled {
            attempt: self.attempts,
            delay: self.backoff,
            token,
        }
    }

    /// Releases the slot when the retry timer fires.
    pub fn fired(&mut self) {
        self.pending = None;
    }

    /// Cancels any pending retry and clears the attempt counter.
    pub fn reset(&mut self) {
        self.cancel();
        self.attempts = 0;
    }

    /// Cancels the pending retry, if any. Attempts are kept.
    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
