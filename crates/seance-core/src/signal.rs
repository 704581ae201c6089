//! Signals fed into the status reconciler and the outcome of applying them.
//!
//! Every source of truth (status poll, timer-sync poll, push channel, local
//! actions, local clock) is reduced to a [`Signal`] and applied through
//! [`CallSession::apply_signal`](crate::CallSession::apply_signal), so the
//! precedence rules live in exactly one place.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CallStatus, Money};

/// Where a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Snapshot returned by the session locator.
    InitialFetch,
    /// Scheduled `/status/{id}` poll.
    StatusPoll,
    /// Scheduled `/sync-timer/{id}` poll.
    TimerPoll,
    /// Push-channel event.
    Push,
    /// Local user action or local clock.
    Local,
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InitialFetch => "initial_fetch",
            Self::StatusPoll => "status_poll",
            Self::TimerPoll => "timer_poll",
            Self::Push => "push",
            Self::Local => "local",
        };
        f.write_str(name)
    }
}

/// A candidate update from one source.
///
/// All fields are optional; absent fields leave the session untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub source: SignalSource,
    pub status: Option<CallStatus>,
    pub elapsed_seconds: Option<u64>,
    /// Server-computed earnings. Authoritative over the local derivation.
    pub credits: Option<Money>,
    /// Authoritative countdown value (only used while pending).
    pub time_remaining: Option<u32>,
}

impl Signal {
    pub fn new(source: SignalSource) -> Self {
        Self {
            source,
            status: None,
            elapsed_seconds: None,
            credits: None,
            time_remaining: None,
        }
    }

    /// Shorthand for a status-only signal.
    pub fn status(source: SignalSource, status: CallStatus) -> Self {
        Self::new(source).with_status(status)
    }

    #[must_use]
    pub fn with_status(mut self, status: CallStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_status_opt(mut self, status: Option<CallStatus>) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_elapsed(mut self, elapsed_seconds: u64) -> Self {
        self.elapsed_seconds = Some(elapsed_seconds);
        self
    }

    #[must_use]
    pub fn with_elapsed_opt(mut self, elapsed_seconds: Option<u64>) -> Self {
        self.elapsed_seconds = elapsed_seconds;
        self
    }

    #[must_use]
    pub fn with_credits_opt(mut self, credits: Option<Money>) -> Self {
        self.credits = credits;
        self
    }

    #[must_use]
    pub fn with_time_remaining_opt(mut self, time_remaining: Option<u32>) -> Self {
        self.time_remaining = time_remaining;
        self
    }

    /// Returns true if the signal carries nothing the reducer could use.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.elapsed_seconds.is_none()
            && self.credits.is_none()
            && self.time_remaining.is_none()
    }
}

/// What happened to the status part of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Signal had no status, or the same status as the session.
    Unchanged,
    /// Candidate was behind the current status and was dropped.
    Discarded { current: CallStatus, candidate: CallStatus },
    /// Status moved forward.
    Advanced { from: CallStatus, to: CallStatus },
}

/// Result of [`CallSession::apply_signal`](crate::CallSession::apply_signal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalOutcome {
    pub status: StatusChange,
    pub elapsed_applied: bool,
    pub earnings_changed: bool,
    /// The session was already terminal; nothing was applied.
    pub ignored: bool,
}

impl SignalOutcome {
    pub fn ignored() -> Self {
        Self {
            status: StatusChange::Unchanged,
            elapsed_applied: false,
            earnings_changed: false,
            ignored: true,
        }
    }

    /// The terminal status this signal moved the session into, if any.
    #[must_use]
    pub fn entered_terminal(&self) -> Option<CallStatus> {
        match self.status {
            StatusChange::Advanced { to, .. } if to.is_terminal() => Some(to),
            _ => None,
        }
    }

    /// The `(from, to)` pair if the status advanced.
    #[must_use]
    pub fn advanced(&self) -> Option<(CallStatus, CallStatus)> {
        match self.status {
            StatusChange::Advanced { from, to } => Some((from, to)),
            _ => None,
        }
    }

    /// Returns true if anything observable changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.advanced().is_some() || self.elapsed_applied || self.earnings_changed
    }
}
