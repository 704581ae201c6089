//! Session actor commands, errors, and events.
//!
//! - `SessionCommand`: messages processed by the actor, from the handle and
//!   from the actor's own background tasks
//! - `SessionError`: errors returned through the handle
//! - `SessionEvent`: broadcast to the presentation shell

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use seance_core::{CallSessionView, CallSnapshot, CallStatus, ConnectionState, Money};
use seance_protocol::{AcceptData, StatusData, SyncTimerData};

use crate::error::{ApiError, TransportError};
use crate::locator::LocateError;

// ============================================================================
// Session Commands
// ============================================================================

/// Commands processed by the session actor.
///
/// User-facing commands come from [`SessionHandle`](super::SessionHandle);
/// the rest are results posted back by pollers, timers and transport tasks.
#[derive(Debug)]
pub enum SessionCommand {
    // ------------------------------------------------------------------------
    // From the handle
    // ------------------------------------------------------------------------
    /// Accept the pending call.
    Accept {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Reject the pending call.
    Reject {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// End the call from this side.
    End {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    SetMuted {
        muted: bool,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Any user interaction; drives the audio-unlock handler.
    UserGesture,

    /// Re-run the locator after a `LocateFailed` event.
    RetryLocate,

    /// The audio SDK reported a dropped connection.
    TransportLost,

    /// Current view of the session, or None before it is located.
    GetSnapshot {
        respond_to: oneshot::Sender<Option<CallSessionView>>,
    },

    /// Dispose everything and stop without ending the call.
    Shutdown,

    // ------------------------------------------------------------------------
    // From background tasks
    // ------------------------------------------------------------------------
    /// Locator finished.
    Located(Result<CallSnapshot, LocateError>),

    StatusPolled(Result<StatusData, ApiError>),

    TimerPolled(Result<SyncTimerData, ApiError>),

    AcceptCompleted(Result<AcceptData, ApiError>),

    /// A transport join attempt finished.
    ConnectionAttempted {
        generation: u64,
        result: Result<(), TransportError>,
    },

    /// The single pending retry timer fired.
    RetryConnection,

    /// Credential watch tick.
    ConnectTick,

    AudioResumed {
        resumed: bool,
    },

    /// 1 Hz local clock.
    ClockTick,

    /// Post-termination delay elapsed.
    NavigateAway,
}

// ============================================================================
// Session Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The call has not been located yet.
    #[error("call not located yet")]
    NotLocated,

    /// The action does not apply in the current status.
    #[error("cannot {action} while {status}")]
    InvalidState {
        action: &'static str,
        status: CallStatus,
    },

    /// An accept or reject request is already running.
    #[error("{0} already in progress")]
    Busy(&'static str),

    /// The session has already terminated.
    #[error("call already terminated ({0})")]
    Terminated(CallStatus),

    /// The backend refused or failed the request.
    #[error("request failed: {0}")]
    Request(String),

    /// Mute requested while audio is not connected.
    #[error("audio not connected")]
    NotConnected,

    /// The actor has shut down.
    #[error("session channel closed")]
    ChannelClosed,
}

// ============================================================================
// Termination
// ============================================================================

/// What caused the session to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Local user ended the call.
    UserEnded,
    /// Local user rejected the offer.
    UserRejected,
    /// Pending countdown reached zero.
    Expired,
    /// Push channel reported a terminal status.
    Remote(CallStatus),
    /// Status or timer poll reported a terminal status.
    Polled(CallStatus),
    /// A session-scoped endpoint returned 404.
    NotFound,
}

impl TerminationReason {
    /// Terminal status recorded for this trigger.
    pub fn status(&self) -> CallStatus {
        match self {
            Self::UserEnded => CallStatus::Ended,
            Self::UserRejected => CallStatus::Rejected,
            Self::Expired => CallStatus::Expired,
            Self::Remote(status) | Self::Polled(status) => *status,
            Self::NotFound => CallStatus::Ended,
        }
    }

    /// Notice shown when navigating away.
    pub fn notice(&self) -> &'static str {
        match self {
            Self::UserEnded => "You ended the call",
            Self::UserRejected => "Call declined",
            Self::Expired => "Call request expired",
            Self::Remote(CallStatus::Cancelled) | Self::Polled(CallStatus::Cancelled) => {
                "The caller cancelled the call"
            }
            Self::Remote(CallStatus::Completed) | Self::Polled(CallStatus::Completed) => {
                "Call completed"
            }
            Self::Remote(_) | Self::Polled(_) => "The call has ended",
            Self::NotFound => "The call is no longer available",
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Events published to subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The locator resolved the call.
    Located { view: Box<CallSessionView> },

    /// Locating failed; `retry_locate` may be offered.
    LocateFailed { reason: String },

    StatusChanged { from: CallStatus, to: CallStatus },

    ElapsedUpdated { elapsed_seconds: u64, earnings: Money },

    /// Pending countdown value after a tick or poll.
    Countdown { time_remaining: u32 },

    ConnectionChanged { state: ConnectionState },

    /// Timer-sync polling started or stopped failing.
    SyncStale { stale: bool },

    AcceptFailed { reason: String },

    /// An endpoint answered 401; the shell must re-authenticate.
    AuthRequired,

    /// The single terminal transition.
    Terminated {
        status: CallStatus,
        reason: TerminationReason,
        at: DateTime<Utc>,
    },

    /// Final event; the session is gone.
    NavigatedAway { notice: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_status_mapping() {
        assert_eq!(TerminationReason::UserEnded.status(), CallStatus::Ended);
        assert_eq!(TerminationReason::UserRejected.status(), CallStatus::Rejected);
        assert_eq!(TerminationReason::Expired.status(), CallStatus::Expired);
        assert_eq!(
            TerminationReason::Remote(CallStatus::Cancelled).status(),
            CallStatus::Cancelled
        );
        assert!(TerminationReason::NotFound.status().is_terminal());
    }

    #[test]
    fn test_notice_text() {
        assert_eq!(
            TerminationReason::Remote(CallStatus::Cancelled).notice(),
            "The caller cancelled the call"
        );
        assert_eq!(TerminationReason::Expired.notice(), "Call request expired");
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::InvalidState {
            action: "accept",
            status: CallStatus::InProgress,
        };
        assert_eq!(err.to_string(), "cannot accept while in-progress");
    }
}
