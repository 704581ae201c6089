//! Call session entity, identifiers and the status reconciler.

use crate::error::{DomainError, DomainResult};
use crate::signal::{Signal, SignalOutcome, SignalSource, StatusChange};
use crate::{CallStatus, ConnectionState, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Authoritative identifier of a call session.
///
/// Opaque string issued by the backend once a call request turns into a
/// session. Used as the correlation key for every poll and push filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened display form (first 8 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of the initial call request.
///
/// Known before the session id; accept/reject are addressed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// The other party on the call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counterpart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Normalized view of a call as returned by the session locator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub session_id: Option<SessionId>,
    pub request_id: Option<RequestId>,
    pub status: Option<CallStatus>,
    pub room_name: Option<String>,
    pub connection_token: Option<String>,
    pub elapsed_seconds: u64,
    pub time_remaining: Option<u32>,
    pub rate_per_min: Money,
    pub credits: Option<Money>,
    pub counterpart: Counterpart,
}

// ============================================================================
// Countdown
// ============================================================================

/// Result of one local countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// Not pending, or no countdown known.
    Inactive,
    /// Seconds left after this tick.
    Remaining(u32),
    /// Countdown reached zero.
    Expired,
}

/// Which value currently drives `earnings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarningsSource {
    #[default]
    Derived,
    Server,
}

// ============================================================================
// Call Session
// ============================================================================

/// One call instance, from offer through termination.
///
/// All mutation of status, elapsed time and earnings goes through
/// [`CallSession::apply_signal`], which enforces:
/// - status only moves forward (`pending < ringing < in-progress < terminal`)
/// - `elapsed_seconds` never decreases
/// - `earnings` never decreases
/// - nothing changes once terminal
#[derive(Debug, Clone)]
pub struct CallSession {
    session_id: Option<SessionId>,
    request_id: Option<RequestId>,
    status: CallStatus,
    elapsed_seconds: u64,
    earnings: Money,
    earnings_source: EarningsSource,
    rate_per_min: Money,
    time_remaining: Option<u32>,
    pub connection_state: ConnectionState,
    pub room_name: Option<String>,
    pub connection_token: Option<String>,
    pub counterpart: Counterpart,
    pub muted: bool,
    /// Last timer-sync poll failed.
    pub sync_stale: bool,
    pub created_at: DateTime<Utc>,
    pub last_signal_at: Option<DateTime<Utc>>,
}

impl CallSession {
    /// Creates a session that only knows its request id.
    pub fn new(request_id: Option<RequestId>) -> Self {
        Self {
            session_id: None,
            request_id,
            status: CallStatus::Pending,
            elapsed_seconds: 0,
            earnings: Money::zero(),
            earnings_source: EarningsSource::Derived,
            rate_per_min: Money::zero(),
            time_remaining: None,
            connection_state: ConnectionState::Disconnected,
            room_name: None,
            connection_token: None,
            counterpart: Counterpart::default(),
            muted: false,
            sync_stale: false,
            created_at: Utc::now(),
            last_signal_at: None,
        }
    }

    /// Creates a session from the locator's snapshot.
    ///
    /// The rate is read once here and fixed for the session's lifetime.
    /// The snapshot is applied as an [`SignalSource::InitialFetch`] signal, so
    /// a non-zero elapsed time promotes a pending/ringing status to in-progress.
    pub fn from_snapshot(snapshot: CallSnapshot) -> Self {
        let mut session = Self::new(snapshot.request_id);
        session.session_id = snapshot.session_id;
        session.rate_per_min = snapshot.rate_per_min;
        session.room_name = snapshot.room_name;
        session.connection_token = snapshot.connection_token;
        session.counterpart = snapshot.counterpart;

        let signal = Signal::new(SignalSource::InitialFetch)
            .with_status_opt(snapshot.status)
            .with_elapsed(snapshot.elapsed_seconds)
            .with_credits_opt(snapshot.credits)
            .with_time_remaining_opt(snapshot.time_remaining);
        session.apply_signal(&signal);
        session
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn earnings(&self) -> Money {
        self.earnings
    }

    pub fn earnings_source(&self) -> EarningsSource {
        self.earnings_source
    }

    pub fn rate_per_min(&self) -> Money {
        self.rate_per_min
    }

    pub fn time_remaining(&self) -> Option<u32> {
        self.time_remaining
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Token and room, when both are known.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.connection_token, &self.room_name) {
            (Some(token), Some(room)) if !token.is_empty() && !room.is_empty() => {
                Some((token.as_str(), room.as_str()))
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    /// Assigns the session id. Write-once.
    ///
    /// Returns `Ok(true)` on first assignment, `Ok(false)` if the same id was
    /// already set.
    ///
    /// # Errors
    ///
    /// `DomainError::SessionIdConflict` if a different id is already assigned.
    pub fn assign_session_id(&mut self, id: SessionId) -> DomainResult<bool> {
        match &self.session_id {
            None => {
                debug!(session_id = %id, "Session id assigned");
                self.session_id = Some(id);
                Ok(true)
            }
            Some(current) if *current == id => Ok(false),
            Some(current) => Err(DomainError::SessionIdConflict {
                current: current.clone(),
                offered: id,
            }),
        }
    }

    /// Records the request id if none is known yet.
    pub fn assign_request_id(&mut self, id: RequestId) {
        if self.request_id.is_none() {
            self.request_id = Some(id);
        }
    }

    /// Stores transport credentials. Returns true if the room name changed.
    pub fn update_credentials(&mut self, token: Option<String>, room: Option<String>) -> bool {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.connection_token = Some(token);
        }
        match room.filter(|r| !r.is_empty()) {
            Some(room) if self.room_name.as_deref() != Some(room.as_str()) => {
                self.room_name = Some(room);
                true
            }
            _ => false,
        }
    }

    /// Returns true if an event tagged with these ids belongs to this session.
    ///
    /// Matches on session id, request id or room name. An event carrying
    /// none of them is not considered relevant.
    pub fn correlates(
        &self,
        session_id: Option<&str>,
        request_id: Option<&str>,
        room_name: Option<&str>,
    ) -> bool {
        let session_match = matches!(
            (session_id, &self.session_id),
            (Some(event), Some(ours)) if event == ours.as_str()
        );
        let request_match = matches!(
            (request_id, &self.request_id),
            (Some(event), Some(ours)) if event == ours.as_str()
        );
        let room_match = matches!(
            (room_name, &self.room_name),
            (Some(event), Some(ours)) if event == ours
        );
        session_match || request_match || room_match
    }

    // ------------------------------------------------------------------------
    // Reconciler
    // ------------------------------------------------------------------------

    /// Applies one signal under the precedence rules.
    ///
    /// - Terminal session: signal ignored.
    /// - Status: applied only if strictly ahead of the current status.
    ///   A non-zero elapsed time while ringing (or in the initial fetch)
    ///   counts as proof the call is in progress.
    /// - Elapsed: applied only if larger than the current value.
    /// - Earnings: server credits win over derivation; never decreases.
    /// - Countdown: refreshed only while pending.
    pub fn apply_signal(&mut self, signal: &Signal) -> SignalOutcome {
        if self.status.is_terminal() {
            debug!(
                source = %signal.source,
                status = %self.status,
                "Signal ignored, session already terminal"
            );
            return SignalOutcome::ignored();
        }

        self.last_signal_at = Some(Utc::now());

        // Elapsed time first: a terminal signal may carry the final value.
        let mut elapsed_applied = false;
        if let Some(elapsed) = signal.elapsed_seconds {
            if elapsed > self.elapsed_seconds {
                self.elapsed_seconds = elapsed;
                elapsed_applied = true;
            }
        }

        let candidate = self.progress_candidate(signal);
        let status = match candidate {
            None => StatusChange::Unchanged,
            Some(candidate) if candidate == self.status => StatusChange::Unchanged,
            Some(candidate) if self.status.is_superseded_by(candidate) => {
                let from = self.status;
                self.status = candidate;
                debug!(source = %signal.source, %from, to = %candidate, "Status advanced");
                StatusChange::Advanced {
                    from,
                    to: candidate,
                }
            }
            Some(candidate) => {
                debug!(
                    source = %signal.source,
                    current = %self.status,
                    %candidate,
                    "Stale status discarded"
                );
                StatusChange::Discarded {
                    current: self.status,
                    candidate,
                }
            }
        };

        if self.status == CallStatus::Pending {
            if let Some(remaining) = signal.time_remaining {
                self.time_remaining = Some(remaining);
            }
        }

        let earnings_changed = self.update_earnings(signal.credits, elapsed_applied);

        SignalOutcome {
            status,
            elapsed_applied,
            earnings_changed,
            ignored: false,
        }
    }

    /// Status candidate after the progress heuristic.
    fn progress_candidate(&self, signal: &Signal) -> Option<CallStatus> {
        let progressing = signal.elapsed_seconds.is_some_and(|e| e > 0)
            && (self.status == CallStatus::Ringing
                || signal.source == SignalSource::InitialFetch);
        match signal.status {
            Some(status) if status.is_terminal() => Some(status),
            Some(status) if progressing && status.rank() < CallStatus::InProgress.rank() => {
                Some(CallStatus::InProgress)
            }
            None if progressing => Some(CallStatus::InProgress),
            other => other,
        }
    }

    fn update_earnings(&mut self, credits: Option<Money>, elapsed_applied: bool) -> bool {
        let candidate = match credits {
            Some(credits) => {
                self.earnings_source = EarningsSource::Server;
                Some(credits.round_to_cents())
            }
            // Server credits stay authoritative unless the server went quiet
            None if elapsed_applied
                && (self.earnings_source == EarningsSource::Derived || self.sync_stale) =>
            {
                Some(self.rate_per_min.earnings_for(self.elapsed_seconds))
            }
            None => None,
        };
        match candidate {
            Some(value) if value > self.earnings => {
                self.earnings = value;
                true
            }
            _ => false,
        }
    }

    /// Moves the session to a terminal status without a signal.
    ///
    /// Used by the lifecycle terminator for local triggers. Returns false if
    /// the session was already terminal (the existing status is kept).
    pub fn mark_terminal(&mut self, status: CallStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    // ------------------------------------------------------------------------
    // Local clock
    // ------------------------------------------------------------------------

    /// Advances the pending countdown by one second.
    ///
    /// Reaching zero reports [`CountdownTick::Expired`]; the caller feeds an
    /// `expired` signal back through [`CallSession::apply_signal`].
    pub fn tick_countdown(&mut self) -> CountdownTick {
        if self.status != CallStatus::Pending {
            return CountdownTick::Inactive;
        }
        match self.time_remaining {
            None => CountdownTick::Inactive,
            Some(remaining) => {
                let next = remaining.saturating_sub(1);
                self.time_remaining = Some(next);
                if next == 0 {
                    CountdownTick::Expired
                } else {
                    CountdownTick::Remaining(next)
                }
            }
        }
    }

    /// Local elapsed-time signal used while the timer-sync endpoint is unreachable.
    pub fn local_clock_signal(&self) -> Option<Signal> {
        if self.status == CallStatus::InProgress && self.sync_stale {
            Some(
                Signal::new(SignalSource::Local)
                    .with_elapsed(self.elapsed_seconds.saturating_add(1)),
            )
        } else {
            None
        }
    }
}

// ============================================================================
// View
// ============================================================================

/// Read-only projection of a session for display and the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSessionView {
    pub session_id: Option<SessionId>,
    pub request_id: Option<RequestId>,
    pub status: CallStatus,
    pub status_label: String,
    pub elapsed_seconds: u64,
    pub elapsed_display: String,
    pub earnings: Money,
    pub earnings_display: String,
    pub rate_display: String,
    pub time_remaining: Option<u32>,
    pub connection_state: ConnectionState,
    pub counterpart_name: Option<String>,
    pub room_name: Option<String>,
    pub muted: bool,
    pub sync_stale: bool,
}

impl CallSessionView {
    pub fn from_session(session: &CallSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            request_id: session.request_id.clone(),
            status: session.status,
            status_label: session.status.label().to_string(),
            elapsed_seconds: session.elapsed_seconds,
            elapsed_display: format_elapsed(session.elapsed_seconds),
            earnings: session.earnings,
            earnings_display: session.earnings.format(),
            rate_display: format!("{}/min", session.rate_per_min.format()),
            time_remaining: session.time_remaining,
            connection_state: session.connection_state,
            counterpart_name: session.counterpart.display_name.clone(),
            room_name: session.room_name.clone(),
            muted: session.muted,
            sync_stale: session.sync_stale,
        }
    }
}

impl From<&CallSession> for CallSessionView {
    fn from(session: &CallSession) -> Self {
        Self::from_session(session)
    }
}

/// Formats seconds as "mm:ss", or "h:mm:ss" past one hour.
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_progress_session() -> CallSession {
        CallSession::from_snapshot(CallSnapshot {
            session_id: Some(SessionId::new("sess-1")),
            request_id: Some(RequestId::new("req-1")),
            status: Some(CallStatus::InProgress),
            rate_per_min: Money::from_amount(2.00),
            ..Default::default()
        })
    }

    fn status_signal(status: CallStatus) -> Signal {
        Signal::status(SignalSource::Push, status)
    }

    fn elapsed_signal(elapsed: u64) -> Signal {
        Signal::new(SignalSource::TimerPoll).with_elapsed(elapsed)
    }

    #[test]
    fn test_session_id_short() {
        let id = SessionId::new("8e11bfb5-7dc2-432b-9206-928fa5c35731");
        assert_eq!(id.short(), "8e11bfb5");
        assert_eq!(SessionId::new("abc").short(), "abc");
    }

    #[test]
    fn test_ringing_after_in_progress_is_discarded() {
        let mut session = CallSession::new(None);
        session.apply_signal(&status_signal(CallStatus::InProgress));
        let outcome = session.apply_signal(&status_signal(CallStatus::Ringing));

        assert_eq!(session.status(), CallStatus::InProgress);
        assert!(matches!(outcome.status, StatusChange::Discarded { .. }));
    }

    #[test]
    fn test_status_never_regresses_across_interleavings() {
        let sequences = [
            vec![CallStatus::Ringing, CallStatus::Pending, CallStatus::InProgress, CallStatus::Ringing],
            vec![CallStatus::InProgress, CallStatus::Pending],
            vec![CallStatus::Pending, CallStatus::InProgress, CallStatus::Ringing, CallStatus::Pending],
        ];
        for sequence in sequences {
            let mut session = CallSession::new(None);
            let mut highest = session.status().rank();
            for status in sequence {
                session.apply_signal(&status_signal(status));
                assert!(session.status().rank() >= highest);
                highest = session.status().rank();
            }
            assert_eq!(session.status(), CallStatus::InProgress);
        }
    }

    #[test]
    fn test_terminal_wins_over_any_state() {
        for start in [CallStatus::Pending, CallStatus::Ringing, CallStatus::InProgress] {
            let mut session = CallSession::new(None);
            session.apply_signal(&status_signal(start));
            let outcome = session.apply_signal(&status_signal(CallStatus::Cancelled));
            assert_eq!(outcome.entered_terminal(), Some(CallStatus::Cancelled));
            assert_eq!(session.status(), CallStatus::Cancelled);
        }
    }

    #[test]
    fn test_signals_after_terminal_are_ignored() {
        let mut session = in_progress_session();
        session.apply_signal(&status_signal(CallStatus::Ended));
        let outcome = session.apply_signal(
            &Signal::new(SignalSource::TimerPoll)
                .with_status(CallStatus::Completed)
                .with_elapsed(500),
        );

        assert!(outcome.ignored);
        assert_eq!(outcome.entered_terminal(), None);
        assert_eq!(session.status(), CallStatus::Ended);
        assert_eq!(session.elapsed_seconds(), 0);
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let mut session = in_progress_session();
        let mut observed = Vec::new();
        for elapsed in [10, 7, 15] {
            session.apply_signal(&elapsed_signal(elapsed));
            observed.push(session.elapsed_seconds());
        }
        assert_eq!(observed, vec![10, 10, 15]);
    }

    #[test]
    fn test_earnings_derivation() {
        let mut session = in_progress_session();
        let outcome = session.apply_signal(&elapsed_signal(90));

        assert!(outcome.earnings_changed);
        assert_eq!(session.earnings(), Money::from_amount(3.00));
        assert_eq!(session.earnings_source(), EarningsSource::Derived);
    }

    #[test]
    fn test_server_credits_are_authoritative() {
        let mut session = in_progress_session();
        session.apply_signal(
            &Signal::new(SignalSource::TimerPoll)
                .with_elapsed(60)
                .with_credits_opt(Some(Money::from_amount(2.5))),
        );
        assert_eq!(session.earnings(), Money::from_amount(2.5));

        // A later elapsed-only push does not override server credits
        session.apply_signal(&Signal::new(SignalSource::Push).with_elapsed(120));
        assert_eq!(session.earnings(), Money::from_amount(2.5));
        assert_eq!(session.earnings_source(), EarningsSource::Server);
    }

    #[test]
    fn test_earnings_never_decrease() {
        let mut session = in_progress_session();
        session.apply_signal(&elapsed_signal(90));
        session.apply_signal(
            &Signal::new(SignalSource::TimerPoll).with_credits_opt(Some(Money::from_amount(1.0))),
        );
        assert_eq!(session.earnings(), Money::from_amount(3.00));
    }

    #[test]
    fn test_ringing_with_elapsed_promotes_to_in_progress() {
        let mut session = CallSession::new(None);
        session.apply_signal(&status_signal(CallStatus::Ringing));

        let outcome = session.apply_signal(
            &Signal::new(SignalSource::StatusPoll)
                .with_status(CallStatus::Ringing)
                .with_elapsed(3),
        );

        assert_eq!(
            outcome.advanced(),
            Some((CallStatus::Ringing, CallStatus::InProgress))
        );
    }

    #[test]
    fn test_pending_with_elapsed_from_poll_not_promoted() {
        let mut session = CallSession::new(None);
        session.apply_signal(&elapsed_signal(4));
        assert_eq!(session.status(), CallStatus::Pending);
    }

    #[test]
    fn test_initial_fetch_elapsed_overrides_status() {
        let session = CallSession::from_snapshot(CallSnapshot {
            status: Some(CallStatus::Pending),
            elapsed_seconds: 12,
            ..Default::default()
        });
        assert_eq!(session.status(), CallStatus::InProgress);
        assert_eq!(session.elapsed_seconds(), 12);
    }

    #[test]
    fn test_initial_fetch_zero_elapsed_keeps_status() {
        let session = CallSession::from_snapshot(CallSnapshot {
            status: Some(CallStatus::Pending),
            time_remaining: Some(30),
            ..Default::default()
        });
        assert_eq!(session.status(), CallStatus::Pending);
        assert_eq!(session.time_remaining(), Some(30));
    }

    #[test]
    fn test_countdown_expires_after_one_tick() {
        let mut session = CallSession::from_snapshot(CallSnapshot {
            status: Some(CallStatus::Pending),
            time_remaining: Some(1),
            ..Default::default()
        });
        assert_eq!(session.tick_countdown(), CountdownTick::Expired);
    }

    #[test]
    fn test_countdown_counts_down() {
        let mut session = CallSession::from_snapshot(CallSnapshot {
            status: Some(CallStatus::Pending),
            time_remaining: Some(3),
            ..Default::default()
        });
        assert_eq!(session.tick_countdown(), CountdownTick::Remaining(2));
        assert_eq!(session.tick_countdown(), CountdownTick::Remaining(1));
        assert_eq!(session.tick_countdown(), CountdownTick::Expired);
    }

    #[test]
    fn test_countdown_inactive_when_not_pending() {
        let mut session = in_progress_session();
        assert_eq!(session.tick_countdown(), CountdownTick::Inactive);
    }

    #[test]
    fn test_poll_refreshes_countdown_only_while_pending() {
        let mut session = CallSession::new(None);
        session.apply_signal(
            &Signal::new(SignalSource::StatusPoll).with_time_remaining_opt(Some(20)),
        );
        assert_eq!(session.time_remaining(), Some(20));

        session.apply_signal(&status_signal(CallStatus::Ringing));
        session.apply_signal(
            &Signal::new(SignalSource::StatusPoll).with_time_remaining_opt(Some(50)),
        );
        assert_eq!(session.time_remaining(), Some(20));
    }

    #[test]
    fn test_session_id_write_once() {
        let mut session = CallSession::new(None);
        assert_eq!(session.assign_session_id(SessionId::new("a")), Ok(true));
        assert_eq!(session.assign_session_id(SessionId::new("a")), Ok(false));
        assert!(matches!(
            session.assign_session_id(SessionId::new("b")),
            Err(DomainError::SessionIdConflict { .. })
        ));
        assert_eq!(session.session_id().map(SessionId::as_str), Some("a"));
    }

    #[test]
    fn test_mark_terminal_is_idempotent() {
        let mut session = in_progress_session();
        assert!(session.mark_terminal(CallStatus::Ended));
        assert!(!session.mark_terminal(CallStatus::Failed));
        assert_eq!(session.status(), CallStatus::Ended);
    }

    #[test]
    fn test_mark_terminal_rejects_non_terminal() {
        let mut session = CallSession::new(None);
        assert!(!session.mark_terminal(CallStatus::Ringing));
        assert_eq!(session.status(), CallStatus::Pending);
    }

    #[test]
    fn test_local_clock_only_when_stale() {
        let mut session = in_progress_session();
        assert!(session.local_clock_signal().is_none());

        session.sync_stale = true;
        let signal = session.local_clock_signal().unwrap();
        session.apply_signal(&signal);
        assert_eq!(session.elapsed_seconds(), 1);
    }

    #[test]
    fn test_credentials_require_both() {
        let mut session = CallSession::new(None);
        assert!(session.credentials().is_none());

        assert!(session.update_credentials(None, Some("room-1".to_string())));
        assert!(session.credentials().is_none());

        assert!(!session.update_credentials(Some("tok".to_string()), Some("room-1".to_string())));
        assert_eq!(session.credentials(), Some(("tok", "room-1")));
    }

    #[test]
    fn test_correlates() {
        let mut session = in_progress_session();
        session.update_credentials(None, Some("room-9".to_string()));

        assert!(session.correlates(Some("sess-1"), None, None));
        assert!(session.correlates(None, Some("req-1"), None));
        assert!(session.correlates(None, None, Some("room-9")));
        assert!(!session.correlates(Some("other"), Some("other"), None));
        assert!(!session.correlates(None, None, None));
    }

    #[test]
    fn test_view_formatting() {
        let mut session = in_progress_session();
        session.apply_signal(&elapsed_signal(90));
        let view = CallSessionView::from_session(&session);

        assert_eq!(view.elapsed_display, "01:30");
        assert_eq!(view.earnings_display, "$3.00");
        assert_eq!(view.rate_display, "$2.00/min");
        assert_eq!(view.status_label, "In call");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(65), "01:05");
        assert_eq!(format_elapsed(3725), "1:02:05");
    }
}
