//! Call status and audio connection state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

// ============================================================================
// Call Status
// ============================================================================

/// Lifecycle status of a call session.
///
/// Statuses form a partial order by [`CallStatus::rank`]:
/// `Pending < Ringing < InProgress < (any terminal status)`.
/// All terminal statuses share the highest rank; once one is reached the
/// session accepts no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    /// Call offered, awaiting accept/reject or expiry.
    #[default]
    Pending,

    /// Accepted locally, audio connection being established.
    Ringing,

    /// Audio call active.
    InProgress,

    /// Ended by either party.
    Ended,

    /// Completed normally (billing closed by the server).
    Completed,

    /// Cancelled by the caller before it started.
    Cancelled,

    /// Offer timed out.
    Expired,

    /// Rejected by the practitioner.
    Rejected,

    /// Failed server-side.
    Failed,
}

impl CallStatus {
    /// Every status, in rank order.
    pub const ALL: [CallStatus; 9] = [
        Self::Pending,
        Self::Ringing,
        Self::InProgress,
        Self::Ended,
        Self::Completed,
        Self::Cancelled,
        Self::Expired,
        Self::Rejected,
        Self::Failed,
    ];

    /// Precedence rank used by the reconciler.
    ///
    /// A signal may only move the status to a strictly higher rank.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Ringing => 1,
            Self::InProgress => 2,
            Self::Ended
            | Self::Completed
            | Self::Cancelled
            | Self::Expired
            | Self::Rejected
            | Self::Failed => 3,
        }
    }

    /// Returns true for statuses with no further legitimate transition.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    /// Returns true while the audio transport should be connecting or connected.
    #[must_use]
    pub fn wants_connection(&self) -> bool {
        matches!(self, Self::Ringing | Self::InProgress)
    }

    /// Returns true if `candidate` would move this status forward.
    #[must_use]
    pub fn is_superseded_by(&self, candidate: CallStatus) -> bool {
        !self.is_terminal() && candidate.rank() > self.rank()
    }

    /// Wire representation (`"in-progress"`, `"ended"`, ...).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ringing => "ringing",
            Self::InProgress => "in-progress",
            Self::Ended => "ended",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    /// Human-readable label for display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Incoming call",
            Self::Ringing => "Connecting",
            Self::InProgress => "In call",
            Self::Ended => "Call ended",
            Self::Completed => "Call completed",
            Self::Cancelled => "Call cancelled",
            Self::Expired => "Call expired",
            Self::Rejected => "Call rejected",
            Self::Failed => "Call failed",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = DomainError;

    /// Parses a backend status string.
    ///
    /// Accepts the canonical kebab-case names plus the spellings the backend
    /// is known to emit (`in_progress`, `active`, `accepted`, `canceled`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let status = match normalized.as_str() {
            "pending" | "requested" | "waiting" => Self::Pending,
            "ringing" | "accepted" | "connecting" => Self::Ringing,
            "in-progress" | "inprogress" | "active" | "ongoing" => Self::InProgress,
            "ended" => Self::Ended,
            "completed" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            "expired" | "missed" | "timeout" => Self::Expired,
            "rejected" | "declined" => Self::Rejected,
            "failed" | "error" => Self::Failed,
            _ => {
                return Err(DomainError::InvalidFieldValue {
                    field: "status".to_string(),
                    value: s.to_string(),
                    expected: "a call status".to_string(),
                })
            }
        };
        Ok(status)
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// State of the audio transport, independent of [`CallStatus`].
///
/// A call can be `InProgress` while the transport is still `Connecting`
/// (token not yet available) or `Failed` (audio dropped mid-call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_order() {
        assert!(CallStatus::Pending.rank() < CallStatus::Ringing.rank());
        assert!(CallStatus::Ringing.rank() < CallStatus::InProgress.rank());
        for status in CallStatus::ALL.iter().filter(|s| s.is_terminal()) {
            assert!(CallStatus::InProgress.rank() < status.rank());
        }
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = CallStatus::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal.len(), 6);
        assert!(!CallStatus::Pending.is_terminal());
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_is_superseded_by() {
        assert!(CallStatus::Pending.is_superseded_by(CallStatus::InProgress));
        assert!(!CallStatus::InProgress.is_superseded_by(CallStatus::Ringing));
        assert!(!CallStatus::InProgress.is_superseded_by(CallStatus::InProgress));
        assert!(CallStatus::InProgress.is_superseded_by(CallStatus::Ended));
        // Terminal never moves, not even to another terminal status
        assert!(!CallStatus::Ended.is_superseded_by(CallStatus::Completed));
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("in-progress".parse::<CallStatus>().unwrap(), CallStatus::InProgress);
        assert_eq!("in_progress".parse::<CallStatus>().unwrap(), CallStatus::InProgress);
        assert_eq!("ACTIVE".parse::<CallStatus>().unwrap(), CallStatus::InProgress);
        assert_eq!("accepted".parse::<CallStatus>().unwrap(), CallStatus::Ringing);
        assert_eq!("canceled".parse::<CallStatus>().unwrap(), CallStatus::Cancelled);
        assert!("bogus".parse::<CallStatus>().is_err());
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&CallStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let parsed: CallStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, CallStatus::Cancelled);
    }

    #[test]
    fn test_display_roundtrips_through_from_str() {
        for status in CallStatus::ALL {
            assert_eq!(status.to_string().parse::<CallStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_wants_connection() {
        assert!(CallStatus::Ringing.wants_connection());
        assert!(CallStatus::InProgress.wants_connection());
        assert!(!CallStatus::Pending.wants_connection());
        assert!(!CallStatus::Ended.wants_connection());
    }
}
