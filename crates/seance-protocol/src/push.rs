//! Push-channel frames.
//!
//! Frames are JSON objects `{ "event": <name>, "data": { ... } }` in both
//! directions.

use crate::error::ProtocolError;
use crate::parse::{lenient_money, lenient_u64, parse_status};
use seance_core::{CallStatus, Money, Signal, SignalSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Inbound
// ============================================================================

/// Push events the client reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    TimerSync,
    CallCompleted,
    CallEnded,
    TimerStopped,
    RoomClosed,
    CallCancelled,
    CallStatus,
}

impl PushEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimerSync => "timer-sync",
            Self::CallCompleted => "call-completed",
            Self::CallEnded => "call-ended",
            Self::TimerStopped => "timer-stopped",
            Self::RoomClosed => "room-closed",
            Self::CallCancelled => "call-cancelled",
            Self::CallStatus => "call-status",
        }
    }

    /// Terminal status implied by the event itself, if any.
    pub fn implied_terminal(&self) -> Option<CallStatus> {
        match self {
            Self::CallCompleted => Some(CallStatus::Completed),
            Self::CallEnded | Self::TimerStopped | Self::RoomClosed => Some(CallStatus::Ended),
            Self::CallCancelled => Some(CallStatus::Cancelled),
            Self::TimerSync | Self::CallStatus => None,
        }
    }
}

impl FromStr for PushEventKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('_', "-").as_str() {
            "timer-sync" => Ok(Self::TimerSync),
            "call-completed" => Ok(Self::CallCompleted),
            "call-ended" => Ok(Self::CallEnded),
            "timer-stopped" => Ok(Self::TimerStopped),
            "room-closed" => Ok(Self::RoomClosed),
            "call-cancelled" | "call-canceled" => Ok(Self::CallCancelled),
            "call-status" => Ok(Self::CallStatus),
            _ => Err(ProtocolError::UnknownEvent(s.to_string())),
        }
    }
}

impl fmt::Display for PushEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event body. Correlation fields identify which call the event is about.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    #[serde(default)]
    pub call_session_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub call_request_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default, alias = "room_name")]
    pub room_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "elapsed", deserialize_with = "lenient_u64")]
    pub elapsed_seconds: Option<u64>,
    #[serde(default, alias = "credits", deserialize_with = "lenient_money")]
    pub credits_used: Option<Money>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Option<PushPayload>,
}

/// A decoded inbound push event.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub kind: PushEventKind,
    pub payload: PushPayload,
}

impl PushEvent {
    pub fn new(kind: PushEventKind, payload: PushPayload) -> Self {
        Self { kind, payload }
    }

    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// `Json` for malformed frames, `UnknownEvent` for events this client
    /// does not handle (callers usually just log those).
    pub fn from_frame(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let kind = raw.event.parse()?;
        Ok(Self {
            kind,
            payload: raw.data.unwrap_or_default(),
        })
    }

    /// Converts the event into a reconciler signal.
    ///
    /// `timer-sync` implies the call is running; the lifecycle events imply
    /// their terminal status regardless of any status field in the body.
    pub fn to_signal(&self) -> Signal {
        let status = match self.kind.implied_terminal() {
            Some(terminal) => Some(terminal),
            None => {
                let parsed = parse_status(self.payload.status.as_deref());
                match self.kind {
                    PushEventKind::TimerSync => parsed.or(Some(CallStatus::InProgress)),
                    _ => parsed,
                }
            }
        };
        Signal::new(SignalSource::Push)
            .with_status_opt(status)
            .with_elapsed_opt(self.payload.elapsed_seconds)
            .with_credits_opt(self.payload.credits_used)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.payload
            .call_session_id
            .as_deref()
            .or(self.payload.session_id.as_deref())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.payload
            .call_request_id
            .as_deref()
            .or(self.payload.request_id.as_deref())
    }

    pub fn room_name(&self) -> Option<&str> {
        self.payload.room_name.as_deref()
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Frames the client emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum PushMessage {
    /// Sent on every (re)connect.
    #[serde(rename_all = "camelCase")]
    Register { user_id: String, role: String },

    /// Joins the call room so room-scoped events are delivered.
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_name: String },

    /// Tells the counterpart the local side ended the call.
    #[serde(rename_all = "camelCase")]
    CallEnded {
        #[serde(skip_serializing_if = "Option::is_none")]
        call_session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_name: Option<String>,
    },
}

impl PushMessage {
    pub fn register(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self::Register {
            user_id: user_id.into(),
            role: role.into(),
        }
    }

    pub fn join_room(room_name: impl Into<String>) -> Self {
        Self::JoinRoom {
            room_name: room_name.into(),
        }
    }

    pub fn call_ended(call_session_id: Option<String>, room_name: Option<String>) -> Self {
        Self::CallEnded {
            call_session_id,
            room_name,
        }
    }

    /// Encodes the message as a text frame.
    ///
    /// # Errors
    ///
    /// Returns `Json` if serialization fails.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
