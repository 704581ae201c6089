//! REST envelope and endpoint payloads.

use crate::error::ProtocolError;
use crate::parse::{lenient_money, lenient_u32, lenient_u64, parse_status};
use seance_core::{CallStatus, Money, Signal, SignalSource};
use serde::Deserialize;

/// Common `{ success, data, message }` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Returns `data` if the server reported success.
    ///
    /// # Errors
    ///
    /// `Rejected` when `success` is false, `MissingField` when data is absent.
    pub fn into_data(self) -> Result<T, ProtocolError> {
        if !self.success {
            return Err(ProtocolError::Rejected {
                message: self.message,
            });
        }
        self.data.ok_or(ProtocolError::MissingField("data"))
    }

    /// Checks `success` only, discarding any payload.
    pub fn into_ack(self) -> Result<(), ProtocolError> {
        if self.success {
            Ok(())
        } else {
            Err(ProtocolError::Rejected {
                message: self.message,
            })
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// `GET /sync-timer/{sessionId}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTimerData {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "elapsed", deserialize_with = "lenient_u64")]
    pub elapsed_seconds: Option<u64>,
    #[serde(default, alias = "credits", alias = "earnings", deserialize_with = "lenient_money")]
    pub credits_used: Option<Money>,
}

impl SyncTimerData {
    pub fn to_signal(&self) -> Signal {
        Signal::new(SignalSource::TimerPoll)
            .with_status_opt(parse_status(self.status.as_deref()))
            .with_elapsed_opt(self.elapsed_seconds)
            .with_credits_opt(self.credits_used)
    }
}

/// `GET /status/{sessionId}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "room_name")]
    pub room_name: Option<String>,
    #[serde(default, alias = "connectionToken")]
    pub token: Option<String>,
    #[serde(default, alias = "elapsed", deserialize_with = "lenient_u64")]
    pub elapsed_seconds: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub time_remaining: Option<u32>,
}

impl StatusData {
    pub fn parsed_status(&self) -> Option<CallStatus> {
        parse_status(self.status.as_deref())
    }

    pub fn to_signal(&self) -> Signal {
        Signal::new(SignalSource::StatusPoll)
            .with_status_opt(self.parsed_status())
            .with_elapsed_opt(self.elapsed_seconds)
            .with_time_remaining_opt(self.time_remaining)
    }
}

/// `POST /accept/{requestId}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptData {
    #[serde(default, alias = "connectionToken")]
    pub token: Option<String>,
    #[serde(default, alias = "room_name")]
    pub room_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub call_session_id: Option<String>,
    #[serde(default, rename = "_id")]
    pub document_id: Option<String>,
}

impl AcceptData {
    /// The session id the backend assigned, whichever spelling carried it.
    pub fn resolved_session_id(&self) -> Option<&str> {
        [&self.session_id, &self.call_session_id, &self.document_id]
            .into_iter()
            .filter_map(|id| id.as_deref())
            .map(str::trim)
            .find(|id| !id.is_empty())
    }
}
