//! Lenient parsing of call payloads.
//!
//! The backend is not consistent across its call endpoints: ids arrive as
//! `_id`, `sessionId` or `callSessionId`, numbers sometimes arrive as strings,
//! and statuses use several spellings. Everything here is optional and
//! normalized into a [`CallSnapshot`].

use seance_core::{CallSnapshot, CallStatus, Counterpart, Money, RequestId, SessionId};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parses a backend status string, returning None for unknown values.
pub fn parse_status(raw: Option<&str>) -> Option<CallStatus> {
    raw.and_then(|s| s.parse().ok())
}

// ============================================================================
// Raw call details
// ============================================================================

/// Call payload as returned by `/active-call` and the call-detail endpoints.
///
/// Each id spelling has its own field because the backend often sends
/// several of them in one document. The remaining aliases expect a single
/// spelling per payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCallDetails {
    /// Document id. Names the session only once the call has left
    /// `pending`; a pending request document carries its request id here.
    #[serde(default, rename = "_id")]
    pub id: Option<String>,
    #[serde(default, rename = "id")]
    pub plain_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub call_session_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub call_request_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "room_name", alias = "room")]
    pub room_name: Option<String>,
    #[serde(default, rename = "token", alias = "connectionToken", alias = "accessToken")]
    pub connection_token: Option<String>,
    #[serde(default, alias = "elapsed", alias = "duration", deserialize_with = "lenient_u64")]
    pub elapsed_seconds: Option<u64>,
    #[serde(default, alias = "remainingSeconds", deserialize_with = "lenient_u32")]
    pub time_remaining: Option<u32>,
    #[serde(default, alias = "ratePerMinute", alias = "rate", deserialize_with = "lenient_money")]
    pub rate_per_min: Option<Money>,
    #[serde(default, alias = "credits", deserialize_with = "lenient_money")]
    pub credits_used: Option<Money>,
    #[serde(default, alias = "client", alias = "caller")]
    pub user: Option<RawParty>,
    #[serde(default, alias = "clientId", alias = "callerId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "clientName", alias = "callerName")]
    pub user_name: Option<String>,
}

/// Nested counterpart object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParty {
    #[serde(default, rename = "_id", alias = "id")]
    pub id: Option<String>,
    #[serde(default, alias = "displayName", alias = "fullName", alias = "username")]
    pub name: Option<String>,
}

impl RawCallDetails {
    /// The id to use for detail lookups: session id, then document id, then
    /// request id.
    pub fn lookup_id(&self) -> Option<&str> {
        self.explicit_session_id()
            .or(self.document_id())
            .or(self.explicit_request_id())
    }

    fn explicit_session_id(&self) -> Option<&str> {
        non_empty(self.session_id.as_deref()).or(non_empty(self.call_session_id.as_deref()))
    }

    fn explicit_request_id(&self) -> Option<&str> {
        non_empty(self.request_id.as_deref()).or(non_empty(self.call_request_id.as_deref()))
    }

    fn document_id(&self) -> Option<&str> {
        non_empty(self.id.as_deref()).or(non_empty(self.plain_id.as_deref()))
    }

    fn is_pending(&self) -> bool {
        parse_status(self.status.as_deref()) == Some(CallStatus::Pending)
    }

    /// Splits the identifiers into `(session id, request id)`.
    ///
    /// The document id is a session id only when no explicit one is present,
    /// it differs from the request id and the call is not pending. A pending
    /// document without an explicit request id contributes its id as the
    /// request id instead.
    fn resolve_ids(
        &self,
        fallback_request_id: Option<&RequestId>,
    ) -> (Option<SessionId>, Option<RequestId>) {
        let mut request_id = self
            .explicit_request_id()
            .map(RequestId::new)
            .or_else(|| fallback_request_id.cloned());

        if let Some(session_id) = self.explicit_session_id() {
            return (Some(SessionId::new(session_id)), request_id);
        }

        let Some(document_id) = self.document_id() else {
            return (None, request_id);
        };
        if request_id.as_ref().map(RequestId::as_str) == Some(document_id) {
            return (None, request_id);
        }
        if self.is_pending() {
            if request_id.is_none() {
                request_id = Some(RequestId::new(document_id));
            }
            return (None, request_id);
        }
        (Some(SessionId::new(document_id)), request_id)
    }

    /// Returns true if the payload identifies a call at all.
    pub fn is_usable(&self) -> bool {
        self.lookup_id().is_some()
    }

    /// Normalizes into a snapshot.
    ///
    /// `fallback_request_id` fills in the request id when the payload
    /// omits it (the locator knows which id it asked for).
    pub fn normalize(&self, fallback_request_id: Option<&RequestId>) -> CallSnapshot {
        let (session_id, request_id) = self.resolve_ids(fallback_request_id);

        let party = self.user.as_ref();
        let counterpart = Counterpart {
            user_id: non_empty(party.and_then(|p| p.id.as_deref()))
                .or(non_empty(self.user_id.as_deref()))
                .map(str::to_string),
            display_name: non_empty(party.and_then(|p| p.name.as_deref()))
                .or(non_empty(self.user_name.as_deref()))
                .map(str::to_string),
        };

        CallSnapshot {
            session_id,
            request_id,
            status: parse_status(self.status.as_deref()),
            room_name: non_empty(self.room_name.as_deref()).map(str::to_string),
            connection_token: non_empty(self.connection_token.as_deref()).map(str::to_string),
            elapsed_seconds: self.elapsed_seconds.unwrap_or(0),
            time_remaining: self.time_remaining,
            rate_per_min: self.rate_per_min.unwrap_or_default(),
            credits: self.credits_used,
            counterpart,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// Lenient number helpers
// ============================================================================

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

/// Accepts a non-negative number or numeric string; anything else is None.
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(value_as_f64)
        .filter(|v| *v >= 0.0)
        .map(|v| v.floor() as u64))
}

pub(crate) fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_u64(deserializer)?;
    Ok(value.map(|v| u32::try_from(v).unwrap_or(u32::MAX)))
}

pub(crate) fn lenient_money<'de, D>(deserializer: D) -> Result<Option<Money>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_f64).map(Money::from_amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_details_parsing() {
        let json = r#"{
            "_id": "sess-42",
            "callRequestId": "req-7",
            "status": "in_progress",
            "roomName": "room-42",
            "token": "jwt-abc",
            "elapsedSeconds": 95,
            "ratePerMinute": 2.5,
            "user": {"_id": "u-1", "name": "Morgan"}
        }"#;
        let raw: RawCallDetails = serde_json::from_str(json).unwrap();
        let snapshot = raw.normalize(None);

        assert_eq!(snapshot.session_id, Some(SessionId::new("sess-42")));
        assert_eq!(snapshot.request_id, Some(RequestId::new("req-7")));
        assert_eq!(snapshot.status, Some(CallStatus::InProgress));
        assert_eq!(snapshot.room_name.as_deref(), Some("room-42"));
        assert_eq!(snapshot.connection_token.as_deref(), Some("jwt-abc"));
        assert_eq!(snapshot.elapsed_seconds, 95);
        assert_eq!(snapshot.rate_per_min, Money::from_cents(250));
        assert_eq!(snapshot.counterpart.display_name.as_deref(), Some("Morgan"));
    }

    #[test]
    fn test_explicit_session_id_wins_over_document_id() {
        let json = r#"{"_id": "doc-1", "sessionId": "sess-1"}"#;
        let raw: RawCallDetails = serde_json::from_str(json).unwrap();
        assert_eq!(raw.lookup_id(), Some("sess-1"));
    }

    #[test]
    fn test_pending_document_id_is_not_a_session() {
        let json = r#"{"_id": "r-1", "status": "pending", "timeRemaining": 30}"#;
        let raw: RawCallDetails = serde_json::from_str(json).unwrap();

        let snapshot = raw.normalize(Some(&RequestId::new("r-1")));
        assert_eq!(snapshot.session_id, None);
        assert_eq!(snapshot.request_id, Some(RequestId::new("r-1")));

        // Without a known request id the document id becomes the request id
        let snapshot = raw.normalize(None);
        assert_eq!(snapshot.session_id, None);
        assert_eq!(snapshot.request_id, Some(RequestId::new("r-1")));
    }

    #[test]
    fn test_document_id_matching_request_id_is_not_a_session() {
        let json = r#"{"_id": "r-2", "requestId": "r-2", "status": "ringing"}"#;
        let raw: RawCallDetails = serde_json::from_str(json).unwrap();
        let snapshot = raw.normalize(None);
        assert_eq!(snapshot.session_id, None);
        assert_eq!(snapshot.request_id, Some(RequestId::new("r-2")));
    }

    #[test]
    fn test_every_id_spelling_in_one_payload() {
        let json = r#"{
            "_id": "doc-1",
            "id": "doc-1",
            "sessionId": "s-1",
            "callSessionId": "s-1",
            "requestId": "r-1",
            "callRequestId": "r-1"
        }"#;
        let raw: RawCallDetails = serde_json::from_str(json).unwrap();
        let snapshot = raw.normalize(None);
        assert_eq!(snapshot.session_id, Some(SessionId::new("s-1")));
        assert_eq!(snapshot.request_id, Some(RequestId::new("r-1")));
    }

    #[test]
    fn test_alternate_id_spellings() {
        let json = r#"{"id": "doc-3", "callRequestId": "r-3", "status": "in-progress"}"#;
        let raw: RawCallDetails = serde_json::from_str(json).unwrap();
        let snapshot = raw.normalize(None);
        assert_eq!(snapshot.session_id, Some(SessionId::new("doc-3")));
        assert_eq!(snapshot.request_id, Some(RequestId::new("r-3")));
    }

    #[test]
    fn test_numbers_as_strings() {
        let json = r#"{"sessionId": "s", "elapsedSeconds": "12", "timeRemaining": "30", "rate": "1.99"}"#;
        let raw: RawCallDetails = serde_json::from_str(json).unwrap();
        assert_eq!(raw.elapsed_seconds, Some(12));
        assert_eq!(raw.time_remaining, Some(30));
        assert_eq!(raw.rate_per_min, Some(Money::from_cents(199)));
    }

    #[test]
    fn test_garbage_numbers_are_ignored() {
        let json = r#"{"sessionId": "s", "elapsedSeconds": "soon", "rate": null, "timeRemaining": -4}"#;
        let raw: RawCallDetails = serde_json::from_str(json).unwrap();
        assert_eq!(raw.elapsed_seconds, None);
        assert_eq!(raw.rate_per_min, None);
        assert_eq!(raw.time_remaining, None);
    }

    #[test]
    fn test_unknown_status_is_none() {
        assert_eq!(parse_status(Some("on-hold")), None);
        assert_eq!(parse_status(Some("ACTIVE")), Some(CallStatus::InProgress));
        assert_eq!(parse_status(None), None);
    }

    #[test]
    fn test_fallback_request_id() {
        let raw: RawCallDetails = serde_json::from_str(r#"{"sessionId": "s"}"#).unwrap();
        let snapshot = raw.normalize(Some(&RequestId::new("req-1")));
        assert_eq!(snapshot.request_id, Some(RequestId::new("req-1")));
    }

    #[test]
    fn test_empty_payload_not_usable() {
        let raw: RawCallDetails = serde_json::from_str(r#"{"sessionId": "  "}"#).unwrap();
        assert!(!raw.is_usable());
    }

    #[test]
    fn test_flat_counterpart_fields() {
        let json = r#"{"requestId": "r", "clientId": "c-9", "clientName": "Ash"}"#;
        let raw: RawCallDetails = serde_json::from_str(json).unwrap();
        let snapshot = raw.normalize(None);
        assert_eq!(snapshot.counterpart.user_id.as_deref(), Some("c-9"));
        assert_eq!(snapshot.counterpart.display_name.as_deref(), Some("Ash"));
        assert_eq!(snapshot.session_id, None);
    }
}
