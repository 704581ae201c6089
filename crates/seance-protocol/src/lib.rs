//! Seance Protocol - Wire types for the call API and push channel
//!
//! This crate provides the JSON envelope and payload types returned by the
//! REST API, the lenient parser that normalizes call details into a
//! [`seance_core::CallSnapshot`], and the push-channel frames exchanged over
//! the real-time socket.

pub mod api;
pub mod error;
pub mod parse;
pub mod push;

pub use api::{AcceptData, ApiEnvelope, StatusData, SyncTimerData};
pub use error::ProtocolError;
pub use parse::{parse_status, RawCallDetails, RawParty};
pub use push::{PushEvent, PushEventKind, PushMessage, PushPayload};
