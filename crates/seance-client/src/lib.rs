//! Seance client runtime.
//!
//! Everything between the HTTP/WebSocket backend and the presentation shell:
//! - `locator` - resolves which call this session is about
//! - `session` - the per-call actor that reconciles status and elapsed time
//! - `sync` - status poll, timer-sync poll and the local clock
//! - `connection` - audio connection with a single pending retry
//! - `push` - push-channel client with reconnect
//! - `api` / `transport` - the backend and audio SDK seams
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        seance client                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌────────────────────┐   ┌─────────────┐  │
//! │  │  HttpCallApi │◀──│  CallSessionActor  │──▶│ Audio       │  │
//! │  │  (REST)      │   │ (session owner)    │   │ Transport   │  │
//! │  └──────────────┘   └─────────┬──────────┘   └─────────────┘  │
//! │         ▲                     │ events                        │
//! │         │ polls               ▼                               │
//! │  ┌──────────────┐   ┌────────────────────┐                    │
//! │  │ Synchronizer │   │ broadcast::Sender  │◀── PushClient      │
//! │  └──────────────┘   └────────────────────┘    (WebSocket)     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod locator;
pub mod push;
pub mod retry;
pub mod session;
pub mod sync;
pub mod tasks;
pub mod transport;

pub use api::{CallApi, HttpCallApi};
pub use config::ClientConfig;
pub use connection::{AttemptOutcome, ConnectAttempt, ConnectionOrchestrator};
pub use error::{ApiError, ClientError, Result, TransportError};
pub use locator::{LocateError, SessionLocator};
pub use push::{PushClient, PushConfig, PushLink, PushNotice};
pub use retry::{RetryDecision, RetryPolicy};
pub use session::{
    spawn_call_session, SessionCommand, SessionError, SessionEvent, SessionHandle,
    TerminationReason,
};
pub use transport::{AudioTransport, HeadlessTransport};
