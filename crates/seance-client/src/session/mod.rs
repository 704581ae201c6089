//! Call session using the Actor pattern.
//!
//! One actor per call. It owns the `CallSession`, reconciles every status
//! and elapsed signal, drives the audio connection and runs the terminator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  SessionCommand  ┌──────────────────┐  SessionEvent  ┌───────────┐
//! │  SessionHandle  │─────────────────▶│ CallSessionActor │───────────────▶│   Shell   │
//! └─────────────────┘   (mpsc)         └──────────────────┘  (broadcast)   └───────────┘
//!                                         ▲    ▲      ▲
//!              StatusPolled/TimerPolled   │    │      │  PushNotice
//!              ClockTick/ConnectTick ─────┘    │      └──────────── PushClient
//!                                 ConnectionAttempted (transport tasks)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use seance_core::RequestId;

use crate::api::CallApi;
use crate::config::ClientConfig;
use crate::push::PushLink;
use crate::transport::AudioTransport;

mod actor;
mod commands;
mod handle;

pub use actor::CallSessionActor;
pub use commands::{SessionCommand, SessionError, SessionEvent, TerminationReason};
pub use handle::SessionHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 128;

/// Spawn a call session actor and return a handle for interaction.
///
/// The actor starts locating the call immediately. With `request_id` set it
/// looks that request up; otherwise it asks `/active-call`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use seance_client::{spawn_call_session, ClientConfig, HeadlessTransport, HttpCallApi};
///
/// #[tokio::main]
/// async fn main() {
///     let config = ClientConfig::default();
///     let Ok(api) = HttpCallApi::new(&config) else { return };
///     let handle = spawn_call_session(
///         config,
///         Arc::new(api),
///         Arc::new(HeadlessTransport::new()),
///         None,
///         None,
///     );
///     let _events = handle.subscribe();
/// }
/// ```
pub fn spawn_call_session(
    config: ClientConfig,
    api: Arc<dyn CallApi>,
    transport: Arc<dyn AudioTransport>,
    push: Option<PushLink>,
    request_id: Option<RequestId>,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = CallSessionActor::new(
        config,
        api,
        transport,
        push,
        request_id,
        cmd_rx,
        cmd_tx.clone(),
        event_tx.clone(),
    );
    tokio::spawn(actor.run());

    SessionHandle::new(cmd_tx, event_tx)
}
