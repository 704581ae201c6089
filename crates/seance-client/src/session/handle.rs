//! Client interface for interacting with the CallSessionActor.
//!
//! The `SessionHandle` is what the presentation shell holds: it sends user
//! actions to the actor and subscribes to session events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `SessionError::ChannelClosed`

use tokio::sync::{broadcast, mpsc, oneshot};

use seance_core::CallSessionView;

use super::commands::{SessionCommand, SessionError, SessionEvent};

// ============================================================================
// Session Handle
// ============================================================================

/// Cheap-to-clone handle to a running call session.
///
/// # Usage
///
/// ```ignore
/// let mut events = handle.subscribe();
/// handle.user_gesture().await;
/// handle.accept().await?;
/// while let Ok(event) = events.recv().await {
///     // Render event
/// }
/// ```
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    event_sender: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(
        sender: mpsc::Sender<SessionCommand>,
        event_sender: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Accept the pending call. Resolves once the backend has answered.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` unless the call is pending
    /// - `SessionError::Busy` if an accept is already running
    /// - `SessionError::Request` if the backend refused
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn accept(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::Accept { respond_to })
            .await
    }

    /// Reject the pending call. The session terminates immediately.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` unless the call is pending
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn reject(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::Reject { respond_to })
            .await
    }

    /// End a ringing or in-progress call.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` while the call is still pending
    /// - `SessionError::Terminated` if the call already ended
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn end(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::End { respond_to })
            .await
    }

    /// Mute or unmute the microphone.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotConnected` if audio is not connected
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn set_muted(&self, muted: bool) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::SetMuted { muted, respond_to })
            .await
    }

    /// Report a user interaction (click, key press).
    pub async fn user_gesture(&self) {
        let _ = self.sender.send(SessionCommand::UserGesture).await;
    }

    /// Re-run the locator after a failed locate.
    pub async fn retry_locate(&self) {
        let _ = self.sender.send(SessionCommand::RetryLocate).await;
    }

    /// Report that the audio transport dropped.
    pub async fn transport_lost(&self) {
        let _ = self.sender.send(SessionCommand::TransportLost).await;
    }

    /// Current view of the session. `Ok(None)` before it is located.
    ///
    /// # Errors
    ///
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn snapshot(&self) -> Result<Option<CallSessionView>, SessionError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(SessionCommand::GetSnapshot { respond_to: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Subscribe to session events.
    ///
    /// Slow receivers may see `RecvError::Lagged` and should call
    /// [`snapshot`](Self::snapshot) to resync.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_sender.subscribe()
    }

    /// Dispose the session without ending the call.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(SessionCommand::Shutdown).await;
    }

    /// Returns true once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<F>(&self, make: F) -> Result<(), SessionError>
    where
        F: FnOnce(oneshot::Sender<Result<(), SessionError>>) -> SessionCommand,
    {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(make(tx))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }
}
