//! Audio transport seam.
//!
//! The telephony SDK is an external collaborator. The runtime only needs the
//! operations below; everything except `join_room` must be idempotent.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::TransportError;

#[async_trait]
pub trait AudioTransport: Send + Sync {
    /// Prepares the SDK. Safe to call more than once.
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Joins the media room. Must not be called while already joined.
    async fn join_room(&self, token: &str, room: &str) -> Result<(), TransportError>;

    async fn toggle_mute(&self, muted: bool) -> Result<(), TransportError>;

    /// Leaves the room.
    async fn end_call(&self) -> Result<(), TransportError>;

    /// Releases every SDK resource.
    async fn cleanup(&self) -> Result<(), TransportError>;

    /// Tries to resume audio outputs blocked until a user gesture.
    ///
    /// Returns true once audio is playing.
    async fn resume_audio(&self) -> Result<bool, TransportError>;
}

// ============================================================================
// Headless transport
// ============================================================================

#[derive(Debug, Default)]
struct HeadlessState {
    initialized: bool,
    room: Option<String>,
    muted: bool,
}

/// Transport without media, used by the CLI.
///
/// Tracks joined/muted state and logs each operation so the session flow
/// can be exercised against a real backend.
#[derive(Debug, Default)]
pub struct HeadlessTransport {
    state: Mutex<HeadlessState>,
}

impl HeadlessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn joined_room(&self) -> Option<String> {
        self.state.lock().await.room.clone()
    }

    pub async fn is_muted(&self) -> bool {
        self.state.lock().await.muted
    }
}

#[async_trait]
impl AudioTransport for HeadlessTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            debug!("Headless transport initialized");
            state.initialized = true;
        }
        Ok(())
    }

    async fn join_room(&self, _token: &str, room: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if !state.initialized {
            return Err(TransportError::NotInitialized);
        }
        if let Some(current) = &state.room {
            return Err(TransportError::AlreadyJoined(current.clone()));
        }
        info!(room, "Joined room (headless)");
        state.room = Some(room.to_string());
        Ok(())
    }

    async fn toggle_mute(&self, muted: bool) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.muted = muted;
        debug!(muted, "Mute toggled (headless)");
        Ok(())
    }

    async fn end_call(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if let Some(room) = state.room.take() {
            info!(room = %room, "Left room (headless)");
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        *state = HeadlessState::default();
        Ok(())
    }

    async fn resume_audio(&self) -> Result<bool, TransportError> {
        Ok(self.state.lock().await.room.is_some())
    }
}
