//! Push-channel client.
//!
//! This module provides the `PushClient` which handles:
//! - Connection to the push WebSocket
//! - Automatic reconnection with exponential backoff
//! - `register` on every connect and replay of the joined room
//! - Forwarding decoded events to the session actor
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()`.

use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use seance_protocol::{ProtocolError, PushEvent, PushMessage};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const NOTICE_BUFFER: usize = 64;
const OUTBOUND_BUFFER: usize = 16;

/// What the push client tells the session actor.
#[derive(Debug, Clone, PartialEq)]
pub enum PushNotice {
    Event(PushEvent),
    /// Socket (re)connected and `register` was sent.
    Connected { reconnect: bool },
    Disconnected,
}

/// The session's end of the push channel.
#[derive(Debug)]
pub struct PushLink {
    pub notices: mpsc::Receiver<PushNotice>,
    pub outbound: mpsc::Sender<PushMessage>,
}

impl PushLink {
    /// Creates a link and the client-side channel ends. Used by
    /// [`PushClient::new`] and by tests that drive the session directly.
    pub fn channel() -> (Self, mpsc::Sender<PushNotice>, mpsc::Receiver<PushMessage>) {
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let link = Self {
            notices: notice_rx,
            outbound: outbound_tx,
        };
        (link, notice_tx, outbound_rx)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Connection behaviour for the push client.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub url: String,
    /// Sent in `register`. Without it no `register` frame is sent.
    pub actor_id: Option<String>,
    pub actor_role: String,
    pub retry_initial_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_multiplier: f64,
}

impl PushConfig {
    /// Builds from the client config. None when push is not configured.
    pub fn from_client(config: &ClientConfig) -> Option<Self> {
        let url = config.push_url.clone()?;
        Some(Self {
            url,
            actor_id: config.actor_id.clone(),
            actor_role: config.actor_role.clone(),
            retry_initial_delay: config.push_retry_initial(),
            retry_max_delay: config.push_retry_max(),
            retry_multiplier: config.push_retry_multiplier,
        })
    }
}

// ============================================================================
// Push Client
// ============================================================================

/// Why a connection ended.
enum Disconnect {
    /// Socket dropped; reconnect.
    Lost,
    /// Session side is gone; stop for good.
    SessionClosed,
}

pub struct PushClient {
    config: PushConfig,
    notice_tx: mpsc::Sender<PushNotice>,
    outbound_rx: mpsc::Receiver<PushMessage>,
    cancel_token: CancellationToken,
    /// Last room joined; replayed after reconnect.
    room: Option<String>,
}

impl PushClient {
    #[must_use]
    pub fn new(config: PushConfig, cancel_token: CancellationToken) -> (Self, PushLink) {
        let (link, notice_tx, outbound_rx) = PushLink::channel();
        let client = Self {
            config,
            notice_tx,
            outbound_rx,
            cancel_token,
            room: None,
        };
        (client, link)
    }

    /// Spawns the client if push is configured.
    pub fn spawn(config: &ClientConfig, cancel_token: CancellationToken) -> Option<PushLink> {
        let push_config = PushConfig::from_client(config)?;
        let (client, link) = Self::new(push_config, cancel_token);
        tokio::spawn(client.run());
        Some(link)
    }

    /// Maintains the connection until cancelled or the session goes away.
    pub async fn run(mut self) {
        info!(url = %self.config.url, "Push client starting");
        let mut connected_before = false;

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            match self.connect_with_retry().await {
                Ok(stream) => {
                    match self.handle_connection(stream, connected_before).await {
                        Ok(Disconnect::SessionClosed) => {
                            debug!("Session closed, push client stopping");
                            break;
                        }
                        Ok(Disconnect::Lost) => {}
                        Err(e) => warn!(error = %e, "Push connection ended with error"),
                    }
                    connected_before = true;
                    if self.notify(PushNotice::Disconnected).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    if !self.cancel_token.is_cancelled() {
                        error!(error = %e, "Failed to connect to push channel");
                    }
                }
            }
        }

        info!("Push client stopped");
    }

    /// Connects with exponential backoff. Returns Err only when cancelled.
    async fn connect_with_retry(&self) -> Result<WsStream> {
        let mut delay = self.config.retry_initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);
            debug!(attempt, url = %self.config.url, "Connecting to push channel");

            match connect_async(self.config.url.as_str()).await {
                Ok((stream, _response)) => {
                    debug!(attempt, "Push channel connected");
                    return Ok(stream);
                }
                Err(e) => {
                    if attempt == 1 {
                        warn!(error = %e, "Push channel unavailable, will retry");
                    } else {
                        debug!(attempt, error = %e, "Push connection attempt failed");
                    }
                }
            }

            tokio::select! {
                _ = sleep(delay) => {
                    let next_delay_ms = (delay.as_millis() as f64 * self.config.retry_multiplier) as u64;
                    delay = Duration::from_millis(next_delay_ms).min(self.config.retry_max_delay);
                }
                _ = self.cancel_token.cancelled() => {
                    return Err(ClientError::Push("cancelled".to_string()));
                }
            }
        }
    }

    async fn handle_connection(&mut self, stream: WsStream, reconnect: bool) -> Result<Disconnect> {
        let (mut write, mut read) = stream.split();

        if let Some(actor_id) = &self.config.actor_id {
            let register = PushMessage::register(actor_id.clone(), self.config.actor_role.clone());
            send_frame(&mut write, &register).await?;
        }
        if let Some(room) = &self.room {
            send_frame(&mut write, &PushMessage::join_room(room.clone())).await?;
            debug!(room = %room, "Room membership replayed");
        }
        if self.notify(PushNotice::Connected { reconnect }).await.is_err() {
            return Ok(Disconnect::SessionClosed);
        }
        info!(reconnect, "Push channel ready");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(Disconnect::SessionClosed);
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if self.handle_frame(text.as_str()).await.is_err() {
                            return Ok(Disconnect::SessionClosed);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Push channel closed by server");
                        return Ok(Disconnect::Lost);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ClientError::Push(e.to_string())),
                },
                outbound = self.outbound_rx.recv() => match outbound {
                    Some(message) => {
                        if let PushMessage::JoinRoom { room_name } = &message {
                            if self.room.as_deref() == Some(room_name.as_str()) {
                                continue;
                            }
                            self.room = Some(room_name.clone());
                        }
                        send_frame(&mut write, &message).await?;
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(Disconnect::SessionClosed);
                    }
                },
            }
        }
    }

    /// Decodes one frame and forwards it. Err means the session is gone.
    async fn handle_frame(&self, text: &str) -> std::result::Result<(), ()> {
        match PushEvent::from_frame(text) {
            Ok(event) => {
                debug!(event = %event.kind, "Push event received");
                self.notify(PushNotice::Event(event)).await
            }
            Err(ProtocolError::UnknownEvent(name)) => {
                debug!(event = %name, "Ignoring unhandled push event");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Malformed push frame");
                Ok(())
            }
        }
    }

    async fn notify(&self, notice: PushNotice) -> std::result::Result<(), ()> {
        self.notice_tx.send(notice).await.map_err(|_| ())
    }
}

async fn send_frame<S>(write: &mut S, message: &PushMessage) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let frame = message.to_frame()?;
    write
        .send(Message::text(frame))
        .await
        .map_err(|e| ClientError::Push(e.to_string()))?;
    debug!(?message, "Sent push frame");
    Ok(())
}
