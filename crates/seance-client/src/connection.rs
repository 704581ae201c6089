//! Connection orchestrator.
//!
//! Owns the audio transport and drives it from the session's credentials.
//! Attempts run on spawned tasks and report back to the session actor as
//! [`SessionCommand::ConnectionAttempted`]; each attempt carries a generation
//! number so results that arrive after a teardown are recognised and dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use seance_core::ConnectionState;

use crate::error::TransportError;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::session::SessionCommand;
use crate::tasks::{spawn_delayed, spawn_ticker, Disposal, TaskSlot};
use crate::transport::AudioTransport;

/// What [`ConnectionOrchestrator::try_connect`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttempt {
    /// A join was started.
    Started { generation: u64 },
    /// Token or room missing; the watch loop will re-check.
    WaitingForCredentials,
    /// An attempt is already running.
    InFlight,
    AlreadyConnected,
    TornDown,
}

/// What a reported attempt result led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Connected,
    RetryScheduled { attempt: u32, delay: Duration },
    /// Failed while a retry was already pending.
    RetryPending,
    /// Failed and the retry cap is reached.
    GaveUp { attempts: u32 },
    /// Result of a superseded attempt; ignored.
    Stale,
}

pub struct ConnectionOrchestrator {
    transport: Arc<dyn AudioTransport>,
    tx: mpsc::Sender<SessionCommand>,
    state: ConnectionState,
    /// A join succeeded and the room has not been left since.
    joined: bool,
    in_flight: bool,
    generation: u64,
    retry: RetryPolicy,
    token_watch: TaskSlot,
    token_wait: Duration,
    unlock_armed: bool,
    resume_in_flight: bool,
    torn_down: bool,
}

impl ConnectionOrchestrator {
    pub fn new(
        transport: Arc<dyn AudioTransport>,
        tx: mpsc::Sender<SessionCommand>,
        retry: RetryPolicy,
        token_wait: Duration,
    ) -> Self {
        Self {
            transport,
            tx,
            state: ConnectionState::Disconnected,
            joined: false,
            in_flight: false,
            generation: 0,
            retry,
            token_watch: TaskSlot::new("token_watch"),
            token_wait,
            unlock_armed: false,
            resume_in_flight: false,
            torn_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_unlock_armed(&self) -> bool {
        self.unlock_armed
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.is_pending()
    }

    pub fn is_waiting_for_credentials(&self) -> bool {
        self.token_watch.is_running()
    }

    /// Starts a connection attempt if every precondition holds.
    ///
    /// Preconditions: not torn down, no attempt in flight, not connected,
    /// credentials present. Missing credentials start the watch loop instead.
    /// A room still held from an earlier join is left before joining again.
    pub fn try_connect(
        &mut self,
        credentials: Option<(&str, &str)>,
        disposal: &Disposal,
    ) -> ConnectAttempt {
        if self.torn_down {
            return ConnectAttempt::TornDown;
        }
        if self.in_flight {
            return ConnectAttempt::InFlight;
        }
        if self.state.is_connected() {
            self.token_watch.stop();
            return ConnectAttempt::AlreadyConnected;
        }

        let Some((token, room)) = credentials else {
            if let Some(watch) = self.token_watch.start(disposal) {
                debug!("Waiting for connection token and room");
                spawn_ticker(watch, self.token_wait, self.tx.clone(), || {
                    SessionCommand::ConnectTick
                });
            }
            return ConnectAttempt::WaitingForCredentials;
        };

        self.token_watch.stop();
        // A direct attempt replaces any scheduled one
        self.retry.cancel();

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        self.in_flight = true;
        self.state = ConnectionState::Connecting;
        let rejoin = std::mem::take(&mut self.joined);
        info!(generation, room, rejoin, "Connecting audio");

        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        let token = token.to_string();
        let room = room.to_string();
        tokio::spawn(async move {
            if rejoin {
                if let Err(e) = transport.end_call().await {
                    debug!(error = %e, "Leaving previous room failed");
                }
            }
            let result = match transport.initialize().await {
                Ok(()) => transport.join_room(&token, &room).await,
                Err(e) => Err(e),
            };
            let _ = tx
                .send(SessionCommand::ConnectionAttempted { generation, result })
                .await;
        });

        ConnectAttempt::Started { generation }
    }

    /// Applies the result of an attempt started by [`Self::try_connect`].
    pub fn on_attempt_result(
        &mut self,
        generation: u64,
        result: Result<(), TransportError>,
        disposal: &Disposal,
    ) -> AttemptOutcome {
        if self.torn_down || generation != self.generation {
            debug!(generation, current = self.generation, "Stale connection result dropped");
            if result.is_ok() {
                // Joined after we stopped caring; release it
                let transport = Arc::clone(&self.transport);
                tokio::spawn(async move {
                    let _ = transport.end_call().await;
                    let _ = transport.cleanup().await;
                });
            }
            return AttemptOutcome::Stale;
        }
        self.in_flight = false;

        match result {
            Ok(()) => {
                info!(generation, "Audio connected");
                self.state = ConnectionState::Connected;
                self.joined = true;
                self.retry.reset();
                self.unlock_armed = true;
                AttemptOutcome::Connected
            }
            Err(e) => {
                warn!(generation, error = %e, "Audio connection failed");
                self.fail(disposal)
            }
        }
    }

    /// Moves to `Failed` and reserves the single retry slot.
    fn fail(&mut self, disposal: &Disposal) -> AttemptOutcome {
        self.state = ConnectionState::Failed;
        match self.retry.schedule(disposal.root()) {
            RetryDecision::Scheduled {
                attempt,
                delay,
                token,
            } => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Connection retry scheduled");
                spawn_delayed(token, delay, self.tx.clone(), SessionCommand::RetryConnection);
                AttemptOutcome::RetryScheduled { attempt, delay }
            }
            RetryDecision::AlreadyPending => AttemptOutcome::RetryPending,
            RetryDecision::Exhausted { attempts } => {
                warn!(attempts, "Connection retries exhausted");
                AttemptOutcome::GaveUp { attempts }
            }
        }
    }

    /// Marks the pending retry timer as fired. The caller re-runs
    /// [`Self::try_connect`].
    pub fn on_retry_fired(&mut self) {
        self.retry.fired();
    }

    /// Transport lost the connection mid-call.
    pub fn on_connection_lost(&mut self, disposal: &Disposal) -> AttemptOutcome {
        if self.torn_down || !self.state.is_connected() {
            return AttemptOutcome::Stale;
        }
        warn!("Audio connection lost");
        self.unlock_armed = false;
        self.fail(disposal)
    }

    /// Stops the credential watch (status no longer wants a connection).
    pub fn stop_waiting(&mut self) {
        self.token_watch.stop();
    }

    /// Audio-unlock handler: on a user gesture, try to resume audio outputs.
    pub fn on_user_gesture(&mut self) {
        if !self.unlock_armed || self.resume_in_flight || self.torn_down {
            return;
        }
        self.resume_in_flight = true;
        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let resumed = match transport.resume_audio().await {
                Ok(resumed) => resumed,
                Err(e) => {
                    debug!(error = %e, "Audio resume failed");
                    false
                }
            };
            let _ = tx.send(SessionCommand::AudioResumed { resumed }).await;
        });
    }

    /// Disarms the unlock handler after the first successful resume.
    pub fn on_audio_resumed(&mut self, resumed: bool) {
        self.resume_in_flight = false;
        if resumed && self.unlock_armed {
            debug!("Audio unlocked");
            self.unlock_armed = false;
        }
    }

    /// Delegates mute to the transport. Returns false when not connected.
    pub fn set_muted(&self, muted: bool) -> bool {
        if !self.state.is_connected() || self.torn_down {
            return false;
        }
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.toggle_mute(muted).await {
                warn!(error = %e, muted, "Failed to toggle mute");
            }
        });
        true
    }

    /// Releases the transport and resets to disconnected. Idempotent.
    ///
    /// Returns false if already torn down.
    pub async fn teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;
        self.token_watch.stop();
        self.retry.cancel();
        self.unlock_armed = false;
        self.in_flight = false;
        self.joined = false;
        self.generation = self.generation.wrapping_add(1);
        self.state = ConnectionState::Disconnected;

        if let Err(e) = self.transport.end_call().await {
            debug!(error = %e, "Transport end_call failed during teardown");
        }
        if let Err(e) = self.transport.cleanup().await {
            warn!(error = %e, "Transport cleanup failed");
        }
        info!("Connection torn down");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HeadlessTransport;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct FlakyTransport {
        fail_joins: AtomicBool,
        joins: AtomicU32,
        cleanups: AtomicU32,
    }

    #[async_trait]
    impl AudioTransport for FlakyTransport {
        async fn initialize(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn join_room(&self, _: &str, _: &str) -> Result<(), TransportError> {
            self.joins.fetch_add(1, Ordering::SeqCst);
            if self.fail_joins.load(Ordering::SeqCst) {
                Err(TransportError::JoinFailed("no route".to_string()))
            } else {
                Ok(())
            }
        }
        async fn toggle_mute(&self, _: bool) -> Result<(), TransportError> {
            Ok(())
        }
        async fn end_call(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn cleanup(&self) -> Result<(), TransportError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn resume_audio(&self) -> Result<bool, TransportError> {
            Ok(true)
        }
    }

    fn orchestrator(
        transport: Arc<FlakyTransport>,
    ) -> (ConnectionOrchestrator, mpsc::Receiver<SessionCommand>) {
        let (tx, rx) = mpsc::channel(32);
        let orchestrator = ConnectionOrchestrator::new(
            transport,
            tx,
            RetryPolicy::new(Duration::from_secs(3), None),
            Duration::from_millis(500),
        );
        (orchestrator, rx)
    }

    async fn next_attempt(rx: &mut mpsc::Receiver<SessionCommand>) -> (u64, Result<(), TransportError>) {
        loop {
            match rx.recv().await {
                Some(SessionCommand::ConnectionAttempted { generation, result }) => {
                    return (generation, result)
                }
                Some(_) => continue,
                None => panic!("channel closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_with_credentials() {
        let transport = Arc::new(FlakyTransport::default());
        let (mut orch, mut rx) = orchestrator(transport.clone());
        let disposal = Disposal::new();

        let attempt = orch.try_connect(Some(("tok", "room")), &disposal);
        assert_eq!(attempt, ConnectAttempt::Started { generation: 1 });
        assert_eq!(orch.state(), ConnectionState::Connecting);
        assert_eq!(orch.try_connect(Some(("tok", "room")), &disposal), ConnectAttempt::InFlight);

        let (generation, result) = next_attempt(&mut rx).await;
        assert_eq!(orch.on_attempt_result(generation, result, &disposal), AttemptOutcome::Connected);
        assert_eq!(orch.state(), ConnectionState::Connected);
        assert!(orch.is_unlock_armed());
        assert_eq!(orch.try_connect(Some(("tok", "room")), &disposal), ConnectAttempt::AlreadyConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credentials_starts_watch() {
        let transport = Arc::new(FlakyTransport::default());
        let (mut orch, mut rx) = orchestrator(transport);
        let disposal = Disposal::new();

        assert_eq!(orch.try_connect(None, &disposal), ConnectAttempt::WaitingForCredentials);
        assert!(orch.is_waiting_for_credentials());
        // Second call does not start a second watch
        orch.try_connect(None, &disposal);

        assert!(matches!(rx.recv().await, Some(SessionCommand::ConnectTick)));

        orch.try_connect(Some(("tok", "room")), &disposal);
        assert!(!orch.is_waiting_for_credentials());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_schedules_single_retry() {
        let transport = Arc::new(FlakyTransport::default());
        transport.fail_joins.store(true, Ordering::SeqCst);
        let (mut orch, mut rx) = orchestrator(transport);
        let disposal = Disposal::new();

        orch.try_connect(Some(("tok", "room")), &disposal);
        let (generation, result) = next_attempt(&mut rx).await;
        let outcome = orch.on_attempt_result(generation, result, &disposal);
        assert!(matches!(outcome, AttemptOutcome::RetryScheduled { attempt: 1, .. }));
        assert_eq!(orch.state(), ConnectionState::Failed);
        assert!(orch.retry_pending());

        // Another failure while the retry is pending does not add a timer
        assert_eq!(orch.fail(&disposal), AttemptOutcome::RetryPending);

        assert!(matches!(rx.recv().await, Some(SessionCommand::RetryConnection)));
        orch.on_retry_fired();
        assert!(!orch.retry_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_is_idempotent_and_invalidates_attempts() {
        let transport = Arc::new(FlakyTransport::default());
        let (mut orch, mut rx) = orchestrator(transport.clone());
        let disposal = Disposal::new();

        orch.try_connect(Some(("tok", "room")), &disposal);
        assert!(orch.teardown().await);
        assert!(!orch.teardown().await);
        assert_eq!(transport.cleanups.load(Ordering::SeqCst), 1);

        let (generation, result) = next_attempt(&mut rx).await;
        assert_eq!(orch.on_attempt_result(generation, result, &disposal), AttemptOutcome::Stale);
        assert_eq!(orch.state(), ConnectionState::Disconnected);
        assert_eq!(orch.try_connect(Some(("tok", "room")), &disposal), ConnectAttempt::TornDown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlock_disarms_after_success() {
        let transport = Arc::new(FlakyTransport::default());
        let (mut orch, mut rx) = orchestrator(transport);
        let disposal = Disposal::new();

        orch.try_connect(Some(("tok", "room")), &disposal);
        let (generation, result) = next_attempt(&mut rx).await;
        orch.on_attempt_result(generation, result, &disposal);

        orch.on_user_gesture();
        match rx.recv().await {
            Some(SessionCommand::AudioResumed { resumed }) => orch.on_audio_resumed(resumed),
            other => panic!("Expected AudioResumed, got {other:?}"),
        }
        assert!(!orch.is_unlock_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_mid_call_loss() {
        let transport = Arc::new(HeadlessTransport::new());
        let (tx, mut rx) = mpsc::channel(32);
        let mut orch = ConnectionOrchestrator::new(
            transport.clone(),
            tx,
            RetryPolicy::new(Duration::from_secs(3), None),
            Duration::from_millis(500),
        );
        let disposal = Disposal::new();

        orch.try_connect(Some(("tok", "room-1")), &disposal);
        let (generation, result) = next_attempt(&mut rx).await;
        assert_eq!(orch.on_attempt_result(generation, result, &disposal), AttemptOutcome::Connected);

        let outcome = orch.on_connection_lost(&disposal);
        assert!(matches!(outcome, AttemptOutcome::RetryScheduled { attempt: 1, .. }));
        assert_eq!(orch.state(), ConnectionState::Failed);

        assert!(matches!(rx.recv().await, Some(SessionCommand::RetryConnection)));
        orch.on_retry_fired();
        assert!(matches!(
            orch.try_connect(Some(("tok", "room-1")), &disposal),
            ConnectAttempt::Started { generation: 2 }
        ));
        let (generation, result) = next_attempt(&mut rx).await;
        assert!(result.is_ok(), "rejoin failed: {result:?}");
        assert_eq!(orch.on_attempt_result(generation, result, &disposal), AttemptOutcome::Connected);
        assert_eq!(transport.joined_room().await.as_deref(), Some("room-1"));
    }

    #[tokio::test]
    async fn test_mute_requires_connection() {
        let transport = Arc::new(FlakyTransport::default());
        let (orch, _rx) = orchestrator(transport);
        assert!(!orch.set_muted(true));
    }
}
