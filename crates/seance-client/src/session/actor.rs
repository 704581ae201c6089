//! Session actor - owns the call session and processes commands.
//!
//! The CallSessionActor is the single owner of session state. Handle
//! commands, poll results, timer ticks, transport results and push notices
//! are all processed sequentially here, and every status/elapsed update goes
//! through `CallSession::apply_signal`.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel send failures are logged or ignored, never propagated as panics

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use seance_core::{
    CallSession, CallSessionView, CallSnapshot, CallStatus, CountdownTick, RequestId, SessionId,
    Signal, SignalOutcome, SignalSource,
};
use seance_protocol::{AcceptData, PushMessage, StatusData, SyncTimerData};

use crate::api::CallApi;
use crate::config::ClientConfig;
use crate::connection::{AttemptOutcome, ConnectionOrchestrator};
use crate::error::{ApiError, TransportError};
use crate::locator::{LocateError, SessionLocator};
use crate::push::{PushLink, PushNotice};
use crate::retry::RetryPolicy;
use crate::sync::Synchronizer;
use crate::tasks::Disposal;
use crate::transport::AudioTransport;

use super::commands::{SessionCommand, SessionError, SessionEvent, TerminationReason};

type Responder = oneshot::Sender<Result<(), SessionError>>;

/// Whether the run loop continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Input to the run loop.
enum Incoming {
    Command(SessionCommand),
    Push(Option<PushNotice>),
}

// ============================================================================
// Session Actor
// ============================================================================

/// The session actor.
///
/// # Ownership
///
/// The actor owns:
/// - `session`: the call session, once located
/// - `connection`: the orchestrator, which owns the audio transport
/// - `sync`: the pollers and local clock
/// - `disposal`: root cancellation for every background task
pub struct CallSessionActor {
    config: ClientConfig,
    api: Arc<dyn CallApi>,
    receiver: mpsc::Receiver<SessionCommand>,
    /// Sender cloned into background tasks.
    sender: mpsc::Sender<SessionCommand>,
    event_publisher: broadcast::Sender<SessionEvent>,
    push_notices: Option<mpsc::Receiver<PushNotice>>,
    push_outbound: Option<mpsc::Sender<PushMessage>>,
    request_id: Option<RequestId>,
    session: Option<CallSession>,
    disposal: Disposal,
    sync: Synchronizer,
    connection: ConnectionOrchestrator,
    locating: bool,
    pending_accept: Option<Responder>,
    terminated: Option<TerminationReason>,
    joined_room: Option<String>,
    auth_reported: bool,
}

impl CallSessionActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn CallApi>,
        transport: Arc<dyn AudioTransport>,
        push: Option<PushLink>,
        request_id: Option<RequestId>,
        receiver: mpsc::Receiver<SessionCommand>,
        sender: mpsc::Sender<SessionCommand>,
        event_publisher: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let retry = RetryPolicy::new(
            config.connect_retry_backoff(),
            config.connect_retry_max_attempts,
        );
        let connection = ConnectionOrchestrator::new(
            transport,
            sender.clone(),
            retry,
            config.token_wait_interval(),
        );
        let sync = Synchronizer::new(Arc::clone(&api), sender.clone(), &config);
        let (push_notices, push_outbound) = match push {
            Some(link) => (Some(link.notices), Some(link.outbound)),
            None => (None, None),
        };

        Self {
            config,
            api,
            receiver,
            sender,
            event_publisher,
            push_notices,
            push_outbound,
            request_id,
            session: None,
            disposal: Disposal::new(),
            sync,
            connection,
            locating: false,
            pending_accept: None,
            terminated: None,
            joined_room: None,
            auth_reported: false,
        }
    }

    /// Runs the actor until shutdown or navigate-away.
    pub async fn run(mut self) {
        info!(request_id = ?self.request_id, "Session actor starting");
        self.start_locate();

        loop {
            let incoming = tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => Incoming::Command(cmd),
                    None => break,
                },
                notice = next_notice(&mut self.push_notices) => Incoming::Push(notice),
            };

            let flow = match incoming {
                Incoming::Command(cmd) => self.handle_command(cmd).await,
                Incoming::Push(Some(notice)) => {
                    self.handle_push(notice).await;
                    Flow::Continue
                }
                Incoming::Push(None) => {
                    debug!("Push channel closed");
                    self.push_notices = None;
                    Flow::Continue
                }
            };
            if flow == Flow::Stop {
                break;
            }
        }

        self.disposal.dispose();
        info!(
            status = ?self.session.as_ref().map(CallSession::status),
            "Session actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    async fn handle_command(&mut self, cmd: SessionCommand) -> Flow {
        match cmd {
            SessionCommand::Accept { respond_to } => self.handle_accept(respond_to),
            SessionCommand::Reject { respond_to } => {
                let result = self.handle_reject().await;
                let _ = respond_to.send(result);
            }
            SessionCommand::End { respond_to } => {
                let result = self.handle_end().await;
                let _ = respond_to.send(result);
            }
            SessionCommand::SetMuted { muted, respond_to } => {
                let result = self.handle_set_muted(muted);
                let _ = respond_to.send(result);
            }
            SessionCommand::UserGesture => self.connection.on_user_gesture(),
            SessionCommand::RetryLocate => {
                if self.session.is_none() && !self.locating {
                    self.start_locate();
                }
            }
            SessionCommand::TransportLost => {
                let outcome = self.connection.on_connection_lost(&self.disposal);
                debug!(?outcome, "Transport reported connection lost");
                self.sync_connection_state();
            }
            SessionCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.session.as_ref().map(CallSessionView::from_session));
            }
            SessionCommand::Shutdown => {
                self.shutdown().await;
                return Flow::Stop;
            }
            SessionCommand::Located(result) => self.handle_located(result).await,
            SessionCommand::StatusPolled(result) => self.handle_status_polled(result).await,
            SessionCommand::TimerPolled(result) => self.handle_timer_polled(result).await,
            SessionCommand::AcceptCompleted(result) => self.handle_accept_completed(result),
            SessionCommand::ConnectionAttempted { generation, result } => {
                self.handle_connection_attempted(generation, result);
            }
            SessionCommand::RetryConnection => {
                self.connection.on_retry_fired();
                self.reconcile_connection();
            }
            SessionCommand::ConnectTick => self.reconcile_connection(),
            SessionCommand::AudioResumed { resumed } => self.connection.on_audio_resumed(resumed),
            SessionCommand::ClockTick => self.handle_clock_tick().await,
            SessionCommand::NavigateAway => {
                let notice = self
                    .terminated
                    .map(|reason| reason.notice())
                    .unwrap_or("The call has ended");
                info!(notice, "Navigating away");
                self.publish(SessionEvent::NavigatedAway {
                    notice: notice.to_string(),
                });
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    // ------------------------------------------------------------------------
    // Locating
    // ------------------------------------------------------------------------

    fn start_locate(&mut self) {
        self.locating = true;
        let locator = SessionLocator::new(Arc::clone(&self.api), &self.config);
        let request_id = self.request_id.clone();
        let tx = self.sender.clone();
        tokio::spawn(async move {
            let result = locator.locate(request_id.as_ref()).await;
            let _ = tx.send(SessionCommand::Located(result)).await;
        });
    }

    async fn handle_located(&mut self, result: Result<CallSnapshot, LocateError>) {
        self.locating = false;
        if self.session.is_some() || self.disposal.is_disposed() {
            return;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to locate call");
                if matches!(e, LocateError::Unauthorized) {
                    self.report_auth();
                }
                self.publish(SessionEvent::LocateFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let session = CallSession::from_snapshot(snapshot);
        info!(
            session_id = ?session.session_id().map(SessionId::as_str),
            status = %session.status(),
            elapsed = session.elapsed_seconds(),
            "Call located"
        );
        let view = CallSessionView::from_session(&session);
        let status = session.status();
        self.session = Some(session);
        self.publish(SessionEvent::Located {
            view: Box::new(view),
        });

        if status.is_terminal() {
            // Call already over by the time we looked
            self.terminate(TerminationReason::Polled(status)).await;
            return;
        }

        self.sync.start_clock(&self.disposal);
        self.join_push_room();
        self.reconcile_connection();
    }

    // ------------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------------

    fn handle_accept(&mut self, respond_to: Responder) {
        let Some(session) = &self.session else {
            let _ = respond_to.send(Err(SessionError::NotLocated));
            return;
        };
        if let Some(reason) = self.terminated {
            let _ = respond_to.send(Err(SessionError::Terminated(reason.status())));
            return;
        }
        if session.status() != CallStatus::Pending {
            let _ = respond_to.send(Err(SessionError::InvalidState {
                action: "accept",
                status: session.status(),
            }));
            return;
        }
        if self.pending_accept.is_some() {
            let _ = respond_to.send(Err(SessionError::Busy("accept")));
            return;
        }
        let Some(request_id) = session.request_id().cloned() else {
            let _ = respond_to.send(Err(SessionError::Request(
                "no request id to accept".to_string(),
            )));
            return;
        };

        info!(request_id = %request_id, "Accepting call");
        self.pending_accept = Some(respond_to);
        let api = Arc::clone(&self.api);
        let tx = self.sender.clone();
        tokio::spawn(async move {
            let result = api.accept(&request_id).await;
            let _ = tx.send(SessionCommand::AcceptCompleted(result)).await;
        });
    }

    fn handle_accept_completed(&mut self, result: Result<AcceptData, ApiError>) {
        let responder = self.pending_accept.take();
        let reply = |result: Result<(), SessionError>| {
            if let Some(tx) = responder {
                let _ = tx.send(result);
            }
        };

        if let Some(reason) = self.terminated {
            reply(Err(SessionError::Terminated(reason.status())));
            return;
        }

        let data = match result {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                if matches!(e, ApiError::Unauthorized) {
                    self.report_auth();
                }
                self.publish(SessionEvent::AcceptFailed {
                    reason: e.to_string(),
                });
                reply(Err(SessionError::Request(e.to_string())));
                return;
            }
        };

        let Some(session) = self.session.as_mut() else {
            reply(Err(SessionError::NotLocated));
            return;
        };
        if let Some(id) = data.resolved_session_id() {
            if let Err(e) = session.assign_session_id(SessionId::new(id)) {
                warn!(error = %e, "Accept returned a different session id");
            }
        }
        session.update_credentials(data.token, data.room_name);
        let outcome = session.apply_signal(&Signal::status(SignalSource::Local, CallStatus::Ringing));
        reply(Ok(()));

        self.publish_outcome(&outcome);
        self.join_push_room();
        self.reconcile_connection();
    }

    async fn handle_reject(&mut self) -> Result<(), SessionError> {
        let status = self.require_active()?;
        if status != CallStatus::Pending {
            return Err(SessionError::InvalidState {
                action: "reject",
                status,
            });
        }
        self.terminate(TerminationReason::UserRejected).await;
        Ok(())
    }

    async fn handle_end(&mut self) -> Result<(), SessionError> {
        let status = self.require_active()?;
        if status == CallStatus::Pending {
            return Err(SessionError::InvalidState {
                action: "end",
                status,
            });
        }
        self.terminate(TerminationReason::UserEnded).await;
        Ok(())
    }

    fn handle_set_muted(&mut self, muted: bool) -> Result<(), SessionError> {
        self.require_active()?;
        if !self.connection.set_muted(muted) {
            return Err(SessionError::NotConnected);
        }
        if let Some(session) = self.session.as_mut() {
            session.muted = muted;
        }
        Ok(())
    }

    /// Current status of a located, non-terminated session.
    fn require_active(&self) -> Result<CallStatus, SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NotLocated)?;
        if let Some(reason) = self.terminated {
            return Err(SessionError::Terminated(reason.status()));
        }
        if session.is_terminal() {
            return Err(SessionError::Terminated(session.status()));
        }
        Ok(session.status())
    }

    // ------------------------------------------------------------------------
    // Polls
    // ------------------------------------------------------------------------

    async fn handle_status_polled(&mut self, result: Result<StatusData, ApiError>) {
        let data = match result {
            Ok(data) => data,
            Err(e) => {
                self.handle_poll_error("status", e).await;
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_terminal() {
            return;
        }

        session.update_credentials(data.token.clone(), data.room_name.clone());
        let outcome = session.apply_signal(&data.to_signal());
        let countdown = match (session.status(), session.time_remaining()) {
            (CallStatus::Pending, Some(remaining)) if data.time_remaining.is_some() => Some(remaining),
            _ => None,
        };
        if let Some(time_remaining) = countdown {
            self.publish(SessionEvent::Countdown { time_remaining });
        }

        self.join_push_room();
        self.apply_outcome(outcome, TerminationReason::Polled).await;
    }

    async fn handle_timer_polled(&mut self, result: Result<SyncTimerData, ApiError>) {
        let data = match result {
            Ok(data) => data,
            Err(e) => {
                self.handle_poll_error("sync-timer", e).await;
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_terminal() {
            return;
        }

        let recovered = session.sync_stale;
        session.sync_stale = false;
        let outcome = session.apply_signal(&data.to_signal());
        if recovered {
            info!("Timer sync recovered");
            self.publish(SessionEvent::SyncStale { stale: false });
        }
        self.apply_outcome(outcome, TerminationReason::Polled).await;
    }

    async fn handle_poll_error(&mut self, endpoint: &'static str, error: ApiError) {
        match error {
            ApiError::NotFound => {
                info!(endpoint, "Session no longer exists");
                self.terminate(TerminationReason::NotFound).await;
            }
            ApiError::Unauthorized => self.report_auth(),
            other => {
                debug!(endpoint, error = %other, "Poll failed, will retry next cycle");
                if endpoint == "sync-timer" {
                    self.mark_sync_stale();
                }
            }
        }
    }

    fn mark_sync_stale(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.sync_stale && !session.is_terminal() {
            warn!("Timer sync unavailable, using local clock");
            session.sync_stale = true;
            self.publish(SessionEvent::SyncStale { stale: true });
        }
    }

    // ------------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------------

    async fn handle_clock_tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_terminal() {
            return;
        }

        match session.tick_countdown() {
            CountdownTick::Inactive => {}
            CountdownTick::Remaining(time_remaining) => {
                self.publish(SessionEvent::Countdown { time_remaining });
            }
            CountdownTick::Expired => {
                self.publish(SessionEvent::Countdown { time_remaining: 0 });
                let outcome = self.apply_local(CallStatus::Expired);
                self.apply_outcome(outcome, |_| TerminationReason::Expired).await;
                return;
            }
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(signal) = session.local_clock_signal() {
            let outcome = session.apply_signal(&signal);
            self.publish_outcome(&outcome);
        }
    }

    fn apply_local(&mut self, status: CallStatus) -> SignalOutcome {
        match self.session.as_mut() {
            Some(session) => session.apply_signal(&Signal::status(SignalSource::Local, status)),
            None => SignalOutcome::ignored(),
        }
    }

    // ------------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------------

    async fn handle_push(&mut self, notice: PushNotice) {
        match notice {
            PushNotice::Event(event) => {
                let Some(session) = self.session.as_mut() else {
                    debug!(event = %event.kind, "Push event before call located, ignored");
                    return;
                };
                if !session.correlates(event.session_id(), event.request_id(), event.room_name()) {
                    debug!(event = %event.kind, "Push event for another call, ignored");
                    return;
                }
                let outcome = session.apply_signal(&event.to_signal());
                debug!(event = %event.kind, ?outcome, "Push event applied");
                self.apply_outcome(outcome, TerminationReason::Remote).await;
            }
            PushNotice::Connected { reconnect } => {
                debug!(reconnect, "Push channel connected");
            }
            PushNotice::Disconnected => {
                debug!("Push channel disconnected");
            }
        }
    }

    fn join_push_room(&mut self) {
        let Some(room) = self.session.as_ref().and_then(|s| s.room_name.clone()) else {
            return;
        };
        if self.joined_room.as_deref() == Some(room.as_str()) {
            return;
        }
        let Some(outbound) = &self.push_outbound else {
            return;
        };
        match outbound.try_send(PushMessage::join_room(room.clone())) {
            Ok(()) => {
                debug!(room = %room, "Joining push room");
                self.joined_room = Some(room);
            }
            Err(e) => warn!(error = %e, "Failed to queue join-room"),
        }
    }

    // ------------------------------------------------------------------------
    // Outcomes and connection
    // ------------------------------------------------------------------------

    /// Publishes what changed and routes terminal transitions to the terminator.
    async fn apply_outcome<F>(&mut self, outcome: SignalOutcome, reason: F)
    where
        F: FnOnce(CallStatus) -> TerminationReason,
    {
        self.publish_outcome(&outcome);
        if let Some(status) = outcome.entered_terminal() {
            self.terminate(reason(status)).await;
        } else if outcome.advanced().is_some() {
            self.reconcile_connection();
        }
    }

    fn publish_outcome(&self, outcome: &SignalOutcome) {
        if let Some((from, to)) = outcome.advanced() {
            info!(%from, %to, "Call status changed");
            self.publish(SessionEvent::StatusChanged { from, to });
        }
        if outcome.elapsed_applied || outcome.earnings_changed {
            if let Some(session) = &self.session {
                self.publish(SessionEvent::ElapsedUpdated {
                    elapsed_seconds: session.elapsed_seconds(),
                    earnings: session.earnings(),
                });
            }
        }
    }

    /// Starts whatever the current status needs: polls, timer sync, audio.
    fn reconcile_connection(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if session.is_terminal() || self.terminated.is_some() {
            return;
        }

        if let Some(session_id) = session.session_id() {
            self.sync.start_status_poll(session_id, &self.disposal);
        }

        if session.status().wants_connection() {
            if let Some(session_id) = session.session_id() {
                self.sync.start_timer_poll(session_id, &self.disposal);
            }
            let attempt = self
                .connection
                .try_connect(session.credentials(), &self.disposal);
            debug!(?attempt, "Connection check");
        } else {
            self.connection.stop_waiting();
        }
        self.sync_connection_state();
    }

    fn handle_connection_attempted(&mut self, generation: u64, result: Result<(), TransportError>) {
        let outcome = self
            .connection
            .on_attempt_result(generation, result, &self.disposal);
        if outcome == AttemptOutcome::Connected {
            if let Some(session_id) = self.session.as_ref().and_then(|s| s.session_id()) {
                self.sync.start_timer_poll(session_id, &self.disposal);
            }
        }
        self.sync_connection_state();
    }

    fn sync_connection_state(&mut self) {
        let state = self.connection.state();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.connection_state != state {
            session.connection_state = state;
            self.publish(SessionEvent::ConnectionChanged { state });
        }
    }

    // ------------------------------------------------------------------------
    // Terminator
    // ------------------------------------------------------------------------

    /// The single exit path. Only the first call has any effect.
    async fn terminate(&mut self, reason: TerminationReason) {
        if !self.begin_termination(reason) {
            return;
        }
        self.connection.teardown().await;
        self.finish_termination(reason);
    }

    fn begin_termination(&mut self, reason: TerminationReason) -> bool {
        if let Some(first) = self.terminated {
            debug!(?first, ignored = ?reason, "Termination already in progress");
            return false;
        }
        self.terminated = Some(reason);
        self.disposal.dispose();
        self.sync.stop_all();
        true
    }

    fn finish_termination(&mut self, reason: TerminationReason) {
        let status = match self.session.as_mut() {
            Some(session) => {
                session.mark_terminal(reason.status());
                session.status()
            }
            None => reason.status(),
        };
        self.sync_connection_state();

        let at = Utc::now();
        info!(%status, ?reason, "Call terminated");
        self.publish(SessionEvent::Terminated { status, reason, at });

        self.notify_counterpart(reason);

        let tx = self.sender.clone();
        let delay = self.config.navigate_delay();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(SessionCommand::NavigateAway).await;
        });
    }

    /// Best-effort server/peer notification. Failures are logged only.
    fn notify_counterpart(&self, reason: TerminationReason) {
        let session_id = self.session.as_ref().and_then(|s| s.session_id().cloned());
        let request_id = self
            .session
            .as_ref()
            .and_then(|s| s.request_id().cloned())
            .or_else(|| self.request_id.clone());
        let room = self.session.as_ref().and_then(|s| s.room_name.clone());

        match reason {
            TerminationReason::Expired => {}
            TerminationReason::UserRejected => {
                let Some(request_id) = request_id else {
                    warn!("No request id, reject not sent");
                    return;
                };
                let api = Arc::clone(&self.api);
                tokio::spawn(async move {
                    match api.reject(&request_id).await {
                        Ok(()) => debug!(request_id = %request_id, "Reject sent"),
                        Err(e) => warn!(request_id = %request_id, error = %e, "Reject request failed"),
                    }
                });
            }
            TerminationReason::UserEnded
            | TerminationReason::Remote(_)
            | TerminationReason::Polled(_)
            | TerminationReason::NotFound => {
                if reason == TerminationReason::UserEnded {
                    if let Some(outbound) = &self.push_outbound {
                        let message = PushMessage::call_ended(
                            session_id.as_ref().map(|id| id.as_str().to_string()),
                            room,
                        );
                        if let Err(e) = outbound.try_send(message) {
                            debug!(error = %e, "Failed to queue call-ended");
                        }
                    }
                }
                let Some(session_id) = session_id else {
                    debug!("No session id, end not sent");
                    return;
                };
                let api = Arc::clone(&self.api);
                tokio::spawn(async move {
                    match api.end(&session_id).await {
                        Ok(()) => debug!(session_id = %session_id, "End sent"),
                        Err(e) => debug!(session_id = %session_id, error = %e, "End request failed"),
                    }
                });
            }
        }
    }

    /// Unmount: dispose everything, release audio, leave the call running.
    async fn shutdown(&mut self) {
        info!("Session shutting down");
        self.disposal.dispose();
        self.sync.stop_all();
        self.connection.teardown().await;
        if let Some(tx) = self.pending_accept.take() {
            let _ = tx.send(Err(SessionError::ChannelClosed));
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn report_auth(&mut self) {
        if !self.auth_reported {
            warn!("API rejected credentials");
            self.auth_reported = true;
            self.publish(SessionEvent::AuthRequired);
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_publisher.send(event);
    }
}

async fn next_notice(notices: &mut Option<mpsc::Receiver<PushNotice>>) -> Option<PushNotice> {
    match notices {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
