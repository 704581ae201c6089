//! Status and timer synchronization.
//!
//! Runs the `/status` poll, the `/sync-timer` poll and the local clock as
//! slot-guarded background tasks. Results are posted to the session actor as
//! commands; nothing here touches session state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use seance_core::SessionId;

use crate::api::CallApi;
use crate::config::ClientConfig;
use crate::session::SessionCommand;
use crate::tasks::{spawn_poller, spawn_ticker, Disposal, TaskSlot};

pub struct Synchronizer {
    api: Arc<dyn CallApi>,
    tx: mpsc::Sender<SessionCommand>,
    status_poll: TaskSlot,
    timer_poll: TaskSlot,
    clock: TaskSlot,
    status_period: Duration,
    timer_period: Duration,
    clock_period: Duration,
}

impl Synchronizer {
    pub fn new(api: Arc<dyn CallApi>, tx: mpsc::Sender<SessionCommand>, config: &ClientConfig) -> Self {
        Self {
            api,
            tx,
            status_poll: TaskSlot::new("status_poll"),
            timer_poll: TaskSlot::new("timer_poll"),
            clock: TaskSlot::new("clock"),
            status_period: config.status_poll_interval(),
            timer_period: config.timer_poll_interval(),
            clock_period: config.clock_tick_interval(),
        }
    }

    /// Starts the status poll. Returns false if already running.
    pub fn start_status_poll(&mut self, session_id: &SessionId, disposal: &Disposal) -> bool {
        let Some(token) = self.status_poll.start(disposal) else {
            return false;
        };
        let api = Arc::clone(&self.api);
        let session_id = session_id.clone();
        spawn_poller(token, self.status_period, self.tx.clone(), move || {
            let api = Arc::clone(&api);
            let session_id = session_id.clone();
            async move { SessionCommand::StatusPolled(api.status(&session_id).await) }
        });
        true
    }

    /// Starts the timer-sync poll. Returns false if already running.
    pub fn start_timer_poll(&mut self, session_id: &SessionId, disposal: &Disposal) -> bool {
        let Some(token) = self.timer_poll.start(disposal) else {
            return false;
        };
        debug!(session_id = %session_id, "Timer sync started");
        let api = Arc::clone(&self.api);
        let session_id = session_id.clone();
        spawn_poller(token, self.timer_period, self.tx.clone(), move || {
            let api = Arc::clone(&api);
            let session_id = session_id.clone();
            async move { SessionCommand::TimerPolled(api.sync_timer(&session_id).await) }
        });
        true
    }

    /// Starts the 1 Hz local clock. Returns false if already running.
    pub fn start_clock(&mut self, disposal: &Disposal) -> bool {
        let Some(token) = self.clock.start(disposal) else {
            return false;
        };
        spawn_ticker(token, self.clock_period, self.tx.clone(), || SessionCommand::ClockTick);
        true
    }

    pub fn is_status_polling(&self) -> bool {
        self.status_poll.is_running()
    }

    pub fn is_timer_polling(&self) -> bool {
        self.timer_poll.is_running()
    }

    pub fn stop_all(&mut self) {
        self.status_poll.stop();
        self.timer_poll.stop();
        self.clock.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use async_trait::async_trait;
    use seance_core::RequestId;
    use seance_protocol::{AcceptData, RawCallDetails, StatusData, SyncTimerData};

    struct IdleApi;

    #[async_trait]
    impl CallApi for IdleApi {
        async fn active_call(&self) -> Result<RawCallDetails, ApiError> {
            Err(ApiError::NotFound)
        }
        async fn call_details(&self, _: &str) -> Result<RawCallDetails, ApiError> {
            Err(ApiError::NotFound)
        }
        async fn sync_timer(&self, _: &SessionId) -> Result<SyncTimerData, ApiError> {
            Ok(SyncTimerData::default())
        }
        async fn status(&self, _: &SessionId) -> Result<StatusData, ApiError> {
            Ok(StatusData::default())
        }
        async fn accept(&self, _: &RequestId) -> Result<AcceptData, ApiError> {
            Err(ApiError::NotFound)
        }
        async fn reject(&self, _: &RequestId) -> Result<(), ApiError> {
            Ok(())
        }
        async fn end(&self, _: &SessionId) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_are_single_instance_and_stop_together() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut sync = Synchronizer::new(Arc::new(IdleApi), tx, &ClientConfig::default());
        let disposal = Disposal::new();
        let session_id = SessionId::new("s-1");

        assert!(sync.start_status_poll(&session_id, &disposal));
        assert!(!sync.start_status_poll(&session_id, &disposal));
        assert!(sync.start_timer_poll(&session_id, &disposal));
        assert!(!sync.start_timer_poll(&session_id, &disposal));
        assert!(sync.is_status_polling());
        assert!(sync.is_timer_polling());

        assert!(matches!(
            rx.recv().await,
            Some(SessionCommand::StatusPolled(Ok(_)) | SessionCommand::TimerPolled(Ok(_)))
        ));

        sync.stop_all();
        assert!(!sync.is_status_polling());
        assert!(!sync.is_timer_polling());
        assert!(sync.start_status_poll(&session_id, &disposal));
    }
}
