//! Background task bookkeeping.
//!
//! Every timer, poller and watch loop is spawned under the [`Disposal`] root
//! token. A [`TaskSlot`] holds at most one running instance of a task kind.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Root cancellation for everything a session spawned.
#[derive(Debug, Default)]
pub struct Disposal {
    root: CancellationToken,
}

impl Disposal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a new task; cancelled on dispose.
    pub fn child(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn root(&self) -> &CancellationToken {
        &self.root
    }

    /// Cancels everything. Returns false if already disposed.
    pub fn dispose(&self) -> bool {
        if self.root.is_cancelled() {
            return false;
        }
        self.root.cancel();
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.root.is_cancelled()
    }
}

/// Single-instance slot for one task kind.
#[derive(Debug)]
pub struct TaskSlot {
    name: &'static str,
    token: Option<CancellationToken>,
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        Self { name, token: None }
    }

    pub fn is_running(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Claims the slot. Returns None if a task is already running or the
    /// session is disposed.
    pub fn start(&mut self, disposal: &Disposal) -> Option<CancellationToken> {
        if self.is_running() || disposal.is_disposed() {
            return None;
        }
        debug!(task = self.name, "Task started");
        let token = disposal.child();
        self.token = Some(token.clone());
        Some(token)
    }

    pub fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            if !token.is_cancelled() {
                debug!(task = self.name, "Task stopped");
            }
            token.cancel();
        }
    }
}

// ============================================================================
// Spawn helpers
// ============================================================================

/// Sends `make()` every `period` (first send after one period) until the
/// token is cancelled or the receiver is gone.
pub fn spawn_ticker<C, F>(
    token: CancellationToken,
    period: Duration,
    tx: mpsc::Sender<C>,
    make: F,
) where
    C: Send + 'static,
    F: Fn() -> C + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if tx.send(make()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Like [`spawn_ticker`], but each tick runs `work` and sends its output.
///
/// Ticks never overlap: the next tick waits for the previous `work` to
/// finish. Cancellation also aborts in-flight work.
pub fn spawn_poller<C, F, Fut>(
    token: CancellationToken,
    period: Duration,
    tx: mpsc::Sender<C>,
    work: F,
) where
    C: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = C> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = work() => result,
            };
            if token.is_cancelled() || tx.send(result).await.is_err() {
                break;
            }
        }
    });
}

/// Sends `command` once after `delay`, unless cancelled first.
pub fn spawn_delayed<C>(token: CancellationToken, delay: Duration, tx: mpsc::Sender<C>, command: C)
where
    C: Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = sleep(delay) => {
                let _ = tx.send(command).await;
            }
        }
    });
}
