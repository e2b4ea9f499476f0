//! Debounced reload trigger
//!
//! Coalesces bursts of export changes into one reload. A signal arms the
//! timer, later signals push the deadline back, and the reload runs once the
//! timer expires without interruption.

use crate::apis::metrics::record_reload;
use crate::export::reload::ReloadNotifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Default quiet period before reloading
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Armed(Instant),
}

impl DebounceState {
    /// A signal (re)arms the timer
    pub fn on_signal(self, now: Instant, delay: Duration) -> DebounceState {
        DebounceState::Armed(now + delay)
    }

    /// The timer expired; returns the next state and whether to reload
    pub fn on_timer(self) -> (DebounceState, bool) {
        match self {
            DebounceState::Armed(_) => (DebounceState::Idle, true),
            DebounceState::Idle => (DebounceState::Idle, false),
        }
    }
}

/// Cheap handle used to signal the debouncer
#[derive(Clone)]
pub struct DebounceHandle {
    tx: mpsc::Sender<()>,
}

impl DebounceHandle {
    /// Never blocks. A full channel already holds a pending signal.
    pub fn signal(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => warn!("Reload debouncer is gone, dropping signal"),
        }
    }
}

/// Spawn the debounce task. It exits once every handle is dropped, firing a
/// pending reload first.
pub fn spawn_debouncer(
    delay: Duration,
    notifier: Arc<dyn ReloadNotifier>,
) -> (DebounceHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);
    let task = tokio::spawn(run(rx, delay, notifier));
    (DebounceHandle { tx }, task)
}

async fn run(mut rx: mpsc::Receiver<()>, delay: Duration, notifier: Arc<dyn ReloadNotifier>) {
    let mut state = DebounceState::Idle;

    loop {
        match state {
            DebounceState::Idle => match rx.recv().await {
                Some(()) => state = state.on_signal(Instant::now(), delay),
                None => break,
            },
            DebounceState::Armed(deadline) => {
                tokio::select! {
                    signal = rx.recv() => match signal {
                        Some(()) => {
                            debug!("Reload postponed");
                            state = state.on_signal(Instant::now(), delay);
                        }
                        None => {
                            reload(&notifier).await;
                            break;
                        }
                    },
                    _ = sleep_until(deadline) => {
                        let (next, fire) = state.on_timer();
                        state = next;
                        if fire {
                            reload(&notifier).await;
                        }
                    }
                }
            }
        }
    }

    debug!("Reload debouncer stopped");
}

/// The notifier may scan the process table, keep it off the async workers
async fn reload(notifier: &Arc<dyn ReloadNotifier>) {
    record_reload();
    let notifier = notifier.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || notifier.reload()).await {
        warn!(error = %e, "Reload notifier panicked");
    }
}
