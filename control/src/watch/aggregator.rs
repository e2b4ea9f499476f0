//! Multi-source aggregator
//!
//! Runs one supervision loop per source and merges their events into a single
//! sink. Every loop owns a clone of the sink sender, so the sink closes exactly
//! when the last loop has exited.
//!
//! Events from one source keep their order; nothing is promised across sources.

use crate::apis::metrics::record_reconnect;
use crate::config::SourceConfig;
use crate::watch::source::{next_step, NextStep, SinkItem, SourceWatcher};
use crate::error::ExporterError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wait after a subscription failed to open
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Wait after a subscription dropped, to avoid thrashing a flapping API server
pub const DISCONNECT_DELAY: Duration = Duration::from_millis(100);

/// Sink capacity; a slow exporter pushes back on every source
const SINK_CAPACITY: usize = 128;

/// Owns all source watchers and the shared sink
pub struct Aggregator {
    watchers: Vec<Arc<SourceWatcher>>,
    reconnect_backoff: Duration,
}

impl Aggregator {
    /// Build one watcher per config; fails fast on any invalid config
    pub fn new(configs: &[SourceConfig]) -> Result<Self, ExporterError> {
        let watchers = configs
            .iter()
            .map(SourceWatcher::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_watchers(watchers))
    }

    /// Aggregate pre-built watchers
    pub fn from_watchers(watchers: Vec<SourceWatcher>) -> Self {
        Self {
            watchers: watchers.into_iter().map(Arc::new).collect(),
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Start every supervision loop and return the merged sink.
    ///
    /// The returned handle completes once every loop has exited, which is also
    /// the moment the sink closes.
    pub fn run(self, token: CancellationToken) -> (mpsc::Receiver<SinkItem>, JoinHandle<()>) {
        let (sink, rx) = mpsc::channel(SINK_CAPACITY);
        let mut loops = JoinSet::new();

        for watcher in self.watchers {
            loops.spawn(supervise(
                watcher,
                sink.clone(),
                token.clone(),
                self.reconnect_backoff,
            ));
        }
        // Only the loops hold senders from here on
        drop(sink);

        let handle = tokio::spawn(async move {
            while let Some(result) = loops.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Source supervision loop panicked");
                }
            }
            info!("All route sources stopped");
        });

        (rx, handle)
    }
}

/// Keep one source connected until cancellation
async fn supervise(
    watcher: Arc<SourceWatcher>,
    sink: mpsc::Sender<SinkItem>,
    token: CancellationToken,
    reconnect_backoff: Duration,
) {
    let source = watcher.name().to_string();
    let mut attempt: u64 = 0;

    loop {
        if attempt > 0 {
            record_reconnect(&source);
        }
        attempt += 1;

        debug!(source = %source, attempt, "Opening route watch");

        let mut events = match watcher.watch(token.clone()).await {
            Ok(events) => events,
            Err(e) => {
                warn!(source = %source, error = %e, "Unable to connect, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_backoff) => continue,
                    _ = token.cancelled() => break,
                }
            }
        };

        while let Some(item) = events.recv().await {
            tokio::select! {
                sent = sink.send(item) => {
                    if sent.is_err() {
                        info!(source = %source, "Sink closed, stopping source");
                        return;
                    }
                }
                _ = token.cancelled() => {
                    debug!(source = %source, "Cancelled while forwarding");
                    break;
                }
            }
        }

        match next_step(watcher.state()) {
            NextStep::Stop => break,
            NextStep::Reconnect if token.is_cancelled() => break,
            NextStep::Reconnect => {
                info!(source = %source, "Route watch disconnected, reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(DISCONNECT_DELAY) => {}
                    _ = token.cancelled() => break,
                }
            }
        }
    }

    info!(source = %source, "Route source cancelled");
}
