//! Full pipeline harness
//!
//! Wires fake clusters through the aggregator into a Prometheus exporter that
//! writes to a temporary directory. Every processed item is reported back
//! through an error callback so tests can wait for outcomes instead of sleeping.

use super::fake_cluster::FakeCluster;
use route_exporter::export::{ErrorCallback, Exporter, PrometheusExporter, ReloadNotifier};
use route_exporter::watch::{Aggregator, SourceWatcher};
use route_exporter::{ExporterError, SourceConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Debounce delay used by the harness
pub const DEBOUNCE: Duration = Duration::from_millis(50);

/// Maximum wait for any single pipeline outcome
const OUTCOME_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct CountingNotifier {
    reloads: AtomicUsize,
}

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl ReloadNotifier for CountingNotifier {
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Pipeline {
    pub export_dir: TempDir,
    pub token: CancellationToken,
    pub notifier: Arc<CountingNotifier>,
    /// `None` for a processed event, `Some(message)` for a reported error
    outcomes: mpsc::UnboundedReceiver<Option<String>>,
    consumer: JoinHandle<()>,
    sources: JoinHandle<()>,
}

impl Pipeline {
    /// Start a pipeline over the given (config, fake cluster) pairs
    pub fn start(clusters: Vec<(SourceConfig, Arc<FakeCluster>)>) -> Self {
        let export_dir = tempfile::tempdir().expect("temp export dir");
        let token = CancellationToken::new();
        let notifier = Arc::new(CountingNotifier::default());

        let (outcome_tx, outcomes) = mpsc::unbounded_channel();
        let callback: ErrorCallback = Arc::new(move |error: Option<&ExporterError>| {
            let _ = outcome_tx.send(error.map(|e| e.to_string()));
        });

        let exporter =
            PrometheusExporter::new(export_dir.path(), vec![callback], notifier.clone(), DEBOUNCE);

        let watchers = clusters
            .into_iter()
            .map(|(config, cluster)| {
                SourceWatcher::with_subscriber(&config, cluster).expect("valid source config")
            })
            .collect();
        let aggregator =
            Aggregator::from_watchers(watchers).with_reconnect_backoff(Duration::from_millis(20));
        let (sink, sources) = aggregator.run(token.clone());

        let consumer = tokio::spawn(async move {
            exporter.consume(sink).await;
        });

        Self {
            export_dir,
            token,
            notifier,
            outcomes,
            consumer,
            sources,
        }
    }

    /// Single cluster with the given static labels
    pub fn single(labels: &[(&str, &str)]) -> (Self, Arc<FakeCluster>) {
        let cluster = FakeCluster::new();
        let mut config = SourceConfig::new("/kube/fake");
        for (k, v) in labels {
            config.labels.insert(k.to_string(), v.to_string());
        }
        (Self::start(vec![(config, cluster.clone())]), cluster)
    }

    /// Wait for the next processed item; `Ok(())` on success
    pub async fn next_outcome(&mut self) -> Result<(), String> {
        let outcome = tokio::time::timeout(OUTCOME_TIMEOUT, self.outcomes.recv())
            .await
            .expect("timed out waiting for pipeline outcome")
            .expect("exporter stopped reporting");
        match outcome {
            None => Ok(()),
            Some(message) => Err(message),
        }
    }

    /// True if no item gets processed within `wait`
    pub async fn stays_quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.outcomes.recv()).await.is_err()
    }

    pub fn target_path(&self, host: &str) -> PathBuf {
        self.export_dir.path().join(format!("{}.json", host))
    }

    /// Parsed export record, `None` if the file does not exist
    pub fn read_target(&self, host: &str) -> Option<serde_json::Value> {
        let raw = std::fs::read_to_string(self.target_path(host)).ok()?;
        Some(serde_json::from_str(&raw).expect("export record should be valid JSON"))
    }

    /// Cancel everything and wait for the exporter to finish
    pub async fn shutdown(self) -> TempDir {
        self.token.cancel();
        tokio::time::timeout(OUTCOME_TIMEOUT, self.consumer)
            .await
            .expect("exporter did not stop after cancellation")
            .expect("exporter task panicked");
        self.sources.await.expect("source supervisor panicked");
        self.export_dir
    }
}
