//! Exporters consume the merged event stream
//!
//! - `prometheus`: file_sd target files, one per host
//! - `debounce`: coalesces changes into a single reload
//! - `reload`: tells the scraper to re-read its targets

pub mod debounce;
pub mod prometheus;
pub mod reload;

use crate::error::ExporterError;
use crate::watch::SinkItem;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use prometheus::{PrometheusExporter, PROMETHEUS_EXPORTER_NAME};
pub use reload::{ProcessSignalNotifier, ReloadNotifier};

/// Invoked after every processed item; `None` on success
pub type ErrorCallback = Arc<dyn Fn(Option<&ExporterError>) + Send + Sync>;

/// An exporter consumes sink items until the sink closes
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn consume(&self, rx: mpsc::Receiver<SinkItem>);
}

/// Build an exporter by name
pub fn new_exporter(
    name: &str,
    export_dir: impl Into<PathBuf>,
    callbacks: Vec<ErrorCallback>,
    notifier: Arc<dyn ReloadNotifier>,
    debounce_delay: Duration,
) -> Result<Box<dyn Exporter>, ExporterError> {
    match name {
        PROMETHEUS_EXPORTER_NAME => Ok(Box::new(PrometheusExporter::new(
            export_dir,
            callbacks,
            notifier,
            debounce_delay,
        ))),
        other => Err(ExporterError::config(format!(
            "exporter '{}' does not exist",
            other
        ))),
    }
}
