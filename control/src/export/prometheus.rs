//! Prometheus file_sd exporter
//!
//! Keeps one `<host>.json` file per live route in the export directory. The
//! exporter is the only writer of that directory.
//!
//! ## File Format
//!
//! ```json
//! [{"lables":{"Namespace":"default","team":"x"},"targets":["a.example.com"]}]
//! ```
//!
//! `lables` is the field name the consuming scrape config expects.

use crate::apis::metrics::record_export_result;
use crate::error::ExporterError;
use crate::export::debounce::{spawn_debouncer, DebounceHandle};
use crate::export::reload::ReloadNotifier;
use crate::export::{ErrorCallback, Exporter};
use crate::watch::SinkItem;
use async_trait::async_trait;
use common::{Event, Labels};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const PROMETHEUS_EXPORTER_NAME: &str = "prometheus";

/// One target group of a file_sd document
#[derive(Debug, Serialize)]
struct TargetGroup<'a> {
    lables: &'a Labels,
    targets: [&'a str; 1],
}

/// Render the export document for an event
pub fn render_target_file(event: &Event) -> Result<Vec<u8>, ExporterError> {
    let document = [TargetGroup {
        lables: &event.labels,
        targets: [event.host()],
    }];
    let mut bytes = serde_json::to_vec(&document)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Exports routes for Prometheus file based service discovery
pub struct PrometheusExporter {
    export_dir: PathBuf,
    callbacks: Vec<ErrorCallback>,
}

impl PrometheusExporter {
    /// Create the exporter and start its reload debouncer
    pub fn new(
        export_dir: impl Into<PathBuf>,
        mut callbacks: Vec<ErrorCallback>,
        notifier: Arc<dyn ReloadNotifier>,
        debounce_delay: Duration,
    ) -> Self {
        let (debounce, _task) = spawn_debouncer(debounce_delay, notifier);
        callbacks.push(reload_callback(debounce));

        Self {
            export_dir: export_dir.into(),
            callbacks,
        }
    }

    /// Path of the export record for a hostname
    pub fn target_path(&self, host: &str) -> PathBuf {
        self.export_dir.join(format!("{}.json", host))
    }

    /// Apply one sink item to the export directory
    async fn process(&self, item: SinkItem) -> Result<(), ExporterError> {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                record_export_result("malformed");
                return Err(e);
            }
        };

        let path = self.target_path(event.host());
        let result = if event.event_type.is_upsert() {
            self.write_record(&path, &event).await
        } else {
            self.remove_record(&path, &event).await
        };

        match &result {
            Ok(()) => record_export_result("success"),
            Err(ExporterError::Serialization(_)) => record_export_result("serialization_error"),
            Err(_) => record_export_result("io_error"),
        }
        result
    }

    /// Replace the record; written to a temp file and renamed so readers never
    /// see a partial document
    async fn write_record(&self, path: &Path, event: &Event) -> Result<(), ExporterError> {
        let content = render_target_file(event)?;
        let tmp = path.with_extension("json.tmp");

        if let Err(e) = tokio::fs::write(&tmp, &content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ExporterError::io(&tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ExporterError::io(path, e));
        }

        info!(
            host = %event.host(),
            route = %event.route.key(),
            event = %event.event_type,
            labels = ?event.labels,
            "Exported target"
        );
        Ok(())
    }

    /// Remove the record; an already missing file is not an error
    async fn remove_record(&self, path: &Path, event: &Event) -> Result<(), ExporterError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!(host = %event.host(), route = %event.route.key(), "Removed target");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(host = %event.host(), "Target already absent");
                Ok(())
            }
            Err(e) => Err(ExporterError::io(path, e)),
        }
    }

    /// Invoke every callback; `None` means the item was applied
    fn trigger(&self, error: Option<&ExporterError>) {
        for callback in &self.callbacks {
            callback(error);
        }
    }
}

#[async_trait]
impl Exporter for PrometheusExporter {
    async fn consume(&self, mut rx: mpsc::Receiver<SinkItem>) {
        info!(export_dir = %self.export_dir.display(), "Prometheus exporter started");

        while let Some(item) = rx.recv().await {
            let outcome = self.process(item).await;
            if let Err(e) = &outcome {
                warn!(error = %e, "Export failed, skipping event");
            }
            self.trigger(outcome.as_ref().err());
        }

        info!("Event stream closed, exporter finished");
    }
}

/// Successful events arm the reload debouncer
fn reload_callback(debounce: DebounceHandle) -> ErrorCallback {
    Arc::new(move |error: Option<&ExporterError>| {
        if error.is_none() {
            debounce.signal();
        }
    })
}
