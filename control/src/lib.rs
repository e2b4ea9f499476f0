//! Route Exporter Library
//!
//! Watches OpenShift routes on one or more clusters and keeps a Prometheus
//! file_sd directory in sync, reloading the scraper after changes settle.
//!
//! Data flows one way:
//! cluster → `watch::SourceWatcher` → `watch::Aggregator` → `export::Exporter`
//! → export directory + reload notifier.

pub mod apis;
pub mod config;
pub mod error;
pub mod export;
pub mod server;
pub mod watch;

pub use config::{ExporterConfig, SourceConfig};
pub use error::ExporterError;
