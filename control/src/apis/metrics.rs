//! Exporter metrics
//!
//! Counters for the watch, export and reload stages, gathered into one registry.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Exporter metrics registry
    pub static ref EXPORTER_METRICS_REGISTRY: Registry = Registry::new();

    /// Route events received from the clusters
    static ref EVENTS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "route_exporter_events_total",
            "Total number of route events received per source",
        );
        let counter = IntCounterVec::new(opts, &["source", "type"])
            .expect("Failed to create counter");
        EXPORTER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Outcome of every item handled by the export engine
    static ref EXPORT_RESULTS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "route_exporter_export_results_total",
            "Total number of processed export items by result",
        );
        let counter = IntCounterVec::new(opts, &["result"])
            .expect("Failed to create counter");
        EXPORTER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Reconnect attempts per source
    static ref RECONNECTS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "route_exporter_reconnects_total",
            "Total number of watch reconnects per source",
        );
        let counter = IntCounterVec::new(opts, &["source"])
            .expect("Failed to create counter");
        EXPORTER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Debounced reloads performed
    static ref RELOADS_TOTAL: IntCounter = {
        let counter = IntCounter::new(
            "route_exporter_reloads_total",
            "Total number of debounced reloads",
        )
        .expect("Failed to create counter");
        EXPORTER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Reload signals delivered to matching processes
    static ref RELOAD_SIGNALS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "route_exporter_reload_signals_total",
            "Total number of reload signals sent by result",
        );
        let counter = IntCounterVec::new(opts, &["result"])
            .expect("Failed to create counter");
        EXPORTER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };
}

/// Record a route event emitted by a source
pub fn record_event(source: &str, event_type: &str) {
    EVENTS_TOTAL.with_label_values(&[source, event_type]).inc();
}

/// Record an export outcome ("success", "io_error", "malformed", ...)
pub fn record_export_result(result: &str) {
    EXPORT_RESULTS_TOTAL.with_label_values(&[result]).inc();
}

/// Record a reconnect of a source
pub fn record_reconnect(source: &str) {
    RECONNECTS_TOTAL.with_label_values(&[source]).inc();
}

/// Record a debounced reload
pub fn record_reload() {
    RELOADS_TOTAL.inc();
}

/// Record a reload signal delivery ("delivered" or "failed")
pub fn record_reload_signal(result: &str) {
    RELOAD_SIGNALS_TOTAL.with_label_values(&[result]).inc();
}

/// Gather exporter metrics in the Prometheus text format
pub fn gather_exporter_metrics() -> Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = EXPORTER_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}
