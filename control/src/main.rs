use anyhow::{Context, Result};
use route_exporter::config::ExporterConfig;
use route_exporter::error::ExporterError;
use route_exporter::export::{new_exporter, ErrorCallback, ProcessSignalNotifier};
use route_exporter::server::{bind_metrics, serve_metrics};
use route_exporter::watch::Aggregator;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (needed for Kubernetes TLS client)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok(); // Ignore error if already installed

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ExporterConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        exporter = %config.exporter,
        export_dir = %config.export_dir.display(),
        targets = config.targets.len(),
        "Starting route exporter"
    );

    let token = CancellationToken::new();

    if let Some(addr) = &config.metrics_addr {
        let listener = bind_metrics(addr)
            .await
            .with_context(|| format!("Failed to bind metrics endpoint on {}", addr))?;
        tokio::spawn(serve_metrics(listener, token.clone()));
    }

    let log_callback: ErrorCallback = Arc::new(log_error);
    let notifier = Arc::new(ProcessSignalNotifier::new(config.reload_process.clone()));
    info!(process = %notifier.process_name(), "Reload signals go to matching processes");
    let exporter = new_exporter(
        &config.exporter,
        config.export_dir.clone(),
        vec![log_callback],
        notifier,
        config.debounce_delay(),
    )?;

    let aggregator =
        Aggregator::new(&config.targets)?.with_reconnect_backoff(config.reconnect_backoff());
    let (sink, sources) = aggregator.run(token.clone());

    let mut consumer = tokio::spawn(async move {
        exporter.consume(sink).await;
    });

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let stop_signal = tokio::select! {
        _ = &mut consumer => None,
        _ = tokio::signal::ctrl_c() => Some("SIGINT"),
        _ = sigterm.recv() => Some("SIGTERM"),
        _ = sigquit.recv() => Some("SIGQUIT"),
    };

    match stop_signal {
        None => info!("Watchers have finished"),
        Some(name) => {
            info!("Received signal {}, stopping", name);
            token.cancel();
            // The exporter drains the sink, which closes once every source stopped
            if let Err(e) = consumer.await {
                error!(error = %e, "Exporter task failed");
            }
        }
    }

    if let Err(e) = sources.await {
        warn!(error = %e, "Source supervisor did not exit cleanly");
    }

    Ok(())
}

fn log_error(err: Option<&ExporterError>) {
    if let Some(err) = err {
        error!(error = %err, "Export error");
    }
}
