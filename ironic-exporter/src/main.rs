// ironic-exporter/src/main.rs - Exporter process: metrics endpoint plus notification sessions

use anyhow::{Context, Result};
use ironic_exporter::{
    observability, prometheus, AmqpBroker, BrokerCredentials, ExporterConfig, NotificationService,
    PrometheusSink,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    tracing::info!(
        service.name = "ironic-exporter",
        service.version = env!("CARGO_PKG_VERSION"),
        "Starting Ironic exporter"
    );

    let config = ExporterConfig::from_env().context("invalid exporter configuration")?;
    prometheus::install_exporter(config.metrics_addr(), &config.version)?;

    if !config.notifications_enabled {
        tracing::info!("Notifications disabled, serving metrics only");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received shutdown signal");
        return Ok(());
    }

    let credentials = match BrokerCredentials::resolve(&config) {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!(error = %e, "Failed to obtain broker credentials");
            return Err(e);
        }
    };

    let broker = Arc::new(AmqpBroker::new(&config, credentials));
    let service = NotificationService::new(&config, broker, Arc::new(PrometheusSink));
    let mut handles = service.start();

    tracing::info!(
        sessions.count = handles.len(),
        broker.host = %config.broker_host,
        "All notification sessions started"
    );

    tokio::select! {
        _ = futures::future::join_all(handles.iter_mut()) => {
            tracing::warn!("All notification sessions have stopped, serving remaining metrics");
            tokio::signal::ctrl_c().await?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    service.shutdown();
    for handle in handles {
        if !handle.is_finished() {
            let _ = handle.await;
        }
    }

    tracing::info!("Exporter shutting down gracefully");
    Ok(())
}
