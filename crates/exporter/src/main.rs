#![forbid(unsafe_code)]

//! FAH exporter: serves client and donor metrics on demand.

use std::sync::Arc;

use fah_exporter::{http, Collector, EnrichmentGate, ExporterConfig, StatsApi};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ExporterConfig::from_args()?;
    init_tracing(&config);

    let enrichment = match &config.api {
        Some(api) => {
            info!(url = %api.base_url, throttle = ?api.throttle, "donor API enabled");
            Some(EnrichmentGate::new(
                StatsApi::new(&api.base_url, api.timeout)?,
                api.throttle,
            ))
        }
        None => None,
    };

    let collector = Arc::new(Collector::new(
        config.fah_address.clone(),
        config.fah_timeout,
        enrichment,
    )?);
    let app = http::router(Arc::clone(&collector), &config.metrics_path);

    let listener = tokio::net::TcpListener::bind(config.listen_address).await?;
    info!(fah_address = %collector.address(), "FAH client address");
    info!(listen = %listener.local_addr()?, path = %config.metrics_path, "starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing(config: &ExporterConfig) {
    let (filter, rejected) = match EnvFilter::try_new(&config.log_level) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new("info"), Some(e)),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_timestamps {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().without_time())
            .init();
    }

    if let Some(e) = rejected {
        warn!(level = %config.log_level, error = %e, "unrecognized log level, using 'info'");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
