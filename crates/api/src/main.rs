use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use aggregator_api::app::{build_app, services};
use aggregator_infra::config::{AppConfig, DEFAULT_LOG_LEVEL};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            aggregator_observability::init(DEFAULT_LOG_LEVEL);
            error!(error = %e, "invalid configuration");
            return Err(e).context("loading configuration");
        }
    };
    aggregator_observability::init(&config.log_level);

    let services = Arc::new(
        services::build_services(&config)
            .await
            .context("building services")?,
    );

    // Release the scheduler, client and store whether serving succeeded or not.
    let result = serve(&config, services.clone()).await;
    services.shutdown().await;
    if let Err(e) = &result {
        error!(error = %e, "server exited with error");
    }
    result
}

async fn serve(config: &AppConfig, services: Arc<services::AppServices>) -> anyhow::Result<()> {
    services
        .start_background()
        .await
        .context("starting sync scheduler")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, build_app(services.clone()))
        .with_graceful_shutdown(shutdown_signal(services))
        .await
        .context("http server failed")?;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. The scheduler is stopped before connections
/// start draining so no tick begins during shutdown.
async fn shutdown_signal(services: Arc<services::AppServices>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
    services.stop_background().await;
}
