//! reqaudit-server - Main entry point

use anyhow::{Context, Result};
use reqaudit::{configurator, AuditLayer};
use reqaudit_server::{
    config::Config,
    logging::{init_logging, LogConfig},
    routes,
};
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("reqaudit-server")
        .filter_directives("reqaudit=info,reqaudit_server=debug,tower_http=info")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    info!("Starting reqaudit server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let resolved = configurator::resolve(&config.audit).await;
    if !resolved.warnings.is_empty() {
        warn!(
            warnings = resolved.warnings.len(),
            emitter = resolved.emitter.name(),
            "Audit configured with warnings"
        );
    }
    let audit = AuditLayer::from_resolved(resolved, &config.audit);

    let app = routes::router(audit.clone());

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let timeout_secs = config.server.shutdown_timeout_secs;
    info!(
        pending = audit.pending_emissions(),
        "Waiting up to {} seconds for audit emissions to drain", timeout_secs
    );
    if !audit.drain(Duration::from_secs(timeout_secs)).await {
        warn!(
            pending = audit.pending_emissions(),
            "Audit emissions still running at shutdown deadline"
        );
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
