//! Server startup and graceful shutdown

use anyhow::Result;
use axum::Router;
use lectern_core::Config;
use lectern_services::SweeperHandle;

/// Serve until Ctrl+C or SIGTERM, then stop the sweeper.
pub async fn start_server(config: &Config, app: Router, sweeper: SweeperHandle) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.server_port());
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let upload = config.upload();
    tracing::info!(
        max_video_mb = upload.max_video_size_bytes / 1024 / 1024,
        max_document_mb = upload.max_document_size_bytes / 1024 / 1024,
        part_size_mb = upload.part_size_bytes / 1024 / 1024,
        session_ttl_minutes = upload.session_ttl_minutes,
        "Server ready and accepting connections"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.shutdown().await;
    tracing::info!("Shutdown complete");

    served?;
    Ok(())
}

/// Resolves on Ctrl+C (SIGINT) or SIGTERM. A handler that cannot be installed is logged
/// and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
