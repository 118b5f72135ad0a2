//! Application setup and initialization
//!
//! Everything `main` needs to go from a `Config` to a running server, split per concern.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;
pub mod validation;

use crate::state::AppState;
use anyhow::{Context, Result};
use lectern_core::Config;
use lectern_services::SweeperHandle;
use std::sync::Arc;

/// Initialize the entire application. The returned sweeper handle must be shut down with
/// the server.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router, SweeperHandle)> {
    validation::validate_config(&config).context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.log_format())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let pool = database::setup_database(&config).await?;
    let gateway = storage::setup_storage(&config).await?;

    let (state, sweeper) = services::initialize_services(&config, pool, gateway);
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router, sweeper))
}
