//! Object store setup

use anyhow::{Context, Result};
use lectern_core::Config;
use lectern_storage::{create_gateway, ObjectStoreGateway};
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn ObjectStoreGateway>> {
    tracing::info!("Initializing object store gateway...");
    let gateway = create_gateway(config)
        .await
        .context("Failed to initialize object store gateway")?;
    tracing::info!(backend = gateway.backend_name(), "Object store gateway ready");
    Ok(gateway)
}
