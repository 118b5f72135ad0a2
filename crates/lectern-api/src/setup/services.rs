//! Service wiring and background tasks

use crate::state::AppState;
use lectern_core::Config;
use lectern_db::PgMediaStore;
use lectern_services::{ExpirySweeper, ObjectJanitor, SweeperHandle};
use lectern_storage::ObjectStoreGateway;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Build the application state on PostgreSQL and start the background sweeper.
pub fn initialize_services(
    config: &Config,
    pool: PgPool,
    gateway: Arc<dyn ObjectStoreGateway>,
) -> (Arc<AppState>, SweeperHandle) {
    let store = Arc::new(PgMediaStore::new(pool));
    let upload = config.upload();
    let state = AppState::new(store.clone(), gateway.clone(), upload, config.jwt_secret());

    let janitor = ObjectJanitor::new(store.clone(), gateway);
    let sweeper = Arc::new(ExpirySweeper::new(
        store,
        state.coordinator.clone(),
        state.ledger.clone(),
        janitor,
        upload,
    ));
    let handle = sweeper.start(Duration::from_secs(upload.sweep_interval_seconds));
    tracing::info!(
        interval_seconds = upload.sweep_interval_seconds,
        batch_size = upload.sweep_batch_size,
        "Expiry sweeper started"
    );

    (Arc::new(state), handle)
}
