//! Application state shared by every handler.

use crate::auth::JwtAuth;
use lectern_core::UploadConfig;
use lectern_db::MediaStore;
use lectern_services::{MediaCatalog, QuotaDefaults, QuotaLedger, UploadCoordinator};
use lectern_storage::ObjectStoreGateway;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MediaStore>,
    pub gateway: Arc<dyn ObjectStoreGateway>,
    pub ledger: QuotaLedger,
    pub coordinator: Arc<UploadCoordinator>,
    pub catalog: Arc<MediaCatalog>,
    pub jwt: JwtAuth,
}

impl AppState {
    /// Wire the services on top of a store and a gateway.
    pub fn new(
        store: Arc<dyn MediaStore>,
        gateway: Arc<dyn ObjectStoreGateway>,
        upload: &UploadConfig,
        jwt_secret: &str,
    ) -> Self {
        let ledger = QuotaLedger::new(store.clone(), QuotaDefaults::from_config(upload));
        let coordinator = Arc::new(UploadCoordinator::new(
            store.clone(),
            gateway.clone(),
            ledger.clone(),
            upload.clone(),
        ));
        let catalog = Arc::new(MediaCatalog::new(
            store.clone(),
            gateway.clone(),
            ledger.clone(),
        ));

        Self {
            store,
            gateway,
            ledger,
            coordinator,
            catalog,
            jwt: JwtAuth::new(jwt_secret),
        }
    }
}
