//! Services wired to the in-memory store and gateway.

use std::sync::Arc;

use lectern_core::models::{
    CompleteUploadRequest, InitiateUploadResponse, MediaAsset, MediaType, QuotaType, QuotaUsage,
    UploadSession,
};
use lectern_core::{AppError, UploadConfig};
use lectern_db::{MediaStore, MemoryStore};
use lectern_storage::InMemoryGateway;
use uuid::Uuid;

use crate::{
    ExpirySweeper, InitiateUpload, MediaCatalog, ObjectJanitor, QuotaDefaults, QuotaLedger,
    UploadCoordinator,
};

pub const MB: i64 = 1024 * 1024;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<InMemoryGateway>,
    pub ledger: QuotaLedger,
    pub coordinator: Arc<UploadCoordinator>,
    pub catalog: MediaCatalog,
    pub janitor: ObjectJanitor,
}

/// Every account gets `quota_bytes`.
pub fn harness(quota_bytes: i64) -> Harness {
    harness_with(QuotaDefaults {
        video_bytes: quota_bytes,
        document_bytes: quota_bytes,
        total_bytes: quota_bytes,
    })
}

pub fn harness_with(defaults: QuotaDefaults) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(InMemoryGateway::new());
    let ledger = QuotaLedger::new(store.clone(), defaults);
    let coordinator = Arc::new(UploadCoordinator::new(
        store.clone(),
        gateway.clone(),
        ledger.clone(),
        UploadConfig::default(),
    ));
    let catalog = MediaCatalog::new(store.clone(), gateway.clone(), ledger.clone());
    let janitor = ObjectJanitor::new(store.clone(), gateway.clone());

    Harness {
        store,
        gateway,
        ledger,
        coordinator,
        catalog,
        janitor,
    }
}

impl Harness {
    pub async fn initiate(
        &self,
        institution_id: Uuid,
        media_type: MediaType,
        file_size: i64,
    ) -> Result<InitiateUploadResponse, AppError> {
        self.coordinator
            .initiate(InitiateUpload {
                institution_id,
                uploader_id: Uuid::new_v4(),
                filename: "lecture.mp4".to_string(),
                file_size,
                media_type,
                content_type: None,
            })
            .await
    }

    /// Upload `actual_size` bytes spread over every planned part, the way a client would.
    pub fn upload_parts(
        &self,
        response: &InitiateUploadResponse,
        actual_size: i64,
    ) -> CompleteUploadRequest {
        let count = response.part_count as i64;
        let base = actual_size / count;
        let sizes: Vec<u64> = (0..count)
            .map(|i| {
                if i == count - 1 {
                    (actual_size - base * (count - 1)) as u64
                } else {
                    base as u64
                }
            })
            .collect();

        let completed_parts = self
            .gateway
            .upload_parts(&response.object_store_upload_id, &sizes)
            .unwrap();
        CompleteUploadRequest {
            upload_id: response.object_store_upload_id.clone(),
            completed_parts,
        }
    }

    /// Initiate, upload and complete in one go.
    pub async fn upload(
        &self,
        institution_id: Uuid,
        media_type: MediaType,
        size: i64,
    ) -> MediaAsset {
        let response = self.initiate(institution_id, media_type, size).await.unwrap();
        let request = self.upload_parts(&response, size);
        self.coordinator
            .complete(institution_id, response.upload_session_id, request)
            .await
            .unwrap()
    }

    pub fn sweeper(&self, batch_size: i64) -> ExpirySweeper {
        ExpirySweeper::new(
            self.store.clone(),
            self.coordinator.clone(),
            self.ledger.clone(),
            self.janitor.clone(),
            &UploadConfig {
                sweep_batch_size: batch_size,
                ..UploadConfig::default()
            },
        )
    }

    pub async fn session(&self, session_id: Uuid) -> UploadSession {
        self.store.get_session(session_id).await.unwrap().unwrap()
    }

    pub async fn usage(&self, institution_id: Uuid, quota_type: QuotaType) -> QuotaUsage {
        self.ledger
            .usage(institution_id)
            .await
            .unwrap()
            .get(quota_type)
            .cloned()
            .unwrap()
    }
}
