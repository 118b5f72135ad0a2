//! Media catalog: tenant-scoped reads, listing, access URLs and delete.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lectern_core::models::{
    MediaAccessResponse, MediaAsset, MediaFilter, MediaPage, ObjectCleanup,
};
use lectern_core::AppError;
use lectern_db::MediaStore;
use lectern_storage::ObjectStoreGateway;
use uuid::Uuid;

use crate::object_cleanup::ObjectJanitor;
use crate::quota_ledger::QuotaLedger;

pub const DEFAULT_ACCESS_MINUTES: u32 = 60;
/// One week, the longest expiry S3 accepts for a presigned URL.
pub const MAX_ACCESS_MINUTES: u32 = 10_080;

pub struct MediaCatalog {
    store: Arc<dyn MediaStore>,
    gateway: Arc<dyn ObjectStoreGateway>,
    ledger: QuotaLedger,
    janitor: ObjectJanitor,
}

impl MediaCatalog {
    pub fn new(
        store: Arc<dyn MediaStore>,
        gateway: Arc<dyn ObjectStoreGateway>,
        ledger: QuotaLedger,
    ) -> Self {
        let janitor = ObjectJanitor::new(store.clone(), gateway.clone());
        Self {
            store,
            gateway,
            ledger,
            janitor,
        }
    }

    /// Assets of other institutions are reported as missing.
    pub async fn get_by_id_scoped(
        &self,
        media_id: Uuid,
        institution_id: Uuid,
    ) -> Result<MediaAsset, AppError> {
        match self.store.get_asset(media_id).await? {
            Some(asset) if asset.institution_id == institution_id => Ok(asset),
            Some(_) => {
                tracing::warn!(
                    media_id = %media_id,
                    institution_id = %institution_id,
                    "Cross-tenant media access"
                );
                Err(media_not_found(media_id))
            }
            None => Err(media_not_found(media_id)),
        }
    }

    /// Unscoped lookup for platform admins.
    pub async fn get_by_id_for_preview(&self, media_id: Uuid) -> Result<MediaAsset, AppError> {
        self.store
            .get_asset(media_id)
            .await?
            .ok_or_else(|| media_not_found(media_id))
    }

    pub async fn list_by_filter(
        &self,
        institution_id: Uuid,
        filter: MediaFilter,
    ) -> Result<MediaPage, AppError> {
        let filter = filter.normalized();
        let (items, total) = self.store.list_assets(institution_id, &filter).await?;
        Ok(MediaPage {
            items,
            page: filter.page,
            page_size: filter.page_size,
            total,
        })
    }

    /// Remove the asset and give its bytes back to the institution's quota in one
    /// transaction. The object delete is recorded in that transaction and attempted after
    /// commit; the sweeper retries it if the object store refuses.
    #[tracing::instrument(skip(self), fields(media_id = %media_id, institution_id = %institution_id))]
    pub async fn delete(&self, media_id: Uuid, institution_id: Uuid) -> Result<MediaAsset, AppError> {
        let mut tx = self.store.begin().await?;
        let asset = tx
            .lock_asset(media_id, institution_id)
            .await?
            .ok_or_else(|| media_not_found(media_id))?;

        if !tx.delete_asset(asset.id).await? {
            return Err(media_not_found(media_id));
        }
        self.ledger
            .release_used_tx(
                tx.as_mut(),
                asset.institution_id,
                asset.quota_type,
                asset.size_bytes,
            )
            .await?;
        let cleanup = ObjectCleanup::delete(&asset.storage_path);
        tx.insert_cleanup(&cleanup).await?;
        tx.commit().await?;

        self.janitor.run(&cleanup).await;

        tracing::info!(size_bytes = asset.size_bytes, "Media deleted");
        Ok(asset)
    }

    /// Presigned read URL. Records the access time.
    #[tracing::instrument(skip(self), fields(media_id = %media_id, institution_id = %institution_id))]
    pub async fn access_url(
        &self,
        media_id: Uuid,
        institution_id: Uuid,
        expiration_minutes: Option<u32>,
    ) -> Result<MediaAccessResponse, AppError> {
        let asset = self.get_by_id_scoped(media_id, institution_id).await?;
        let minutes = clamp_access_minutes(expiration_minutes);

        let url = self
            .gateway
            .presign_get_url(
                &asset.storage_path,
                Duration::from_secs(u64::from(minutes) * 60),
            )
            .await?;

        let now = Utc::now();
        self.store.touch_asset(asset.id, now).await?;

        Ok(MediaAccessResponse {
            media_id: asset.id,
            url,
            expires_at: now + chrono::Duration::minutes(i64::from(minutes)),
        })
    }
}

pub fn clamp_access_minutes(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_ACCESS_MINUTES)
        .clamp(1, MAX_ACCESS_MINUTES)
}

fn media_not_found(media_id: Uuid) -> AppError {
    AppError::NotFound(format!("Media {} not found", media_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, MB};
    use lectern_core::models::{MediaType, QuotaType};
    use lectern_storage::memory::{Fault, GatewayOp};

    #[tokio::test]
    async fn test_delete_returns_exact_bytes_to_quota() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();

        let kept = h.upload(institution, MediaType::Video, 30 * MB).await;
        let asset = h.upload(institution, MediaType::Video, 20 * MB).await;
        assert_eq!(h.usage(institution, QuotaType::Video).await.used_bytes, 50 * MB);

        h.catalog.delete(asset.id, institution).await.unwrap();

        assert_eq!(h.usage(institution, QuotaType::Video).await.used_bytes, 30 * MB);
        assert_eq!(h.usage(institution, QuotaType::Total).await.used_bytes, 30 * MB);
        assert!(matches!(
            h.catalog.get_by_id_scoped(asset.id, institution).await,
            Err(AppError::NotFound(_))
        ));
        assert!(!h.gateway.object_exists(&asset.storage_path));
        assert!(h.catalog.get_by_id_scoped(kept.id, institution).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_delete_changes_neither_catalog_nor_quota() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        let asset = h.upload(institution, MediaType::Document, 20 * MB).await;

        h.store.fail_next_commits(1);
        assert!(h.catalog.delete(asset.id, institution).await.is_err());

        assert!(h.catalog.get_by_id_scoped(asset.id, institution).await.is_ok());
        assert_eq!(h.usage(institution, QuotaType::Document).await.used_bytes, 20 * MB);
        assert!(h.gateway.object_exists(&asset.storage_path));
        assert_eq!(h.store.pending_cleanup_count().await, 0);
    }

    #[tokio::test]
    async fn test_object_left_by_failed_delete_is_removed_by_sweep() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        let asset = h.upload(institution, MediaType::Video, 20 * MB).await;
        h.gateway.inject_fault(GatewayOp::Delete, Fault::Backend, 1);

        h.catalog.delete(asset.id, institution).await.unwrap();
        assert_eq!(h.usage(institution, QuotaType::Video).await.used_bytes, 0);
        assert!(h.gateway.object_exists(&asset.storage_path));
        assert_eq!(h.store.pending_cleanup_count().await, 1);

        let report = h.sweeper(10).run_once().await.unwrap();
        assert_eq!(report.cleanups_completed, 1);
        assert!(!h.gateway.object_exists(&asset.storage_path));
        assert_eq!(h.store.pending_cleanup_count().await, 0);
    }

    #[tokio::test]
    async fn test_other_institution_cannot_read_or_delete() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let asset = h.upload(institution, MediaType::Video, 10 * MB).await;

        assert!(matches!(
            h.catalog.get_by_id_scoped(asset.id, intruder).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            h.catalog.delete(asset.id, intruder).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            h.catalog.access_url(asset.id, intruder, None).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(h.usage(institution, QuotaType::Video).await.used_bytes, 10 * MB);

        let preview = h.catalog.get_by_id_for_preview(asset.id).await.unwrap();
        assert_eq!(preview.institution_id, institution);
    }

    #[tokio::test]
    async fn test_list_is_scoped_filtered_and_paged() {
        let h = harness(200 * MB);
        let institution = Uuid::new_v4();
        for _ in 0..3 {
            h.upload(institution, MediaType::Video, MB).await;
        }
        h.upload(institution, MediaType::Document, MB).await;
        h.upload(Uuid::new_v4(), MediaType::Video, MB).await;

        let page = h
            .catalog
            .list_by_filter(
                institution,
                MediaFilter {
                    media_type: Some(MediaType::Video),
                    page: 1,
                    page_size: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page
            .items
            .iter()
            .all(|a| a.institution_id == institution && a.media_type == MediaType::Video));

        let by_name = h
            .catalog
            .list_by_filter(
                institution,
                MediaFilter {
                    filename_contains: Some("LECT".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_name.total, 4);
        assert_eq!(by_name.page, 1);
        assert_eq!(by_name.page_size, 20);
    }

    #[tokio::test]
    async fn test_access_url_clamps_expiry_and_records_access() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        let asset = h.upload(institution, MediaType::Video, MB).await;
        assert!(asset.last_access_time.is_none());

        let access = h
            .catalog
            .access_url(asset.id, institution, Some(1_000_000))
            .await
            .unwrap();
        assert!(access.url.contains("expires=604800"));
        assert_eq!(access.media_id, asset.id);

        let stored = h.store.get_asset(asset.id).await.unwrap().unwrap();
        assert!(stored.last_access_time.is_some());
    }

    #[test]
    fn test_clamp_access_minutes() {
        assert_eq!(clamp_access_minutes(None), 60);
        assert_eq!(clamp_access_minutes(Some(0)), 1);
        assert_eq!(clamp_access_minutes(Some(30)), 30);
        assert_eq!(clamp_access_minutes(Some(20_000)), MAX_ACCESS_MINUTES);
    }
}
