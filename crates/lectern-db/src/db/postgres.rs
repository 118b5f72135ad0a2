use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lectern_core::models::{
    MediaAsset, MediaFilter, ObjectCleanup, QuotaAccount, QuotaReservation, QuotaType,
    UploadSession, UploadStatus,
};
use lectern_core::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::rows::{
    convert_all, AssetRow, CleanupRow, QuotaAccountRow, ReservationRow, SessionRow,
};
use super::store::{MediaStore, StoreTx};

const SESSION_COLUMNS: &str = "id, institution_id, uploader_id, filename, content_type, \
     declared_size_bytes, media_type, storage_key, object_store_upload_id, part_size, \
     part_count, status, reservation_id, created_at, updated_at, expires_at";

const ASSET_COLUMNS: &str = "id, institution_id, uploader_id, upload_session_id, title, \
     filename, media_type, quota_type, content_type, size_bytes, storage_path, status, \
     upload_time, last_access_time";

const ACCOUNT_COLUMNS: &str =
    "institution_id, quota_type, total_bytes, reserved_bytes, used_bytes, updated_at";

const RESERVATION_COLUMNS: &str = "id, institution_id, quota_type, reserved_bytes, \
     committed_bytes, status, created_at, updated_at";

const CLEANUP_COLUMNS: &str = "id, storage_key, upload_id, delete_object, attempts, \
     last_error, created_at, updated_at";

/// Escape LIKE wildcards so a filename filter matches literally.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn status_list(statuses: &[UploadStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MediaStore for PgMediaStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to begin transaction");
            AppError::Database(e)
        })?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM upload_session WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UploadSession::try_from).transpose()
    }

    async fn list_stale_sessions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<UploadSession>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM upload_session
            WHERE status IN ('INITIATED', 'UPLOADING') AND expires_at <= $1
            ORDER BY expires_at
            LIMIT $2
            "#,
            SESSION_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<QuotaReservation>, AppError> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM quota_reservation WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QuotaReservation::try_from).transpose()
    }

    async fn list_orphaned_reservations(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QuotaReservation>, AppError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            r#"
            SELECT {}
            FROM quota_reservation r
            WHERE r.status = 'ACTIVE'
              AND r.created_at <= $1
              AND NOT EXISTS (SELECT 1 FROM upload_session s WHERE s.reservation_id = r.id)
            ORDER BY r.created_at
            LIMIT $2
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError> {
        let row = sqlx::query_as::<_, AssetRow>(&format!(
            "SELECT {} FROM media_asset WHERE id = $1",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MediaAsset::try_from).transpose()
    }

    async fn get_asset_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<MediaAsset>, AppError> {
        let row = sqlx::query_as::<_, AssetRow>(&format!(
            "SELECT {} FROM media_asset WHERE upload_session_id = $1",
            ASSET_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MediaAsset::try_from).transpose()
    }

    async fn list_assets(
        &self,
        institution_id: Uuid,
        filter: &MediaFilter,
    ) -> Result<(Vec<MediaAsset>, i64), AppError> {
        let media_type = filter.media_type.map(|t| t.as_str().to_string());
        let pattern = filter.filename_contains.as_deref().map(like_pattern);

        let rows = sqlx::query_as::<_, AssetRow>(&format!(
            r#"
            SELECT {}
            FROM media_asset
            WHERE institution_id = $1
              AND ($2::text IS NULL OR media_type = $2)
              AND ($3::text IS NULL OR filename ILIKE $3)
            ORDER BY upload_time DESC, id
            LIMIT $4 OFFSET $5
            "#,
            ASSET_COLUMNS
        ))
        .bind(institution_id)
        .bind(media_type.as_deref())
        .bind(pattern.as_deref())
        .bind(filter.page_size as i64)
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM media_asset
            WHERE institution_id = $1
              AND ($2::text IS NULL OR media_type = $2)
              AND ($3::text IS NULL OR filename ILIKE $3)
            "#,
        )
        .bind(institution_id)
        .bind(media_type.as_deref())
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok((convert_all(rows)?, total))
    }

    async fn touch_asset(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE media_asset SET last_access_time = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn quota_accounts(&self, institution_id: Uuid) -> Result<Vec<QuotaAccount>, AppError> {
        let rows = sqlx::query_as::<_, QuotaAccountRow>(&format!(
            "SELECT {} FROM quota_account WHERE institution_id = $1 ORDER BY quota_type",
            ACCOUNT_COLUMNS
        ))
        .bind(institution_id)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn list_pending_cleanups(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ObjectCleanup>, AppError> {
        let rows = sqlx::query_as::<_, CleanupRow>(&format!(
            r#"
            SELECT {}
            FROM object_cleanup
            WHERE updated_at <= $1
            ORDER BY created_at
            LIMIT $2
            "#,
            CLEANUP_COLUMNS
        ))
        .bind(updated_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn finish_cleanup(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM object_cleanup WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_cleanup_failure(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE object_cleanup
            SET attempts = attempts + 1, last_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// One PostgreSQL transaction. Dropping it without commit rolls back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn ensure_accounts(
        &mut self,
        institution_id: Uuid,
        defaults: &[(QuotaType, i64)],
    ) -> Result<(), AppError> {
        let mut sorted = defaults.to_vec();
        sorted.sort_by_key(|(quota_type, _)| quota_type.as_str());

        for (quota_type, total_bytes) in sorted {
            sqlx::query(
                r#"
                INSERT INTO quota_account (institution_id, quota_type, total_bytes)
                VALUES ($1, $2, $3)
                ON CONFLICT (institution_id, quota_type) DO NOTHING
                "#,
            )
            .bind(institution_id)
            .bind(quota_type.as_str())
            .bind(total_bytes)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn lock_accounts(
        &mut self,
        institution_id: Uuid,
        quota_types: &[QuotaType],
    ) -> Result<Vec<QuotaAccount>, AppError> {
        let types: Vec<String> = quota_types.iter().map(|t| t.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, QuotaAccountRow>(&format!(
            r#"
            SELECT {}
            FROM quota_account
            WHERE institution_id = $1 AND quota_type = ANY($2)
            ORDER BY quota_type
            FOR UPDATE
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(institution_id)
        .bind(types)
        .fetch_all(&mut *self.tx)
        .await?;

        convert_all(rows)
    }

    async fn update_account(&mut self, account: &QuotaAccount) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE quota_account
            SET total_bytes = $3, reserved_bytes = $4, used_bytes = $5, updated_at = $6
            WHERE institution_id = $1 AND quota_type = $2
            "#,
        )
        .bind(account.institution_id)
        .bind(account.quota_type.as_str())
        .bind(account.total_bytes)
        .bind(account.reserved_bytes)
        .bind(account.used_bytes)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(AppError::Internal(format!(
                "Quota account {} of institution {} does not exist",
                account.quota_type, account.institution_id
            )));
        }
        Ok(())
    }

    async fn insert_reservation(
        &mut self,
        reservation: &QuotaReservation,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO quota_reservation (
                id, institution_id, quota_type, reserved_bytes, committed_bytes, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.institution_id)
        .bind(reservation.quota_type.as_str())
        .bind(reservation.reserved_bytes)
        .bind(reservation.committed_bytes)
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_reservation(&mut self, id: Uuid) -> Result<Option<QuotaReservation>, AppError> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM quota_reservation WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(QuotaReservation::try_from).transpose()
    }

    async fn update_reservation(
        &mut self,
        reservation: &QuotaReservation,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE quota_reservation
            SET status = $2, committed_bytes = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.status.as_str())
        .bind(reservation.committed_bytes)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_session(&mut self, session: &UploadSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO upload_session (
                id, institution_id, uploader_id, filename, content_type, declared_size_bytes,
                media_type, storage_key, object_store_upload_id, part_size, part_count, status,
                reservation_id, created_at, updated_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(session.id)
        .bind(session.institution_id)
        .bind(session.uploader_id)
        .bind(&session.filename)
        .bind(&session.content_type)
        .bind(session.declared_size_bytes)
        .bind(session.media_type.as_str())
        .bind(&session.storage_key)
        .bind(&session.object_store_upload_id)
        .bind(session.part_size)
        .bind(session.part_count)
        .bind(session.status.as_str())
        .bind(session.reservation_id)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.expires_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_session(&mut self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM upload_session WHERE id = $1 FOR UPDATE",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(UploadSession::try_from).transpose()
    }

    async fn transition_session(
        &mut self,
        id: Uuid,
        from: &[UploadStatus],
        to: UploadStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_session
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(status_list(from))
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_asset(&mut self, asset: &MediaAsset) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO media_asset (
                id, institution_id, uploader_id, upload_session_id, title, filename,
                media_type, quota_type, content_type, size_bytes, storage_path, status,
                upload_time, last_access_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(asset.id)
        .bind(asset.institution_id)
        .bind(asset.uploader_id)
        .bind(asset.upload_session_id)
        .bind(&asset.title)
        .bind(&asset.filename)
        .bind(asset.media_type.as_str())
        .bind(asset.quota_type.as_str())
        .bind(&asset.content_type)
        .bind(asset.size_bytes)
        .bind(&asset.storage_path)
        .bind(asset.status.as_str())
        .bind(asset.upload_time)
        .bind(asset.last_access_time)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::Conflict(format!(
                    "Upload session {} already has a media asset",
                    asset.upload_session_id
                )))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn lock_asset(
        &mut self,
        id: Uuid,
        institution_id: Uuid,
    ) -> Result<Option<MediaAsset>, AppError> {
        let row = sqlx::query_as::<_, AssetRow>(&format!(
            "SELECT {} FROM media_asset WHERE id = $1 AND institution_id = $2 FOR UPDATE",
            ASSET_COLUMNS
        ))
        .bind(id)
        .bind(institution_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(MediaAsset::try_from).transpose()
    }

    async fn delete_asset(&mut self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM media_asset WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_cleanup(&mut self, cleanup: &ObjectCleanup) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO object_cleanup (
                id, storage_key, upload_id, delete_object, attempts, last_error, created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(cleanup.id)
        .bind(&cleanup.storage_key)
        .bind(cleanup.upload_id.as_deref())
        .bind(cleanup.delete_object)
        .bind(cleanup.attempts)
        .bind(cleanup.last_error.as_deref())
        .bind(cleanup.created_at)
        .bind(cleanup.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let PgStoreTx { tx } = *self;
        tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to commit transaction");
            AppError::Database(e)
        })
    }
}
