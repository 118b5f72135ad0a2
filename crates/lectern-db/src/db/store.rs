//! Store traits
//!
//! [`MediaStore`] serves plain reads. Anything that changes state goes through a [`StoreTx`]
//! from [`MediaStore::begin`]: the `lock_*` reads take row locks that are held until the
//! transaction ends, and dropping a transaction without calling [`StoreTx::commit`] rolls it
//! back.
//!
//! Callers must not await other store reads while they hold a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lectern_core::models::{
    MediaAsset, MediaFilter, ObjectCleanup, QuotaAccount, QuotaReservation, QuotaType,
    UploadSession, UploadStatus,
};
use lectern_core::AppError;
use uuid::Uuid;

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<UploadSession>, AppError>;

    /// Non-terminal sessions whose `expires_at` is at or before `now`, oldest first.
    async fn list_stale_sessions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<UploadSession>, AppError>;

    async fn get_reservation(&self, id: Uuid) -> Result<Option<QuotaReservation>, AppError>;

    /// ACTIVE reservations created at or before `created_before` that no upload session
    /// references, oldest first.
    async fn list_orphaned_reservations(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QuotaReservation>, AppError>;

    async fn get_asset(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError>;

    async fn get_asset_by_session(&self, session_id: Uuid)
        -> Result<Option<MediaAsset>, AppError>;

    /// One page of an institution's assets, newest first, plus the total match count.
    async fn list_assets(
        &self,
        institution_id: Uuid,
        filter: &MediaFilter,
    ) -> Result<(Vec<MediaAsset>, i64), AppError>;

    /// Record a read access. Returns false when the asset does not exist.
    async fn touch_asset(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Persisted quota accounts of an institution. Accounts that were never provisioned
    /// are absent.
    async fn quota_accounts(&self, institution_id: Uuid) -> Result<Vec<QuotaAccount>, AppError>;

    /// Outstanding object cleanups last touched at or before `updated_before`, oldest first.
    async fn list_pending_cleanups(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ObjectCleanup>, AppError>;

    /// Forget a cleanup the gateway confirmed. Unknown ids are ignored.
    async fn finish_cleanup(&self, id: Uuid) -> Result<(), AppError>;

    /// Count a failed attempt and keep the cleanup for the next sweep.
    async fn record_cleanup_failure(&self, id: Uuid, error: &str) -> Result<(), AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

/// A unit of work. All writes become visible together on commit.
#[async_trait]
pub trait StoreTx: Send {
    /// Create missing accounts with the given totals. Existing accounts are left alone.
    async fn ensure_accounts(
        &mut self,
        institution_id: Uuid,
        defaults: &[(QuotaType, i64)],
    ) -> Result<(), AppError>;

    /// Lock and return the requested accounts. Locks are always taken in the same order.
    async fn lock_accounts(
        &mut self,
        institution_id: Uuid,
        quota_types: &[QuotaType],
    ) -> Result<Vec<QuotaAccount>, AppError>;

    async fn update_account(&mut self, account: &QuotaAccount) -> Result<(), AppError>;

    async fn insert_reservation(&mut self, reservation: &QuotaReservation)
        -> Result<(), AppError>;

    async fn lock_reservation(&mut self, id: Uuid) -> Result<Option<QuotaReservation>, AppError>;

    async fn update_reservation(&mut self, reservation: &QuotaReservation)
        -> Result<(), AppError>;

    async fn insert_session(&mut self, session: &UploadSession) -> Result<(), AppError>;

    async fn lock_session(&mut self, id: Uuid) -> Result<Option<UploadSession>, AppError>;

    /// Compare-and-set on the session status: moves the session to `to` only if its current
    /// status is one of `from`. Returns whether the row changed.
    async fn transition_session(
        &mut self,
        id: Uuid,
        from: &[UploadStatus],
        to: UploadStatus,
    ) -> Result<bool, AppError>;

    /// Insert an asset. A second asset for the same upload session is a `Conflict`.
    async fn insert_asset(&mut self, asset: &MediaAsset) -> Result<(), AppError>;

    /// Lock an asset of `institution_id`. Assets of other institutions are not returned.
    async fn lock_asset(
        &mut self,
        id: Uuid,
        institution_id: Uuid,
    ) -> Result<Option<MediaAsset>, AppError>;

    async fn delete_asset(&mut self, id: Uuid) -> Result<bool, AppError>;

    async fn insert_cleanup(&mut self, cleanup: &ObjectCleanup) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
