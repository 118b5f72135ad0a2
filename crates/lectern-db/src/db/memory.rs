//! In-memory store
//!
//! A transaction takes the whole store's lock and works on a copy of the state, which is
//! written back on commit. Transactions are therefore fully serialized, which gives the same
//! guarantees as the row locks of the PostgreSQL store. The account check constraint and the
//! unique asset-per-session index are enforced as well.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lectern_core::models::{
    MediaAsset, MediaFilter, ObjectCleanup, QuotaAccount, QuotaReservation, QuotaType,
    ReservationStatus, UploadSession, UploadStatus,
};
use lectern_core::AppError;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{MediaStore, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: BTreeMap<(Uuid, QuotaType), QuotaAccount>,
    reservations: HashMap<Uuid, QuotaReservation>,
    sessions: HashMap<Uuid, UploadSession>,
    assets: HashMap<Uuid, MediaAsset>,
    cleanups: HashMap<Uuid, ObjectCleanup>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    commit_faults: Arc<CommitFaults>,
}

/// Armed commit failures: after `skip` successful commits, the next `fail` commits fail.
#[derive(Default)]
struct CommitFaults {
    skip: AtomicU32,
    fail: AtomicU32,
}

impl CommitFaults {
    fn fire(&self) -> bool {
        if self.fail.load(Ordering::SeqCst) == 0 {
            return false;
        }
        if self
            .skip
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return false;
        }
        self.fail
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` commits fail and roll back.
    pub fn fail_next_commits(&self, times: u32) {
        self.fail_commits_after(0, times);
    }

    /// Let `skip` commits through, then make the following `times` commits fail.
    pub fn fail_commits_after(&self, skip: u32, times: u32) {
        self.commit_faults.skip.store(skip, Ordering::SeqCst);
        self.commit_faults.fail.store(times, Ordering::SeqCst);
    }

    /// Object cleanups still waiting for the gateway.
    pub async fn pending_cleanup_count(&self) -> usize {
        self.state.lock().await.cleanups.len()
    }

    /// Number of stored assets across all institutions.
    pub async fn asset_count(&self) -> usize {
        self.state.lock().await.assets.len()
    }

    /// Number of reservations still holding bytes.
    pub async fn active_reservation_count(&self, institution_id: Uuid) -> usize {
        self.state
            .lock()
            .await
            .reservations
            .values()
            .filter(|r| {
                r.institution_id == institution_id
                    && r.status == ReservationStatus::Active
            })
            .count()
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            commit_faults: self.commit_faults.clone(),
        }))
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
        Ok(self.state.lock().await.sessions.get(&id).cloned())
    }

    async fn list_stale_sessions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<UploadSession>, AppError> {
        let state = self.state.lock().await;
        let mut stale: Vec<UploadSession> = state
            .sessions
            .values()
            .filter(|s| !s.status.is_terminal() && s.expires_at <= now)
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.expires_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<QuotaReservation>, AppError> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn list_orphaned_reservations(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QuotaReservation>, AppError> {
        let state = self.state.lock().await;
        let mut orphans: Vec<QuotaReservation> = state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.created_at <= created_before)
            .filter(|r| !state.sessions.values().any(|s| s.reservation_id == r.id))
            .cloned()
            .collect();
        orphans.sort_by_key(|r| r.created_at);
        orphans.truncate(limit.max(0) as usize);
        Ok(orphans)
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError> {
        Ok(self.state.lock().await.assets.get(&id).cloned())
    }

    async fn get_asset_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<MediaAsset>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .assets
            .values()
            .find(|a| a.upload_session_id == session_id)
            .cloned())
    }

    async fn list_assets(
        &self,
        institution_id: Uuid,
        filter: &MediaFilter,
    ) -> Result<(Vec<MediaAsset>, i64), AppError> {
        let state = self.state.lock().await;
        let needle = filter.filename_contains.as_ref().map(|s| s.to_lowercase());
        let mut matches: Vec<MediaAsset> = state
            .assets
            .values()
            .filter(|a| a.institution_id == institution_id)
            .filter(|a| filter.media_type.map_or(true, |t| a.media_type == t))
            .filter(|a| {
                needle
                    .as_ref()
                    .map_or(true, |n| a.filename.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.upload_time.cmp(&a.upload_time).then(a.id.cmp(&b.id)));

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.page_size as usize)
            .collect();
        Ok((page, total))
    }

    async fn touch_asset(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        match state.assets.get_mut(&id) {
            Some(asset) => {
                asset.last_access_time = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn quota_accounts(&self, institution_id: Uuid) -> Result<Vec<QuotaAccount>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .values()
            .filter(|a| a.institution_id == institution_id)
            .cloned()
            .collect())
    }

    async fn list_pending_cleanups(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ObjectCleanup>, AppError> {
        let state = self.state.lock().await;
        let mut pending: Vec<ObjectCleanup> = state
            .cleanups
            .values()
            .filter(|c| c.updated_at <= updated_before)
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn finish_cleanup(&self, id: Uuid) -> Result<(), AppError> {
        self.state.lock().await.cleanups.remove(&id);
        Ok(())
    }

    async fn record_cleanup_failure(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        if let Some(cleanup) = self.state.lock().await.cleanups.get_mut(&id) {
            cleanup.attempts += 1;
            cleanup.last_error = Some(error.to_string());
            cleanup.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    commit_faults: Arc<CommitFaults>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn ensure_accounts(
        &mut self,
        institution_id: Uuid,
        defaults: &[(QuotaType, i64)],
    ) -> Result<(), AppError> {
        for (quota_type, total_bytes) in defaults {
            self.working
                .accounts
                .entry((institution_id, *quota_type))
                .or_insert_with(|| QuotaAccount::new(institution_id, *quota_type, *total_bytes));
        }
        Ok(())
    }

    async fn lock_accounts(
        &mut self,
        institution_id: Uuid,
        quota_types: &[QuotaType],
    ) -> Result<Vec<QuotaAccount>, AppError> {
        Ok(self
            .working
            .accounts
            .values()
            .filter(|a| a.institution_id == institution_id && quota_types.contains(&a.quota_type))
            .cloned()
            .collect())
    }

    async fn update_account(&mut self, account: &QuotaAccount) -> Result<(), AppError> {
        if !account.is_consistent() {
            return Err(AppError::Internal(format!(
                "quota_account check constraint violated for {} of institution {}",
                account.quota_type, account.institution_id
            )));
        }
        match self
            .working
            .accounts
            .get_mut(&(account.institution_id, account.quota_type))
        {
            Some(existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(AppError::Internal(format!(
                "Quota account {} of institution {} does not exist",
                account.quota_type, account.institution_id
            ))),
        }
    }

    async fn insert_reservation(
        &mut self,
        reservation: &QuotaReservation,
    ) -> Result<(), AppError> {
        self.working
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn lock_reservation(&mut self, id: Uuid) -> Result<Option<QuotaReservation>, AppError> {
        Ok(self.working.reservations.get(&id).cloned())
    }

    async fn update_reservation(
        &mut self,
        reservation: &QuotaReservation,
    ) -> Result<(), AppError> {
        if let Some(existing) = self.working.reservations.get_mut(&reservation.id) {
            *existing = reservation.clone();
        }
        Ok(())
    }

    async fn insert_session(&mut self, session: &UploadSession) -> Result<(), AppError> {
        self.working.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn lock_session(&mut self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
        Ok(self.working.sessions.get(&id).cloned())
    }

    async fn transition_session(
        &mut self,
        id: Uuid,
        from: &[UploadStatus],
        to: UploadStatus,
    ) -> Result<bool, AppError> {
        match self.working.sessions.get_mut(&id) {
            Some(session) if from.contains(&session.status) => {
                session.status = to;
                session.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_asset(&mut self, asset: &MediaAsset) -> Result<(), AppError> {
        if self
            .working
            .assets
            .values()
            .any(|a| a.upload_session_id == asset.upload_session_id)
        {
            return Err(AppError::Conflict(format!(
                "Upload session {} already has a media asset",
                asset.upload_session_id
            )));
        }
        self.working.assets.insert(asset.id, asset.clone());
        Ok(())
    }

    async fn lock_asset(
        &mut self,
        id: Uuid,
        institution_id: Uuid,
    ) -> Result<Option<MediaAsset>, AppError> {
        Ok(self
            .working
            .assets
            .get(&id)
            .filter(|a| a.institution_id == institution_id)
            .cloned())
    }

    async fn delete_asset(&mut self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.working.assets.remove(&id).is_some())
    }

    async fn insert_cleanup(&mut self, cleanup: &ObjectCleanup) -> Result<(), AppError> {
        self.working.cleanups.insert(cleanup.id, cleanup.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx {
            mut guard,
            working,
            commit_faults,
        } = *self;

        if commit_faults.fire() {
            return Err(AppError::Internal("injected commit failure".to_string()));
        }

        *guard = working;
        Ok(())
    }
}
