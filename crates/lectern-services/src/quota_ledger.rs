//! Quota ledger
//!
//! Owns every write to quota accounts and reservations. Each operation runs the pure rules
//! from [`lectern_core::accounting`] against accounts locked inside a store transaction, so
//! concurrent reservations for one institution are serialized by the store.
//!
//! The `*_tx` variants work inside a transaction the caller already holds. The upload
//! coordinator uses them to commit quota and create the asset in one unit of work.

use std::sync::Arc;

use chrono::Utc;
use lectern_core::accounting;
use lectern_core::models::{
    InstitutionQuota, QuotaAccount, QuotaReservation, QuotaType, QuotaUsage, ReservationStatus,
};
use lectern_core::{AppError, UploadConfig};
use lectern_db::{MediaStore, StoreTx};
use uuid::Uuid;

/// Totals given to accounts the first time an institution touches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDefaults {
    pub video_bytes: i64,
    pub document_bytes: i64,
    pub total_bytes: i64,
}

impl QuotaDefaults {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            video_bytes: config.default_video_quota_bytes,
            document_bytes: config.default_document_quota_bytes,
            total_bytes: config.default_total_quota_bytes,
        }
    }

    pub fn total_for(&self, quota_type: QuotaType) -> i64 {
        match quota_type {
            QuotaType::Video => self.video_bytes,
            QuotaType::Document => self.document_bytes,
            QuotaType::Total => self.total_bytes,
        }
    }

    fn pairs(&self) -> Vec<(QuotaType, i64)> {
        QuotaType::ALL
            .iter()
            .map(|qt| (*qt, self.total_for(*qt)))
            .collect()
    }
}

impl Default for QuotaDefaults {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn MediaStore>,
    defaults: QuotaDefaults,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn MediaStore>, defaults: QuotaDefaults) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> QuotaDefaults {
        self.defaults
    }

    /// Hold `bytes` against the typed account and TOTAL.
    #[tracing::instrument(skip(self), fields(institution_id = %institution_id, quota_type = %quota_type))]
    pub async fn reserve(
        &self,
        institution_id: Uuid,
        quota_type: QuotaType,
        bytes: i64,
    ) -> Result<QuotaReservation, AppError> {
        let mut tx = self.store.begin().await?;
        let reservation = self
            .reserve_tx(tx.as_mut(), institution_id, quota_type, bytes)
            .await?;
        tx.commit().await?;

        tracing::debug!(reservation_id = %reservation.id, bytes, "Quota reserved");
        Ok(reservation)
    }

    pub async fn reserve_tx(
        &self,
        tx: &mut dyn StoreTx,
        institution_id: Uuid,
        quota_type: QuotaType,
        bytes: i64,
    ) -> Result<QuotaReservation, AppError> {
        tx.ensure_accounts(institution_id, &self.defaults.pairs())
            .await?;
        let mut accounts = tx
            .lock_accounts(institution_id, &quota_type.charged_accounts())
            .await?;

        accounting::reserve(&mut accounts, quota_type, bytes)?;
        for account in &accounts {
            tx.update_account(account).await?;
        }

        let reservation = QuotaReservation::new(institution_id, quota_type, bytes);
        tx.insert_reservation(&reservation).await?;
        Ok(reservation)
    }

    /// Turn a reservation into usage of `actual_bytes`.
    ///
    /// Committing an already committed reservation with the same size succeeds without
    /// changing anything, so retries are safe.
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn commit(&self, reservation_id: Uuid, actual_bytes: i64) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        self.commit_tx(tx.as_mut(), reservation_id, actual_bytes)
            .await?;
        tx.commit().await
    }

    pub async fn commit_tx(
        &self,
        tx: &mut dyn StoreTx,
        reservation_id: Uuid,
        actual_bytes: i64,
    ) -> Result<(), AppError> {
        let mut reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Quota reservation {} not found", reservation_id))
            })?;

        match reservation.status {
            ReservationStatus::Active => {}
            ReservationStatus::Committed if reservation.committed_bytes == Some(actual_bytes) => {
                return Ok(());
            }
            ReservationStatus::Committed => {
                return Err(AppError::Conflict(format!(
                    "Reservation {} was already committed with {} bytes",
                    reservation_id,
                    reservation.committed_bytes.unwrap_or_default()
                )));
            }
            ReservationStatus::Released => {
                return Err(AppError::Conflict(format!(
                    "Reservation {} was released and cannot be committed",
                    reservation_id
                )));
            }
        }

        let mut accounts = tx
            .lock_accounts(
                reservation.institution_id,
                &reservation.quota_type.charged_accounts(),
            )
            .await?;
        accounting::commit(
            &mut accounts,
            reservation.quota_type,
            reservation.reserved_bytes,
            actual_bytes,
        )?;
        for account in &accounts {
            tx.update_account(account).await?;
        }

        reservation.status = ReservationStatus::Committed;
        reservation.committed_bytes = Some(actual_bytes);
        reservation.updated_at = Utc::now();
        tx.update_reservation(&reservation).await?;

        tracing::debug!(
            reservation_id = %reservation.id,
            reserved_bytes = reservation.reserved_bytes,
            actual_bytes,
            "Quota reservation committed"
        );
        Ok(())
    }

    /// Drop a reservation. Returns false when it was not active, which is not an error.
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn release(&self, reservation_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.store.begin().await?;
        let released = self.release_tx(tx.as_mut(), reservation_id).await?;
        tx.commit().await?;
        Ok(released)
    }

    pub async fn release_tx(
        &self,
        tx: &mut dyn StoreTx,
        reservation_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut reservation = match tx.lock_reservation(reservation_id).await? {
            Some(r) if r.status == ReservationStatus::Active => r,
            Some(_) => return Ok(false),
            None => {
                return Err(AppError::NotFound(format!(
                    "Quota reservation {} not found",
                    reservation_id
                )))
            }
        };

        let mut accounts = tx
            .lock_accounts(
                reservation.institution_id,
                &reservation.quota_type.charged_accounts(),
            )
            .await?;
        accounting::release(
            &mut accounts,
            reservation.quota_type,
            reservation.reserved_bytes,
        )?;
        for account in &accounts {
            tx.update_account(account).await?;
        }

        reservation.status = ReservationStatus::Released;
        reservation.updated_at = Utc::now();
        tx.update_reservation(&reservation).await?;

        tracing::debug!(
            reservation_id = %reservation.id,
            bytes = reservation.reserved_bytes,
            "Quota reservation released"
        );
        Ok(true)
    }

    /// Give back committed usage of a deleted asset.
    pub async fn release_used_tx(
        &self,
        tx: &mut dyn StoreTx,
        institution_id: Uuid,
        quota_type: QuotaType,
        bytes: i64,
    ) -> Result<(), AppError> {
        let mut accounts = tx
            .lock_accounts(institution_id, &quota_type.charged_accounts())
            .await?;
        accounting::release_used(&mut accounts, quota_type, bytes)?;
        for account in &accounts {
            tx.update_account(account).await?;
        }
        Ok(())
    }

    /// Usage of all three accounts. Accounts never provisioned report their default total.
    pub async fn usage(&self, institution_id: Uuid) -> Result<InstitutionQuota, AppError> {
        let stored = self.store.quota_accounts(institution_id).await?;

        let accounts = QuotaType::ALL
            .iter()
            .map(|qt| {
                stored
                    .iter()
                    .find(|a| a.quota_type == *qt)
                    .cloned()
                    .unwrap_or_else(|| {
                        QuotaAccount::new(institution_id, *qt, self.defaults.total_for(*qt))
                    })
                    .usage()
            })
            .collect();

        Ok(InstitutionQuota {
            institution_id,
            accounts,
        })
    }

    #[tracing::instrument(skip(self), fields(institution_id = %institution_id, quota_type = %quota_type))]
    pub async fn set_total(
        &self,
        institution_id: Uuid,
        quota_type: QuotaType,
        total_bytes: i64,
    ) -> Result<QuotaUsage, AppError> {
        let mut tx = self.store.begin().await?;
        tx.ensure_accounts(institution_id, &self.defaults.pairs())
            .await?;
        let mut account = tx
            .lock_accounts(institution_id, &[quota_type])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::Internal(format!("Quota account {} was not provisioned", quota_type))
            })?;

        let previous = account.total_bytes;
        accounting::set_total(&mut account, total_bytes)?;
        tx.update_account(&account).await?;
        tx.commit().await?;

        tracing::info!(previous, total_bytes, "Quota total updated");
        Ok(account.usage())
    }
}
