//! Expiry sweeper
//!
//! Periodically expires upload sessions whose TTL ran out while still INITIATED or
//! UPLOADING, through the same path as an explicit cancel. Without it an abandoned upload
//! would hold its quota reservation forever. Each sweep also releases ACTIVE reservations
//! that outlived the session TTL with no session referencing them, and retries object store
//! cleanups that failed earlier.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lectern_core::{AppError, UploadConfig};
use lectern_db::MediaStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::object_cleanup::ObjectJanitor;
use crate::quota_ledger::QuotaLedger;
use crate::upload_coordinator::{TerminateOutcome, UploadCoordinator};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    /// Sessions that reached a terminal status before the sweeper got to them.
    pub skipped: usize,
    pub failed: usize,
    /// Orphaned reservations handed back to their accounts.
    pub reservations_released: usize,
    pub cleanups_completed: usize,
    pub cleanups_failed: usize,
}

pub struct ExpirySweeper {
    store: Arc<dyn MediaStore>,
    coordinator: Arc<UploadCoordinator>,
    ledger: QuotaLedger,
    janitor: ObjectJanitor,
    session_ttl: chrono::Duration,
    batch_size: i64,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn MediaStore>,
        coordinator: Arc<UploadCoordinator>,
        ledger: QuotaLedger,
        janitor: ObjectJanitor,
        config: &UploadConfig,
    ) -> Self {
        Self {
            store,
            coordinator,
            ledger,
            janitor,
            session_ttl: config.session_ttl(),
            batch_size: config.sweep_batch_size.max(1),
        }
    }

    pub async fn run_once(&self) -> Result<SweepReport, AppError> {
        self.run_once_at(Utc::now()).await
    }

    /// Expire up to one batch of sessions that were stale at `now`, then reclaim orphaned
    /// reservations and retry pending cleanups, one batch each.
    #[tracing::instrument(skip(self), fields(sweep.batch_size = self.batch_size))]
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let stale = self.store.list_stale_sessions(now, self.batch_size).await?;
        let mut report = SweepReport::default();

        for session in stale {
            match self.coordinator.expire(session.id).await {
                Ok(TerminateOutcome::Transitioned) => report.expired += 1,
                Ok(TerminateOutcome::AlreadyTerminal(_)) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        session_id = %session.id,
                        "Failed to expire upload session"
                    );
                    report.failed += 1;
                }
            }
        }

        report.reservations_released = self.release_orphans(now).await?;

        let cleanups = self.janitor.retry_pending(now, self.batch_size).await?;
        report.cleanups_completed = cleanups.completed;
        report.cleanups_failed = cleanups.failed;

        if report != SweepReport::default() {
            tracing::info!(
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                reservations_released = report.reservations_released,
                cleanups_completed = report.cleanups_completed,
                cleanups_failed = report.cleanups_failed,
                "Expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// A reservation whose initiate never produced a session and whose release also failed.
    async fn release_orphans(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let orphans = self
            .store
            .list_orphaned_reservations(now - self.session_ttl, self.batch_size)
            .await?;

        let mut released = 0;
        for reservation in orphans {
            match self.ledger.release(reservation.id).await {
                Ok(true) => {
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        institution_id = %reservation.institution_id,
                        bytes = reservation.reserved_bytes,
                        "Released orphaned quota reservation"
                    );
                    released += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        reservation_id = %reservation.id,
                        "Failed to release orphaned quota reservation"
                    );
                }
            }
        }
        Ok(released)
    }

    /// Run a sweep every `period` until the returned handle is shut down.
    pub fn start(self: Arc<Self>, period: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "Expiry sweep failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Expiry sweeper shutting down");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx, task }
    }
}

/// Running sweeper loop
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the loop and wait for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Expiry sweeper task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, Harness, MB};
    use lectern_core::models::{MediaType, QuotaType, UploadStatus};
    use lectern_storage::memory::{Fault, GatewayOp};
    use uuid::Uuid;

    fn sweeper(h: &Harness) -> ExpirySweeper {
        h.sweeper(100)
    }

    fn after_ttl() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(25)
    }

    #[tokio::test]
    async fn test_fresh_sessions_are_left_alone() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        let response = h.initiate(institution, MediaType::Video, 10 * MB).await.unwrap();

        let report = sweeper(&h).run_once().await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(
            h.session(response.upload_session_id).await.status,
            UploadStatus::Initiated
        );
    }

    #[tokio::test]
    async fn test_stale_initiated_session_is_expired_and_released() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        let response = h.initiate(institution, MediaType::Video, 40 * MB).await.unwrap();

        let report = sweeper(&h).run_once_at(after_ttl()).await.unwrap();
        assert_eq!(report.expired, 1);

        assert_eq!(
            h.session(response.upload_session_id).await.status,
            UploadStatus::Expired
        );
        assert!(!h.gateway.has_pending_upload(&response.object_store_upload_id));
        assert_eq!(h.usage(institution, QuotaType::Video).await.reserved_bytes, 0);
    }

    #[tokio::test]
    async fn test_stale_uploading_session_is_expired_and_later_calls_are_noops() {
        let h = harness(110 * MB);
        let institution = Uuid::new_v4();

        // Leave a session in UPLOADING through a failed quota commit.
        h.upload(institution, MediaType::Video, 60 * MB).await;
        let response = h.initiate(institution, MediaType::Video, 50 * MB).await.unwrap();
        let request = h.upload_parts(&response, 55 * MB);
        let id = response.upload_session_id;
        h.coordinator
            .complete(institution, id, request.clone())
            .await
            .unwrap_err();
        let storage_key = h.session(id).await.storage_key;
        assert!(h.gateway.object_exists(&storage_key));

        let report = sweeper(&h).run_once_at(after_ttl()).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(h.session(id).await.status, UploadStatus::Expired);
        assert!(!h.gateway.object_exists(&storage_key));
        let video = h.usage(institution, QuotaType::Video).await;
        assert_eq!(video.reserved_bytes, 0);
        assert_eq!(video.used_bytes, 60 * MB);

        let cancelled = h.coordinator.cancel(institution, id).await.unwrap();
        assert_eq!(cancelled.status, UploadStatus::Expired);
        assert!(matches!(
            h.coordinator.complete(institution, id, request).await,
            Err(AppError::InvalidStateTransition { .. })
        ));
        let video = h.usage(institution, QuotaType::Video).await;
        assert_eq!(video.reserved_bytes, 0);
        assert_eq!(video.used_bytes, 60 * MB);
    }

    #[tokio::test]
    async fn test_terminal_sessions_are_not_swept() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        h.upload(institution, MediaType::Video, 10 * MB).await;
        let cancelled = h.initiate(institution, MediaType::Video, 10 * MB).await.unwrap();
        h.coordinator
            .cancel(institution, cancelled.upload_session_id)
            .await
            .unwrap();

        let report = sweeper(&h).run_once_at(after_ttl()).await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(h.usage(institution, QuotaType::Video).await.used_bytes, 10 * MB);
    }

    #[tokio::test]
    async fn test_failed_session_is_counted_and_retried_next_sweep() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        let first = h.initiate(institution, MediaType::Video, 10 * MB).await.unwrap();
        h.initiate(institution, MediaType::Video, 10 * MB).await.unwrap();

        h.store.fail_next_commits(1);
        let report = sweeper(&h).run_once_at(after_ttl()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.expired, 1);

        let report = sweeper(&h).run_once_at(after_ttl()).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(
            h.session(first.upload_session_id).await.status,
            UploadStatus::Expired
        );
        assert_eq!(h.usage(institution, QuotaType::Total).await.reserved_bytes, 0);
    }

    #[tokio::test]
    async fn test_abort_failure_does_not_block_expiry() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        let response = h.initiate(institution, MediaType::Video, 10 * MB).await.unwrap();
        h.gateway
            .inject_fault(GatewayOp::AbortMultipart, Fault::Timeout, 1);

        let report = sweeper(&h).run_once_at(after_ttl()).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(
            h.session(response.upload_session_id).await.status,
            UploadStatus::Expired
        );
        // The abort that failed during expiry is retried later in the same sweep.
        assert_eq!(report.cleanups_completed, 1);
        assert!(!h.gateway.has_pending_upload(&response.object_store_upload_id));
    }

    #[tokio::test]
    async fn test_failed_abort_after_cancel_is_retried_until_upload_is_gone() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        let response = h.initiate(institution, MediaType::Video, 10 * MB).await.unwrap();
        let upload_id = response.object_store_upload_id.clone();
        h.gateway
            .inject_fault(GatewayOp::AbortMultipart, Fault::Backend, 2);

        h.coordinator
            .cancel(institution, response.upload_session_id)
            .await
            .unwrap();
        assert!(h.gateway.has_pending_upload(&upload_id));
        assert_eq!(h.store.pending_cleanup_count().await, 1);

        let report = sweeper(&h).run_once().await.unwrap();
        assert_eq!(report.cleanups_failed, 1);
        assert!(h.gateway.has_pending_upload(&upload_id));
        // Parts can still land on the open upload until the abort goes through.
        assert!(h.gateway.put_part(&upload_id, 1, 1024).is_ok());

        let report = sweeper(&h).run_once().await.unwrap();
        assert_eq!(report.cleanups_completed, 1);
        assert!(!h.gateway.has_pending_upload(&upload_id));
        assert!(h.gateway.put_part(&upload_id, 2, 1024).is_err());
        assert_eq!(h.store.pending_cleanup_count().await, 0);
        assert_eq!(h.gateway.calls(GatewayOp::AbortMultipart), 3);
    }

    #[tokio::test]
    async fn test_reservation_left_by_failed_initiate_is_reclaimed_after_ttl() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        // The reserve commits, then both the session insert and the compensating release
        // are lost.
        h.store.fail_commits_after(1, 2);

        assert!(h.initiate(institution, MediaType::Video, 40 * MB).await.is_err());
        assert_eq!(h.usage(institution, QuotaType::Video).await.reserved_bytes, 40 * MB);
        assert_eq!(h.gateway.pending_upload_count(), 0);

        let report = sweeper(&h).run_once().await.unwrap();
        assert_eq!(report.reservations_released, 0);
        assert_eq!(h.usage(institution, QuotaType::Video).await.reserved_bytes, 40 * MB);

        let report = sweeper(&h).run_once_at(after_ttl()).await.unwrap();
        assert_eq!(report.reservations_released, 1);
        let video = h.usage(institution, QuotaType::Video).await;
        assert_eq!(video.reserved_bytes, 0);
        assert_eq!(video.available_bytes, 100 * MB);
        assert_eq!(h.usage(institution, QuotaType::Total).await.reserved_bytes, 0);
        assert_eq!(h.store.active_reservation_count(institution).await, 0);

        let report = sweeper(&h).run_once_at(after_ttl()).await.unwrap();
        assert_eq!(report.reservations_released, 0);
    }

    #[tokio::test]
    async fn test_live_session_reservation_is_not_treated_as_orphan() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        h.initiate(institution, MediaType::Video, 10 * MB).await.unwrap();

        // Past the TTL the session is expired through the normal path, and only once.
        let report = sweeper(&h).run_once_at(after_ttl()).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.reservations_released, 0);
        assert_eq!(h.usage(institution, QuotaType::Video).await.reserved_bytes, 0);
    }

    #[tokio::test]
    async fn test_batch_size_limits_one_sweep() {
        let h = harness(100 * MB);
        let institution = Uuid::new_v4();
        for _ in 0..3 {
            h.initiate(institution, MediaType::Video, MB).await.unwrap();
        }

        let sweeper = h.sweeper(2);
        assert_eq!(sweeper.run_once_at(after_ttl()).await.unwrap().expired, 2);
        assert_eq!(sweeper.run_once_at(after_ttl()).await.unwrap().expired, 1);
    }

    #[tokio::test]
    async fn test_started_loop_stops_on_shutdown() {
        let h = harness(100 * MB);
        let handle = Arc::new(sweeper(&h)).start(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }
}
