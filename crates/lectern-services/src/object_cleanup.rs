//! Object store cleanup
//!
//! Aborts and deletes are owed to the object store after a session ends or an asset is
//! deleted. They are recorded as [`ObjectCleanup`] rows inside the transaction that makes
//! them necessary, attempted right after commit, and retried by the sweeper until the store
//! confirms them. An open multipart upload therefore cannot outlive its session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lectern_core::models::ObjectCleanup;
use lectern_core::AppError;
use lectern_db::MediaStore;
use lectern_storage::{GatewayError, ObjectStoreGateway};

/// Counts from one retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub completed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ObjectJanitor {
    store: Arc<dyn MediaStore>,
    gateway: Arc<dyn ObjectStoreGateway>,
}

impl ObjectJanitor {
    pub fn new(store: Arc<dyn MediaStore>, gateway: Arc<dyn ObjectStoreGateway>) -> Self {
        Self { store, gateway }
    }

    /// Record `cleanup` in its own transaction, then attempt it. When the record cannot be
    /// written the work is still attempted once.
    pub async fn schedule(&self, cleanup: ObjectCleanup) {
        let recorded = async {
            let mut tx = self.store.begin().await?;
            tx.insert_cleanup(&cleanup).await?;
            tx.commit().await
        }
        .await;

        match recorded {
            Ok(()) => {
                self.run(&cleanup).await;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    key = %cleanup.storage_key,
                    "Failed to record object cleanup, attempting it once"
                );
                if let Err(e) = self.execute(&cleanup).await {
                    tracing::error!(error = %e, key = %cleanup.storage_key, "Object cleanup failed");
                }
            }
        }
    }

    /// Attempt a recorded cleanup. Returns whether the store confirmed it.
    pub async fn run(&self, cleanup: &ObjectCleanup) -> bool {
        match self.execute(cleanup).await {
            Ok(()) => {
                if let Err(e) = self.store.finish_cleanup(cleanup.id).await {
                    tracing::warn!(error = %e, cleanup_id = %cleanup.id, "Failed to clear object cleanup");
                }
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    cleanup_id = %cleanup.id,
                    key = %cleanup.storage_key,
                    attempts = cleanup.attempts + 1,
                    "Object cleanup failed, will retry"
                );
                if let Err(db) = self
                    .store
                    .record_cleanup_failure(cleanup.id, &e.to_string())
                    .await
                {
                    tracing::error!(error = %db, cleanup_id = %cleanup.id, "Failed to record cleanup failure");
                }
                false
            }
        }
    }

    /// Retry up to `limit` outstanding cleanups last attempted at or before `now`.
    pub async fn retry_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<CleanupReport, AppError> {
        let pending = self.store.list_pending_cleanups(now, limit).await?;
        let mut report = CleanupReport::default();
        for cleanup in &pending {
            if self.run(cleanup).await {
                report.completed += 1;
            } else {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    /// Missing uploads and objects count as done.
    async fn execute(&self, cleanup: &ObjectCleanup) -> Result<(), GatewayError> {
        if let Some(upload_id) = &cleanup.upload_id {
            match self
                .gateway
                .abort_multipart_upload(&cleanup.storage_key, upload_id)
                .await
            {
                Ok(()) => {}
                Err(GatewayError::NotFound(_)) => {
                    tracing::debug!(upload_id = %upload_id, "Multipart upload already aborted or completed");
                }
                Err(e) => return Err(e),
            }
        }

        if cleanup.delete_object {
            match self.gateway.delete_object(&cleanup.storage_key).await {
                Ok(()) | Err(GatewayError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_db::MemoryStore;
    use lectern_storage::memory::{Fault, GatewayOp};
    use lectern_storage::InMemoryGateway;

    fn janitor() -> (ObjectJanitor, Arc<MemoryStore>, Arc<InMemoryGateway>) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(InMemoryGateway::new());
        (
            ObjectJanitor::new(store.clone(), gateway.clone()),
            store,
            gateway,
        )
    }

    fn later() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(1)
    }

    #[tokio::test]
    async fn test_scheduled_cleanup_aborts_and_is_forgotten() {
        let (janitor, store, gateway) = janitor();
        let upload_id = gateway
            .create_multipart_upload("institutions/a/b/week.mp4", "video/mp4")
            .await
            .unwrap();

        janitor
            .schedule(ObjectCleanup::abort_upload(
                "institutions/a/b/week.mp4",
                &upload_id,
                false,
            ))
            .await;

        assert!(!gateway.has_pending_upload(&upload_id));
        assert_eq!(store.pending_cleanup_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_delete_stays_pending_until_retried() {
        let (janitor, store, gateway) = janitor();
        gateway.put_object("institutions/a/b/notes.pdf", 10);
        gateway.inject_fault(GatewayOp::Delete, Fault::Backend, 1);

        janitor
            .schedule(ObjectCleanup::delete("institutions/a/b/notes.pdf"))
            .await;
        assert!(gateway.object_exists("institutions/a/b/notes.pdf"));
        assert_eq!(store.pending_cleanup_count().await, 1);

        let report = janitor.retry_pending(later(), 10).await.unwrap();
        assert_eq!(report, CleanupReport { completed: 1, failed: 0 });
        assert!(!gateway.object_exists("institutions/a/b/notes.pdf"));
        assert_eq!(store.pending_cleanup_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_upload_counts_as_done() {
        let (janitor, store, _) = janitor();
        janitor
            .schedule(ObjectCleanup::abort_upload("k", "gone", true))
            .await;
        assert_eq!(store.pending_cleanup_count().await, 0);
    }

    #[tokio::test]
    async fn test_unrecorded_cleanup_is_still_attempted() {
        let (janitor, store, gateway) = janitor();
        gateway.put_object("k", 1);
        store.fail_next_commits(1);

        janitor.schedule(ObjectCleanup::delete("k")).await;
        assert!(!gateway.object_exists("k"));
        assert_eq!(store.pending_cleanup_count().await, 0);
    }
}
