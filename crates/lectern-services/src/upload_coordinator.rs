//! Upload coordinator
//!
//! Drives an upload session through its lifecycle:
//!
//! ```text
//! INITIATED --complete--> UPLOADING --commit--> COMPLETED
//!     |                      |
//!     +------cancel/expire---+----> CANCELLED / EXPIRED
//! ```
//!
//! `UPLOADING` means the object store already assembled the object and only the quota
//! commit is outstanding. Every transition is a compare-and-set on the session status, so
//! complete, cancel and the sweeper can race on the same session. No store transaction is
//! held across an object store call. Aborts and deletes go through the [`ObjectJanitor`],
//! which keeps retrying them after a failure.

use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use lectern_core::models::{
    title_from_filename, validate_filename, CompleteUploadRequest, CompletedPart,
    InitiateUploadRequest, InitiateUploadResponse, MediaAsset, MediaAssetStatus, MediaType,
    ObjectCleanup, PresignedPart, RefreshPartUrlsResponse, UploadPlan, UploadSession,
    UploadStatus,
};
use lectern_core::{AppError, UploadConfig};
use lectern_db::MediaStore;
use lectern_storage::keys::object_key;
use lectern_storage::{GatewayError, ObjectStoreGateway};
use uuid::Uuid;

use crate::object_cleanup::ObjectJanitor;
use crate::quota_ledger::QuotaLedger;

/// Everything needed to open an upload session.
#[derive(Debug, Clone)]
pub struct InitiateUpload {
    pub institution_id: Uuid,
    pub uploader_id: Uuid,
    pub filename: String,
    pub file_size: i64,
    pub media_type: MediaType,
    pub content_type: Option<String>,
}

impl InitiateUpload {
    pub fn from_request(
        institution_id: Uuid,
        uploader_id: Uuid,
        request: InitiateUploadRequest,
    ) -> Self {
        Self {
            institution_id,
            uploader_id,
            filename: request.filename,
            file_size: request.file_size,
            media_type: request.media_type,
            content_type: request.content_type,
        }
    }
}

/// Result of driving a session to CANCELLED or EXPIRED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// This call moved the session and released its reservation.
    Transitioned,
    /// The session had already reached the given terminal status. Nothing changed.
    AlreadyTerminal(UploadStatus),
}

pub struct UploadCoordinator {
    store: Arc<dyn MediaStore>,
    gateway: Arc<dyn ObjectStoreGateway>,
    ledger: QuotaLedger,
    janitor: ObjectJanitor,
    config: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn MediaStore>,
        gateway: Arc<dyn ObjectStoreGateway>,
        ledger: QuotaLedger,
        config: UploadConfig,
    ) -> Self {
        let janitor = ObjectJanitor::new(store.clone(), gateway.clone());
        Self {
            store,
            gateway,
            ledger,
            janitor,
            config,
        }
    }

    /// Reserve quota, open a multipart upload and presign one URL per part.
    #[tracing::instrument(
        skip(self, upload),
        fields(
            institution_id = %upload.institution_id,
            media_type = %upload.media_type,
            file_size = upload.file_size
        )
    )]
    pub async fn initiate(
        &self,
        upload: InitiateUpload,
    ) -> Result<InitiateUploadResponse, AppError> {
        validate_filename(&upload.filename)?;
        if upload.file_size <= 0 {
            return Err(AppError::InvalidInput(
                "File size must be at least 1 byte".to_string(),
            ));
        }
        let max_size = self.config.max_size_for(upload.media_type);
        if upload.file_size as u64 > max_size {
            return Err(AppError::PayloadTooLarge(format!(
                "{} uploads are limited to {} bytes, got {}",
                upload.media_type, max_size, upload.file_size
            )));
        }

        let plan = UploadPlan::for_size(upload.file_size, self.config.part_size_bytes as i64)?;
        let filename = upload.filename.trim().to_string();
        let content_type = upload
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(upload.media_type.default_content_type())
            .to_string();

        let reservation = self
            .ledger
            .reserve(
                upload.institution_id,
                upload.media_type.quota_type(),
                upload.file_size,
            )
            .await?;

        let session_id = Uuid::new_v4();
        let storage_key = object_key(upload.institution_id, session_id, &filename);

        let upload_id = match self
            .gateway
            .create_multipart_upload(&storage_key, &content_type)
            .await
        {
            Ok(upload_id) => upload_id,
            Err(e) => {
                tracing::error!(error = %e, key = %storage_key, "Failed to create multipart upload");
                self.release_quietly(reservation.id).await;
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let session = UploadSession {
            id: session_id,
            institution_id: upload.institution_id,
            uploader_id: upload.uploader_id,
            filename,
            content_type,
            declared_size_bytes: upload.file_size,
            media_type: upload.media_type,
            storage_key,
            object_store_upload_id: upload_id,
            part_size: plan.part_size,
            part_count: plan.part_count,
            status: UploadStatus::Initiated,
            reservation_id: reservation.id,
            created_at: now,
            updated_at: now,
            expires_at: now + self.config.session_ttl(),
        };

        let part_numbers: Vec<i32> = (1..=plan.part_count).collect();
        let opened = match self.presign_parts(&session, &part_numbers).await {
            Ok(urls) => self.insert_session(&session).await.map(|_| urls),
            Err(e) => Err(e),
        };
        let presigned_part_urls = match opened {
            Ok(urls) => urls,
            Err(e) => {
                // A reservation that cannot be released here has no session pointing at it;
                // the sweeper reclaims it once it is older than the session TTL.
                self.release_quietly(reservation.id).await;
                self.janitor
                    .schedule(ObjectCleanup::abort_upload(
                        &session.storage_key,
                        &session.object_store_upload_id,
                        false,
                    ))
                    .await;
                return Err(e);
            }
        };

        tracing::info!(
            session_id = %session.id,
            part_count = session.part_count,
            part_size = session.part_size,
            "Upload session initiated"
        );

        Ok(InitiateUploadResponse {
            upload_session_id: session.id,
            object_store_upload_id: session.object_store_upload_id,
            presigned_part_urls,
            part_size: session.part_size,
            part_count: session.part_count,
            expires_at: session.expires_at,
        })
    }

    /// Finalize the multipart upload, commit quota for the real object size and record the
    /// asset. Retrying after any failure is safe; a completed session returns its asset.
    #[tracing::instrument(
        skip(self, request),
        fields(institution_id = %institution_id, session_id = %session_id)
    )]
    pub async fn complete(
        &self,
        institution_id: Uuid,
        session_id: Uuid,
        request: CompleteUploadRequest,
    ) -> Result<MediaAsset, AppError> {
        let session = self.load_scoped(institution_id, session_id).await?;
        if request.upload_id != session.object_store_upload_id {
            return Err(AppError::BadRequest(
                "uploadId does not belong to this upload session".to_string(),
            ));
        }

        match session.status {
            UploadStatus::Completed => return self.existing_asset(session.id).await,
            UploadStatus::Cancelled | UploadStatus::Expired => {
                return Err(AppError::InvalidStateTransition {
                    from: session.status,
                    to: UploadStatus::Completed,
                })
            }
            UploadStatus::Initiated => {
                validate_parts(&request.completed_parts, session.part_count)?;
                if let Err(e) = self
                    .assemble_object(&session, &request.completed_parts)
                    .await
                {
                    // A concurrent complete or cancel may have consumed the upload id.
                    return self.settle_after_failure(session.id, e).await;
                }
                self.mark_uploading(&session).await?;
            }
            UploadStatus::Uploading => {
                tracing::debug!("Object already assembled, retrying quota commit");
            }
        }

        self.commit_upload(&session).await
    }

    /// Cancel a session. Cancelling a session that already reached a terminal status is a
    /// no-op and returns it unchanged.
    #[tracing::instrument(skip(self), fields(institution_id = %institution_id, session_id = %session_id))]
    pub async fn cancel(
        &self,
        institution_id: Uuid,
        session_id: Uuid,
    ) -> Result<UploadSession, AppError> {
        self.load_scoped(institution_id, session_id).await?;
        let (_, session) = self.terminate(session_id, UploadStatus::Cancelled).await?;
        Ok(session)
    }

    /// Expire an abandoned session. Used by the sweeper.
    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    pub async fn expire(&self, session_id: Uuid) -> Result<TerminateOutcome, AppError> {
        let (outcome, _) = self.terminate(session_id, UploadStatus::Expired).await?;
        Ok(outcome)
    }

    pub async fn get_session(
        &self,
        institution_id: Uuid,
        session_id: Uuid,
    ) -> Result<UploadSession, AppError> {
        self.load_scoped(institution_id, session_id).await
    }

    /// Presign fresh URLs for parts of a session that is still accepting parts.
    #[tracing::instrument(skip(self, part_numbers), fields(institution_id = %institution_id, session_id = %session_id))]
    pub async fn refresh_part_urls(
        &self,
        institution_id: Uuid,
        session_id: Uuid,
        part_numbers: Vec<i32>,
    ) -> Result<RefreshPartUrlsResponse, AppError> {
        let session = self.load_scoped(institution_id, session_id).await?;
        if session.status != UploadStatus::Initiated {
            return Err(AppError::Conflict(format!(
                "Upload session is {}, part URLs can only be issued while INITIATED",
                session.status
            )));
        }

        let mut part_numbers = part_numbers;
        part_numbers.sort_unstable();
        part_numbers.dedup();
        if part_numbers.is_empty() {
            return Err(AppError::InvalidInput(
                "At least one part number is required".to_string(),
            ));
        }
        if let Some(bad) = part_numbers
            .iter()
            .find(|n| **n < 1 || **n > session.part_count)
        {
            return Err(AppError::InvalidInput(format!(
                "Part number {} is outside 1..={}",
                bad, session.part_count
            )));
        }

        let urls = self.presign_parts(&session, &part_numbers).await?;
        let expires_at = Utc::now()
            + chrono::Duration::minutes(self.config.presigned_url_expiry_minutes as i64);

        Ok(RefreshPartUrlsResponse {
            upload_session_id: session.id,
            parts: part_numbers
                .into_iter()
                .zip(urls)
                .map(|(part_number, url)| PresignedPart { part_number, url })
                .collect(),
            expires_at,
        })
    }

    async fn load_scoped(
        &self,
        institution_id: Uuid,
        session_id: Uuid,
    ) -> Result<UploadSession, AppError> {
        match self.store.get_session(session_id).await? {
            Some(session) if session.institution_id == institution_id => Ok(session),
            Some(_) => {
                tracing::warn!(
                    session_id = %session_id,
                    institution_id = %institution_id,
                    "Cross-tenant upload session access"
                );
                Err(AppError::SessionNotFound(session_id))
            }
            None => Err(AppError::SessionNotFound(session_id)),
        }
    }

    /// Map a failed complete step onto the session's current status. A session another
    /// caller completed returns its asset; a cancelled or expired one is a state conflict.
    async fn settle_after_failure(
        &self,
        session_id: Uuid,
        err: AppError,
    ) -> Result<MediaAsset, AppError> {
        match self.store.get_session(session_id).await? {
            Some(current) if current.status == UploadStatus::Completed => {
                self.existing_asset(session_id).await
            }
            Some(current) if current.status.is_terminal() => Err(AppError::InvalidStateTransition {
                from: current.status,
                to: UploadStatus::Completed,
            }),
            _ => Err(err),
        }
    }

    async fn existing_asset(&self, session_id: Uuid) -> Result<MediaAsset, AppError> {
        self.store
            .get_asset_by_session(session_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Media created by upload session {} was deleted",
                    session_id
                ))
            })
    }

    async fn insert_session(&self, session: &UploadSession) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        tx.insert_session(session).await?;
        tx.commit().await
    }

    async fn presign_parts(
        &self,
        session: &UploadSession,
        part_numbers: &[i32],
    ) -> Result<Vec<String>, AppError> {
        let expires_in = self.config.presigned_url_expiry();
        let urls = try_join_all(part_numbers.iter().map(|part_number| {
            self.gateway.presign_part_url(
                &session.storage_key,
                &session.object_store_upload_id,
                *part_number,
                expires_in,
            )
        }))
        .await?;
        Ok(urls)
    }

    /// Ask the object store to assemble the parts. When the upload id is already gone but
    /// the object exists, an earlier attempt assembled it and the result is reused.
    async fn assemble_object(
        &self,
        session: &UploadSession,
        parts: &[CompletedPart],
    ) -> Result<(), AppError> {
        let result = self
            .gateway
            .complete_multipart_upload(
                &session.storage_key,
                &session.object_store_upload_id,
                parts,
            )
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(GatewayError::NotFound(_)) => match self.gateway.head_object(&session.storage_key).await {
                Ok(_) => {
                    tracing::info!(
                        key = %session.storage_key,
                        "Multipart upload was already assembled"
                    );
                    Ok(())
                }
                Err(GatewayError::NotFound(_)) => Err(AppError::Conflict(format!(
                    "Multipart upload {} no longer exists",
                    session.object_store_upload_id
                ))),
                Err(e) => Err(e.into()),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to complete multipart upload");
                Err(e.into())
            }
        }
    }

    async fn mark_uploading(&self, session: &UploadSession) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        let moved = tx
            .transition_session(
                session.id,
                &[UploadStatus::Initiated],
                UploadStatus::Uploading,
            )
            .await?;
        tx.commit().await?;
        if moved {
            return Ok(());
        }

        match self.store.get_session(session.id).await? {
            Some(current)
                if matches!(
                    current.status,
                    UploadStatus::Uploading | UploadStatus::Completed
                ) =>
            {
                Ok(())
            }
            Some(current) => {
                // Cancelled or expired while the object was being assembled. The cancel path
                // only saw INITIATED, so the object is ours to remove.
                tracing::warn!(
                    status = %current.status,
                    "Upload session terminated during complete, discarding object"
                );
                self.janitor
                    .schedule(ObjectCleanup::delete(&session.storage_key))
                    .await;
                Err(AppError::InvalidStateTransition {
                    from: current.status,
                    to: UploadStatus::Completed,
                })
            }
            None => Err(AppError::SessionNotFound(session.id)),
        }
    }

    /// Commit quota for the assembled object, insert the asset and mark the session
    /// COMPLETED in one transaction.
    async fn commit_upload(&self, session: &UploadSession) -> Result<MediaAsset, AppError> {
        let size = match self.gateway.head_object(&session.storage_key).await {
            Ok(size) => size,
            Err(e) => return self.settle_after_failure(session.id, e.into()).await,
        };
        let size_bytes = i64::try_from(size).map_err(|_| {
            AppError::Internal(format!("Object size {} does not fit in i64", size))
        })?;

        let mut tx = self.store.begin().await?;
        let current = tx
            .lock_session(session.id)
            .await?
            .ok_or(AppError::SessionNotFound(session.id))?;
        match current.status {
            UploadStatus::Uploading => {}
            UploadStatus::Completed => {
                drop(tx);
                return self.existing_asset(session.id).await;
            }
            other => {
                return Err(AppError::InvalidStateTransition {
                    from: other,
                    to: UploadStatus::Completed,
                })
            }
        }

        if let Err(e) = self
            .ledger
            .commit_tx(tx.as_mut(), current.reservation_id, size_bytes)
            .await
        {
            tracing::warn!(
                error = %e,
                declared_size_bytes = current.declared_size_bytes,
                size_bytes,
                "Quota commit failed, session stays UPLOADING"
            );
            return Err(e);
        }

        let asset = MediaAsset {
            id: Uuid::new_v4(),
            institution_id: current.institution_id,
            uploader_id: current.uploader_id,
            upload_session_id: current.id,
            title: title_from_filename(&current.filename),
            filename: current.filename.clone(),
            media_type: current.media_type,
            quota_type: current.media_type.quota_type(),
            content_type: current.content_type.clone(),
            size_bytes,
            storage_path: current.storage_key.clone(),
            status: MediaAssetStatus::Completed,
            upload_time: Utc::now(),
            last_access_time: None,
        };
        tx.insert_asset(&asset).await?;

        if !tx
            .transition_session(current.id, &[UploadStatus::Uploading], UploadStatus::Completed)
            .await?
        {
            return Err(AppError::Internal(format!(
                "Upload session {} changed while locked",
                current.id
            )));
        }
        tx.commit().await?;

        tracing::info!(media_id = %asset.id, size_bytes, "Upload completed");
        Ok(asset)
    }

    /// Move a non-terminal session to `to` and release its reservation. The object store
    /// cleanup is recorded in the same transaction and attempted after commit.
    async fn terminate(
        &self,
        session_id: Uuid,
        to: UploadStatus,
    ) -> Result<(TerminateOutcome, UploadSession), AppError> {
        let mut tx = self.store.begin().await?;
        let mut session = tx
            .lock_session(session_id)
            .await?
            .ok_or(AppError::SessionNotFound(session_id))?;
        if session.status.is_terminal() {
            tracing::debug!(status = %session.status, "Upload session already terminal");
            return Ok((TerminateOutcome::AlreadyTerminal(session.status), session));
        }

        if !tx
            .transition_session(session.id, &UploadStatus::ACTIVE, to)
            .await?
        {
            return Err(AppError::Internal(format!(
                "Upload session {} changed while locked",
                session.id
            )));
        }
        self.ledger
            .release_tx(tx.as_mut(), session.reservation_id)
            .await?;
        let previous = session.status;
        let cleanup = ObjectCleanup::abort_upload(
            &session.storage_key,
            &session.object_store_upload_id,
            previous == UploadStatus::Uploading,
        );
        tx.insert_cleanup(&cleanup).await?;
        tx.commit().await?;

        self.janitor.run(&cleanup).await;

        session.status = to;
        session.updated_at = Utc::now();
        tracing::info!(from = %previous, to = %to, "Upload session terminated");
        Ok((TerminateOutcome::Transitioned, session))
    }

    async fn release_quietly(&self, reservation_id: Uuid) {
        if let Err(e) = self.ledger.release(reservation_id).await {
            tracing::error!(
                error = %e,
                reservation_id = %reservation_id,
                "Failed to release quota reservation"
            );
        }
    }
}

fn validate_parts(parts: &[CompletedPart], part_count: i32) -> Result<(), AppError> {
    if parts.is_empty() {
        return Err(AppError::InvalidInput(
            "At least one completed part is required".to_string(),
        ));
    }
    let mut previous = 0;
    for part in parts {
        if part.part_number <= previous {
            return Err(AppError::InvalidInput(
                "Completed parts must be listed in ascending part number order".to_string(),
            ));
        }
        if part.part_number > part_count {
            return Err(AppError::InvalidInput(format!(
                "Part number {} is outside 1..={}",
                part.part_number, part_count
            )));
        }
        if part.e_tag.trim().is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Part {} has an empty eTag",
                part.part_number
            )));
        }
        previous = part.part_number;
    }
    Ok(())
}
