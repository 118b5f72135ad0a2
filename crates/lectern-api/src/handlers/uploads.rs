//! Chunked upload handlers.
//!
//! Clients initiate a session, PUT each part straight to the object store through the
//! presigned URLs, then call complete with the ETags the store returned.

use crate::auth::AuthContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use lectern_core::models::{
    CompleteUploadRequest, InitiateUploadRequest, InitiateUploadResponse, MediaAsset,
    RefreshPartUrlsRequest, RefreshPartUrlsResponse, UploadSession,
};
use lectern_services::InitiateUpload;
use std::sync::Arc;
use uuid::Uuid;

/// Start a chunked upload: reserves quota and returns one presigned URL per part
#[utoipa::path(
    post,
    path = "/api/media/initiate-upload",
    tag = "uploads",
    request_body = InitiateUploadRequest,
    responses(
        (status = 201, description = "Upload session created", body = InitiateUploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Role cannot upload", body = ErrorResponse),
        (status = 409, description = "Quota exceeded", body = ErrorResponse),
        (status = 413, description = "File larger than the media type allows", body = ErrorResponse),
        (status = 502, description = "Object store failure", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, request),
    fields(institution_id = %auth.institution_id, user_id = %auth.user_id)
)]
pub async fn initiate_upload(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<InitiateUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    auth.require_media_manager()?;

    let response = state
        .coordinator
        .initiate(InitiateUpload::from_request(
            auth.institution_id,
            auth.user_id,
            request,
        ))
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Finalize a chunked upload and commit its quota
#[utoipa::path(
    post,
    path = "/api/media/{id}/complete",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    request_body = CompleteUploadRequest,
    responses(
        (status = 200, description = "Upload finalized", body = MediaAsset),
        (status = 400, description = "Invalid part list", body = ErrorResponse),
        (status = 404, description = "Upload session not found", body = ErrorResponse),
        (status = 409, description = "Quota exceeded or session already terminated", body = ErrorResponse),
        (status = 502, description = "Object store failure", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, request),
    fields(institution_id = %auth.institution_id, session_id = %id)
)]
pub async fn complete_upload(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<CompleteUploadRequest>,
) -> Result<Json<MediaAsset>, HttpAppError> {
    auth.require_media_manager()?;

    let asset = state
        .coordinator
        .complete(auth.institution_id, id, request)
        .await?;
    Ok(Json(asset))
}

/// Cancel an upload and release its reservation. Cancelling a finished session is a no-op.
#[utoipa::path(
    delete,
    path = "/api/media/{id}/cancel",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Session after cancel", body = UploadSession),
        (status = 404, description = "Upload session not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state),
    fields(institution_id = %auth.institution_id, session_id = %id)
)]
pub async fn cancel_upload(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UploadSession>, HttpAppError> {
    auth.require_media_manager()?;

    let session = state.coordinator.cancel(auth.institution_id, id).await?;
    Ok(Json(session))
}

#[utoipa::path(
    get,
    path = "/api/media/uploads/{id}",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Upload session", body = UploadSession),
        (status = 404, description = "Upload session not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_upload_session(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UploadSession>, HttpAppError> {
    let session = state
        .coordinator
        .get_session(auth.institution_id, id)
        .await?;
    Ok(Json(session))
}

/// Re-issue presigned URLs for parts whose URLs expired mid-upload
#[utoipa::path(
    post,
    path = "/api/media/uploads/{id}/parts",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    request_body = RefreshPartUrlsRequest,
    responses(
        (status = 200, description = "Fresh part URLs", body = RefreshPartUrlsResponse),
        (status = 400, description = "Part number out of range", body = ErrorResponse),
        (status = 404, description = "Upload session not found", body = ErrorResponse),
        (status = 409, description = "Session no longer accepts parts", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_part_urls(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<RefreshPartUrlsRequest>,
) -> Result<Json<RefreshPartUrlsResponse>, HttpAppError> {
    auth.require_media_manager()?;

    let response = state
        .coordinator
        .refresh_part_urls(auth.institution_id, id, request.part_numbers)
        .await?;
    Ok(Json(response))
}
