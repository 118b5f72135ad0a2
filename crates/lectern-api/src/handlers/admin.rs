//! Platform administration endpoints

use crate::auth::AuthContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use lectern_core::models::{MediaAsset, QuotaUsage, SetQuotaRequest};
use std::sync::Arc;
use uuid::Uuid;

/// Set the total of one of an institution's quota accounts
#[utoipa::path(
    put,
    path = "/api/admin/institutions/{institutionId}/quota",
    tag = "admin",
    params(("institutionId" = Uuid, Path, description = "Institution ID")),
    request_body = SetQuotaRequest,
    responses(
        (status = 200, description = "Updated account", body = QuotaUsage),
        (status = 403, description = "Platform administrator role required", body = ErrorResponse),
        (status = 409, description = "Total below current usage", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, request),
    fields(admin_id = %auth.user_id, institution_id = %institution_id)
)]
pub async fn set_institution_quota(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(institution_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<SetQuotaRequest>,
) -> Result<Json<QuotaUsage>, HttpAppError> {
    auth.require_platform_admin()?;

    let usage = state
        .ledger
        .set_total(institution_id, request.quota_type, request.total_bytes)
        .await?;
    Ok(Json(usage))
}

/// Look up any institution's asset
#[utoipa::path(
    get,
    path = "/api/admin/media/{id}",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Media ID")),
    responses(
        (status = 200, description = "Media found", body = MediaAsset),
        (status = 403, description = "Platform administrator role required", body = ErrorResponse),
        (status = 404, description = "Media not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn preview_media(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MediaAsset>, HttpAppError> {
    auth.require_platform_admin()?;

    let asset = state.catalog.get_by_id_for_preview(id).await?;
    Ok(Json(asset))
}
