use crate::auth::AuthContext;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use lectern_core::models::{MediaAccessResponse, MediaAsset, MediaFilter, MediaPage, MediaType};
use lectern_core::AppError;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AccessQuery {
    /// Lifetime of the URL in minutes (1..=10080, default 60)
    pub expiration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListMediaQuery {
    /// VIDEO, DOCUMENT, IMAGE or AUDIO (case-insensitive)
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    /// Case-insensitive filename substring
    pub filename: Option<String>,
    /// 1-based page number
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListMediaQuery {
    fn into_filter(self) -> Result<MediaFilter, AppError> {
        let media_type = self
            .media_type
            .filter(|t| !t.trim().is_empty())
            .map(|t| {
                t.trim().parse::<MediaType>().map_err(|_| {
                    AppError::InvalidInput(format!(
                        "Invalid type: {}. Must be one of: VIDEO, DOCUMENT, IMAGE, AUDIO",
                        t
                    ))
                })
            })
            .transpose()?;

        Ok(MediaFilter {
            media_type,
            filename_contains: self.filename,
            page: self.page.unwrap_or(1),
            page_size: self.page_size.unwrap_or(0),
        })
    }
}

#[utoipa::path(
    get,
    path = "/api/media/{id}",
    tag = "media",
    params(("id" = Uuid, Path, description = "Media ID")),
    responses(
        (status = 200, description = "Media found", body = MediaAsset),
        (status = 404, description = "Media not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_media(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MediaAsset>, HttpAppError> {
    let asset = state
        .catalog
        .get_by_id_scoped(id, auth.institution_id)
        .await?;
    Ok(Json(asset))
}

/// Presigned read URL for an asset
#[utoipa::path(
    get,
    path = "/api/media/{id}/access",
    tag = "media",
    params(("id" = Uuid, Path, description = "Media ID"), AccessQuery),
    responses(
        (status = 200, description = "Presigned URL", body = MediaAccessResponse),
        (status = 404, description = "Media not found", body = ErrorResponse),
        (status = 502, description = "Object store failure", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_media_access(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    query: Result<Query<AccessQuery>, QueryRejection>,
) -> Result<Json<MediaAccessResponse>, HttpAppError> {
    let Query(query) = query?;
    let access = state
        .catalog
        .access_url(id, auth.institution_id, query.expiration_minutes)
        .await?;
    Ok(Json(access))
}

#[utoipa::path(
    get,
    path = "/api/media",
    tag = "media",
    params(ListMediaQuery),
    responses(
        (status = 200, description = "One page of the institution's media", body = MediaPage),
        (status = 400, description = "Invalid filter", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_media(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListMediaQuery>, QueryRejection>,
) -> Result<Json<MediaPage>, HttpAppError> {
    let Query(query) = query?;
    let page = state
        .catalog
        .list_by_filter(auth.institution_id, query.into_filter()?)
        .await?;
    Ok(Json(page))
}

/// Delete an asset and return its bytes to the institution's quota
#[utoipa::path(
    delete,
    path = "/api/media/{id}",
    tag = "media",
    params(("id" = Uuid, Path, description = "Media ID")),
    responses(
        (status = 204, description = "Media deleted"),
        (status = 403, description = "Role cannot delete media", body = ErrorResponse),
        (status = 404, description = "Media not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state),
    fields(institution_id = %auth.institution_id, user_id = %auth.user_id, media_id = %id)
)]
pub async fn delete_media(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HttpAppError> {
    auth.require_media_manager()?;

    state.catalog.delete(id, auth.institution_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
