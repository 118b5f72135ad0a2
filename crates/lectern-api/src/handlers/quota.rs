use crate::auth::AuthContext;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{extract::State, Json};
use lectern_core::models::InstitutionQuota;
use std::sync::Arc;

/// Per-type and total usage of the caller's institution
#[utoipa::path(
    get,
    path = "/api/media/quota",
    tag = "quota",
    responses(
        (status = 200, description = "Quota usage", body = InstitutionQuota),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_quota(
    auth: AuthContext,
    State(state): State<Arc<AppState>>,
) -> Result<Json<InstitutionQuota>, HttpAppError> {
    let quota = state.ledger.usage(auth.institution_id).await?;
    Ok(Json(quota))
}
