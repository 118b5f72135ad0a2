use crate::auth::jwt::JwtAuth;
use crate::auth::models::AuthContext;
use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use lectern_core::AppError;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtAuth,
}

pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = match request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        Some(h) => h,
        None => {
            return HttpAppError(AppError::Unauthorized(
                "Missing authorization header".to_string(),
            ))
            .into_response();
        }
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return HttpAppError(AppError::Unauthorized(
            "Invalid authorization header format".to_string(),
        ))
        .into_response();
    };

    match auth_state.jwt.validate_token(token.trim()) {
        Ok(claims) => {
            let context = AuthContext::from(claims);
            tracing::debug!(
                user_id = %context.user_id,
                institution_id = %context.institution_id,
                role = %context.role,
                "Request authenticated"
            );
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(e) => HttpAppError(e).into_response(),
    }
}
