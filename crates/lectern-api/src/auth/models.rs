use crate::error::ErrorResponse;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use lectern_core::AppError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

/// Caller role carried in the token. Declared from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    Instructor,
    InstitutionAdmin,
    PlatformAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Instructor => "instructor",
            UserRole::InstitutionAdmin => "institution_admin",
            UserRole::PlatformAdmin => "platform_admin",
        }
    }

    /// Instructors and admins may upload, cancel and delete media.
    pub fn can_manage_media(&self) -> bool {
        *self >= UserRole::Instructor
    }

    pub fn is_platform_admin(&self) -> bool {
        *self == UserRole::PlatformAdmin
    }
}

impl Display for UserRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Uuid,
    pub institution_id: Uuid,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

/// Authenticated caller, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub institution_id: Uuid,
    pub role: UserRole,
}

impl AuthContext {
    pub fn require_media_manager(&self) -> Result<(), AppError> {
        if self.role.can_manage_media() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role {} cannot manage media",
                self.role
            )))
        }
    }

    pub fn require_platform_admin(&self) -> Result<(), AppError> {
        if self.role.is_platform_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Platform administrator role required".to_string(),
            ))
        }
    }
}

impl From<JwtClaims> for AuthContext {
    fn from(claims: JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            institution_id: claims.institution_id,
            role: claims.role,
        }
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: "Missing authentication context".to_string(),
                        details: None,
                        error_type: None,
                        code: "MISSING_AUTH_CONTEXT".to_string(),
                        recoverable: false,
                        suggested_action: Some("Send a valid bearer token".to_string()),
                        quota: None,
                    }),
                )
            })
    }
}
