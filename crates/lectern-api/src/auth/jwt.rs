//! HS256 token validation

use crate::auth::models::JwtClaims;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use lectern_core::AppError;

/// Shared-secret JWT verifier. Tokens are minted by the identity provider holding the
/// same secret.
#[derive(Clone)]
pub struct JwtAuth {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AppError> {
        let token_data =
            decode::<JwtClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                tracing::debug!("JWT validation failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AppError::Unauthorized("Token has expired".to_string())
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AppError::Unauthorized("Invalid token signature".to_string())
                    }
                    _ => AppError::Unauthorized(format!("Invalid token: {}", e)),
                }
            })?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::UserRole;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    fn sign(
        secret: &str,
        user_id: Uuid,
        institution_id: Uuid,
        role: UserRole,
        ttl: chrono::Duration,
    ) -> String {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id,
            institution_id,
            role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_signed_token_validates() {
        let auth = JwtAuth::new(SECRET);
        let user = Uuid::new_v4();
        let institution = Uuid::new_v4();
        let token = sign(
            SECRET,
            user,
            institution,
            UserRole::Instructor,
            chrono::Duration::hours(1),
        );

        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.institution_id, institution);
        assert_eq!(claims.role, UserRole::Instructor);
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = JwtAuth::new(SECRET);
        let token = sign(
            SECRET,
            Uuid::new_v4(),
            Uuid::new_v4(),
            UserRole::Student,
            chrono::Duration::hours(-1),
        );
        assert!(matches!(
            auth.validate_token(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let token = sign(
            "another-secret-that-is-at-least-32-chars",
            Uuid::new_v4(),
            Uuid::new_v4(),
            UserRole::PlatformAdmin,
            chrono::Duration::hours(1),
        );
        assert!(JwtAuth::new(SECRET).validate_token(&token).is_err());
    }
}
