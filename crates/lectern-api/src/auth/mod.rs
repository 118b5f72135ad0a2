//! Bearer token authentication and role checks

pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::JwtAuth;
pub use models::{AuthContext, JwtClaims, UserRole};
