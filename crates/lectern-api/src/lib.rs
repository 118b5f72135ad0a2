//! Lectern API Library
//!
//! This crate provides the HTTP handlers, the bearer-token auth boundary, OpenAPI docs and
//! application setup.

mod api_doc;
pub mod constants;
mod handlers;
pub mod setup;
mod telemetry;

// Public modules
pub mod auth;
pub mod error;
pub mod state;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
