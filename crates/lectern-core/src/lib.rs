//! Lectern Core Library
//!
//! Domain models, quota accounting rules, error types and configuration shared by every
//! Lectern crate.

pub mod accounting;
pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{BaseConfig, Config, LecternConfig, ObjectStoreConfig, UploadConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
