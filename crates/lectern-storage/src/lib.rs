//! Lectern Storage Library
//!
//! Object store gateway for chunked uploads. Clients send part bytes straight to the store
//! through presigned URLs; this crate only drives the multipart lifecycle and signs URLs.
//!
//! # Object key format
//!
//! `institutions/{institution_id}/{session_id}/{sanitized_filename}`. Key generation is
//! centralized in the `keys` module so every backend stays consistent.

pub mod factory;
pub mod keys;
pub mod memory;
pub mod retry;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_gateway;
pub use memory::InMemoryGateway;
pub use retry::{RetryPolicy, RetryingGateway};
#[cfg(feature = "storage-s3")]
pub use s3::S3Gateway;
pub use traits::{GatewayError, GatewayResult, ObjectStoreGateway};
