//! Object store gateway trait
//!
//! This module defines the contract the upload coordinator relies on: multipart lifecycle
//! calls plus presigned part and read URLs. Implementations are S3 (and S3-compatible
//! providers) and an in-memory gateway for tests.

use async_trait::async_trait;
use lectern_core::models::CompletedPart;
use lectern_core::AppError;
use std::time::Duration;
use thiserror::Error;

/// Object store operation errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The object or multipart upload does not exist (or was already aborted)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store rejected the request, e.g. a part list with a wrong ETag
    #[error("Rejected by object store: {0}")]
    Rejected(String),

    /// Transport or service failure that may succeed on retry
    #[error("Object store backend error: {0}")]
    Backend(String),

    #[error("Object store call timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether retrying the same call can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Backend(_) | GatewayError::Timeout(_))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(msg) => AppError::NotFound(msg),
            GatewayError::Rejected(msg) => AppError::BadRequest(msg),
            GatewayError::Timeout(msg) => AppError::Timeout(msg),
            GatewayError::Backend(msg) | GatewayError::Config(msg) => AppError::ObjectStore(msg),
        }
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Multipart-capable object store.
///
/// Clients upload part bytes straight to the store through presigned URLs; the server only
/// drives the lifecycle. Keys are produced by [`crate::keys::object_key`].
#[async_trait]
pub trait ObjectStoreGateway: Send + Sync {
    /// Start a multipart upload and return the store's upload id.
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> GatewayResult<String>;

    /// Presigned PUT URL for one part (1-based part number).
    async fn presign_part_url(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> GatewayResult<String>;

    /// Assemble the object from the listed parts.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> GatewayResult<()>;

    /// Discard an unfinished multipart upload and its parts.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> GatewayResult<()>;

    /// Size in bytes of a stored object.
    async fn head_object(&self, key: &str) -> GatewayResult<u64>;

    /// Presigned GET URL for a stored object.
    async fn presign_get_url(&self, key: &str, expires_in: Duration) -> GatewayResult<String>;

    async fn delete_object(&self, key: &str) -> GatewayResult<()>;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}
