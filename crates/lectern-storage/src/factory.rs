use crate::retry::{RetryPolicy, RetryingGateway};
#[cfg(feature = "storage-s3")]
use crate::S3Gateway;
use crate::{GatewayError, GatewayResult, ObjectStoreGateway};
use lectern_core::Config;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy from the object store settings.
pub fn retry_policy(config: &Config) -> RetryPolicy {
    let store = config.object_store();
    RetryPolicy {
        timeout: Duration::from_secs(store.timeout_seconds),
        max_retries: store.max_retries,
        base_delay: Duration::from_millis(store.retry_base_delay_ms),
    }
}

/// Create the object store gateway based on configuration
#[cfg(feature = "storage-s3")]
pub async fn create_gateway(config: &Config) -> GatewayResult<Arc<dyn ObjectStoreGateway>> {
    let store = config.object_store();
    if store.bucket.trim().is_empty() {
        return Err(GatewayError::Config("S3_BUCKET not configured".to_string()));
    }

    let s3 = S3Gateway::new(
        store.bucket.clone(),
        store.region.clone(),
        store.endpoint.clone(),
    )
    .await?;

    tracing::info!(
        bucket = %store.bucket,
        region = %store.region,
        endpoint = ?store.endpoint,
        "S3 gateway initialized"
    );

    Ok(Arc::new(RetryingGateway::new(
        Arc::new(s3),
        retry_policy(config),
    )))
}

#[cfg(not(feature = "storage-s3"))]
pub async fn create_gateway(_config: &Config) -> GatewayResult<Arc<dyn ObjectStoreGateway>> {
    Err(GatewayError::Config(
        "S3 gateway not available (storage-s3 feature not enabled)".to_string(),
    ))
}
