//! Timeout and retry decorator for gateway backends
//!
//! Every call is bounded by a timeout. Idempotent calls (abort, head, delete and URL
//! signing) are retried on transient errors with a linear backoff. Create and complete are
//! not retried here: a retried create would leak an upload id, and the client retries
//! complete itself.

use crate::traits::{GatewayError, GatewayResult, ObjectStoreGateway};
use async_trait::async_trait;
use lectern_core::models::CompletedPart;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Run `call` once, bounded by `timeout`.
pub async fn with_timeout<T, Fut>(operation: &str, timeout: Duration, call: Fut) -> GatewayResult<T>
where
    Fut: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(format!(
            "{} did not finish within {:?}",
            operation, timeout
        ))),
    }
}

/// Run `f` with a timeout per attempt, retrying transient failures.
pub async fn with_retry<T, F, Fut>(operation: &str, policy: RetryPolicy, mut f: F) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let mut attempt = 0;
    loop {
        match with_timeout(operation, policy.timeout, f()).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = operation,
                    attempt = attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Object store call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Wraps a gateway with per-call timeouts and retries.
pub struct RetryingGateway {
    inner: Arc<dyn ObjectStoreGateway>,
    policy: RetryPolicy,
}

impl RetryingGateway {
    pub fn new(inner: Arc<dyn ObjectStoreGateway>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ObjectStoreGateway for RetryingGateway {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> GatewayResult<String> {
        with_timeout(
            "create_multipart_upload",
            self.policy.timeout,
            self.inner.create_multipart_upload(key, content_type),
        )
        .await
    }

    async fn presign_part_url(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> GatewayResult<String> {
        with_retry("presign_part_url", self.policy, move || {
            self.inner
                .presign_part_url(key, upload_id, part_number, expires_in)
        })
        .await
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> GatewayResult<()> {
        with_timeout(
            "complete_multipart_upload",
            self.policy.timeout,
            self.inner.complete_multipart_upload(key, upload_id, parts),
        )
        .await
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> GatewayResult<()> {
        with_retry("abort_multipart_upload", self.policy, move || {
            self.inner.abort_multipart_upload(key, upload_id)
        })
        .await
    }

    async fn head_object(&self, key: &str) -> GatewayResult<u64> {
        with_retry("head_object", self.policy, move || self.inner.head_object(key)).await
    }

    async fn presign_get_url(&self, key: &str, expires_in: Duration) -> GatewayResult<String> {
        with_retry("presign_get_url", self.policy, move || {
            self.inner.presign_get_url(key, expires_in)
        })
        .await
    }

    async fn delete_object(&self, key: &str) -> GatewayResult<()> {
        with_retry("delete_object", self.policy, move || self.inner.delete_object(key)).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry("head_object", fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GatewayError::Backend("503 Slow Down".to_string()))
                } else {
                    Ok(42u64)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: GatewayResult<()> = with_retry("abort_multipart_upload", fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::NotFound("NoSuchUpload".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(GatewayError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_stop_at_limit() {
        let calls = AtomicU32::new(0);
        let result: GatewayResult<()> = with_retry("delete_object", fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::Backend("connection reset".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let result: GatewayResult<()> =
            with_timeout("complete_multipart_upload", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Timeout(_))));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }
}
