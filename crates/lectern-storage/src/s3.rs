use crate::traits::{GatewayError, GatewayResult, ObjectStoreGateway};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use lectern_core::models::CompletedPart;
use std::time::{Duration, Instant};

/// S3 gateway implementation
#[derive(Clone)]
pub struct S3Gateway {
    client: Client,
    bucket: String,
}

impl S3Gateway {
    /// Create a new S3Gateway instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO). Custom endpoints use path-style addressing.
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> GatewayResult<Self> {
        if bucket.trim().is_empty() {
            return Err(GatewayError::Config("S3 bucket name is empty".to_string()));
        }

        // Credentials come from the standard AWS provider chain (env, profile, IMDS).
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(ref endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(S3Gateway {
            client: Client::from_conf(builder.build()),
            bucket,
        })
    }

    fn presigning(expires_in: Duration) -> GatewayResult<PresigningConfig> {
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| GatewayError::Config(format!("Invalid presign expiry: {}", e)))
    }
}

/// Map an S3 error code and HTTP status onto the gateway's error kinds.
fn classify_service_error(code: Option<&str>, status: u16, message: String) -> GatewayError {
    match code {
        Some("NoSuchKey") | Some("NoSuchUpload") | Some("NotFound") => {
            GatewayError::NotFound(message)
        }
        Some("InvalidPart") | Some("InvalidPartOrder") | Some("EntityTooSmall") => {
            GatewayError::Rejected(message)
        }
        Some("SlowDown") | Some("InternalError") | Some("ServiceUnavailable") => {
            GatewayError::Backend(message)
        }
        _ if status == 404 => GatewayError::NotFound(message),
        _ if status >= 500 => GatewayError::Backend(message),
        _ => GatewayError::Rejected(message),
    }
}

fn map_sdk_error<E>(err: SdkError<E>) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) => GatewayError::Timeout(message),
        SdkError::ConstructionFailure(_) => GatewayError::Config(message),
        SdkError::ServiceError(ctx) => {
            classify_service_error(ctx.err().code(), ctx.raw().status().as_u16(), message)
        }
        _ => GatewayError::Backend(message),
    }
}

#[async_trait]
impl ObjectStoreGateway for S3Gateway {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> GatewayResult<String> {
        let start = Instant::now();
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                let err = map_sdk_error(e);
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 create multipart upload failed"
                );
                err
            })?;

        let upload_id = output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Backend("S3 returned no upload id".to_string()))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 multipart upload created"
        );
        Ok(upload_id)
    }

    async fn presign_part_url(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> GatewayResult<String> {
        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(map_sdk_error)?;
        Ok(request.uri().to_string())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> GatewayResult<()> {
        let start = Instant::now();
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        S3CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(&p.e_tag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                let err = map_sdk_error(e);
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket,
                    key = %key,
                    part_count = parts.len(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 complete multipart upload failed"
                );
                err
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            part_count = parts.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 multipart upload completed"
        );
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> GatewayResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(map_sdk_error)?;

        tracing::info!(bucket = %self.bucket, key = %key, "S3 multipart upload aborted");
        Ok(())
    }

    async fn head_object(&self, key: &str) -> GatewayResult<u64> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let length = output
            .content_length()
            .ok_or_else(|| GatewayError::Backend(format!("No content length for {}", key)))?;
        u64::try_from(length)
            .map_err(|_| GatewayError::Backend(format!("Negative content length for {}", key)))
    }

    async fn presign_get_url(&self, key: &str, expires_in: Duration) -> GatewayResult<String> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(map_sdk_error)?;
        Ok(request.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> GatewayResult<()> {
        let start = Instant::now();
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let err = map_sdk_error(e);
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                err
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
