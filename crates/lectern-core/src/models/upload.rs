use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::media::MediaType;
use crate::AppError;

/// S3 rejects non-final parts smaller than 5 MiB.
pub const MIN_PART_SIZE_BYTES: i64 = 5 * 1024 * 1024;
/// S3 accepts at most 10,000 parts per multipart upload.
pub const MAX_PART_COUNT: i64 = 10_000;
const MIB: i64 = 1024 * 1024;

/// Upload session status.
///
/// `Initiated` and `Uploading` both hold the quota reservation. `Uploading` means the object
/// store has already assembled the object and only the quota commit is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    Initiated,
    Uploading,
    Completed,
    Cancelled,
    Expired,
}

impl UploadStatus {
    /// Statuses a session can leave through a terminal transition.
    pub const ACTIVE: [UploadStatus; 2] = [UploadStatus::Initiated, UploadStatus::Uploading];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Cancelled | UploadStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Initiated => "INITIATED",
            UploadStatus::Uploading => "UPLOADING",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Cancelled => "CANCELLED",
            UploadStatus::Expired => "EXPIRED",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INITIATED" => Ok(UploadStatus::Initiated),
            "UPLOADING" => Ok(UploadStatus::Uploading),
            "COMPLETED" => Ok(UploadStatus::Completed),
            "CANCELLED" => Ok(UploadStatus::Cancelled),
            "EXPIRED" => Ok(UploadStatus::Expired),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One initiated upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub uploader_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub declared_size_bytes: i64,
    pub media_type: MediaType,
    pub storage_key: String,
    pub object_store_upload_id: String,
    pub part_size: i64,
    pub part_count: i32,
    pub status: UploadStatus,
    pub reservation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Part layout of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    pub part_size: i64,
    pub part_count: i32,
}

impl UploadPlan {
    /// Split `size_bytes` into parts of `preferred_part_size`, growing the part size
    /// (in whole MiB) when the count would pass the object store's part limit.
    pub fn for_size(size_bytes: i64, preferred_part_size: i64) -> Result<Self, AppError> {
        if size_bytes <= 0 {
            return Err(AppError::InvalidInput(
                "File size must be at least 1 byte".to_string(),
            ));
        }

        let mut part_size = preferred_part_size.max(MIN_PART_SIZE_BYTES);
        if div_ceil(size_bytes, part_size) > MAX_PART_COUNT {
            part_size = div_ceil(div_ceil(size_bytes, MAX_PART_COUNT), MIB) * MIB;
        }

        let part_count = div_ceil(size_bytes, part_size);
        Ok(UploadPlan {
            part_size,
            part_count: part_count as i32,
        })
    }
}

fn div_ceil(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

/// Reject filenames that could escape the session's key prefix or break headers.
pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    let trimmed = filename.trim();
    if trimmed.is_empty() || filename.chars().count() > 255 {
        return Err(AppError::InvalidInput(
            "Filename must be between 1 and 255 characters".to_string(),
        ));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(AppError::InvalidInput("Invalid filename".to_string()));
    }
    if filename
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(AppError::InvalidInput(
            "Filename must not contain path separators or control characters".to_string(),
        ));
    }
    Ok(())
}

/// Object key component derived from a filename: ASCII alphanumerics, `.`, `-` and `_` only.
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized.to_string()
    }
}

/// A part the client uploaded directly to the object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CompletedPart {
    #[serde(rename = "partNumber")]
    pub part_number: i32,
    #[serde(rename = "eTag")]
    pub e_tag: String,
}

/// Request to initiate a chunked upload
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadRequest {
    /// Original filename
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub filename: String,
    /// Declared file size in bytes
    #[validate(range(min = 1, message = "File size must be at least 1 byte"))]
    pub file_size: i64,
    pub media_type: MediaType,
    /// MIME type; defaults per media type when omitted
    #[serde(default)]
    #[validate(length(max = 255, message = "Content type must be at most 255 characters"))]
    pub content_type: Option<String>,
}

/// Response to a successful initiate
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadResponse {
    pub upload_session_id: Uuid,
    pub object_store_upload_id: String,
    /// URL for part N is at index N-1
    pub presigned_part_urls: Vec<String>,
    pub part_size: i64,
    pub part_count: i32,
    pub expires_at: DateTime<Utc>,
}

/// Request to finalize a chunked upload
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    /// Object store upload id returned by initiate
    #[validate(length(min = 1, message = "uploadId is required"))]
    pub upload_id: String,
    #[validate(length(min = 1, message = "At least one completed part is required"))]
    pub completed_parts: Vec<CompletedPart>,
}

/// Request to re-issue presigned part URLs
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPartUrlsRequest {
    #[validate(length(min = 1, max = 1000, message = "Between 1 and 1000 part numbers"))]
    pub part_numbers: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresignedPart {
    pub part_number: i32,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPartUrlsResponse {
    pub upload_session_id: Uuid,
    pub parts: Vec<PresignedPart>,
    pub expires_at: DateTime<Utc>,
}
