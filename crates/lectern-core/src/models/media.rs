use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::quota::QuotaType;

/// Media type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Video,
    Document,
    Image,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "VIDEO",
            MediaType::Document => "DOCUMENT",
            MediaType::Image => "IMAGE",
            MediaType::Audio => "AUDIO",
        }
    }

    /// Typed account this media is charged to. Images and audio only count against TOTAL.
    pub fn quota_type(&self) -> QuotaType {
        match self {
            MediaType::Video => QuotaType::Video,
            MediaType::Document => QuotaType::Document,
            MediaType::Image | MediaType::Audio => QuotaType::Total,
        }
    }

    pub fn default_content_type(&self) -> &'static str {
        match self {
            MediaType::Video => "video/mp4",
            MediaType::Document => "application/pdf",
            MediaType::Image => "image/jpeg",
            MediaType::Audio => "audio/mpeg",
        }
    }
}

impl FromStr for MediaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VIDEO" => Ok(MediaType::Video),
            "DOCUMENT" => Ok(MediaType::Document),
            "IMAGE" => Ok(MediaType::Image),
            "AUDIO" => Ok(MediaType::Audio),
            _ => Err(anyhow::anyhow!("Invalid media type: {}", s)),
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a finalized asset. Downstream processors move it out of `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaAssetStatus {
    Processing,
    Completed,
    Failed,
}

impl MediaAssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaAssetStatus::Processing => "PROCESSING",
            MediaAssetStatus::Completed => "COMPLETED",
            MediaAssetStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for MediaAssetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PROCESSING" => Ok(MediaAssetStatus::Processing),
            "COMPLETED" => Ok(MediaAssetStatus::Completed),
            "FAILED" => Ok(MediaAssetStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid media asset status: {}", s)),
        }
    }
}

/// Persisted metadata of a successfully completed upload.
///
/// `size_bytes` always equals the bytes committed to the owning quota account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub uploader_id: Uuid,
    pub upload_session_id: Uuid,
    pub title: String,
    pub filename: String,
    pub media_type: MediaType,
    pub quota_type: QuotaType,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub status: MediaAssetStatus,
    pub upload_time: DateTime<Utc>,
    pub last_access_time: Option<DateTime<Utc>>,
}

/// Title shown for a new asset: the filename without its extension.
pub fn title_from_filename(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => filename.to_string(),
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filter for tenant-scoped listing
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    pub media_type: Option<MediaType>,
    pub filename_contains: Option<String>,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl MediaFilter {
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.page_size = match self.page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        self.filename_contains = self
            .filename_contains
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.page_size as i64
    }
}

/// One page of a listing
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaPage {
    pub items: Vec<MediaAsset>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

/// Presigned read access to an asset
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaAccessResponse {
    pub media_id: Uuid,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
