//! Row types for the PostgreSQL store. Enum columns are TEXT and parsed on the way out.

use chrono::{DateTime, Utc};
use lectern_core::models::{
    MediaAsset, MediaAssetStatus, MediaType, ObjectCleanup, QuotaAccount, QuotaReservation,
    QuotaType, ReservationStatus, UploadSession, UploadStatus,
};
use lectern_core::AppError;
use std::str::FromStr;
use uuid::Uuid;

fn parse_column<T>(column: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr<Err = anyhow::Error>,
{
    value.parse::<T>().map_err(|e| {
        AppError::Internal(format!("Corrupt value {:?} in column {}: {}", value, column, e))
    })
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct QuotaAccountRow {
    pub institution_id: Uuid,
    pub quota_type: String,
    pub total_bytes: i64,
    pub reserved_bytes: i64,
    pub used_bytes: i64,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<QuotaAccountRow> for QuotaAccount {
    type Error = AppError;

    fn try_from(row: QuotaAccountRow) -> Result<Self, Self::Error> {
        Ok(QuotaAccount {
            institution_id: row.institution_id,
            quota_type: parse_column::<QuotaType>("quota_type", &row.quota_type)?,
            total_bytes: row.total_bytes,
            reserved_bytes: row.reserved_bytes,
            used_bytes: row.used_bytes,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ReservationRow {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub quota_type: String,
    pub reserved_bytes: i64,
    pub committed_bytes: Option<i64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for QuotaReservation {
    type Error = AppError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(QuotaReservation {
            id: row.id,
            institution_id: row.institution_id,
            quota_type: parse_column::<QuotaType>("quota_type", &row.quota_type)?,
            reserved_bytes: row.reserved_bytes,
            committed_bytes: row.committed_bytes,
            status: parse_column::<ReservationStatus>("status", &row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SessionRow {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub uploader_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub declared_size_bytes: i64,
    pub media_type: String,
    pub storage_key: String,
    pub object_store_upload_id: String,
    pub part_size: i64,
    pub part_count: i32,
    pub status: String,
    pub reservation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for UploadSession {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(UploadSession {
            id: row.id,
            institution_id: row.institution_id,
            uploader_id: row.uploader_id,
            filename: row.filename,
            content_type: row.content_type,
            declared_size_bytes: row.declared_size_bytes,
            media_type: parse_column::<MediaType>("media_type", &row.media_type)?,
            storage_key: row.storage_key,
            object_store_upload_id: row.object_store_upload_id,
            part_size: row.part_size,
            part_count: row.part_count,
            status: parse_column::<UploadStatus>("status", &row.status)?,
            reservation_id: row.reservation_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AssetRow {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub uploader_id: Uuid,
    pub upload_session_id: Uuid,
    pub title: String,
    pub filename: String,
    pub media_type: String,
    pub quota_type: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub status: String,
    pub upload_time: DateTime<Utc>,
    pub last_access_time: Option<DateTime<Utc>>,
}

impl TryFrom<AssetRow> for MediaAsset {
    type Error = AppError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        Ok(MediaAsset {
            id: row.id,
            institution_id: row.institution_id,
            uploader_id: row.uploader_id,
            upload_session_id: row.upload_session_id,
            title: row.title,
            filename: row.filename,
            media_type: parse_column::<MediaType>("media_type", &row.media_type)?,
            quota_type: parse_column::<QuotaType>("quota_type", &row.quota_type)?,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            storage_path: row.storage_path,
            status: parse_column::<MediaAssetStatus>("status", &row.status)?,
            upload_time: row.upload_time,
            last_access_time: row.last_access_time,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CleanupRow {
    pub id: Uuid,
    pub storage_key: String,
    pub upload_id: Option<String>,
    pub delete_object: bool,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CleanupRow> for ObjectCleanup {
    type Error = AppError;

    fn try_from(row: CleanupRow) -> Result<Self, Self::Error> {
        Ok(ObjectCleanup {
            id: row.id,
            storage_key: row.storage_key,
            upload_id: row.upload_id,
            delete_object: row.delete_object,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_enum_value_is_internal_error() {
        let row = QuotaAccountRow {
            institution_id: Uuid::new_v4(),
            quota_type: "IMAGES".to_string(),
            total_bytes: 1,
            reserved_bytes: 0,
            used_bytes: 0,
            updated_at: Utc::now(),
        };
        let err = QuotaAccount::try_from(row).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_reservation_row_conversion() {
        let row = ReservationRow {
            id: Uuid::new_v4(),
            institution_id: Uuid::new_v4(),
            quota_type: "VIDEO".to_string(),
            reserved_bytes: 10,
            committed_bytes: Some(12),
            status: "COMMITTED".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let reservation = QuotaReservation::try_from(row).unwrap();
        assert_eq!(reservation.status, ReservationStatus::Committed);
        assert_eq!(reservation.committed_bytes, Some(12));
    }
}
