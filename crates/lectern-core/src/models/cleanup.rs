use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Object store work owed after an upload session ended or an asset was deleted.
///
/// The row is written in the same transaction as the state change and removed once the
/// gateway confirms the work, so a failed abort or delete is retried by the sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCleanup {
    pub id: Uuid,
    pub storage_key: String,
    /// Multipart upload to abort, if one may still be open.
    pub upload_id: Option<String>,
    pub delete_object: bool,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ObjectCleanup {
    fn new(storage_key: &str, upload_id: Option<&str>, delete_object: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            storage_key: storage_key.to_string(),
            upload_id: upload_id.map(str::to_string),
            delete_object,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Abort a multipart upload, and delete the assembled object too when `delete_object`.
    pub fn abort_upload(storage_key: &str, upload_id: &str, delete_object: bool) -> Self {
        Self::new(storage_key, Some(upload_id), delete_object)
    }

    /// Delete a stored object.
    pub fn delete(storage_key: &str) -> Self {
        Self::new(storage_key, None, true)
    }
}
