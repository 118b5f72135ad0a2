//! Shared key generation for gateway backends.
//!
//! Key format: `institutions/{institution_id}/{session_id}/{filename}`. The filename is
//! sanitized so a key can never leave its institution prefix.

use lectern_core::models::sanitize_filename;
use uuid::Uuid;

pub fn institution_prefix(institution_id: Uuid) -> String {
    format!("institutions/{}/", institution_id)
}

/// Object key for the upload session `session_id` of `institution_id`.
pub fn object_key(institution_id: Uuid, session_id: Uuid, filename: &str) -> String {
    format!(
        "{}{}/{}",
        institution_prefix(institution_id),
        session_id,
        sanitize_filename(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_is_scoped_to_institution() {
        let institution = Uuid::new_v4();
        let session = Uuid::new_v4();
        let key = object_key(institution, session, "../../other/secret.pdf");
        assert!(key.starts_with(&institution_prefix(institution)));
        assert!(key.ends_with(&format!("{}/_.._other_secret.pdf", session)));
        assert_eq!(key.matches('/').count(), 3);
    }

    #[test]
    fn test_object_key_layout() {
        let institution = Uuid::nil();
        let session = Uuid::nil();
        assert_eq!(
            object_key(institution, session, "Lecture 1.mp4"),
            format!("institutions/{}/{}/Lecture_1.mp4", institution, session)
        );
    }
}
