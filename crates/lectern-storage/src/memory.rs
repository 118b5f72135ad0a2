//! In-memory gateway
//!
//! Behaves like S3 for the calls the coordinator makes: upload ids are consumed by complete
//! and abort, parts must match the ETags the store handed out, and delete is idempotent.
//! Part bytes are never stored, only their sizes. Faults can be injected per operation.

use crate::traits::{GatewayError, GatewayResult, ObjectStoreGateway};
use async_trait::async_trait;
use lectern_core::models::CompletedPart;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CreateMultipart,
    PresignPart,
    CompleteMultipart,
    AbortMultipart,
    Head,
    PresignGet,
    Delete,
}

/// Error kind returned by an injected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Backend,
    Timeout,
    NotFound,
}

impl Fault {
    fn into_error(self, op: GatewayOp) -> GatewayError {
        let message = format!("injected fault on {:?}", op);
        match self {
            Fault::Backend => GatewayError::Backend(message),
            Fault::Timeout => GatewayError::Timeout(message),
            Fault::NotFound => GatewayError::NotFound(message),
        }
    }
}

#[derive(Debug)]
struct PendingUpload {
    key: String,
    content_type: String,
    /// part number -> (etag, size)
    parts: BTreeMap<i32, (String, u64)>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug, Default)]
struct GatewayState {
    uploads: HashMap<String, PendingUpload>,
    objects: HashMap<String, StoredObject>,
    faults: HashMap<GatewayOp, (Fault, u32)>,
    calls: HashMap<GatewayOp, u32>,
}

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<GatewayState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and fire an injected fault if one is armed.
    fn enter(&self, op: GatewayOp) -> GatewayResult<MutexGuard<'_, GatewayState>> {
        let mut state = self.state();
        *state.calls.entry(op).or_insert(0) += 1;
        let fired = match state.faults.get_mut(&op) {
            Some((fault, remaining)) => {
                *remaining -= 1;
                Some((*fault, *remaining == 0))
            }
            None => None,
        };
        if let Some((fault, exhausted)) = fired {
            if exhausted {
                state.faults.remove(&op);
            }
            return Err(fault.into_error(op));
        }
        Ok(state)
    }

    /// Make the next `times` calls of `op` fail with `fault`.
    pub fn inject_fault(&self, op: GatewayOp, fault: Fault, times: u32) {
        if times > 0 {
            self.state().faults.insert(op, (fault, times));
        }
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    pub fn calls(&self, op: GatewayOp) -> u32 {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Simulate a client PUT to a presigned part URL. Returns the part's ETag.
    pub fn put_part(&self, upload_id: &str, part_number: i32, size: u64) -> GatewayResult<String> {
        let mut state = self.state();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| GatewayError::NotFound(format!("upload {}", upload_id)))?;
        let etag = format!("\"{}\"", Uuid::new_v4().simple());
        upload.parts.insert(part_number, (etag.clone(), size));
        Ok(etag)
    }

    /// Upload parts of the given sizes as 1..=n and return the list a client would send.
    pub fn upload_parts(&self, upload_id: &str, sizes: &[u64]) -> GatewayResult<Vec<CompletedPart>> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                let part_number = i as i32 + 1;
                self.put_part(upload_id, part_number, *size)
                    .map(|e_tag| CompletedPart { part_number, e_tag })
            })
            .collect()
    }

    /// Store an object directly.
    pub fn put_object(&self, key: &str, size: u64) {
        self.state().objects.insert(
            key.to_string(),
            StoredObject {
                size,
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state().objects.get(key).cloned()
    }

    pub fn object_exists(&self, key: &str) -> bool {
        self.state().objects.contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    pub fn has_pending_upload(&self, upload_id: &str) -> bool {
        self.state().uploads.contains_key(upload_id)
    }

    pub fn pending_upload_count(&self) -> usize {
        self.state().uploads.len()
    }
}

#[async_trait]
impl ObjectStoreGateway for InMemoryGateway {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> GatewayResult<String> {
        let mut state = self.enter(GatewayOp::CreateMultipart)?;
        let upload_id = Uuid::new_v4().simple().to_string();
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
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
        let state = self.enter(GatewayOp::PresignPart)?;
        if !state.uploads.contains_key(upload_id) {
            return Err(GatewayError::NotFound(format!("upload {}", upload_id)));
        }
        Ok(format!(
            "memory://{}?partNumber={}&uploadId={}&expires={}",
            key,
            part_number,
            upload_id,
            expires_in.as_secs()
        ))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> GatewayResult<()> {
        let mut state = self.enter(GatewayOp::CompleteMultipart)?;
        let upload = state
            .uploads
            .get(upload_id)
            .ok_or_else(|| GatewayError::NotFound(format!("upload {}", upload_id)))?;
        if upload.key != key {
            return Err(GatewayError::Rejected(format!(
                "upload {} belongs to a different key",
                upload_id
            )));
        }
        if parts.is_empty() {
            return Err(GatewayError::Rejected("no parts listed".to_string()));
        }

        let mut size = 0u64;
        let mut previous = 0;
        for part in parts {
            if part.part_number <= previous {
                return Err(GatewayError::Rejected("InvalidPartOrder".to_string()));
            }
            previous = part.part_number;
            match upload.parts.get(&part.part_number) {
                Some((etag, part_size)) if *etag == part.e_tag => size += part_size,
                _ => {
                    return Err(GatewayError::Rejected(format!(
                        "InvalidPart: part {} was not uploaded with ETag {}",
                        part.part_number, part.e_tag
                    )))
                }
            }
        }

        let content_type = upload.content_type.clone();
        state.uploads.remove(upload_id);
        state
            .objects
            .insert(key.to_string(), StoredObject { size, content_type });
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> GatewayResult<()> {
        let mut state = self.enter(GatewayOp::AbortMultipart)?;
        state
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(format!("upload {}", upload_id)))
    }

    async fn head_object(&self, key: &str) -> GatewayResult<u64> {
        let state = self.enter(GatewayOp::Head)?;
        state
            .objects
            .get(key)
            .map(|o| o.size)
            .ok_or_else(|| GatewayError::NotFound(key.to_string()))
    }

    async fn presign_get_url(&self, key: &str, expires_in: Duration) -> GatewayResult<String> {
        let state = self.enter(GatewayOp::PresignGet)?;
        if !state.objects.contains_key(key) {
            return Err(GatewayError::NotFound(key.to_string()));
        }
        Ok(format!("memory://{}?expires={}", key, expires_in.as_secs()))
    }

    async fn delete_object(&self, key: &str) -> GatewayResult<()> {
        let mut state = self.enter(GatewayOp::Delete)?;
        state.objects.remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[tokio::test]
    async fn test_complete_assembles_object_from_parts() {
        let gateway = InMemoryGateway::new();
        let upload_id = gateway
            .create_multipart_upload("institutions/a/b/clip.mp4", "video/mp4")
            .await
            .unwrap();
        let parts = gateway
            .upload_parts(&upload_id, &[8 * MIB, 8 * MIB, 3 * MIB])
            .unwrap();

        gateway
            .complete_multipart_upload("institutions/a/b/clip.mp4", &upload_id, &parts)
            .await
            .unwrap();

        assert_eq!(
            gateway.head_object("institutions/a/b/clip.mp4").await.unwrap(),
            19 * MIB
        );
        assert!(!gateway.has_pending_upload(&upload_id));
    }

    #[tokio::test]
    async fn test_complete_rejects_wrong_etag() {
        let gateway = InMemoryGateway::new();
        let upload_id = gateway.create_multipart_upload("k", "video/mp4").await.unwrap();
        gateway.put_part(&upload_id, 1, MIB).unwrap();
        let parts = vec![CompletedPart {
            part_number: 1,
            e_tag: "\"bogus\"".to_string(),
        }];
        let err = gateway
            .complete_multipart_upload("k", &upload_id, &parts)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
        assert!(gateway.has_pending_upload(&upload_id));
    }

    #[tokio::test]
    async fn test_abort_twice_reports_not_found() {
        let gateway = InMemoryGateway::new();
        let upload_id = gateway.create_multipart_upload("k", "video/mp4").await.unwrap();
        gateway.abort_multipart_upload("k", &upload_id).await.unwrap();
        assert!(matches!(
            gateway.abort_multipart_upload("k", &upload_id).await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let gateway = InMemoryGateway::new();
        gateway.put_object("k", 10);
        gateway.inject_fault(GatewayOp::Head, Fault::Timeout, 1);
        assert!(matches!(
            gateway.head_object("k").await,
            Err(GatewayError::Timeout(_))
        ));
        assert_eq!(gateway.head_object("k").await.unwrap(), 10);
        assert_eq!(gateway.calls(GatewayOp::Head), 2);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let gateway = InMemoryGateway::new();
        gateway.put_object("k", 10);
        gateway.delete_object("k").await.unwrap();
        gateway.delete_object("k").await.unwrap();
        assert!(!gateway.object_exists("k"));
    }
}
