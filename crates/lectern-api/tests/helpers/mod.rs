//! Test helpers: build the router on in-memory backends and mint bearer tokens.
//!
//! Run with: `cargo test -p lectern-api --test media_upload_test`. No Docker needed.

#![allow(dead_code)]

use axum::http::StatusCode;
use axum_test::{TestResponse, TestServer};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use lectern_api::auth::{JwtClaims, UserRole};
use lectern_api::setup::routes::build_router;
use lectern_api::AppState;
use lectern_core::models::CompletedPart;
use lectern_core::UploadConfig;
use lectern_db::MemoryStore;
use lectern_storage::InMemoryGateway;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const MB: i64 = 1024 * 1024;
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-at-least-32-characters-long";

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<InMemoryGateway>,
}

/// A caller: bearer token plus the identity inside it.
pub struct TestUser {
    pub user_id: Uuid,
    pub institution_id: Uuid,
    pub token: String,
}

impl TestUser {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// App whose institutions start with `quota_bytes` on every account.
pub fn setup_test_app(quota_bytes: i64) -> TestApp {
    let upload = UploadConfig {
        default_video_quota_bytes: quota_bytes,
        default_document_quota_bytes: quota_bytes,
        default_total_quota_bytes: quota_bytes,
        ..UploadConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(InMemoryGateway::new());
    let state = Arc::new(AppState::new(
        store.clone(),
        gateway.clone(),
        &upload,
        TEST_JWT_SECRET,
    ));
    let server = TestServer::new(build_router(state.clone())).unwrap();

    TestApp {
        server,
        state,
        store,
        gateway,
    }
}

impl TestApp {
    pub fn user(&self, institution_id: Uuid, role: UserRole) -> TestUser {
        let user_id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let claims = JwtClaims {
            sub: user_id,
            institution_id,
            role,
            exp: (now + chrono::Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
        )
        .unwrap();
        TestUser {
            user_id,
            institution_id,
            token,
        }
    }

    pub fn instructor(&self, institution_id: Uuid) -> TestUser {
        self.user(institution_id, UserRole::Instructor)
    }

    pub async fn initiate(&self, user: &TestUser, media_type: &str, file_size: i64) -> TestResponse {
        self.server
            .post("/api/media/initiate-upload")
            .add_header("Authorization", user.bearer())
            .json(&json!({
                "filename": "Week 1 Lecture.mp4",
                "fileSize": file_size,
                "mediaType": media_type,
            }))
            .await
    }

    /// Upload `actual_size` bytes over the planned parts straight to the object store, the
    /// way a browser would, and return the complete request body.
    pub fn upload_parts(&self, initiated: &Value, actual_size: i64) -> Value {
        let upload_id = initiated["objectStoreUploadId"].as_str().unwrap();
        let count = initiated["partCount"].as_i64().unwrap();
        let base = actual_size / count;
        let sizes: Vec<u64> = (0..count)
            .map(|i| {
                if i == count - 1 {
                    (actual_size - base * (count - 1)) as u64
                } else {
                    base as u64
                }
            })
            .collect();
        let parts: Vec<CompletedPart> = self.gateway.upload_parts(upload_id, &sizes).unwrap();

        json!({ "uploadId": upload_id, "completedParts": parts })
    }

    pub async fn complete(&self, user: &TestUser, session_id: &str, body: &Value) -> TestResponse {
        self.server
            .post(&format!("/api/media/{}/complete", session_id))
            .add_header("Authorization", user.bearer())
            .json(body)
            .await
    }

    /// Initiate, upload and complete; returns the asset JSON.
    pub async fn upload(&self, user: &TestUser, media_type: &str, size: i64) -> Value {
        let initiated = self.initiate(user, media_type, size).await;
        initiated.assert_status(StatusCode::CREATED);
        let initiated: Value = initiated.json();
        let body = self.upload_parts(&initiated, size);
        let session_id = initiated["uploadSessionId"].as_str().unwrap().to_string();

        let completed = self.complete(user, &session_id, &body).await;
        completed.assert_status_ok();
        completed.json()
    }

    /// `(usedBytes, reservedBytes)` of one account as reported by the quota endpoint.
    pub async fn usage(&self, user: &TestUser, quota_type: &str) -> (i64, i64) {
        let response = self
            .server
            .get("/api/media/quota")
            .add_header("Authorization", user.bearer())
            .await;
        response.assert_status_ok();
        let quota: Value = response.json();
        let account = quota["accounts"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["quotaType"] == quota_type)
            .cloned()
            .unwrap();
        (
            account["usedBytes"].as_i64().unwrap(),
            account["reservedBytes"].as_i64().unwrap(),
        )
    }
}
