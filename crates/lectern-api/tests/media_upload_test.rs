//! Media upload API integration tests.
//!
//! Run with: `cargo test -p lectern-api --test media_upload_test`

mod helpers;

use axum::http::StatusCode;
use helpers::{setup_test_app, MB};
use lectern_api::auth::UserRole;
use lectern_core::models::UploadStatus;
use lectern_db::MediaStore;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn test_upload_get_and_delete_flow() {
    let app = setup_test_app(100 * MB);
    let user = app.instructor(Uuid::new_v4());

    let initiated = app.initiate(&user, "VIDEO", 20 * MB).await;
    initiated.assert_status(StatusCode::CREATED);
    let initiated: Value = initiated.json();
    assert_eq!(initiated["partCount"], 3);
    assert_eq!(initiated["presignedPartUrls"].as_array().unwrap().len(), 3);
    assert_eq!(app.usage(&user, "VIDEO").await, (0, 20 * MB));

    let session_id = initiated["uploadSessionId"].as_str().unwrap().to_string();
    let body = app.upload_parts(&initiated, 20 * MB);
    let completed = app.complete(&user, &session_id, &body).await;
    completed.assert_status_ok();
    let asset: Value = completed.json();
    assert_eq!(asset["sizeBytes"], 20 * MB);
    assert_eq!(asset["title"], "Week 1 Lecture");
    assert_eq!(asset["mediaType"], "VIDEO");
    assert_eq!(app.usage(&user, "VIDEO").await, (20 * MB, 0));
    assert_eq!(app.usage(&user, "TOTAL").await, (20 * MB, 0));

    let media_id = asset["id"].as_str().unwrap().to_string();
    let fetched = app
        .server
        .get(&format!("/api/media/{}", media_id))
        .add_header("Authorization", user.bearer())
        .await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<Value>()["id"], asset["id"]);

    let access = app
        .server
        .get(&format!("/api/media/{}/access", media_id))
        .add_query_param("expirationMinutes", 15)
        .add_header("Authorization", user.bearer())
        .await;
    access.assert_status_ok();
    assert!(access.json::<Value>()["url"]
        .as_str()
        .unwrap()
        .contains("expires=900"));

    app.server
        .delete(&format!("/api/media/{}", media_id))
        .add_header("Authorization", user.bearer())
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert_eq!(app.usage(&user, "VIDEO").await, (0, 0));

    app.server
        .get(&format!("/api/media/{}", media_id))
        .add_header("Authorization", user.bearer())
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_complete_twice_returns_same_asset() {
    let app = setup_test_app(100 * MB);
    let user = app.instructor(Uuid::new_v4());

    let initiated: Value = app.initiate(&user, "DOCUMENT", 6 * MB).await.json();
    let session_id = initiated["uploadSessionId"].as_str().unwrap().to_string();
    let body = app.upload_parts(&initiated, 6 * MB);

    let first: Value = app.complete(&user, &session_id, &body).await.json();
    let second = app.complete(&user, &session_id, &body).await;
    second.assert_status_ok();
    assert_eq!(second.json::<Value>()["id"], first["id"]);
    assert_eq!(app.usage(&user, "DOCUMENT").await, (6 * MB, 0));
}

#[tokio::test]
async fn test_quota_exceeded_is_409_with_headroom() {
    let app = setup_test_app(100 * MB);
    let user = app.instructor(Uuid::new_v4());

    app.initiate(&user, "VIDEO", 80 * MB)
        .await
        .assert_status(StatusCode::CREATED);

    let rejected = app.initiate(&user, "VIDEO", 30 * MB).await;
    rejected.assert_status(StatusCode::CONFLICT);
    let body: Value = rejected.json();
    assert_eq!(body["code"], "QUOTA_EXCEEDED");
    assert_eq!(body["quota"]["quotaType"], "VIDEO");
    assert_eq!(body["quota"]["requestedBytes"], 30 * MB);
    assert_eq!(body["quota"]["reservedBytes"], 80 * MB);
    assert_eq!(body["quota"]["availableBytes"], 20 * MB);

    assert_eq!(app.usage(&user, "VIDEO").await, (0, 80 * MB));
}

#[tokio::test]
async fn test_cancel_releases_reservation_and_is_idempotent() {
    let app = setup_test_app(100 * MB);
    let user = app.instructor(Uuid::new_v4());

    let initiated: Value = app.initiate(&user, "VIDEO", 40 * MB).await.json();
    let session_id = initiated["uploadSessionId"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let cancelled = app
            .server
            .delete(&format!("/api/media/{}/cancel", session_id))
            .add_header("Authorization", user.bearer())
            .await;
        cancelled.assert_status_ok();
        assert_eq!(cancelled.json::<Value>()["status"], "CANCELLED");
    }
    assert_eq!(app.usage(&user, "VIDEO").await, (0, 0));
    assert!(!app
        .gateway
        .has_pending_upload(initiated["objectStoreUploadId"].as_str().unwrap()));

    let session = app
        .server
        .get(&format!("/api/media/uploads/{}", session_id))
        .add_header("Authorization", user.bearer())
        .await;
    session.assert_status_ok();
    assert_eq!(session.json::<Value>()["status"], "CANCELLED");

    let body = json!({
        "uploadId": initiated["objectStoreUploadId"],
        "completedParts": [{ "partNumber": 1, "eTag": "\"x\"" }]
    });
    let late = app.complete(&user, &session_id, &body).await;
    late.assert_status(StatusCode::CONFLICT);
    assert_eq!(late.json::<Value>()["code"], "INVALID_STATE_TRANSITION");
}

#[tokio::test]
async fn test_other_institution_sees_not_found() {
    let app = setup_test_app(100 * MB);
    let owner = app.instructor(Uuid::new_v4());
    let intruder = app.instructor(Uuid::new_v4());

    let asset = app.upload(&owner, "VIDEO", 10 * MB).await;
    let media_id = asset["id"].as_str().unwrap();
    let session_id = asset["uploadSessionId"].as_str().unwrap();

    for path in [
        format!("/api/media/{}", media_id),
        format!("/api/media/{}/access", media_id),
        format!("/api/media/uploads/{}", session_id),
    ] {
        app.server
            .get(&path)
            .add_header("Authorization", intruder.bearer())
            .await
            .assert_status_not_found();
    }
    app.server
        .delete(&format!("/api/media/{}", media_id))
        .add_header("Authorization", intruder.bearer())
        .await
        .assert_status_not_found();
    app.server
        .delete(&format!("/api/media/{}/cancel", session_id))
        .add_header("Authorization", intruder.bearer())
        .await
        .assert_status_not_found();

    let listed: Value = app
        .server
        .get("/api/media")
        .add_header("Authorization", intruder.bearer())
        .await
        .json();
    assert_eq!(listed["total"], 0);
    assert_eq!(app.usage(&owner, "VIDEO").await, (10 * MB, 0));
}

#[tokio::test]
async fn test_list_filters_by_type() {
    let app = setup_test_app(200 * MB);
    let user = app.instructor(Uuid::new_v4());
    app.upload(&user, "VIDEO", MB).await;
    app.upload(&user, "VIDEO", MB).await;
    app.upload(&user, "DOCUMENT", MB).await;

    let response = app
        .server
        .get("/api/media")
        .add_query_param("type", "video")
        .add_header("Authorization", user.bearer())
        .await;
    response.assert_status_ok();
    let page: Value = response.json();
    assert_eq!(page["total"], 2);
    assert_eq!(page["page"], 1);
    assert!(page["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|item| item["mediaType"] == "VIDEO"));

    app.server
        .get("/api/media")
        .add_query_param("type", "spreadsheet")
        .add_header("Authorization", user.bearer())
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_refresh_part_urls() {
    let app = setup_test_app(100 * MB);
    let user = app.instructor(Uuid::new_v4());
    let initiated: Value = app.initiate(&user, "VIDEO", 20 * MB).await.json();
    let session_id = initiated["uploadSessionId"].as_str().unwrap();

    let refreshed = app
        .server
        .post(&format!("/api/media/uploads/{}/parts", session_id))
        .add_header("Authorization", user.bearer())
        .json(&json!({ "partNumbers": [3, 1, 3] }))
        .await;
    refreshed.assert_status_ok();
    let parts: Value = refreshed.json();
    let numbers: Vec<i64> = parts["parts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["partNumber"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 3]);

    app.server
        .post(&format!("/api/media/uploads/{}/parts", session_id))
        .add_header("Authorization", user.bearer())
        .json(&json!({ "partNumbers": [4] }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_request_validation() {
    let app = setup_test_app(100 * MB);
    let user = app.instructor(Uuid::new_v4());

    let empty = app.initiate(&user, "VIDEO", 0).await;
    empty.assert_status_bad_request();
    assert_eq!(empty.json::<Value>()["code"], "INVALID_INPUT");

    app.initiate(&user, "VIDEO", 3 * 1024 * MB)
        .await
        .assert_status(StatusCode::PAYLOAD_TOO_LARGE);

    app.server
        .post("/api/media/initiate-upload")
        .add_header("Authorization", user.bearer())
        .json(&json!({ "filename": "a.mp4", "fileSize": 10, "mediaType": "HOLOGRAM" }))
        .await
        .assert_status_bad_request();

    assert_eq!(app.usage(&user, "TOTAL").await, (0, 0));
}

#[tokio::test]
async fn test_missing_or_bad_token_is_401() {
    let app = setup_test_app(100 * MB);

    app.server
        .get("/api/media")
        .await
        .assert_status_unauthorized();
    app.server
        .get("/api/media/quota")
        .add_header("Authorization", "Bearer not-a-jwt")
        .await
        .assert_status_unauthorized();
    app.server
        .get("/api/media/quota")
        .add_header("Authorization", "Basic dXNlcjpwYXNz")
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn test_student_can_read_but_not_upload() {
    let app = setup_test_app(100 * MB);
    let institution = Uuid::new_v4();
    let instructor = app.instructor(institution);
    let student = app.user(institution, UserRole::Student);
    let asset = app.upload(&instructor, "DOCUMENT", MB).await;

    let rejected = app.initiate(&student, "DOCUMENT", MB).await;
    rejected.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(rejected.json::<Value>()["code"], "FORBIDDEN");

    app.server
        .delete(&format!("/api/media/{}", asset["id"].as_str().unwrap()))
        .add_header("Authorization", student.bearer())
        .await
        .assert_status(StatusCode::FORBIDDEN);
    app.server
        .get(&format!("/api/media/{}", asset["id"].as_str().unwrap()))
        .add_header("Authorization", student.bearer())
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_admin_quota_and_preview() {
    let app = setup_test_app(100 * MB);
    let institution = Uuid::new_v4();
    let instructor = app.instructor(institution);
    let admin = app.user(Uuid::new_v4(), UserRole::PlatformAdmin);
    let asset = app.upload(&instructor, "VIDEO", 30 * MB).await;
    let quota_path = format!("/api/admin/institutions/{}/quota", institution);

    app.server
        .put(&quota_path)
        .add_header("Authorization", instructor.bearer())
        .json(&json!({ "quotaType": "VIDEO", "totalBytes": 500 * MB }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let raised = app
        .server
        .put(&quota_path)
        .add_header("Authorization", admin.bearer())
        .json(&json!({ "quotaType": "VIDEO", "totalBytes": 500 * MB }))
        .await;
    raised.assert_status_ok();
    assert_eq!(raised.json::<Value>()["totalBytes"], 500 * MB);

    app.server
        .put(&quota_path)
        .add_header("Authorization", admin.bearer())
        .json(&json!({ "quotaType": "VIDEO", "totalBytes": 10 * MB }))
        .await
        .assert_status(StatusCode::CONFLICT);

    let preview_path = format!("/api/admin/media/{}", asset["id"].as_str().unwrap());
    app.server
        .get(&preview_path)
        .add_header("Authorization", instructor.bearer())
        .await
        .assert_status(StatusCode::FORBIDDEN);
    let preview = app
        .server
        .get(&preview_path)
        .add_header("Authorization", admin.bearer())
        .await;
    preview.assert_status_ok();
    assert_eq!(
        preview.json::<Value>()["institutionId"],
        institution.to_string()
    );
}

#[tokio::test]
async fn test_completed_session_is_recorded() {
    let app = setup_test_app(100 * MB);
    let user = app.instructor(Uuid::new_v4());
    let asset = app.upload(&user, "AUDIO", 2 * MB).await;

    let session_id: Uuid = asset["uploadSessionId"].as_str().unwrap().parse().unwrap();
    let session = app.store.get_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.status, UploadStatus::Completed);
    // Audio is only charged to TOTAL.
    assert_eq!(app.usage(&user, "TOTAL").await, (2 * MB, 0));
    assert_eq!(app.usage(&user, "VIDEO").await, (0, 0));
}

#[tokio::test]
async fn test_health_and_docs_are_public() {
    let app = setup_test_app(100 * MB);

    app.server.get("/live").await.assert_status_ok();

    let health = app.server.get("/health").await;
    health.assert_status_ok();
    let body: Value = health.json();
    assert_eq!(body["database"], "healthy");
    assert_eq!(body["storage"], "healthy");
    assert_eq!(body["storage_backend"], "memory");

    let spec = app.server.get("/api/openapi.json").await;
    spec.assert_status_ok();
    assert!(spec.json::<Value>()["paths"]["/api/media/initiate-upload"].is_object());
}
