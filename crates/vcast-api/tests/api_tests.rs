//! API integration tests.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use tempfile::TempDir;
use vcast_api::{create_router, ApiConfig, AppState};
use vcast_models::{JobId, JobStatus};
use vcast_storage::{ArtifactStorage, LocalStorage};
use vcast_store::{JobStore, StatusUpdate};

fn app_with_storage(config: ApiConfig, root: &std::path::Path) -> (Router, JobStore) {
    dotenvy::dotenv().ok();
    let store = JobStore::in_memory().unwrap();
    let storage: Arc<dyn ArtifactStorage> = Arc::new(LocalStorage::new(root, "/files"));
    let app = create_router(AppState::new(config, store.clone(), storage), None);
    (app, store)
}

fn relaxed_config() -> ApiConfig {
    ApiConfig {
        rate_limit_rps: 1000,
        ..ApiConfig::default()
    }
}

/// App whose storage is never written to.
fn test_app() -> (Router, JobStore) {
    app_with_storage(relaxed_config(), &std::env::temp_dir().join("vcast-api-tests"))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn three_segment_manifest() -> Value {
    json!({
        "segments": [
            {"text": "hello there", "start_ms": 0, "end_ms": 1500},
            {"text": "general", "start_ms": 1600, "end_ms": 3200,
             "words": [{"text": "general", "start_ms": 1600, "end_ms": 3200}]},
            {"text": "kenobi", "start_ms": 3300, "end_ms": 5000}
        ]
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app();
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_reports_store() {
    let (app, _) = test_app();
    let (status, body) = send(&app, get("/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["store"]["status"], "ok");
    assert_eq!(body["checks"]["store"]["pending"], 0);
}

#[tokio::test]
async fn test_metrics_route_absent_without_handle() {
    let (app, _) = test_app();
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_then_poll_status() {
    let (app, store) = test_app();

    let (status, body) = send(
        &app,
        post_json(
            "/api/exports",
            json!({
                "kind": "mp4",
                "user_id": "user-1",
                "audio_url": "https://cdn.example.com/rec/take.m4a",
                "manifest": three_segment_manifest(),
                "template_id": "bold"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert_eq!(body["status_url"], format!("/api/exports/{}", job_id));
    assert!(body["estimated_duration_secs"].as_u64().unwrap() > 0);

    let stored = store.get(&JobId::from_string(job_id.as_str())).await.unwrap().unwrap();
    assert_eq!(stored.style.id, "bold");

    let (status, body) = send(&app, get(&format!("/api/exports/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["kind"], "video");
    assert_eq!(body["progress"], 0);
    assert!(body.get("output_url").is_none());

    store.claim_next("w1").await.unwrap().unwrap();
    store
        .update_status(
            &stored.id,
            "w1",
            JobStatus::Completed,
            StatusUpdate::completed("/files/exports/user-1/x.mp4", 4096),
        )
        .await
        .unwrap();

    let (_, body) = send(&app, get(&format!("/api/exports/{}", job_id))).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"], 100);
    assert_eq!(body["output_url"], "/files/exports/user-1/x.mp4");
    assert_eq!(body["output_size"], 4096);
    assert!(body["completed_at"].is_string());
}

#[tokio::test]
async fn test_duration_limit_rejected_without_row() {
    let (app, store) = test_app();

    let (status, body) = send(
        &app,
        post_json(
            "/api/exports",
            json!({
                "kind": "mp4",
                "user_id": "user-2",
                "audio_url": "r2://uploads/long.m4a",
                "manifest": {"segments": [{"text": "too long", "start_ms": 0, "end_ms": 200000}]}
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "duration_limit");
    assert!(store.list_by_user("user-2", 10).await.unwrap().is_empty());
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duration_limit_wins_over_short_declared_duration() {
    let (app, store) = test_app();

    let (status, body) = send(
        &app,
        post_json(
            "/api/exports",
            json!({
                "kind": "mp4",
                "user_id": "user-3",
                "audio_url": "r2://uploads/long.m4a",
                "manifest": {
                    "duration_ms": 5000,
                    "segments": [{"text": "too long", "start_ms": 0, "end_ms": 200000}]
                }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "duration_limit");
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_submission_validation_errors() {
    let (app, store) = test_app();

    let cases = [
        // unknown kind
        json!({"kind": "gif", "user_id": "u", "audio_url": "a.wav", "manifest": three_segment_manifest()}),
        // unknown template
        json!({"kind": "mp3", "user_id": "u", "audio_url": "a.wav", "manifest": three_segment_manifest(), "template_id": "neon"}),
        // empty audio reference
        json!({"kind": "mp3", "user_id": "u", "audio_url": "  ", "manifest": three_segment_manifest()}),
        // overlapping segments
        json!({"kind": "carousel", "user_id": "u", "audio_url": "a.wav", "manifest": {"segments": [
            {"text": "a", "start_ms": 0, "end_ms": 1000},
            {"text": "b", "start_ms": 900, "end_ms": 2000}
        ]}}),
        // inverted segment
        json!({"kind": "mp4", "user_id": "u", "audio_url": "a.wav", "manifest": {"segments": [
            {"text": "a", "start_ms": 1000, "end_ms": 500}
        ]}}),
    ];

    for case in cases {
        let (status, body) = send(&app, post_json("/api/exports", case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} -> {}", case, body);
        assert!(body["detail"].is_string());
    }
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_submit_with_uploaded_audio() {
    let dir = TempDir::new().unwrap();
    let (app, store) = app_with_storage(relaxed_config(), dir.path());

    let (status, body) = send(
        &app,
        post_json(
            "/api/exports",
            json!({
                "kind": "mp3",
                "user_id": "uploader",
                "audio_upload": {"filename": "memo.m4a", "data": "AAECAwQFBgc="},
                "manifest": three_segment_manifest()
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED, "{}", body);
    let job_id = body["job_id"].as_str().unwrap();
    let job = store.get(&JobId::from_string(job_id)).await.unwrap().unwrap();

    let key = job.audio_ref.strip_prefix("r2://").unwrap();
    assert!(key.starts_with("uploads/uploader/"), "{}", key);
    assert!(key.ends_with(".m4a"));
    assert_eq!(std::fs::read(dir.path().join(key)).unwrap(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
}

#[tokio::test]
async fn test_rejected_upload_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let (app, store) = app_with_storage(relaxed_config(), dir.path());

    let cases = [
        // over the duration ceiling
        json!({"kind": "mp4", "user_id": "u", "audio_upload": {"data": "AAECAw=="},
               "manifest": {"segments": [{"text": "long", "start_ms": 0, "end_ms": 200000}]}}),
        // both audio sources
        json!({"kind": "mp3", "user_id": "u", "audio_url": "r2://a.wav",
               "audio_upload": {"data": "AAECAw=="}, "manifest": three_segment_manifest()}),
        // neither audio source
        json!({"kind": "mp3", "user_id": "u", "manifest": three_segment_manifest()}),
        // not base64
        json!({"kind": "mp3", "user_id": "u", "audio_upload": {"data": "%%%"},
               "manifest": three_segment_manifest()}),
    ];

    for case in cases {
        let (status, body) = send(&app, post_json("/api/exports", case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} -> {}", case, body);
    }
    assert_eq!(store.pending_count().await.unwrap(), 0);
    assert!(!dir.path().join("uploads").exists());
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let dir = TempDir::new().unwrap();
    let config = ApiConfig {
        max_upload_bytes: 4,
        ..relaxed_config()
    };
    let (app, _) = app_with_storage(config, dir.path());

    let (status, body) = send(
        &app,
        post_json(
            "/api/exports",
            json!({
                "kind": "mp3",
                "user_id": "u",
                "audio_upload": {"data": "AAECAwQFBgc="},
                "manifest": three_segment_manifest()
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("limit"));
}

#[tokio::test]
async fn test_unknown_export_is_404() {
    let (app, _) = test_app();
    let (status, body) = send(&app, get("/api/exports/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn test_list_user_exports() {
    let (app, _) = test_app();

    for kind in ["mp3", "carousel"] {
        let (status, _) = send(
            &app,
            post_json(
                "/api/exports",
                json!({
                    "kind": kind,
                    "user_id": "lister",
                    "audio_url": "/data/take.wav",
                    "manifest": three_segment_manifest()
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let (status, body) = send(&app, get("/api/users/lister/exports")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (_, body) = send(&app, get("/api/users/lister/exports?limit=1")).await;
    assert_eq!(body["count"], 1);

    let (_, body) = send(&app, get("/api/users/nobody/exports")).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_security_and_request_id_headers() {
    let (app, _) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "trace-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "trace-123");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn test_rate_limiting() {
    dotenvy::dotenv().ok();
    let config = ApiConfig {
        rate_limit_rps: 2,
        ..ApiConfig::default()
    };
    let (app, _) = app_with_storage(config, &std::env::temp_dir().join("vcast-api-tests"));

    let mut limited = false;
    for _ in 0..10 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/users/someone/exports")
                    .header("x-forwarded-for", "192.168.1.100")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            assert_eq!(response.headers()["retry-after"], "1");
            limited = true;
            break;
        }
    }
    assert!(limited);
}
