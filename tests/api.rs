mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::*;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tower::ServiceExt;
use truemailer::api::{router, ApiState};
use truemailer::engine::{unix_now, SyncOrchestrator};
use truemailer::stats::StatsCollector;
use truemailer::store::{MemoryStore, ReputationStore};
use truemailer::validator::EmailValidator;

fn app(cron_secret: Option<&str>) -> (Router, Receiver<()>) {
    let (app, rx, _) = app_with_store(cron_secret);
    (app, rx)
}

fn app_with_store(cron_secret: Option<&str>) -> (Router, Receiver<()>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::seeded(unix_now()));
    let fetcher = MockFetcher::new();
    fetcher.serve(PRIMARY_URL, &["trash-mail.io"]);
    let (resolver, cache) = resolver(store.clone(), fetcher.clone());
    let (sync_trigger, sync_rx) = tokio::sync::mpsc::channel(1);

    let state = ApiState {
        validator: Arc::new(EmailValidator::new(resolver)),
        orchestrator: Arc::new(SyncOrchestrator::new(
            fetcher,
            store.clone(),
            &test_config(),
        )),
        cache,
        store: store.clone(),
        stats: StatsCollector::new(0),
        sync_trigger,
        cron_secret: cron_secret.map(str::to_string),
    };
    (router(state), sync_rx, store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_validate_via_query() {
    let (app, _rx) = app(None);

    let (status, body) = send(&app, get("/api/v1/validate?email=jane@example.com")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["domain"], "example.com");
    assert_eq!(body["details"]["detection_source"], "Clean Domain");
}

#[tokio::test]
async fn test_validate_via_json() {
    let (app, _rx) = app(None);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/validate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"email":"x@trash-mail.io","userId":"bob"}"#))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blocked"], true);
    assert_eq!(body["details"]["block_reason"], "github_disposable");
}

#[tokio::test]
async fn test_validate_requires_email() {
    let (app, _rx) = app(None);

    let (status, body) = send(&app, get("/api/v1/validate")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "email is required");
}

#[tokio::test]
async fn test_stats_count_validations() {
    let (app, _rx) = app(None);

    send(&app, get("/api/v1/validate?email=jane@example.com")).await;
    send(&app, get("/api/v1/validate?email=x@trash-mail.io")).await;
    send(&app, get("/api/v1/validate?email=broken")).await;

    let (status, body) = send(&app, get("/api/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validations"]["total_validations"], 3);
    assert_eq!(body["validations"]["valid_emails"], 1);
    assert_eq!(body["validations"]["blocked_emails"], 1);
    assert_eq!(body["validations"]["invalid_syntax"], 1);
    assert_eq!(body["providers"]["total"], 10);
}

#[tokio::test]
async fn test_sync_requires_bearer_secret() {
    let (app, _rx) = app(Some("s3cret"));

    let (status, _) = send(&app, post("/api/sync")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/sync")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sync_single_source_runs_in_background() {
    let (app, _rx, store) = app_with_store(Some("s3cret"));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/sync?source=mailchecker")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "sync_triggered");
    assert_eq!(body["source"], "mailchecker");

    let mut synced = None;
    for _ in 0..100 {
        synced = store.find_provider("trash-mail.io").await.unwrap();
        if synced.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let entry = synced.expect("background sync never stored the domain");
    assert_eq!(entry.source.as_deref(), Some(PRIMARY_NAME));
}

#[tokio::test]
async fn test_sync_unknown_source_is_rejected() {
    let (app, _rx) = app(None);

    let (status, body) = send(&app, post("/api/sync?source=nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown source key 'nope'");
}

#[tokio::test]
async fn test_full_sync_is_queued() {
    let (app, mut rx) = app(None);

    let (status, body) = send(&app, post("/api/sync")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "sync_triggered");
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_cache_inspection_and_clear() {
    let (app, _rx) = app(None);

    send(&app, get("/api/v1/validate?email=jane@example.com")).await;
    let (_, body) = send(&app, get("/api/cache")).await;
    assert_eq!(body["cache_ttl_ms"], 300_000);
    // Only the primary list fetched successfully.
    assert_eq!(body["total_cached_sources"], 1);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/cache")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cache_cleared");

    let (_, body) = send(&app, get("/api/cache")).await;
    assert_eq!(body["total_cached_sources"], 0);
}
