//! End-to-end tests of the HTTP service over an in-memory store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use modelquota::quota::{
    Catalog, ManualClock, MemoryStore, ResourceDefinition, UsageStore, UsageTracker,
};
use modelquota::server::{router, AppState};
use modelquota::QuotaError;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const NOW: i64 = 1_700_000_000;

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::from_definitions(vec![
            ResourceDefinition::new("gpt", 10, 100),
            ResourceDefinition::new("llama", 30, 14_400).with_tokens(6_000, 500_000),
            ResourceDefinition::new("whisper", 20, 2_000).with_aux(7_200, 28_800),
        ])
        .unwrap(),
    )
}

fn app_with(store: Arc<dyn UsageStore>) -> (Router, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(NOW));
    let tracker = UsageTracker::new(store, catalog()).with_clock(clock.clone());
    (router(AppState::new(tracker)), clock)
}

fn app() -> (Router, Arc<ManualClock>) {
    app_with(Arc::new(MemoryStore::new()))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    owner: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        request = request.header("Authorization", format!("Bearer {}", owner));
    }
    let request = match body {
        Some(body) => request
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_and_banner() {
    let (app, _) = app();

    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = send(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_models_catalog() {
    let (app, _) = app();

    let (status, body) = send(&app, "GET", "/models", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert_eq!(body[0]["name"], "gpt");

    let (status, body) = send(&app, "GET", "/models/llama", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tpm"], 6000);

    let (status, body) = send(&app, "GET", "/models/nope", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("model not found"));
}

#[tokio::test]
async fn test_track_then_remaining() {
    let (app, _) = app();

    let (status, record) = send(
        &app,
        "POST",
        "/models/gpt/track",
        Some("u1"),
        Some(json!({"requests": 3, "tokens": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["rpm"], 3);
    assert_eq!(record["rpd"], 3);
    assert!(record["tpm"].is_null());
    assert_eq!(record["owner"], "u1");
    assert_eq!(record["lastMinute"], NOW);

    let (status, left) = send(&app, "GET", "/models/gpt/remaining", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(left, json!({"name": "gpt", "rpm": 7, "rpd": 97, "tpm": null, "tpd": null, "ash": null, "asd": null}));
}

#[tokio::test]
async fn test_track_defaults_requests_to_one() {
    let (app, _) = app();

    let (status, record) = send(
        &app,
        "POST",
        "/models/llama/track",
        Some("u1"),
        Some(json!({"tokens": 250})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["rpm"], 1);
    assert_eq!(record["tpm"], 250);
    assert_eq!(record["tpd"], 250);
}

#[tokio::test]
async fn test_track_requires_bearer() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        "POST",
        "/models/gpt/track",
        None,
        Some(json!({"tokens": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid or missing authorization token");

    // Authentication is checked before the model
    let (status, _) = send(&app, "GET", "/models/nope/usage", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_track_rejects_bad_bodies() {
    let (app, _) = app();

    for body in [
        json!({"requests": 1}),
        json!({"tokens": 0}),
        json!({"tokens": -3}),
        json!({"tokens": 1, "extra": true}),
        json!({"tokens": 1.5}),
        json!({"requests": u64::MAX, "tokens": 1}),
        json!({"requests": 1u64 << 63, "tokens": 1}),
    ] {
        let (status, response) =
            send(&app, "POST", "/models/gpt/track", Some("u1"), Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {} should be rejected", body);
        assert!(response["error"].is_string());
    }

    let (status, _) = send(&app, "GET", "/models/gpt/usage", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_model_is_checked_before_body() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        "POST",
        "/models/nope/track",
        Some("u1"),
        Some(json!({"garbage": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("model not found"));
}

#[tokio::test]
async fn test_usage_is_scoped_to_owner() {
    let (app, _) = app();

    send(&app, "POST", "/models/gpt/track", Some("u1"), Some(json!({"requests": 4, "tokens": 1}))).await;

    let (_, mine) = send(&app, "GET", "/models/gpt/usage", Some("u1"), None).await;
    let (_, theirs) = send(&app, "GET", "/models/gpt/usage", Some("u2"), None).await;
    assert_eq!(mine["rpm"], 4);
    assert_eq!(theirs["rpm"], 0);

    let (_, listed) = send(&app, "GET", "/me", Some("u2"), None).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn test_window_rollover_over_http() {
    let (app, clock) = app();

    send(&app, "POST", "/models/llama/track", Some("u1"), Some(json!({"requests": 5, "tokens": 500}))).await;
    clock.advance(61);

    let (_, usage) = send(&app, "GET", "/models/llama/usage", Some("u1"), None).await;
    assert_eq!(usage["rpm"], 0);
    assert_eq!(usage["tpm"], 0);
    assert_eq!(usage["rpd"], 5);
    assert_eq!(usage["tpd"], 500);
    assert_eq!(usage["lastMinute"], NOW + 61);
}

#[tokio::test]
async fn test_me_and_deletes() {
    let (app, _) = app();
    for model in ["gpt", "llama", "whisper"] {
        send(&app, "POST", &format!("/models/{}/track", model), Some("u1"), Some(json!({"tokens": 1}))).await;
    }

    let (status, listed) = send(&app, "GET", "/me", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 3);

    let (status, body) = send(&app, "DELETE", "/models/gpt/usage", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    // Deleting again is still a success
    let (status, _) = send(&app, "DELETE", "/models/gpt/usage", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "DELETE", "/me?models=llama,missing", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, listed) = send(&app, "GET", "/me", Some("u1"), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], "whisper");

    let (status, _) = send(&app, "DELETE", "/me", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, listed) = send(&app, "GET", "/me", Some("u1"), None).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn test_select_orders_and_filters() {
    let (app, _) = app();
    send(&app, "POST", "/models/gpt/track", Some("u1"), Some(json!({"requests": 10, "tokens": 1}))).await;

    let (status, selected) = send(
        &app,
        "POST",
        "/select",
        Some("u1"),
        Some(json!({"modelPriority": ["whisper", "gpt"], "fallbackAll": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = selected
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["whisper", "llama"]);

    let (_, selected) = send(
        &app,
        "POST",
        "/select",
        Some("u1"),
        Some(json!({"modelPriority": ["llama"]})),
    )
    .await;
    assert_eq!(selected.as_array().unwrap().len(), 1);
    assert_eq!(selected[0]["name"], "llama");
}

#[tokio::test]
async fn test_select_rejections() {
    let (app, _) = app();

    let (status, body) = send(&app, "POST", "/select", Some("u1"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "modelPriority and fallbackAll cannot be both falsy. you cannot choose any model that way"
    );

    let (status, _) = send(
        &app,
        "POST",
        "/select",
        Some("u1"),
        Some(json!({"modelPriority": ["nope"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/select",
        Some("u1"),
        Some(json!({"modelPriority": [], "fallbackAll": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/select",
        Some("u1"),
        Some(json!({"modelPriority": null, "fallbackAll": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/select", None, Some(json!({"fallbackAll": true}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// Store that is always down
struct DownStore;

#[async_trait::async_trait]
impl UsageStore for DownStore {
    async fn save(&self, _: &modelquota::quota::UsageRecord) -> modelquota::Result<()> {
        Err(QuotaError::PersistenceUnavailable("connection refused".to_string()))
    }

    async fn get_one(
        &self,
        _: &str,
        _: &str,
    ) -> modelquota::Result<Option<modelquota::quota::UsageRecord>> {
        Err(QuotaError::PersistenceUnavailable("connection refused".to_string()))
    }

    async fn get_all(&self, _: &str) -> modelquota::Result<Vec<modelquota::quota::UsageRecord>> {
        Err(QuotaError::PersistenceUnavailable("connection refused".to_string()))
    }

    async fn delete_one(&self, _: &str, _: &str) -> modelquota::Result<()> {
        Err(QuotaError::Timeout(1000))
    }

    async fn delete_many(&self, _: &str, _: &[String]) -> modelquota::Result<()> {
        Err(QuotaError::Timeout(1000))
    }

    async fn delete_all(&self, _: &str) -> modelquota::Result<()> {
        Err(QuotaError::Timeout(1000))
    }
}

#[tokio::test]
async fn test_store_outage_maps_to_503() {
    let (app, _) = app_with(Arc::new(DownStore));

    let (status, body) = send(&app, "POST", "/models/gpt/track", Some("u1"), Some(json!({"tokens": 1}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("unavailable"));

    let (status, _) = send(&app, "DELETE", "/me", Some("u1"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // Listing soft-fails to an empty list
    let (status, listed) = send(&app, "GET", "/me", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));

    // Selection still answers from fresh records
    let (status, selected) = send(&app, "POST", "/select", Some("u1"), Some(json!({"fallbackAll": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(selected.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_metrics_route() {
    modelquota::metrics::init().unwrap();
    let (app, _) = app();
    send(&app, "POST", "/models/gpt/track", Some("u1"), Some(json!({"tokens": 1}))).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("modelquota_track_calls_total"));
}

#[tokio::test]
async fn test_metrics_route_can_be_disabled() {
    let tracker = UsageTracker::new(Arc::new(MemoryStore::new()), catalog());
    let app = router(AppState::new(tracker).with_metrics(false));

    let (status, _) = send(&app, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
