// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route-level tests for the ingest gateway.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use mirrorline_core::{BotId, UserId};
use mirrorline_gateway::{AuthConfig, GatewayState, HealthState, router};
use mirrorline_relay::MemoryDirectory;
use mirrorline_test_utils::TestHarness;

const TOKEN: &str = "test-token";

fn state(harness: &TestHarness, directory: Option<Arc<MemoryDirectory>>) -> GatewayState {
    GatewayState {
        pipeline: Arc::clone(&harness.relay.pipeline),
        control: Arc::clone(&harness.relay.control),
        directory,
        auth: AuthConfig {
            bearer_token: Some(TOKEN.to_string()),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render: Some(Arc::new(|| "mirrorline_up 1\n".to_string())),
        },
    }
}

fn post(path: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn message(content: &str) -> serde_json::Value {
    serde_json::json!({
        "bot_id": 7,
        "user_id": 42,
        "role": "user",
        "content": content,
    })
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = router(state(&harness, None));

    let health = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(json(health).await["status"], "ok");

    let metrics = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
}

#[tokio::test]
async fn mirror_requires_bearer_token() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = router(state(&harness, None));

    let missing = app
        .clone()
        .oneshot(post("/v1/mirror", None, message("hi")))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .oneshot(post("/v1/mirror", Some("nope"), message("hi")))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unconfigured_gateway_rejects_everything() {
    let harness = TestHarness::builder().build().await.unwrap();
    let mut state = state(&harness, None);
    state.auth.bearer_token = None;

    let response = router(state)
        .oneshot(post("/v1/mirror", Some(TOKEN), message("hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mirror_reports_disposition() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = router(state(&harness, None));

    let response = app
        .clone()
        .oneshot(post("/v1/mirror", Some(TOKEN), message("hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json(response).await["disposition"], "not_configured");

    harness.configure(BotId(7), 5).await.unwrap();
    let response = app
        .oneshot(post("/v1/mirror", Some(TOKEN), message("hi")))
        .await
        .unwrap();
    assert_eq!(json(response).await["disposition"], "buffered");
}

#[tokio::test]
async fn mirror_records_display_names() {
    let harness = TestHarness::builder().build().await.unwrap();
    let directory = Arc::new(MemoryDirectory::new());
    let app = router(state(&harness, Some(Arc::clone(&directory))));

    let mut body = message("hi");
    body["user_display_name"] = "Bob".into();
    body["bot_handle"] = "support_bot".into();
    let response = app
        .oneshot(post("/v1/mirror", Some(TOKEN), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    use mirrorline_core::DirectoryService;
    assert_eq!(
        directory.user_display_name(BotId(7), UserId(42)).await.as_deref(),
        Some("Bob")
    );
    assert_eq!(
        directory.bot_handle(BotId(7)).await.as_deref(),
        Some("support_bot")
    );
}

#[tokio::test]
async fn control_applies_panel_tokens() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.configure(BotId(7), 1).await.unwrap();
    harness.send(BotId(7), UserId(42), "hi").await;
    harness.run_jobs().await.unwrap();

    let panel = harness
        .transport
        .posted()
        .await
        .into_iter()
        .find_map(|post| post.panel)
        .expect("control panel posted");
    let ban = panel.buttons[0][0].token.clone();

    let app = router(state(&harness, None));
    let response = app
        .clone()
        .oneshot(post("/v1/control", Some(TOKEN), serde_json::json!({ "token": ban })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["action"], "ban");
    assert_eq!(body["user_id"], 42);
    assert!(body["text"].as_str().unwrap().contains("42"));

    let response = app
        .oneshot(post(
            "/v1/control",
            Some(TOKEN),
            serde_json::json!({ "token": "explode_1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
