//! Integration tests for request forwarding

use std::sync::Arc;

use autonote_gateway::{api::routes::create_router, config::Settings, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{any, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_settings(notes_url: &str) -> Settings {
    Settings {
        note_service_url: notes_url.to_string(),
        health_check_timeout: 2,
        ..Default::default()
    }
}

fn build_app(settings: Settings) -> Router {
    let state = Arc::new(AppState::from_settings(settings).unwrap());
    create_router(state)
}

async fn body_value(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_forwards_request_and_relays_response() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notes/create"))
        .and(header("authorization", "Bearer user-token"))
        .and(body_json(json!({"title": "hi"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "1"})))
        .expect(1)
        .mount(&backend)
        .await;

    let app = build_app(test_settings(&backend.uri()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/notes/create")
                .header("authorization", "Bearer user-token")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"title":"hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_value(response).await, json!({"id": "1"}));
}

#[tokio::test]
async fn test_query_params_preserved() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes/search"))
        .and(query_param("q", "rust"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&backend)
        .await;

    let app = build_app(test_settings(&backend.uri()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/notes/search?q=rust&limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_backend_status_relayed_verbatim() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "no such note"})))
        .mount(&backend)
        .await;

    let app = build_app(test_settings(&backend.uri()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/notes/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_value(response).await, json!({"detail": "no such note"}));
}

#[tokio::test]
async fn test_non_json_body_passes_through_untouched() {
    let payload: &[u8] = b"\x00\x01\x02 raw export bytes";
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes/export"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(payload)
                .insert_header("content-type", "application/octet-stream"),
        )
        .mount(&backend)
        .await;

    let app = build_app(test_settings(&backend.uri()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/notes/export")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], payload);
}

#[tokio::test]
async fn test_unreachable_backend_returns_502_naming_service() {
    // Nothing listens on port 1.
    let app = build_app(test_settings("http://127.0.0.1:1"));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/notes/create")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_value(response).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("notes"));
    assert_eq!(body["error"]["code"], "forwarding_failed");
}

#[tokio::test]
async fn test_unmatched_path_is_never_forwarded() {
    let backend = MockServer::start().await;
    Mock::given(any()).respond_with(ResponseTemplate::new(200)).expect(0).mount(&backend).await;

    let app = build_app(test_settings(&backend.uri()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/billing/invoices")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_value(response).await;
    assert_eq!(body["error"]["code"], "unknown_service");
}

#[tokio::test]
async fn test_options_is_never_forwarded() {
    let backend = MockServer::start().await;
    Mock::given(any()).respond_with(ResponseTemplate::new(200)).expect(0).mount(&backend).await;

    let app = build_app(test_settings(&backend.uri()));

    // Bare OPTIONS lands on the proxy fallback and is answered locally.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/notes/create")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // A real preflight is intercepted by the CORS layer.
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/notes/create")
                .header("origin", "http://localhost:3000")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:3000"
    );
}

#[tokio::test]
async fn test_responses_carry_cors_headers() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&backend)
        .await;

    let app = build_app(test_settings(&backend.uri()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/notes/list")
                .header("origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-credentials")
            .unwrap(),
        "true"
    );
}
