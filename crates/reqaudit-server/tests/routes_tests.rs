//! Router tests driving the full middleware stack

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{HeaderName, Method, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use reqaudit::{AuditLayer, AuditRecord, EmitOutcome, Emitter, TokenState};
use reqaudit_server::routes;
use serde_json::Value as JsonValue;
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tower::ServiceExt;

#[derive(Debug, Default)]
struct CapturingEmitter {
    records: Mutex<Vec<AuditRecord>>,
}

impl CapturingEmitter {
    fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl Emitter for CapturingEmitter {
    fn name(&self) -> &'static str {
        "capturing"
    }

    async fn emit(&self, record: &AuditRecord) -> EmitOutcome {
        self.records.lock().unwrap().push(record.clone());
        EmitOutcome::Written
    }
}

fn test_app(emitter: Arc<CapturingEmitter>) -> Router {
    let layer = AuditLayer::new(emitter, Some(HeaderName::from_static("x-request-id")))
        .await_emit(true);
    routes::router(layer)
}

fn echo_request(body: &str) -> Request {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/echo")
        .header("content-type", "application/json")
        .header("authorization", "Bearer abc")
        .header(routes::CLIENT_ID_HEADER, "client-11")
        .body(Body::from(body.to_string()))
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 5], 40000))));
    request
}

#[tokio::test]
async fn test_health_check() {
    let emitter = Arc::new(CapturingEmitter::default());
    let app = test_app(emitter.clone());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(emitter.records()[0].component(), "/health");
}

#[tokio::test]
async fn test_echo_annotates_record() {
    let emitter = Arc::new(CapturingEmitter::default());
    let app = test_app(emitter.clone());

    let response = app
        .oneshot(echo_request(r#"{"field1":"value1"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let header = response.headers()["x-request-id"].to_str().unwrap().to_string();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body: JsonValue = serde_json::from_slice(&body).unwrap();

    let record = &emitter.records()[0];
    assert_eq!(header, record.id().to_string());
    assert_eq!(body["audit_id"], header);
    assert_eq!(body["echo"]["field1"], "value1");
    assert_eq!(record.ip(), "10.0.0.5");
    assert_eq!(record.action(), "POST");
    assert_eq!(record.component(), "/api/v1/echo");
    assert_eq!(record.fields()["field1"], "value1");
    assert_eq!(record.token_state(), TokenState::Valid);
    assert_eq!(record.client_id(), Some("client-11".to_string()));
    assert_eq!(record.status(), 200);
}

#[tokio::test]
async fn test_echo_rejects_non_object() {
    let emitter = Arc::new(CapturingEmitter::default());
    let app = test_app(emitter.clone());

    let response = app.oneshot(echo_request("[1,2,3]")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let record = &emitter.records()[0];
    assert!(record.fields().is_empty());
    assert_eq!(record.status(), 422);
    assert_eq!(record.errors()[0]["code"], "not_an_object");
}

#[tokio::test]
async fn test_malformed_json_status_recorded() {
    let emitter = Arc::new(CapturingEmitter::default());
    let app = test_app(emitter.clone());

    let response = app.oneshot(echo_request("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let record = &emitter.records()[0];
    assert_eq!(record.status(), 400);
    assert_eq!(record.token_state(), TokenState::Missing);
}

#[tokio::test]
async fn test_spawned_emissions_drained_before_exit() {
    let emitter = Arc::new(CapturingEmitter::default());
    let layer = AuditLayer::new(emitter.clone(), None);
    let app = routes::router(layer.clone());

    for _ in 0..3 {
        let response = app.clone().oneshot(echo_request("{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert!(layer.drain(std::time::Duration::from_secs(1)).await);
    assert_eq!(emitter.records().len(), 3);
    assert_eq!(layer.pending_emissions(), 0);
}
