//! HTTP routes and middleware stack

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use reqaudit::{audit::CLAIM_SUBJECT, AuditHandle, AuditLayer, TokenState};
use serde_json::{json, Value as JsonValue};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;

/// Header the echo route reads the caller's client id from
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Build the router with the audit layer outermost
pub fn router(audit: AuditLayer) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/echo", post(echo))
        .layer(tracing_layer())
        .layer(audit)
}

/// Create tracing/logging layer
pub fn tracing_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Micros),
        )
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Echo the JSON body back, annotating the audit record on the way.
///
/// Token verification is out of scope here; a present `Authorization`
/// header is treated as valid and an empty one as invalid.
async fn echo(
    Extension(audit): Extension<AuditHandle>,
    headers: HeaderMap,
    Json(payload): Json<JsonValue>,
) -> impl IntoResponse {
    let token = match headers.get(header::AUTHORIZATION) {
        None => TokenState::Missing,
        Some(value) if value.is_empty() => TokenState::Invalid,
        Some(_) => TokenState::Valid,
    };
    audit.set_token_state(token);

    if let Some(client_id) = headers.get(CLIENT_ID_HEADER).and_then(|v| v.to_str().ok()) {
        audit.insert_claim(CLAIM_SUBJECT, client_id);
    }

    if !payload.is_object() {
        audit.push_error(json!({ "code": "not_an_object" }));
        audit.set_status(StatusCode::UNPROCESSABLE_ENTITY.as_u16());
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "expected a JSON object" })),
        );
    }

    audit.set_status(StatusCode::OK.as_u16());
    (
        StatusCode::OK,
        Json(json!({ "audit_id": audit.id().to_string(), "echo": payload })),
    )
}
