//! Audit middleware: one record per request, finished when the response is produced
//!
//! Every request is audited regardless of method. Bodies up to the configured
//! cap are buffered so they can seed the record's fields, then handed to the
//! downstream service unchanged. A body that declares a larger size is
//! forwarded untouched without fields; one that overruns the cap while being
//! read, or fails to read, is answered here with 413 or 400.
//!
//! Emission always runs on a task owned by the layer's tracker, so dropping
//! the response future never cancels a record that is being emitted. A
//! request whose future is dropped before a response exists is still
//! finished, with an error noting the cancellation.

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use http_body::Body as _;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{json, Value as JsonValue};
use std::{
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio_util::task::TaskTracker;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::handle::AuditHandle;
use super::models::{AuditRecord, JsonMap, RequestSeed};
use crate::config::{AuditOptions, DEFAULT_MAX_BODY_BYTES};
use crate::configurator::ResolvedAudit;
use crate::emitter::Emitter;
use crate::error::AuditError;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Error text recorded when the request future is dropped before a response
pub const CANCELLED_MESSAGE: &str = "request cancelled before a response was produced";

/// Audit logging layer
///
/// Closes over the emitter built at startup and the optional header that
/// carries the record id back to the client. Clones share one emission
/// tracker, drained with [`AuditLayer::drain`] at shutdown.
#[derive(Debug, Clone)]
pub struct AuditLayer {
    emitter: Arc<dyn Emitter>,
    response_header: Option<HeaderName>,
    await_emit: bool,
    trust_forwarded_for: bool,
    max_body_bytes: usize,
    emissions: TaskTracker,
}

impl AuditLayer {
    pub fn new(emitter: Arc<dyn Emitter>, response_header: Option<HeaderName>) -> Self {
        Self {
            emitter,
            response_header,
            await_emit: false,
            trust_forwarded_for: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            emissions: TaskTracker::new(),
        }
    }

    /// Build from resolved options, taking the middleware flags from `options`
    pub fn from_resolved(resolved: ResolvedAudit, options: &AuditOptions) -> Self {
        Self::new(resolved.emitter, resolved.response_header)
            .await_emit(options.await_emit)
            .trust_forwarded_for(options.trust_forwarded_for)
            .max_body_bytes(options.body_limit())
    }

    /// Wait for emission before returning the response
    pub fn await_emit(mut self, await_emit: bool) -> Self {
        self.await_emit = await_emit;
        self
    }

    /// Take the client address from the first `X-Forwarded-For` entry
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// Largest body buffered to seed fields
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn response_header(&self) -> Option<&HeaderName> {
        self.response_header.as_ref()
    }

    pub fn emitter(&self) -> &Arc<dyn Emitter> {
        &self.emitter
    }

    /// Emissions spawned and not yet completed
    pub fn pending_emissions(&self) -> usize {
        self.emissions.len()
    }

    /// Wait up to `timeout` for every spawned emission to complete.
    ///
    /// Meant for shutdown, after the server stopped accepting requests.
    /// Returns `false` if emissions were still running at the deadline.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.emissions.close();
        tokio::time::timeout(timeout, self.emissions.wait())
            .await
            .is_ok()
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditMiddleware {
            inner,
            layer: self.clone(),
        }
    }
}

/// Audit middleware service
#[derive(Debug, Clone)]
pub struct AuditMiddleware<S> {
    inner: S,
    layer: AuditLayer,
}

impl<S> Service<Request> for AuditMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The clone may not be ready; swap so the ready service handles this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let layer = self.layer.clone();

        Box::pin(async move {
            let ip = client_ip(&request, layer.trust_forwarded_for);
            let action = request.method().to_string();
            let component = request.uri().path().to_string();

            let (parts, body) = request.into_parts();
            let captured = capture_body(body, layer.max_body_bytes).await;

            let fields = match &captured {
                CapturedBody::Buffered(bytes) => body_fields(bytes),
                _ => JsonMap::new(),
            };
            let record = AuditRecord::from_request(RequestSeed {
                ip,
                action,
                component,
                fields,
            });
            let audit_id = record.id();
            let handle = AuditHandle::new(record, layer.emitter.clone());
            let pending = PendingFinish::new(handle.clone(), layer.emissions.clone());

            let forward = match captured {
                CapturedBody::Buffered(bytes) => {
                    debug!(audit_id = %audit_id, body_size = bytes.len(), "Audit record attached to request");
                    Ok(Body::from(bytes))
                },
                CapturedBody::Oversize { body, size } => {
                    warn!(audit_id = %audit_id, body_size = size, limit = layer.max_body_bytes, "Request body not captured for audit");
                    handle.push_error(json!({
                        "code": "body_too_large",
                        "size": size,
                        "limit": layer.max_body_bytes,
                    }));
                    Ok(body)
                },
                CapturedBody::LimitExceeded => {
                    warn!(audit_id = %audit_id, limit = layer.max_body_bytes, "Request body exceeded audit capture limit");
                    handle.push_error(json!({
                        "code": "body_too_large",
                        "limit": layer.max_body_bytes,
                    }));
                    Err(StatusCode::PAYLOAD_TOO_LARGE)
                },
                CapturedBody::Unreadable(detail) => {
                    warn!(audit_id = %audit_id, error = %detail, "Failed to capture request body");
                    handle.push_error(json!({
                        "code": "body_unreadable",
                        "detail": detail,
                    }));
                    Err(StatusCode::BAD_REQUEST)
                },
            };

            let result = match forward {
                Ok(body) => {
                    let mut request = Request::from_parts(parts, body);
                    request.extensions_mut().insert(handle.clone());
                    inner.call(request).await
                },
                Err(status) => Ok(status.into_response()),
            };

            let result = match result {
                Ok(mut response) => {
                    if let Some(name) = &layer.response_header {
                        insert_correlation_header(response.headers_mut(), name, audit_id);
                    }
                    let status = response.status().as_u16();
                    handle.update(|record| {
                        if record.status() == 0 {
                            record.set_status(status);
                        }
                    });
                    Ok(response)
                },
                Err(e) => {
                    handle.push_error_message(e.to_string());
                    Err(e)
                },
            };

            pending.disarm();
            let emission = layer.emissions.spawn(finish(handle));
            if layer.await_emit {
                if let Err(e) = emission.await {
                    warn!(audit_id = %audit_id, error = %e, "Audit emission task failed");
                }
            }

            result
        })
    }
}

/// Finishes the record from `Drop` unless the request reached its response
struct PendingFinish {
    handle: Option<AuditHandle>,
    emissions: TaskTracker,
}

impl PendingFinish {
    fn new(handle: AuditHandle, emissions: TaskTracker) -> Self {
        Self {
            handle: Some(handle),
            emissions,
        }
    }

    /// The request reached its response; the caller finishes the record
    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for PendingFinish {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        handle.push_error_message(CANCELLED_MESSAGE);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(audit_id = %handle.id(), "Request cancelled; finishing audit record");
                self.emissions.spawn_on(finish(handle), &runtime);
            },
            Err(_) => {
                warn!(audit_id = %handle.id(), "No runtime to finish cancelled audit record");
            },
        }
    }
}

async fn finish(handle: AuditHandle) {
    match handle.finish().await {
        Ok(outcome) => {
            debug!(audit_id = %handle.id(), outcome = ?outcome, "Audit record finished");
        },
        Err(AuditError::AlreadyFinalized { id }) => {
            debug!(audit_id = %id, "Audit record finished by downstream code");
        },
    }
}

enum CapturedBody {
    Buffered(Bytes),
    /// Declared size is over the cap; forwarded unread
    Oversize { body: Body, size: u64 },
    /// Ran past the cap while reading; the body is partly consumed
    LimitExceeded,
    Unreadable(String),
}

async fn capture_body(body: Body, limit: usize) -> CapturedBody {
    let declared = body.size_hint().lower();
    if declared > limit as u64 {
        return CapturedBody::Oversize {
            body,
            size: declared,
        };
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => CapturedBody::Buffered(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => CapturedBody::LimitExceeded,
        Err(e) => CapturedBody::Unreadable(e.to_string()),
    }
}

fn insert_correlation_header(headers: &mut HeaderMap, name: &HeaderName, audit_id: uuid::Uuid) {
    match HeaderValue::from_str(&audit_id.to_string()) {
        Ok(value) => {
            headers.insert(name.clone(), value);
        },
        Err(e) => {
            warn!(audit_id = %audit_id, error = %e, "Failed to write audit response header");
        },
    }
}

/// Client address for the record, empty when unknown
fn client_ip(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_default()
}

/// Request body as a JSON object; anything else yields an empty map
fn body_fields(body: &[u8]) -> JsonMap {
    if body.is_empty() {
        return JsonMap::new();
    }

    match serde_json::from_slice::<JsonValue>(body) {
        Ok(JsonValue::Object(map)) => map,
        _ => JsonMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_fields_object() {
        let fields = body_fields(br#"{"field1": "value1", "field2": 2}"#);
        assert_eq!(fields["field1"], "value1");
        assert_eq!(fields["field2"], 2);
    }

    #[test]
    fn test_body_fields_non_object() {
        assert!(body_fields(b"").is_empty());
        assert!(body_fields(b"not json").is_empty());
        assert!(body_fields(b"[1, 2, 3]").is_empty());
        assert!(body_fields(b"\"text\"").is_empty());
    }

    #[tokio::test]
    async fn test_capture_body_respects_declared_size() {
        match capture_body(Body::from("x".repeat(64)), 16).await {
            CapturedBody::Oversize { body, size } => {
                assert_eq!(size, 64);
                let bytes = body.collect().await.unwrap().to_bytes();
                assert_eq!(bytes.len(), 64);
            },
            _ => panic!("expected oversize body to be forwarded unread"),
        }

        match capture_body(Body::from("x".repeat(16)), 16).await {
            CapturedBody::Buffered(bytes) => assert_eq!(bytes.len(), 16),
            _ => panic!("expected body at the limit to be buffered"),
        }
    }

    #[test]
    fn test_client_ip_sources() {
        let mut request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request, false), "");
        assert_eq!(client_ip(&request, true), "203.0.113.9");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 4], 5000))));
        assert_eq!(client_ip(&request, false), "192.168.1.4");
        assert_eq!(client_ip(&request, true), "203.0.113.9");
    }

    #[test]
    fn test_blank_forwarded_for_uses_peer() {
        let mut request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", " ")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 1, 1], 80))));
        assert_eq!(client_ip(&request, true), "10.1.1.1");
    }
}
