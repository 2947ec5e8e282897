//! Request audit logging for axum services
//!
//! Attaches a structured audit record to every inbound request, lets handlers
//! annotate it with status, identity claims and errors, and emits the
//! finished record to a configurable sink.
//!
//! # Overview
//!
//! - **Records**: [`AuditRecord`], shared per request through [`AuditHandle`]
//! - **Sinks**: [`ConsoleEmitter`] writes a text block to the log stream,
//!   [`NotificationEmitter`] publishes JSON to an AWS SNS topic
//! - **Middleware**: [`AuditLayer`] for any tower/axum service
//! - **Configuration**: [`AuditOptions`] resolved by [`configurator::resolve`]
//!
//! # Example
//!
//! ```no_run
//! use axum::{http::StatusCode, routing::post, Extension, Router};
//! use reqaudit::{configurator, AuditHandle, AuditLayer, AuditOptions};
//!
//! async fn create(Extension(audit): Extension<AuditHandle>) -> StatusCode {
//!     audit.insert_claim("sub", "client-42");
//!     StatusCode::CREATED
//! }
//!
//! # async fn example() {
//! let options = AuditOptions {
//!     response_header: Some("X-Request-Id".to_string()),
//!     ..AuditOptions::console()
//! };
//! let resolved = configurator::resolve(&options).await;
//!
//! let app: Router = Router::new()
//!     .route("/orders", post(create))
//!     .layer(AuditLayer::from_resolved(resolved, &options));
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod audit;
pub mod config;
pub mod configurator;
pub mod emitter;
pub mod error;
pub mod notify;

// Re-export commonly used types
pub use audit::{AuditHandle, AuditLayer, AuditRecord, RequestSeed, TokenState};
pub use config::AuditOptions;
pub use configurator::{ConfigWarning, ResolvedAudit};
pub use emitter::{ConsoleEmitter, EmitOutcome, Emitter, NotificationEmitter};
pub use error::{AuditError, AuditResult, PublishError};
pub use notify::{NotificationPublisher, PublishReceipt, SnsConfig, SnsPublisher};
