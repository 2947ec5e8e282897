//! Request audit records and the middleware that produces them
//!
//! # Architecture
//!
//! - [`AuditRecord`] is a plain value describing one request
//! - [`AuditHandle`] shares a record between the middleware and handlers
//! - [`AuditLayer`] creates a record per request, attaches the handle to the
//!   request extensions and finishes the record once the response exists
//!
//! # Usage
//!
//! ```no_run
//! use axum::{routing::post, Router};
//! use reqaudit::{configurator, AuditLayer, AuditOptions};
//!
//! # async fn example() {
//! let options = AuditOptions::from_env();
//! let resolved = configurator::resolve(&options).await;
//!
//! let app: Router = Router::new()
//!     .route("/api/v1/orders", post(|| async { "created" }))
//!     .layer(AuditLayer::from_resolved(resolved, &options));
//! # }
//! ```

mod handle;
mod middleware;
mod models;


pub use handle::AuditHandle;
pub use middleware::{AuditLayer, AuditMiddleware};
pub use models::{AuditRecord, JsonMap, RequestSeed, TokenState, CLAIM_ISSUER, CLAIM_SUBJECT};
