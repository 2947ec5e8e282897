//! Shared handle to the audit record of one in-flight request
//!
//! The middleware stores an [`AuditHandle`] in the request extensions.
//! Handlers extract it with `Extension<AuditHandle>` and annotate the record:
//!
//! ```no_run
//! use axum::{http::StatusCode, Extension};
//! use reqaudit::{AuditHandle, TokenState};
//!
//! async fn create_order(Extension(audit): Extension<AuditHandle>) -> StatusCode {
//!     audit.set_token_state(TokenState::Valid);
//!     audit.insert_claim("sub", "client-42");
//!     audit.set_status(201);
//!     StatusCode::CREATED
//! }
//! ```

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::models::{AuditRecord, JsonMap, TokenState};
use crate::emitter::{EmitOutcome, Emitter};
use crate::error::AuditResult;

/// Cloneable handle to a request's audit record and the emitter that finishes it
#[derive(Debug, Clone)]
pub struct AuditHandle {
    record: Arc<Mutex<AuditRecord>>,
    emitter: Arc<dyn Emitter>,
}

impl AuditHandle {
    pub fn new(record: AuditRecord, emitter: Arc<dyn Emitter>) -> Self {
        Self {
            record: Arc::new(Mutex::new(record)),
            emitter,
        }
    }

    /// Handle to a fresh record that is not tied to any request
    pub fn standalone(emitter: Arc<dyn Emitter>) -> Self {
        Self::new(AuditRecord::new(), emitter)
    }

    // A panic while holding the lock leaves the record usable, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, AuditRecord> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> Uuid {
        self.lock().id()
    }

    pub fn emitter_name(&self) -> &'static str {
        self.emitter.name()
    }

    /// Copy of the record in its current state
    pub fn snapshot(&self) -> AuditRecord {
        self.lock().clone()
    }

    /// Run `f` with mutable access to the record
    pub fn update<R>(&self, f: impl FnOnce(&mut AuditRecord) -> R) -> R {
        f(&mut *self.lock())
    }

    pub fn status(&self) -> u16 {
        self.lock().status()
    }

    pub fn is_finalized(&self) -> bool {
        self.lock().is_finalized()
    }

    pub fn set_status(&self, status: u16) {
        self.lock().set_status(status);
    }

    pub fn set_fields(&self, fields: JsonMap) {
        self.lock().set_fields(fields);
    }

    pub fn set_claims(&self, claims: JsonMap) {
        self.lock().set_claims(claims);
    }

    pub fn insert_claim(&self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.lock().insert_claim(key, value);
    }

    pub fn set_token_state(&self, state: TokenState) {
        self.lock().set_token_state(state);
    }

    pub fn set_token_flags(&self, missing: bool, invalid: bool) {
        self.lock().set_token_flags(missing, invalid);
    }

    pub fn push_error<E>(&self, error: E)
    where
        E: Serialize + std::fmt::Debug,
    {
        self.lock().push_error(error);
    }

    pub fn push_error_message(&self, message: impl Into<String>) {
        self.lock().push_error_message(message);
    }

    /// Finalize the record and emit it.
    ///
    /// The record is stamped under the lock; emission runs on a snapshot so
    /// the lock is never held across the sink's I/O. Only the first call
    /// emits, later calls return `AlreadyFinalized`.
    pub async fn finish(&self) -> AuditResult<EmitOutcome> {
        let finalized = {
            let mut record = self.lock();
            record.finalize()?;
            record.clone()
        };

        Ok(self.emitter.emit(&finalized).await)
    }
}
