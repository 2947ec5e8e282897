//! Audit sinks
//!
//! An [`Emitter`] receives a finalized [`AuditRecord`] and delivers it to one
//! destination. Emitters are built once at startup and shared by every
//! request, so they hold only sink configuration and never mutate records.
//!
//! Adding a sink means implementing [`Emitter`]; neither the record nor the
//! middleware changes.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use reqaudit::{AuditRecord, EmitOutcome, Emitter};
//!
//! #[derive(Debug)]
//! struct StderrEmitter;
//!
//! #[async_trait]
//! impl Emitter for StderrEmitter {
//!     fn name(&self) -> &'static str {
//!         "stderr"
//!     }
//!
//!     async fn emit(&self, record: &AuditRecord) -> EmitOutcome {
//!         tracing::info!(audit_id = %record.id(), status = record.status(), "request audited");
//!         EmitOutcome::Written
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::audit::AuditRecord;

mod console;
mod notification;

pub use console::ConsoleEmitter;
pub use notification::{NotificationEmitter, NotificationPayload};

/// Text substituted for a value that cannot be serialized
pub const UNSERIALIZABLE_PLACEHOLDER: &str = "\"<unserializable>\"";

/// What happened to a record handed to an emitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Written to a local log stream
    Written,
    /// Accepted by a remote sink
    Published { message_id: Option<String> },
    /// Delivery failed; the failure has already been logged
    Dropped { reason: String },
}

impl EmitOutcome {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, Self::Dropped { .. })
    }
}

/// Capability to deliver a finalized audit record to one sink
#[async_trait]
pub trait Emitter: Send + Sync + std::fmt::Debug {
    /// Short sink name used in logs
    fn name(&self) -> &'static str;

    /// Deliver `record`. Implementations log and swallow their own failures.
    async fn emit(&self, record: &AuditRecord) -> EmitOutcome;
}

/// Serialize `value` to JSON text, logging and substituting a placeholder on failure
pub(crate) fn json_text<T: Serialize + ?Sized>(value: &T, what: &str, audit_id: Uuid) -> String {
    match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            error!(
                audit_id = %audit_id,
                field = what,
                error = %e,
                "Failed to serialize audit field"
            );
            UNSERIALIZABLE_PLACEHOLDER.to_string()
        },
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingEmitter;
    use super::*;
    use crate::error::AuditError;
    use serde::ser::Error as _;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refused"))
        }
    }

    #[test]
    fn test_json_text_placeholder_on_failure() {
        let text = json_text(&Unserializable, "fields", Uuid::now_v7());
        assert_eq!(text, UNSERIALIZABLE_PLACEHOLDER);
    }

    #[test]
    fn test_emit_outcome_delivery() {
        assert!(EmitOutcome::Written.is_delivered());
        assert!(EmitOutcome::Published { message_id: None }.is_delivered());
        assert!(!EmitOutcome::Dropped { reason: "down".to_string() }.is_delivered());
    }

    #[tokio::test]
    async fn test_record_finish_emits_once() {
        let emitter = RecordingEmitter::default();
        let mut record = AuditRecord::new();

        let outcome = record.finish(&emitter).await.unwrap();
        assert_eq!(outcome, EmitOutcome::Written);

        let err = record.finish(&emitter).await.unwrap_err();
        assert_eq!(err, AuditError::AlreadyFinalized { id: record.id() });
        assert_eq!(emitter.count(), 1);

        let emitted = &emitter.records()[0];
        assert!(emitted.is_finalized());
        assert!(emitted.end_time().unwrap() >= emitted.start_time());
    }
}
