//! Notification sink: publishes each record as a JSON message to a topic
//!
//! Delivery is at-most-once. A failed publish is logged with the record id
//! and dropped; it never fails or retries the request being audited.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::{json_text, EmitOutcome, Emitter};
use crate::audit::{AuditRecord, TokenState};
use crate::notify::NotificationPublisher;

/// Wire shape of a published audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: String,
    pub start_time: String,
    pub end_time: String,
    /// Milliseconds
    pub duration: u64,
    pub status: u16,
    pub component: String,
    pub action: String,
    pub token: TokenState,
    pub client_ip: String,
    pub client_id: Option<String>,
    pub issuer_id: Option<String>,
    /// JSON text of the request fields
    pub fields: String,
    /// JSON text of the identity claims
    pub claims: String,
    /// JSON text of the error list
    pub errors: String,
}

impl NotificationPayload {
    pub fn from_record(record: &AuditRecord) -> Self {
        let id = record.id();
        Self {
            id: id.to_string(),
            start_time: record.start_time_iso(),
            end_time: record.end_time_iso(),
            duration: record.duration_ms(),
            status: record.status(),
            component: record.component().to_string(),
            action: record.action().to_string(),
            token: record.token_state(),
            client_ip: record.ip().to_string(),
            client_id: record.client_id(),
            issuer_id: record.issuer_id(),
            fields: json_text(record.fields(), "fields", id),
            claims: json_text(record.claims(), "claims", id),
            errors: json_text(record.errors(), "errors", id),
        }
    }
}

/// Publishes audit records through a [`NotificationPublisher`]
#[derive(Debug, Clone)]
pub struct NotificationEmitter {
    publisher: Arc<dyn NotificationPublisher>,
    topic: String,
    quiet: bool,
}

impl NotificationEmitter {
    pub fn new(publisher: Arc<dyn NotificationPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            quiet: false,
        }
    }

    /// Suppress the per-message success log
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[async_trait]
impl Emitter for NotificationEmitter {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn emit(&self, record: &AuditRecord) -> EmitOutcome {
        let audit_id = record.id();
        let payload = NotificationPayload::from_record(record);

        let message = match serde_json::to_string(&payload) {
            Ok(message) => message,
            Err(e) => {
                error!(audit_id = %audit_id, error = %e, "Failed to serialize audit notification");
                return EmitOutcome::Dropped {
                    reason: e.to_string(),
                };
            },
        };

        match self.publisher.publish(&self.topic, message).await {
            Ok(receipt) => {
                if !self.quiet {
                    info!(
                        audit_id = %audit_id,
                        message_id = receipt.message_id.as_deref().unwrap_or_default(),
                        "Audit notification sent"
                    );
                }
                EmitOutcome::Published {
                    message_id: receipt.message_id,
                }
            },
            Err(e) => {
                error!(
                    audit_id = %audit_id,
                    topic = %self.topic,
                    error = %e,
                    "Failed to send audit notification"
                );
                EmitOutcome::Dropped {
                    reason: e.to_string(),
                }
            },
        }
    }
}
