//! Console sink: renders each record as a banner-delimited text block

use async_trait::async_trait;
use tracing::info;

use super::{json_text, EmitOutcome, Emitter};
use crate::audit::AuditRecord;

/// Shown for a claim the record does not carry
const ABSENT_CLAIM: &str = "-";

/// Writes audit records to the log stream as human-readable blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleEmitter;

impl ConsoleEmitter {
    pub fn new() -> Self {
        Self
    }

    /// Render `record` as the multi-line audit block
    pub fn render(&self, record: &AuditRecord) -> String {
        let id = record.id();
        let client_id = record.client_id();
        let issuer_id = record.issuer_id();

        format!(
            "------ Start request ID {id} ----------
 Start time: {start}
   End time: {end}
   Duration: {duration} ms
HTTP Status: {status}
  Component: {component}
     Action: {action}
 Auth Token: {token}
  Client IP: {ip}
  Client ID: {client_id}
  Issuer ID: {issuer_id}
     Fields: {fields}
     Claims: {claims}
     Errors: {errors}
------ End request ID {id} ------------",
            start = record.start_time_iso(),
            end = record.end_time_iso(),
            duration = record.duration_ms(),
            status = record.status(),
            component = record.component(),
            action = record.action(),
            token = record.token_state(),
            ip = record.ip(),
            client_id = client_id.as_deref().unwrap_or(ABSENT_CLAIM),
            issuer_id = issuer_id.as_deref().unwrap_or(ABSENT_CLAIM),
            fields = json_text(record.fields(), "fields", id),
            claims = json_text(record.claims(), "claims", id),
            errors = json_text(record.errors(), "errors", id),
        )
    }
}

#[async_trait]
impl Emitter for ConsoleEmitter {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn emit(&self, record: &AuditRecord) -> EmitOutcome {
        let block = self.render(record);
        info!(target: "reqaudit::console", "{}", block);
        EmitOutcome::Written
    }
}
