//! Audit data models

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;
use uuid::Uuid;

use crate::emitter::{EmitOutcome, Emitter};
use crate::error::{AuditError, AuditResult};

/// JSON object type used for request fields and identity claims
pub type JsonMap = Map<String, JsonValue>;

/// Claim key holding the authenticated subject
pub const CLAIM_SUBJECT: &str = "sub";

/// Claim key holding the token issuer
pub const CLAIM_ISSUER: &str = "iss";

/// Outcome of the token check performed by downstream auth code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    /// No valid token confirmed yet
    #[default]
    Missing,
    Invalid,
    Valid,
}

impl TokenState {
    /// Derive the state from the legacy `missing`/`invalid` flags.
    ///
    /// `missing` is checked first, so a record that still carries both
    /// default flags reports `Missing`.
    pub fn from_flags(missing: bool, invalid: bool) -> Self {
        if missing {
            Self::Missing
        } else if invalid {
            Self::Invalid
        } else {
            Self::Valid
        }
    }

    /// Legacy `(missing, invalid)` flag pair for this state
    pub fn as_flags(self) -> (bool, bool) {
        match self {
            Self::Missing => (true, true),
            Self::Invalid => (false, true),
            Self::Valid => (false, false),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Invalid => "invalid",
            Self::Valid => "valid",
        }
    }
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request attributes copied onto a record when it is created
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSeed {
    /// Client address
    pub ip: String,
    /// HTTP method
    pub action: String,
    /// Request path
    pub component: String,
    /// Request body fields
    pub fields: JsonMap,
}

/// Audit trail of a single request
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    id: Uuid,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    duration_ms: u64,
    status: u16,
    component: String,
    action: String,
    fields: JsonMap,
    claims: JsonMap,
    ip: String,
    token_state: TokenState,
    errors: Vec<JsonValue>,
    finalized: bool,
}

impl AuditRecord {
    /// Create a record with a fresh time-ordered id, started now
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: 0,
            status: 0,
            component: String::new(),
            action: String::new(),
            fields: JsonMap::new(),
            claims: JsonMap::new(),
            ip: String::new(),
            token_state: TokenState::default(),
            errors: Vec::new(),
            finalized: false,
        }
    }

    /// Create a record seeded with the request-derived attributes
    pub fn from_request(seed: RequestSeed) -> Self {
        Self {
            ip: seed.ip,
            action: seed.action,
            component: seed.component,
            fields: seed.fields,
            ..Self::new()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn fields(&self) -> &JsonMap {
        &self.fields
    }

    pub fn claims(&self) -> &JsonMap {
        &self.claims
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn token_state(&self) -> TokenState {
        self.token_state
    }

    pub fn errors(&self) -> &[JsonValue] {
        &self.errors
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Legacy flag: no token has been seen yet
    pub fn missing_token(&self) -> bool {
        self.token_state.as_flags().0
    }

    /// Legacy flag: the token has not been confirmed valid
    pub fn invalid_token(&self) -> bool {
        self.token_state.as_flags().1
    }

    /// Subject claim rendered as text
    pub fn client_id(&self) -> Option<String> {
        claim_text(&self.claims, CLAIM_SUBJECT)
    }

    /// Issuer claim rendered as text
    pub fn issuer_id(&self) -> Option<String> {
        claim_text(&self.claims, CLAIM_ISSUER)
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn set_fields(&mut self, fields: JsonMap) {
        self.fields = fields;
    }

    pub fn set_claims(&mut self, claims: JsonMap) {
        self.claims = claims;
    }

    pub fn insert_claim(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.claims.insert(key.into(), value.into());
    }

    pub fn set_token_state(&mut self, state: TokenState) {
        self.token_state = state;
    }

    /// Update the token state from the legacy flag pair
    pub fn set_token_flags(&mut self, missing: bool, invalid: bool) {
        self.token_state = TokenState::from_flags(missing, invalid);
    }

    /// Append an error descriptor.
    ///
    /// Values that fail to serialize are recorded by their debug text.
    pub fn push_error<E>(&mut self, error: E)
    where
        E: Serialize + std::fmt::Debug,
    {
        let descriptor = match serde_json::to_value(&error) {
            Ok(value) => value,
            Err(e) => {
                warn!(audit_id = %self.id, error = %e, "Failed to serialize audit error descriptor");
                JsonValue::String(format!("{:?}", error))
            },
        };
        self.errors.push(descriptor);
    }

    /// Append a plain message as an error descriptor
    pub fn push_error_message(&mut self, message: impl Into<String>) {
        self.errors.push(JsonValue::String(message.into()));
    }

    /// Stamp end time and duration.
    ///
    /// A backward clock yields `end_time == start_time` and a zero duration.
    pub fn finalize(&mut self) -> AuditResult<()> {
        if self.finalized {
            return Err(AuditError::AlreadyFinalized { id: self.id });
        }

        let end_time = Utc::now().max(self.start_time);
        let elapsed = (end_time - self.start_time).num_milliseconds();

        self.end_time = Some(end_time);
        self.duration_ms = u64::try_from(elapsed).unwrap_or(0);
        self.finalized = true;

        Ok(())
    }

    /// Finalize the record and hand it to `emitter`
    pub async fn finish(&mut self, emitter: &dyn Emitter) -> AuditResult<EmitOutcome> {
        self.finalize()?;
        Ok(emitter.emit(self).await)
    }

    /// Start time in the wire format used by every sink
    pub fn start_time_iso(&self) -> String {
        format_timestamp(self.start_time)
    }

    /// End time in the wire format, empty until finalized
    pub fn end_time_iso(&self) -> String {
        self.end_time.map(format_timestamp).unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn set_start_time(&mut self, start_time: DateTime<Utc>) {
        self.start_time = start_time;
    }
}

impl Default for AuditRecord {
    fn default() -> Self {
        Self::new()
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn claim_text(claims: &JsonMap, key: &str) -> Option<String> {
    match claims.get(key)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: JsonValue) -> JsonMap {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn test_new_record_defaults() {
        let record = AuditRecord::new();

        assert!(!record.id().is_nil());
        assert_eq!(record.end_time(), None);
        assert_eq!(record.duration_ms(), 0);
        assert_eq!(record.status(), 0);
        assert_eq!(record.component(), "");
        assert_eq!(record.action(), "");
        assert!(record.fields().is_empty());
        assert!(record.claims().is_empty());
        assert_eq!(record.ip(), "");
        assert_eq!(record.token_state(), TokenState::Missing);
        assert!(record.missing_token());
        assert!(record.invalid_token());
        assert!(record.errors().is_empty());
        assert!(!record.is_finalized());
    }

    #[test]
    fn test_ids_are_unique() {
        let first = AuditRecord::new();
        let second = AuditRecord::new();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.id().get_version_num(), 7);
    }

    #[test]
    fn test_from_request_copies_seed() {
        let record = AuditRecord::from_request(RequestSeed {
            ip: "127.0.0.1".to_string(),
            action: "POST".to_string(),
            component: "/p1/p2".to_string(),
            fields: object(json!({"field1": "value1", "field2": "value2"})),
        });

        assert_eq!(record.ip(), "127.0.0.1");
        assert_eq!(record.action(), "POST");
        assert_eq!(record.component(), "/p1/p2");
        assert_eq!(record.fields()["field1"], "value1");
        assert_eq!(record.fields()["field2"], "value2");
    }

    #[test]
    fn test_token_state_precedence() {
        assert_eq!(TokenState::from_flags(true, true), TokenState::Missing);
        assert_eq!(TokenState::from_flags(true, false), TokenState::Missing);
        assert_eq!(TokenState::from_flags(false, true), TokenState::Invalid);
        assert_eq!(TokenState::from_flags(false, false), TokenState::Valid);
    }

    #[test]
    fn test_token_flags_round_trip_through_record() {
        let mut record = AuditRecord::new();

        record.set_token_flags(false, true);
        assert_eq!(record.token_state(), TokenState::Invalid);
        assert!(!record.missing_token());
        assert!(record.invalid_token());

        record.set_token_state(TokenState::Valid);
        assert!(!record.missing_token());
        assert!(!record.invalid_token());
    }

    #[test]
    fn test_token_state_serialization() {
        assert_eq!(serde_json::to_string(&TokenState::Invalid).unwrap(), r#""invalid""#);
        let state: TokenState = serde_json::from_str(r#""valid""#).unwrap();
        assert_eq!(state, TokenState::Valid);
    }

    #[test]
    fn test_finalize_stamps_end_time_once() {
        let mut record = AuditRecord::new();
        record.finalize().unwrap();

        let end_time = record.end_time().unwrap();
        assert!(end_time >= record.start_time());
        assert!(record.is_finalized());

        let err = record.finalize().unwrap_err();
        assert_eq!(err, AuditError::AlreadyFinalized { id: record.id() });
        assert_eq!(record.end_time(), Some(end_time));
    }

    #[test]
    fn test_finalize_computes_duration() {
        let mut record = AuditRecord::new();
        record.set_start_time(Utc::now() - chrono::Duration::milliseconds(250));
        record.finalize().unwrap();

        assert!(record.duration_ms() >= 250);
    }

    #[test]
    fn test_finalize_clamps_backward_clock() {
        let mut record = AuditRecord::new();
        let future_start = Utc::now() + chrono::Duration::seconds(60);
        record.set_start_time(future_start);

        record.finalize().unwrap();

        assert_eq!(record.duration_ms(), 0);
        assert_eq!(record.end_time(), Some(future_start));
    }

    #[test]
    fn test_claim_text_accessors() {
        let mut record = AuditRecord::new();
        assert_eq!(record.client_id(), None);

        record.insert_claim("sub", "user-42");
        record.insert_claim("iss", 7);
        assert_eq!(record.client_id(), Some("user-42".to_string()));
        assert_eq!(record.issuer_id(), Some("7".to_string()));

        record.insert_claim("sub", JsonValue::Null);
        assert_eq!(record.client_id(), None);
    }

    #[test]
    fn test_errors_keep_insertion_order() {
        let mut record = AuditRecord::new();
        record.push_error_message("first");
        record.push_error(json!({"code": "E2", "message": "second"}));

        assert_eq!(record.errors().len(), 2);
        assert_eq!(record.errors()[0], "first");
        assert_eq!(record.errors()[1]["code"], "E2");
    }

    #[test]
    fn test_timestamp_wire_format() {
        let mut record = AuditRecord::new();
        assert_eq!(record.end_time_iso(), "");

        record.finalize().unwrap();
        let start = record.start_time_iso();
        assert!(start.ends_with('Z'));
        assert_eq!(start.len(), "2024-01-01T00:00:00.000Z".len());
    }
}
