//! Audit configuration options

use serde::{Deserialize, Serialize};

// ============================================================================
// Audit Configuration Constants
// ============================================================================

/// Emitter used when none is requested.
pub const DEFAULT_EMITTER: &str = EMITTER_CONSOLE;

/// Name selecting the console emitter.
pub const EMITTER_CONSOLE: &str = "console";

/// Name selecting the AWS SNS notification emitter.
pub const EMITTER_AWS_SNS: &str = "awssns";

/// Largest request body buffered to seed a record's fields (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Options bag resolved into an emitter by [`crate::configurator::resolve`].
///
/// Every field is optional so a partially filled bag still resolves; the
/// configurator reports what is missing and falls back to the console.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditOptions {
    /// `"console"` or `"awssns"`
    pub emitter: Option<String>,
    /// Response header that carries the audit record id
    pub response_header: Option<String>,
    pub aws_region: Option<String>,
    pub aws_topic_arn: Option<String>,
    pub aws_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub aws_secret: Option<String>,
    /// Endpoint override for the notification service
    pub aws_endpoint: Option<String>,
    /// Suppress setup logging
    pub quiet_init: bool,
    /// Suppress per-record success logging
    pub quiet_emit: bool,
    /// Await emission before returning the response instead of spawning it
    pub await_emit: bool,
    /// Take the client address from `X-Forwarded-For`
    pub trust_forwarded_for: bool,
    /// Cap on the buffered request body, [`DEFAULT_MAX_BODY_BYTES`] when unset
    pub max_body_bytes: Option<usize>,
}

impl AuditOptions {
    /// Options selecting the console emitter
    pub fn console() -> Self {
        Self {
            emitter: Some(EMITTER_CONSOLE.to_string()),
            ..Self::default()
        }
    }

    /// Load options from `AUDIT_*` environment variables
    ///
    /// Environment variables:
    /// - `AUDIT_EMITTER`: emitter name (console, awssns)
    /// - `AUDIT_RESPONSE_HEADER`: correlation header name
    /// - `AUDIT_AWS_REGION`, `AUDIT_AWS_TOPIC_ARN`: required for awssns
    /// - `AUDIT_AWS_KEY_ID`, `AUDIT_AWS_SECRET`: explicit credentials
    /// - `AUDIT_AWS_ENDPOINT`: endpoint override
    /// - `AUDIT_QUIET_INIT`, `AUDIT_QUIET_EMIT`, `AUDIT_AWAIT_EMIT`,
    ///   `AUDIT_TRUST_FORWARDED_FOR`: booleans (true/false)
    /// - `AUDIT_MAX_BODY_BYTES`: body buffering cap in bytes
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            emitter: env_string("AUDIT_EMITTER"),
            response_header: env_string("AUDIT_RESPONSE_HEADER"),
            aws_region: env_string("AUDIT_AWS_REGION"),
            aws_topic_arn: env_string("AUDIT_AWS_TOPIC_ARN"),
            aws_key_id: env_string("AUDIT_AWS_KEY_ID"),
            aws_secret: env_string("AUDIT_AWS_SECRET"),
            aws_endpoint: env_string("AUDIT_AWS_ENDPOINT"),
            quiet_init: env_flag("AUDIT_QUIET_INIT"),
            quiet_emit: env_flag("AUDIT_QUIET_EMIT"),
            await_emit: env_flag("AUDIT_AWAIT_EMIT"),
            trust_forwarded_for: env_flag("AUDIT_TRUST_FORWARDED_FOR"),
            max_body_bytes: env_string("AUDIT_MAX_BODY_BYTES").and_then(|s| s.trim().parse().ok()),
        }
    }

    /// Requested emitter name, defaulting to the console
    pub fn emitter_name(&self) -> &str {
        self.emitter
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_EMITTER)
    }

    /// Body buffering cap in bytes
    pub fn body_limit(&self) -> usize {
        self.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES)
    }
}

impl std::fmt::Debug for AuditOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditOptions")
            .field("emitter", &self.emitter)
            .field("response_header", &self.response_header)
            .field("aws_region", &self.aws_region)
            .field("aws_topic_arn", &self.aws_topic_arn)
            .field("aws_key_id", &self.aws_key_id)
            .field("aws_secret", &self.aws_secret.as_ref().map(|_| "**********"))
            .field("aws_endpoint", &self.aws_endpoint)
            .field("quiet_init", &self.quiet_init)
            .field("quiet_emit", &self.quiet_emit)
            .field("await_emit", &self.await_emit)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(false)
}
