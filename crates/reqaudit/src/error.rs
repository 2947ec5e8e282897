//! Error types for the audit core

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for audit record operations
pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Errors surfaced to code that drives an audit record directly.
///
/// The middleware never lets these reach the host pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("Audit record {id} was already finalized")]
    AlreadyFinalized { id: Uuid },
}

/// Failure reported by a notification publisher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}
