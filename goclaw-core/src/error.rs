//! Crate-wide error taxonomy.
//!
//! Every subsystem error eventually maps into one [`RuntimeError`] variant so the
//! gateway's JSON-RPC error objects and the CLI's exit codes have a single source
//! of truth for "what kind of failure was this".

use crate::classify::Reason;

/// Taxonomy every operation ultimately surfaces as.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("context overflow: {0}")]
    ContextOverflow(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Short machine-readable code, used by the gateway's JSON-RPC error objects
    /// and by the CLI's single-line error printer.
    pub fn code(&self) -> &'static str {
        match self {
            RuntimeError::InvalidInput(_) => "invalid-input",
            RuntimeError::NotFound(_) => "not-found",
            RuntimeError::PermissionDenied(_) => "permission-denied",
            RuntimeError::PreconditionFailed(_) => "precondition-failed",
            RuntimeError::Unavailable(_) => "unavailable",
            RuntimeError::Timeout(_) => "timeout",
            RuntimeError::RateLimited(_) => "rate-limited",
            RuntimeError::ContextOverflow(_) => "context-overflow",
            RuntimeError::Conflict(_) => "conflict",
            RuntimeError::Internal(_) => "internal",
        }
    }

    /// Maps a provider-layer classification onto the taxonomy.
    pub fn from_reason(reason: Reason, message: impl Into<String>) -> Self {
        let message = message.into();
        match reason {
            Reason::Auth => RuntimeError::PermissionDenied(message),
            Reason::Billing => RuntimeError::PreconditionFailed(message),
            Reason::RateLimit => RuntimeError::RateLimited(message),
            Reason::ContextOverflow => RuntimeError::ContextOverflow(message),
            Reason::Timeout => RuntimeError::Timeout(message),
            Reason::ServerError | Reason::Network => RuntimeError::Unavailable(message),
            Reason::Unknown => RuntimeError::Internal(message),
        }
    }
}
