//! Error types for mailpolicy
//!
//! Every failure is detected before anything is committed, so an error
//! always means "nothing changed".

use thiserror::Error;

/// Errors surfaced by the stores and the request handlers
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Account or mailbox does not resolve
    #[error("no such {kind}: {id}")]
    NotFound {
        /// What was being looked up (`account`, `mailbox`)
        kind: &'static str,
        /// The identifier that failed to resolve
        id: String,
    },

    /// The authorization predicate rejected the caller
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A right name resolves in neither the user nor the admin registry
    #[error("unknown right: {0}")]
    UnknownRight(String),

    /// A submitted filter rule is malformed
    #[error("invalid filter rule '{rule}': {reason}")]
    InvalidRule {
        /// Name of the first offending rule
        rule: String,
        /// What is wrong with it
        reason: String,
    },

    /// The request body could not be interpreted
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Snapshot persistence failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn account_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "account",
            id: id.into(),
        }
    }

    pub fn mailbox_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "mailbox",
            id: id.into(),
        }
    }

    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// Stable fault code reported back to clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "service.NOT_FOUND",
            Self::PermissionDenied(_) => "service.PERM_DENIED",
            Self::UnknownRight(_) => "account.UNKNOWN_RIGHT",
            Self::InvalidRule { .. } => "mail.INVALID_FILTER_RULE",
            Self::InvalidRequest(_) => "service.INVALID_REQUEST",
            Self::Io(_) => "service.IO_ERROR",
            Self::Json(_) => "service.PARSE_ERROR",
        }
    }

    /// Whether the failure was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Json(_))
    }
}

/// Result type for mailpolicy operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
