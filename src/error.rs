//! # Errors
//!
//! Failure taxonomy for rotation steps.
//!
//! Only [`RotationError::TargetUnavailable`] is retriable. Every other variant
//! means the attempt for this token must stop until someone intervenes.

use thiserror::Error;

pub type Result<T, E = RotationError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RotationError {
    /// A required version or label is absent, or the stored state does not
    /// allow the step to run.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Another rotation holds the PENDING label.
    #[error("rotation conflict: version {pending} already holds PENDING, refusing to stage {requested}")]
    Conflict { pending: String, requested: String },

    /// The database rejected the candidate credential.
    #[error("credential validation failed: {0}")]
    Validation(String),

    /// Transient failure reaching the secret store or the database.
    #[error("{resource} unavailable: {message}")]
    TargetUnavailable {
        resource: &'static str,
        message: String,
    },
}

impl RotationError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn unavailable(resource: &'static str, message: impl Into<String>) -> Self {
        Self::TargetUnavailable {
            resource,
            message: message.into(),
        }
    }

    /// Whether re-invoking the same step with the same token may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::TargetUnavailable { .. })
    }

    /// Stable label used in metrics and HTTP responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "precondition",
            Self::Conflict { .. } => "conflict",
            Self::Validation(_) => "validation",
            Self::TargetUnavailable { .. } => "target_unavailable",
        }
    }
}
