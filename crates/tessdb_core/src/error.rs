//! Error types for tessdb core.

use crate::artifact::ArtifactId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in tessdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation not permitted in the current state.
    ///
    /// Always a caller bug: committing or aborting twice, registering a
    /// partial into a finalized composite, mutating a terminal
    /// transaction.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Transaction was aborted.
    ///
    /// Raised to a partial that attempts further mutating progress after
    /// a sibling aborted the shared transaction. Callers should stop and
    /// clean up rather than report a fresh failure.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort.
        reason: String,
    },

    /// Operation structurally disallowed for this transaction handle.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Description of the disallowed operation.
        operation: String,
    },

    /// A terminal operation received an unhandled prior error.
    ///
    /// `commit` and `abort` expect prior errors to have been handled by
    /// aborting, not passed through.
    #[error("{operation} called with an unhandled prior error: {source}")]
    PrecheckFailed {
        /// The terminal operation that was misused.
        operation: &'static str,
        /// The prior error that should have been handled first.
        source: Box<CoreError>,
    },

    /// The artifact is not tracked by this transaction.
    #[error("unknown artifact: {artifact}")]
    UnknownArtifact {
        /// The untracked artifact.
        artifact: ArtifactId,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates a precheck failure for a terminal operation.
    #[must_use]
    pub fn precheck_failed(operation: &'static str, source: CoreError) -> Self {
        Self::PrecheckFailed {
            operation,
            source: Box::new(source),
        }
    }

    /// Creates an unknown artifact error.
    #[must_use]
    pub fn unknown_artifact(artifact: ArtifactId) -> Self {
        Self::UnknownArtifact { artifact }
    }
}
