//! Error types shared by the GitMate core crates.

use thiserror::Error;

// =============================================================================
// Event Kind Errors
// =============================================================================

/// Returned when a string does not name a known domain action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

/// Errors produced while parsing an [`EventKind`](crate::EventKind).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventKindError {
    /// The event kind string was empty or only whitespace.
    #[error("event kind must not be empty")]
    Empty,

    /// A scheduled job name contained whitespace.
    #[error("invalid job name '{0}': job names must not contain whitespace")]
    InvalidJobName(String),
}

// =============================================================================
// Repository Errors
// =============================================================================

/// Errors raised by the repository persistence collaborator.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// The hosting provider could not be reached while building the handle.
    #[error("repository '{repository}' is unreachable: {reason}")]
    Unreachable {
        /// Full name of the repository.
        repository: String,
        /// Reason reported by the hosting client.
        reason: String,
    },

    /// The repository no longer exists upstream.
    #[error("repository '{0}' not found")]
    NotFound(String),

    /// Any other storage failure.
    #[error("repository store error: {0}")]
    Store(String),
}

impl RepositoryError {
    /// Creates an [`RepositoryError::Unreachable`] error.
    pub fn unreachable(repository: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            repository: repository.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;
