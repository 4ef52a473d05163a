//! Error types for the GitMate framework.

use std::time::Duration;

use thiserror::Error;

use gitmate_core::{EventKind, EventKindError};

pub use tower::BoxError;

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors raised while building the responder registry.
///
/// These are startup errors: a registry that fails to build must abort the
/// process before any event is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A responder was registered without any event kind.
    #[error("responder '{0}' must be registered for at least one event kind")]
    EmptyEventKinds(String),

    /// The same event kind was listed twice in one registration.
    #[error("responder '{responder}' lists event kind '{kind}' more than once")]
    DuplicateEventKind {
        /// Task name of the responder.
        responder: String,
        /// The repeated kind.
        kind: EventKind,
    },

    /// A scheduled job name does not form a valid job kind.
    #[error("invalid event kind for '{name}': {source}")]
    InvalidEventKind {
        /// The rejected job name.
        name: String,
        #[source]
        source: EventKindError,
    },

    /// Plugin names must be non-empty and must not contain `.`.
    #[error("invalid plugin name '{0}'")]
    InvalidPluginName(String),

    /// A plugin with the same name is already installed.
    #[error("plugin '{0}' is already installed")]
    DuplicatePlugin(String),

    /// A task name was registered again with a different signature or queue.
    #[error("responder '{0}' is already registered with a different signature or queue")]
    ConflictingRegistration(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

// =============================================================================
// Execution Errors
// =============================================================================

/// Errors returned when an invocation cannot be handed to the backend.
///
/// The dispatcher logs these and skips the affected responder.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The backend is shut down or otherwise not accepting work.
    #[error("execution backend unavailable: {0}")]
    Unavailable(String),

    /// The target queue stayed full for the whole enqueue timeout.
    #[error("queue '{queue}' is full (waited {waited:?})")]
    Backpressure {
        /// Name of the full queue.
        queue: String,
        /// How long the submission waited for capacity.
        waited: Duration,
    },

    /// The invocation could not be serialized for the queue.
    #[error("failed to serialize invocation: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No responder with the given task name is registered.
    #[error("unknown responder '{0}'")]
    UnknownResponder(String),
}

/// Result type for submissions.
pub type SubmitResult<T> = Result<T, SubmitError>;

/// Why an invocation did not produce a value.
///
/// Delivered through [`InvocationHandle::get`](crate::InvocationHandle::get);
/// never raised into the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// The handler returned an error. Carries the full error chain.
    #[error("responder failed: {0}")]
    Failed(String),

    /// The handler panicked.
    #[error("responder panicked: {0}")]
    Panicked(String),

    /// The handler exceeded its time limit and was aborted.
    #[error("responder exceeded its time limit of {0:?}")]
    TimedOut(Duration),

    /// The worker received an invocation for a responder it does not know.
    #[error("unknown responder '{0}'")]
    UnknownResponder(String),

    /// The result channel closed before a result was published.
    #[error("invocation result was lost")]
    Lost,

    /// [`InvocationHandle::get`](crate::InvocationHandle::get) gave up waiting.
    #[error("timed out waiting for the invocation result")]
    WaitTimeout,
}

/// Result of a single invocation.
pub type InvocationResult = Result<serde_json::Value, InvocationError>;

// =============================================================================
// Extraction Errors
// =============================================================================

/// Errors raised when a handler reads its arguments or options.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No positional argument at this index.
    #[error("missing positional argument #{0}")]
    MissingArgument(usize),

    /// The positional argument has a different type.
    #[error("positional argument #{index} is not a {expected}")]
    ArgumentType {
        /// Index of the argument.
        index: usize,
        /// Expected type name.
        expected: &'static str,
    },

    /// Neither a resolved value nor a declared default exists.
    #[error("option '{0}' is neither set nor declared with a default")]
    MissingOption(String),

    /// The option value does not deserialize into the requested type.
    #[error("option '{name}' has an unexpected type: {source}")]
    InvalidOption {
        /// Option name.
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Renders an error and its `source()` chain as `outer: inner: root`.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
