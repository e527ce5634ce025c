//! Error types.
//!
//! Transport failures carry a retry classification so the poller can decide
//! whether to try again. Configuration mistakes surface at build time, history
//! corruption surfaces when the snapshot is projected, and nothing in a
//! decision round panics on malformed input.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport-specific error with retry classification
///
/// Transport implementations return this error type to indicate whether an
/// operation should be retried.
///
/// **Retryable (is_retryable = true)**:
/// - Throttling and service-unavailable responses
/// - Connection timeouts
/// - Network failures
///
/// **Non-retryable (is_retryable = false)**:
/// - Unknown task token (the task was already answered or timed out)
/// - Malformed requests
/// - Access denied
///
/// ```rust
/// use replayflow::TransportError;
///
/// let busy = TransportError::retryable("poll_for_decision", "throttled");
/// assert!(busy.is_retryable());
/// let gone = TransportError::permanent("respond_decisions", "unknown task token");
/// assert!(!gone.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation}: {message}")]
pub struct TransportError {
    /// Operation that failed (e.g., "poll_for_decision", "respond_decisions")
    pub operation: String,
    /// Human-readable error message
    pub message: String,
    /// Whether this error should be retried
    pub retryable: bool,
}

impl TransportError {
    /// Create a retryable (transient) error
    pub fn retryable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable (permanent) error
    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Static configuration mistakes, raised while building configs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("name is not set for workflow version {version}")]
    MissingName { version: String },
    #[error("the value of {field} must be a strictly positive number of seconds")]
    NonPositiveDuration { field: &'static str },
    #[error("invalid child policy value: {0:?}")]
    InvalidChildPolicy(String),
    #[error("rate limit must allow at least one command per response")]
    ZeroRateLimit,
    #[error("duplicate {kind} registration: {name}@{version}")]
    Duplicate {
        kind: &'static str,
        name: String,
        version: String,
    },
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),
}

/// History that cannot be projected into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history is empty")]
    Empty,
    #[error("first event must be WorkflowExecutionStarted, found {0}")]
    MissingStart(String),
    #[error("event {event_id} references unknown scheduling event {source_event_id}")]
    DanglingReference { event_id: u64, source_event_id: u64 },
    #[error("event {event_id} completes call {call} which is not running")]
    NotRunning { event_id: u64, call: String },
    #[error("event {event_id} records a second terminal outcome for call {call_id}")]
    DuplicateTerminal { event_id: u64, call_id: u64 },
    #[error("malformed {kind} identifier: {value:?}")]
    MalformedKey { kind: &'static str, value: String },
    #[error("execution started on task list {started:?} but was polled from {polled:?}")]
    ForeignTaskList { polled: String, started: String },
}

/// Remote type registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("remote {kind} type {name}@{version} is registered with different defaults")]
    Incompatible {
        kind: &'static str,
        name: String,
        version: String,
    },
}

/// Umbrella error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
