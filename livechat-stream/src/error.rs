//! Error types for the livechat-stream crate.

use crate::types::ListenerSpec;

/// Errors raised inside a single listener.
///
/// These are contained by the supervisor: they end the affected listener in
/// `Failed` and are reported as an error notice, never propagated to other
/// listeners or to the caller of `start`/`stop`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// Connecting failed, or the socket dropped mid-stream
    #[error("Connection error: {0}")]
    Connection(String),

    /// The peer sent something the adapter cannot interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Opening or fetching a chat session failed
    #[error("Session error: {0}")]
    Session(String),

    /// The listener observed the cancellation signal
    #[error("Listener cancelled")]
    Cancelled,

    /// The platform backend is not installed or cannot be reached
    #[error("Platform unavailable: {0}")]
    Unavailable(String),
}

impl AdapterError {
    /// Cancellation is a normal exit. Everything else is a failure.
    pub fn is_failure(&self) -> bool {
        !matches!(self, AdapterError::Cancelled)
    }
}

/// Errors returned by supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// `start` was called while a previous session is still active
    #[error("An aggregation session is already active")]
    SessionAlreadyActive,

    /// `start` was called with an empty listener set
    #[error("No listeners requested")]
    NoListeners,

    /// A listener spec has an empty target
    #[error("Invalid listener spec: {0}")]
    InvalidSpec(String),

    /// Some listeners did not acknowledge cancellation within the grace period
    #[error("{} listener(s) did not stop within the grace period", listeners.len())]
    ForcedTermination {
        /// The listeners that were forcibly terminated
        listeners: Vec<ListenerSpec>,
    },

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The cooperative runtime could not be created or driven
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Convenience alias for supervisor results.
pub type Result<T> = std::result::Result<T, SupervisorError>;
