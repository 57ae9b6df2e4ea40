//! Error types for unidl
//!
//! Library-level failures only. Engine-reported task errors are not `Error`s: they are
//! carried on the task as an [`ErrorInfo`](crate::types::ErrorInfo) and surfaced through
//! snapshots.

use thiserror::Error;

/// Result type alias for unidl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for unidl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "event_channel_capacity")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A download engine rejected or could not execute a command
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task not found in either collection
    #[error("task not found: {0}")]
    NotFound(String),

    /// A task with the same identity is already registered
    #[error("task already exists: {0}")]
    AlreadyExists(String),

    /// Shutdown in progress - not accepting new tasks or commands
    #[error("shutdown in progress: not accepting new commands")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not supported by the backend owning the task
    #[error("{operation} is not supported for {backend} tasks")]
    NotSupported {
        /// The operation that was attempted (e.g., "move_storage")
        operation: String,
        /// The backend kind that cannot perform it
        backend: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors raised by engine implementations when a command cannot be honoured
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The engine refused the command (unknown id, bad state, invalid argument)
    #[error("command {command} rejected: {reason}")]
    Rejected {
        /// The engine command that was rejected (e.g., "pause")
        command: String,
        /// Engine-supplied reason
        reason: String,
    },

    /// The engine is not running or cannot be reached
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Shorthand for a [`BackendError::Rejected`]
    pub fn rejected(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            command: command.into(),
            reason: reason.into(),
        }
    }
}
