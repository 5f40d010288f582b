//! Error types for checkpoint operations.

use thiserror::Error;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while persisting or restoring dialogue state.
///
/// A checkpointer failure on `save` propagates to the caller and the turn
/// is considered failed; this enum is what gets propagated.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists for the requested user key.
    #[error("no checkpoint found for key: {0}")]
    NotFound(String),

    /// The stored payload could not be deserialized back into a `DialogueState`.
    #[error("checkpoint for key {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backend itself failed (I/O, connection, query).
    #[error("checkpoint storage error: {0}")]
    Storage(String),

    /// Serialization of the state into the wire format failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
