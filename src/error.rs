//! Error types for the Tupelo client.

use thiserror::Error;

/// Errors that can occur when using the Tupelo client.
#[derive(Debug, Error)]
pub enum TupeloError {
    /// The server refused a command because it violates game rules or session
    /// state. The message is human-readable and meant for the user.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// A network or server failure unrelated to game rules.
    #[error("transport error: {0}")]
    Transport(String),

    /// Failed to serialize or deserialize a protocol payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A server event could not be decoded into a known shape.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The client loop has exited; the handle can no longer queue commands.
    #[error("client is closed")]
    ClientClosed,
}

/// A specialized [`Result`] type for Tupelo client operations.
pub type Result<T> = std::result::Result<T, TupeloError>;
