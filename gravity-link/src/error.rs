/// Error types for the gravity-link library
use thiserror::Error;

use crate::types::ParticipantId;

/// Result type alias for link operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors that can occur in gravity-link operations
#[derive(Debug, Error)]
pub enum LinkError {
    /// Payload is shorter or longer than its kind requires, or carries an invalid byte
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Leading discriminant byte outside the known set
    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    /// A message names a participant that is inactive or unknown
    #[error("Invalid peer reference: participant {0}")]
    InvalidPeerReference(ParticipantId),

    /// A pairing request lost against another pairing decision
    #[error("Pairing race: participant {0} is already entangled")]
    RaceOnPairing(ParticipantId),

    /// Operation requires an entangled participant
    #[error("Participant {0} is not entangled")]
    NotEntangled(ParticipantId),

    /// Zenoh-related errors
    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    /// Invalid keyexpr pattern
    #[error("Invalid keyexpr: {0}")]
    InvalidKeyexpr(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Serialization(e.to_string())
    }
}
