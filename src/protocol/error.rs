//! Protocol error types

use thiserror::Error;

/// Error decoding or interpreting control traffic
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Record has no string `type` field
    #[error("control record has no type field")]
    MissingType,

    /// Known `type` with a malformed body, or not JSON at all
    #[error("malformed control record: {0}")]
    Malformed(#[source] serde_json::Error),

    /// `Unknown` variants cannot be sent
    #[error("cannot encode unknown message type {0:?}")]
    NotEncodable(String),

    /// Announced role is not producer or subscriber
    #[error("unrecognized role {0:?}")]
    UnknownRole(String),

    /// Message is valid but makes no sense in the current state
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),
}
