//! Error types
//!
//! Each module owns a focused error enum; [`Error`] wraps them for callers
//! that only need to propagate.

use thiserror::Error;

pub use crate::client::capture::MediaAcquisitionError;
pub use crate::identity::IdentityError;
pub use crate::protocol::ProtocolError;
pub use crate::transport::TransportError;

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Rendezvous identity could not be claimed
    #[error("identity: {0}")]
    Identity(#[from] IdentityError),

    /// Connection-level transport failure
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// Local capture unavailable
    #[error("media acquisition: {0}")]
    MediaAcquisition(#[from] MediaAcquisitionError),

    /// Unrecognized message shape or role
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;
