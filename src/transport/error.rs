//! Transport error types

use thiserror::Error;

use super::types::{CallId, PeerId};

/// Error reported by the signaling transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Endpoint name already claimed by someone else
    #[error("endpoint name {0} is already taken")]
    UnavailableId(PeerId),

    /// Remote peer cannot be reached
    #[error("peer {0} is unavailable")]
    PeerUnavailable(PeerId),

    /// No open control connection to the peer
    #[error("no open connection to {0}")]
    ConnectionClosed(PeerId),

    /// Call id is not known to the transport
    #[error("unknown call {0}")]
    UnknownCall(CallId),

    /// Anything else the underlying layer reports
    #[error("{0}")]
    Other(String),
}
