//! Signaling transport collaborator
//!
//! Peer discovery, NAT traversal and media negotiation are provided by an
//! external signaling layer. This module defines the slice of it the hub
//! and peers consume:
//!
//! ```text
//!        outbound (non-blocking)                 inbound (events)
//!   ┌───────────────────────────────┐   ┌──────────────────────────────┐
//!   │ open_endpoint / close_endpoint│   │ ConnectionOpened             │
//!   │ connect / disconnect          │   │ MessageReceived              │
//!   │ send(record)                  │──►│ CallReceived / StreamReceived│
//!   │ call / answer / hang_up       │   │ CallClosed / ConnectionClosed│
//!   └───────────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! Every outbound operation except endpoint registration returns
//! immediately; its outcome arrives later as a [`TransportEvent`]. Sessions
//! consume events from an `mpsc` receiver handed to their `run` loop.

pub mod error;
pub mod memory;
pub mod types;

use std::future::Future;

use serde_json::Value;

pub use error::TransportError;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use types::{CallId, CallMetadata, PeerId, Track, TrackKind};

/// Which side opened a control connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Remote dialed us
    Inbound,
    /// We dialed the remote
    Outbound,
}

/// Event delivered by the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Control channel to `peer` is open
    ConnectionOpened { peer: PeerId, direction: Direction },

    /// Structured record received on the control channel
    MessageReceived { peer: PeerId, record: Value },

    /// Remote placed a media call
    CallReceived {
        call: CallId,
        peer: PeerId,
        metadata: CallMetadata,
    },

    /// Remote media for a call became available
    StreamReceived { call: CallId, track: Track },

    /// Call ended (either side)
    CallClosed { call: CallId },

    /// Control channel to `peer` closed
    ConnectionClosed { peer: PeerId },

    /// Connection-level failure
    Error {
        peer: Option<PeerId>,
        error: TransportError,
    },
}

/// Outbound half of the signaling layer
///
/// Implementations are cheap handles (clones share one underlying peer).
pub trait SignalingTransport: Clone + Send + Sync + 'static {
    /// Identifier remote peers see for us on connections we initiate
    fn local_id(&self) -> PeerId;

    /// Claim an externally dialable endpoint name
    ///
    /// Fails with [`TransportError::UnavailableId`] when the name is taken.
    fn open_endpoint(
        &self,
        name: &PeerId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Release a previously claimed name; open connections are unaffected
    fn close_endpoint(&self, name: &PeerId);

    /// Open a control connection to `remote`
    fn connect(&self, remote: &PeerId) -> Result<(), TransportError>;

    /// Send a structured record on the control connection to `remote`
    fn send(&self, remote: &PeerId, record: Value) -> Result<(), TransportError>;

    /// Place a media call carrying `track`
    fn call(
        &self,
        remote: &PeerId,
        track: &Track,
        metadata: CallMetadata,
    ) -> Result<CallId, TransportError>;

    /// Answer an inbound call, supplying our side's media
    fn answer(&self, call: &CallId, track: &Track) -> Result<(), TransportError>;

    /// End a call
    fn hang_up(&self, call: &CallId);

    /// Close the control connection to `remote`
    fn disconnect(&self, remote: &PeerId);
}
