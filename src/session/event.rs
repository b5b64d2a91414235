//! Events a session reports to its user interface

use std::time::Duration;

use crate::client::capture::MediaAcquisitionError;
use crate::identity::{IdentityError, SessionIdentity};
use crate::protocol::{PeerRole, RoleTag};
use crate::stats::ConnectionStats;
use crate::transport::{PeerId, Track, TransportError};

use super::state::SessionPhase;

/// Observable session event
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Hub registered (or rotated to) a new rendezvous code
    IdentityChanged { code: SessionIdentity, endpoint: PeerId },

    /// Rotation gave up; the previous code stays in effect
    RegistrationFailed { error: IdentityError },

    /// A connection changed phase or role
    ConnectionStateChanged {
        peer: PeerId,
        phase: SessionPhase,
        role: PeerRole,
    },

    /// Fresh round-trip measurement
    LatencyUpdated { peer: PeerId, latency: Duration },

    /// Set of connected peers changed
    PeerListChanged { peers: Vec<ConnectionStats> },

    /// Transport failure local to one connection
    ConnectionError { peer: PeerId, error: TransportError },

    /// Peer sent something outside the protocol; the connection stays up
    ProtocolViolation { peer: PeerId, detail: String },

    /// Relayed media ready for display
    StreamAvailable {
        tag: RoleTag,
        origin: Option<PeerId>,
        track: Track,
    },

    /// Media for a tag stopped
    StreamEnded { tag: RoleTag },

    /// Local capture failed; the role stays registered without media
    MediaUnavailable { error: MediaAcquisitionError },
}
