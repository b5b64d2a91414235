//! Media links
//!
//! A media link is one directional media call bound to a control
//! connection. Links live in the [`ConnectionTable`](super::ConnectionTable)
//! and are torn down with the connection that owns them.

use std::time::Instant;

use crate::protocol::RoleTag;
use crate::transport::{CallId, PeerId, Track};

/// What a media call is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Producer media arriving at the hub
    Ingest,
    /// Hub relaying a live tag to a subscriber
    Forward,
    /// Subscriber asking the hub for media with a placeholder call
    Request,
    /// Producer sending its camera to the hub
    Publish,
    /// Subscriber receiving relayed media
    View,
}

/// One media call
#[derive(Debug, Clone)]
pub struct MediaLink {
    /// Transport call id
    pub call: CallId,

    /// Connection the call belongs to
    pub peer: PeerId,

    /// Role tag of the media
    pub tag: RoleTag,

    /// Purpose of the call
    pub kind: LinkKind,

    /// Peer the media originates from, when known
    pub origin: Option<PeerId>,

    /// Remote media, once the transport delivered it
    pub track: Option<Track>,

    /// When the call was placed or received
    pub created_at: Instant,
}

impl MediaLink {
    pub fn new(call: CallId, peer: PeerId, tag: RoleTag, kind: LinkKind) -> Self {
        Self {
            call,
            peer,
            tag,
            kind,
            origin: None,
            track: None,
            created_at: Instant::now(),
        }
    }

    /// Set the originating peer
    pub fn with_origin(mut self, origin: PeerId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Whether remote media has arrived
    pub fn is_flowing(&self) -> bool {
        self.track.is_some()
    }
}
