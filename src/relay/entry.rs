//! Live track entries
//!
//! The relay keeps the most recent live track per role tag so subscribers
//! that join late are offered existing media straight away.

use std::time::Instant;

use crate::protocol::RoleTag;
use crate::transport::{CallId, PeerId, Track};

/// Most recent producer media for one role tag
#[derive(Debug, Clone)]
pub struct LiveTrack {
    /// Role tag the media is published under
    pub tag: RoleTag,

    /// Producer connection the media arrives on
    pub producer: PeerId,

    /// Ingest call carrying the media
    pub call: CallId,

    /// Media handle re-offered to subscribers
    pub track: Track,

    /// When this track became live
    pub since: Instant,
}

impl LiveTrack {
    pub fn new(tag: RoleTag, producer: PeerId, call: CallId, track: Track) -> Self {
        Self {
            tag,
            producer,
            call,
            track,
            since: Instant::now(),
        }
    }

    /// Whether this entry is fed by the given ingest call
    pub fn is_fed_by(&self, call: &CallId) -> bool {
        &self.call == call
    }
}
