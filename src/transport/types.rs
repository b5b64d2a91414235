//! Identifiers and media handles exchanged with the signaling transport

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::constants::UNKNOWN_TAG;
use crate::protocol::RoleTag;

/// Identifier of a peer (or endpoint name) on the signaling network
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of one media call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of media carried by a [`Track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Live capture from a camera
    Camera,
    /// Blank stream used only to complete call negotiation
    Placeholder,
}

/// Opaque handle to a media stream owned by the transport
///
/// The relay never looks inside; it only routes handles between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    id: String,
    kind: TrackKind,
}

impl Track {
    /// Handle to a live camera stream
    pub fn camera(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Camera,
        }
    }

    /// Fresh placeholder stream for answering calls the local side does not
    /// consume
    pub fn placeholder() -> Self {
        Self {
            id: format!("placeholder-{}", nanoid::nanoid!(8)),
            kind: TrackKind::Placeholder,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == TrackKind::Placeholder
    }
}

/// Metadata record attached to a media call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetadata {
    /// Role tag of the carried media
    #[serde(default, alias = "cameraType", skip_serializing_if = "Option::is_none")]
    pub role_tag: Option<RoleTag>,

    /// Peer the media originates from
    #[serde(default, alias = "cameraPeerId", skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<PeerId>,
}

impl CallMetadata {
    pub fn new(role_tag: RoleTag, origin_id: PeerId) -> Self {
        Self {
            role_tag: Some(role_tag),
            origin_id: Some(origin_id),
        }
    }

    /// Role tag, or `unknown` when the caller sent none
    /// Declared role tag, ignoring an empty one
    pub fn tag(&self) -> Option<RoleTag> {
        self.role_tag
            .clone()
            .filter(|tag| !tag.as_str().is_empty())
    }

    pub fn tag_or_unknown(&self) -> RoleTag {
        self.tag().unwrap_or_else(|| RoleTag::new(UNKNOWN_TAG))
    }
}
