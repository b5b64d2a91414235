//! Peer roles and role tags

use std::fmt;

use serde::{Deserialize, Serialize};

use super::constants::{DEFAULT_PRODUCER_TAG, UNKNOWN_TAG};

/// Label distinguishing simultaneous media flows (e.g. "front", "back")
///
/// Compared with case-sensitive string equality. Unrecognized tags are kept
/// verbatim so new camera roles relay without changes here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleTag(String);

impl RoleTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag for media that arrived without one
    pub fn unknown() -> Self {
        Self(UNKNOWN_TAG.to_string())
    }

    pub fn front() -> Self {
        Self("front".to_string())
    }

    pub fn back() -> Self {
        Self("back".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the tags the viewer renders in a fixed slot
    pub fn is_well_known(&self) -> bool {
        matches!(self.0.as_str(), "front" | "back")
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoleTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Role assigned to a control connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRole {
    /// No announcement or media seen yet
    Unset,
    /// Originates media under the given tag
    Producer(RoleTag),
    /// Consumes relayed media
    Subscriber,
    /// Announced something unrecognized; kept for control only
    Unknown(String),
}

impl PeerRole {
    /// Parse the `role` / `subtype` pair of an announcement
    ///
    /// Unrecognized roles map to [`PeerRole::Unknown`] instead of failing.
    pub fn from_announcement(role: &str, subtype: Option<&str>) -> Self {
        match role {
            "producer" | "camera" => {
                let tag = subtype
                    .filter(|s| !s.is_empty())
                    .unwrap_or(DEFAULT_PRODUCER_TAG);
                PeerRole::Producer(RoleTag::new(tag))
            }
            "subscriber" | "viewer" | "client" => PeerRole::Subscriber,
            other => PeerRole::Unknown(other.to_string()),
        }
    }

    /// Wire name of the role
    pub fn name(&self) -> &str {
        match self {
            PeerRole::Unset => "unset",
            PeerRole::Producer(_) => "producer",
            PeerRole::Subscriber => "subscriber",
            PeerRole::Unknown(raw) => raw,
        }
    }

    /// Producer subtype, if any
    pub fn subtype(&self) -> Option<&RoleTag> {
        match self {
            PeerRole::Producer(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is_producer(&self) -> bool {
        matches!(self, PeerRole::Producer(_))
    }

    pub fn is_subscriber(&self) -> bool {
        matches!(self, PeerRole::Subscriber)
    }

    /// Whether the role takes part in media fan-out
    pub fn takes_media(&self) -> bool {
        matches!(self, PeerRole::Producer(_) | PeerRole::Subscriber)
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Producer(tag) => write!(f, "producer/{}", tag),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_announcement() {
        let role = PeerRole::from_announcement("producer", Some("back"));
        assert_eq!(role, PeerRole::Producer(RoleTag::back()));
        assert_eq!(role.to_string(), "producer/back");

        // Subtype defaults to front
        let role = PeerRole::from_announcement("camera", None);
        assert_eq!(role.subtype(), Some(&RoleTag::front()));
    }

    #[test]
    fn test_subscriber_aliases() {
        for name in ["subscriber", "viewer", "client"] {
            assert!(PeerRole::from_announcement(name, None).is_subscriber());
        }
    }

    #[test]
    fn test_unknown_role_excluded_from_media() {
        let role = PeerRole::from_announcement("projector", None);
        assert_eq!(role, PeerRole::Unknown("projector".into()));
        assert!(!role.takes_media());
        assert_eq!(role.name(), "projector");
    }

    #[test]
    fn test_tag_case_sensitive() {
        assert_ne!(RoleTag::from("Front"), RoleTag::front());
        assert!(RoleTag::front().is_well_known());
        assert!(!RoleTag::from("overhead").is_well_known());
    }
}
