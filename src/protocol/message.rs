//! Control message codec
//!
//! Control messages travel over the reliable control channel as structured
//! records whose `type` field selects the variant:
//!
//! ```text
//! {"type":"ping","id":"k3j9x0qa2mzt","timestamp":1718000000000}
//! {"type":"role-announce","role":"producer","subtype":"front"}
//! {"type":"role-accepted","role":"producer"}
//! {"type":"media-updated"}
//! ```
//!
//! A record with a `type` outside the vocabulary decodes to
//! [`ControlMessage::Unknown`] so the caller decides how to react; a known
//! `type` with missing or mistyped fields is a [`ProtocolError::Malformed`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants::KNOWN_TYPES;
use super::error::ProtocolError;
use super::role::PeerRole;

/// One control-channel message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Latency probe; the receiver echoes a pong
    Ping { id: String, timestamp: u64 },

    /// Echo of a ping carrying the original id and send timestamp
    Pong { id: String, timestamp: u64 },

    /// Hub asks a freshly opened connection to declare its role
    RoleRequest,

    /// Peer declares its role (and producer subtype)
    #[serde(alias = "connection-type")]
    RoleAnnounce {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
    },

    /// Hub acknowledges a declared role
    RoleAccepted { role: String },

    /// Legacy hub acknowledgement sent on connection open
    ConnectionAccepted,

    /// Receiver should re-request or re-offer media
    MediaUpdated,

    /// Any `type` this codec does not know
    #[serde(skip)]
    Unknown { kind: String },
}

impl ControlMessage {
    pub fn ping(id: impl Into<String>, timestamp: u64) -> Self {
        ControlMessage::Ping {
            id: id.into(),
            timestamp,
        }
    }

    /// Build the pong answering a ping
    pub fn pong(id: impl Into<String>, timestamp: u64) -> Self {
        ControlMessage::Pong {
            id: id.into(),
            timestamp,
        }
    }

    /// Announcement for a local role
    pub fn announce(role: &PeerRole) -> Self {
        ControlMessage::RoleAnnounce {
            role: role.name().to_string(),
            subtype: role.subtype().map(|tag| tag.as_str().to_string()),
        }
    }

    pub fn accepted(role: &PeerRole) -> Self {
        ControlMessage::RoleAccepted {
            role: role.name().to_string(),
        }
    }

    /// Wire name of the variant
    pub fn kind(&self) -> &str {
        match self {
            ControlMessage::Ping { .. } => "ping",
            ControlMessage::Pong { .. } => "pong",
            ControlMessage::RoleRequest => "role-request",
            ControlMessage::RoleAnnounce { .. } => "role-announce",
            ControlMessage::RoleAccepted { .. } => "role-accepted",
            ControlMessage::ConnectionAccepted => "connection-accepted",
            ControlMessage::MediaUpdated => "media-updated",
            ControlMessage::Unknown { kind } => kind,
        }
    }

    /// Encode as a structured record
    pub fn encode(&self) -> Result<Value, ProtocolError> {
        if let ControlMessage::Unknown { kind } = self {
            return Err(ProtocolError::NotEncodable(kind.clone()));
        }
        serde_json::to_value(self).map_err(ProtocolError::Malformed)
    }

    /// Decode a structured record
    pub fn decode(record: Value) -> Result<Self, ProtocolError> {
        let kind = record
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        if !KNOWN_TYPES.contains(&kind) {
            return Ok(ControlMessage::Unknown {
                kind: kind.to_string(),
            });
        }

        serde_json::from_value(record).map_err(ProtocolError::Malformed)
    }

    /// Encode to JSON text, for transports that carry strings
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(self.encode()?.to_string())
    }

    /// Decode from JSON text
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let record: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        Self::decode(record)
    }
}
