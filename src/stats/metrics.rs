//! Statistics for connections and hubs

use std::time::Duration;

use crate::protocol::{PeerRole, RoleTag};
use crate::session::{ConnectionTable, LinkKind, PeerConnection, SessionPhase};
use crate::transport::PeerId;

/// Observable state of one connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStats {
    /// Remote peer
    pub peer: PeerId,
    /// Assigned role
    pub role: PeerRole,
    /// Current phase
    pub phase: SessionPhase,
    /// Most recent round-trip latency
    pub latency: Option<Duration>,
    /// Time since the connection was opened
    pub duration: Duration,
    /// Media calls bound to the connection
    pub media_links: usize,
    /// Whether the control channel is open
    pub control_open: bool,
}

impl ConnectionStats {
    /// Snapshot a connection
    pub fn from_connection(connection: &PeerConnection, media_links: usize) -> Self {
        Self {
            peer: connection.peer.clone(),
            role: connection.role.clone(),
            phase: connection.phase,
            latency: connection.latency(),
            duration: connection.duration(),
            media_links,
            control_open: connection.control_open,
        }
    }

    /// Latency in whole milliseconds, for display
    pub fn latency_ms(&self) -> Option<u64> {
        self.latency.map(|l| l.as_millis() as u64)
    }
}

/// Snapshot every connection in a table, sorted by peer
pub fn connection_stats(table: &ConnectionTable) -> Vec<ConnectionStats> {
    let mut stats: Vec<ConnectionStats> = table
        .connections()
        .map(|conn| ConnectionStats::from_connection(conn, table.links_for(&conn.peer).count()))
        .collect();
    stats.sort_by(|a, b| a.peer.cmp(&b.peer));
    stats
}

/// Hub-wide statistics
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    /// Current connections
    pub connections: usize,
    /// Active producers
    pub producers: usize,
    /// Active subscribers
    pub subscribers: usize,
    /// Connections with an unrecognized role
    pub unknown_roles: usize,
    /// Tags with live media
    pub live_tags: Vec<RoleTag>,
    /// Producer calls into the hub
    pub ingest_calls: usize,
    /// Calls relaying media to subscribers
    pub forward_calls: usize,
    /// Time since the hub started
    pub uptime: Duration,
}

impl HubStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect from a hub's table and live tags
    pub fn collect(table: &ConnectionTable, live_tags: Vec<RoleTag>, uptime: Duration) -> Self {
        let mut stats = Self {
            connections: table.len(),
            live_tags,
            uptime,
            ..Self::default()
        };

        for conn in table.connections().filter(|c| c.is_active()) {
            match conn.role {
                PeerRole::Producer(_) => stats.producers += 1,
                PeerRole::Subscriber => stats.subscribers += 1,
                PeerRole::Unknown(_) => stats.unknown_roles += 1,
                PeerRole::Unset => {}
            }
            for link in table.links_for(&conn.peer) {
                match link.kind {
                    LinkKind::Ingest => stats.ingest_calls += 1,
                    LinkKind::Forward => stats.forward_calls += 1,
                    _ => {}
                }
            }
        }

        stats
    }
}
