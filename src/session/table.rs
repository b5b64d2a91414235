//! Connection table
//!
//! Bookkeeping of every control connection and media link a session holds,
//! keyed by remote peer and call id. Removing a connection removes its
//! links in the same call so the table never holds links for a closed peer.

use std::collections::HashMap;

use crate::protocol::RoleTag;
use crate::transport::{CallId, PeerId};

use super::link::{LinkKind, MediaLink};
use super::state::PeerConnection;

/// All active connections and media links of one session
#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: HashMap<PeerId, PeerConnection>,
    links: HashMap<CallId, MediaLink>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection, returning any entry it replaced
    pub fn insert(&mut self, connection: PeerConnection) -> Option<PeerConnection> {
        self.connections.insert(connection.peer.clone(), connection)
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PeerConnection> {
        self.connections.get(peer)
    }

    pub fn get_mut(&mut self, peer: &PeerId) -> Option<&mut PeerConnection> {
        self.connections.get_mut(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.connections.contains_key(peer)
    }

    /// Remove a connection together with every link bound to it
    ///
    /// The returned connection is already closed.
    pub fn remove(&mut self, peer: &PeerId) -> Option<(PeerConnection, Vec<MediaLink>)> {
        let mut connection = self.connections.remove(peer)?;
        connection.close();

        let calls: Vec<CallId> = self
            .links
            .values()
            .filter(|link| &link.peer == peer)
            .map(|link| link.call.clone())
            .collect();
        let links = calls
            .iter()
            .filter_map(|call| self.links.remove(call))
            .collect();

        Some((connection, links))
    }

    /// Iterate over all connections
    pub fn connections(&self) -> impl Iterator<Item = &PeerConnection> {
        self.connections.values()
    }

    /// Connected peer ids, sorted for stable output
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.connections.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Subscribers eligible for fan-out
    pub fn live_subscribers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .connections
            .values()
            .filter(|conn| conn.is_live_subscriber())
            .map(|conn| conn.peer.clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Bind a media link; the owning connection must exist
    pub fn add_link(&mut self, link: MediaLink) -> bool {
        if !self.connections.contains_key(&link.peer) {
            return false;
        }
        self.links.insert(link.call.clone(), link);
        true
    }

    pub fn link(&self, call: &CallId) -> Option<&MediaLink> {
        self.links.get(call)
    }

    pub fn link_mut(&mut self, call: &CallId) -> Option<&mut MediaLink> {
        self.links.get_mut(call)
    }

    pub fn remove_link(&mut self, call: &CallId) -> Option<MediaLink> {
        self.links.remove(call)
    }

    /// Links bound to one peer
    pub fn links_for<'a>(&'a self, peer: &'a PeerId) -> impl Iterator<Item = &'a MediaLink> + 'a {
        self.links.values().filter(move |link| &link.peer == peer)
    }

    /// Forwarding calls currently carrying `tag`
    pub fn forwards_of(&self, tag: &RoleTag) -> Vec<CallId> {
        self.links
            .values()
            .filter(|link| link.kind == LinkKind::Forward && &link.tag == tag)
            .map(|link| link.call.clone())
            .collect()
    }

    /// Whether `peer` already receives a forward of `tag`
    pub fn is_forwarding(&self, peer: &PeerId, tag: &RoleTag) -> bool {
        self.links_for(peer)
            .any(|link| link.kind == LinkKind::Forward && &link.tag == tag)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::PeerRole;
    use crate::transport::Direction;

    fn active(peer: &str, role: PeerRole) -> PeerConnection {
        let mut conn =
            PeerConnection::new(PeerId::from(peer), Direction::Inbound, Duration::from_secs(10));
        conn.on_announce(role);
        conn.activate();
        conn
    }

    #[test]
    fn test_remove_takes_links_with_it() {
        let mut table = ConnectionTable::new();
        table.insert(active("cam", PeerRole::Producer(RoleTag::front())));
        table.insert(active("viewer", PeerRole::Subscriber));

        let cam = PeerId::from("cam");
        let viewer = PeerId::from("viewer");
        assert!(table.add_link(MediaLink::new(CallId::new("c1"), cam.clone(), RoleTag::front(), LinkKind::Ingest)));
        assert!(table.add_link(MediaLink::new(CallId::new("c2"), viewer.clone(), RoleTag::front(), LinkKind::Forward)));

        let (conn, links) = table.remove(&cam).unwrap();
        assert!(conn.is_closed());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].call, CallId::new("c1"));

        // Other peers' links are untouched
        assert_eq!(table.link_count(), 1);
        assert!(table.is_forwarding(&viewer, &RoleTag::front()));
    }

    #[test]
    fn test_links_require_connection() {
        let mut table = ConnectionTable::new();
        let link = MediaLink::new(CallId::new("c1"), PeerId::from("ghost"), RoleTag::front(), LinkKind::Ingest);
        assert!(!table.add_link(link));
        assert_eq!(table.link_count(), 0);
    }

    #[test]
    fn test_live_subscribers() {
        let mut table = ConnectionTable::new();
        table.insert(active("b-viewer", PeerRole::Subscriber));
        table.insert(active("a-viewer", PeerRole::Subscriber));
        table.insert(active("cam", PeerRole::Producer(RoleTag::back())));
        table.insert(active("odd", PeerRole::Unknown("projector".into())));
        table.insert(PeerConnection::new(
            PeerId::from("pending"),
            Direction::Inbound,
            Duration::from_secs(10),
        ));

        assert_eq!(
            table.live_subscribers(),
            vec![PeerId::from("a-viewer"), PeerId::from("b-viewer")]
        );
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_forwards_of_tag() {
        let mut table = ConnectionTable::new();
        table.insert(active("v1", PeerRole::Subscriber));
        table.insert(active("v2", PeerRole::Subscriber));
        table.add_link(MediaLink::new(CallId::new("f1"), PeerId::from("v1"), RoleTag::front(), LinkKind::Forward));
        table.add_link(MediaLink::new(CallId::new("f2"), PeerId::from("v2"), RoleTag::front(), LinkKind::Forward));
        table.add_link(MediaLink::new(CallId::new("f3"), PeerId::from("v2"), RoleTag::back(), LinkKind::Forward));

        let mut front = table.forwards_of(&RoleTag::front());
        front.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(front, vec![CallId::new("f1"), CallId::new("f2")]);
        assert_eq!(table.forwards_of(&RoleTag::back()), vec![CallId::new("f3")]);
    }
}
