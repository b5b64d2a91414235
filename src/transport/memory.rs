//! In-process signaling network
//!
//! Routes transport events between sessions living in the same process.
//! Used by tests and the loopback demo; behaves like the real signaling
//! layer from a session's point of view: endpoint names are exclusive,
//! every outbound action is acknowledged through events, and both ends of
//! a connection or call are notified when it closes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    CallId, CallMetadata, Direction, PeerId, SignalingTransport, Track, TransportError,
    TransportEvent,
};

/// Control connection between two nodes
struct Link {
    a: PeerId,
    /// Remote id as seen from `a`
    a_sees: PeerId,
    b: PeerId,
    /// Remote id as seen from `b`
    b_sees: PeerId,
}

struct CallRecord {
    caller: PeerId,
    callee: PeerId,
    caller_track: Track,
}

#[derive(Default)]
struct NetworkState {
    /// Node id to event inbox
    inboxes: HashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>,
    /// Dialable name to node id (includes each node's own id)
    names: HashMap<PeerId, PeerId>,
    links: Vec<Link>,
    calls: HashMap<CallId, CallRecord>,
    next_call: u64,
}

impl NetworkState {
    fn deliver(&self, node: &PeerId, event: TransportEvent) {
        if let Some(inbox) = self.inboxes.get(node) {
            let _ = inbox.send(event);
        }
    }

    /// Resolve the far end of `node`'s connection to `remote`
    fn route(&self, node: &PeerId, remote: &PeerId) -> Option<(PeerId, PeerId)> {
        self.links.iter().find_map(|link| {
            if &link.a == node && &link.a_sees == remote {
                Some((link.b.clone(), link.b_sees.clone()))
            } else if &link.b == node && &link.b_sees == remote {
                Some((link.a.clone(), link.a_sees.clone()))
            } else {
                None
            }
        })
    }
}

/// Shared in-memory signaling network
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the network under a random id
    pub fn attach(&self) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        self.attach_as(PeerId::new(format!("peer-{}", nanoid::nanoid!(10))))
    }

    /// Join the network under a fixed id
    pub fn attach_as(
        &self,
        id: PeerId,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.inboxes.insert(id.clone(), tx);
        state.names.insert(id.clone(), id.clone());
        drop(state);

        let transport = MemoryTransport {
            id,
            network: self.clone(),
        };
        (transport, rx)
    }

    /// Whether `name` is currently claimed
    pub fn is_registered(&self, name: &PeerId) -> bool {
        self.state.lock().names.contains_key(name)
    }

    /// Number of open control connections
    pub fn link_count(&self) -> usize {
        self.state.lock().links.len()
    }

    /// Number of calls not yet hung up
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }
}

/// One node's handle onto a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransport {
    id: PeerId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    /// Leave the network, closing every connection and call this node holds
    pub fn detach(&self) {
        let mut state = self.network.state.lock();
        let me = &self.id;

        let (mine, kept): (Vec<Link>, Vec<Link>) = std::mem::take(&mut state.links)
            .into_iter()
            .partition(|link| &link.a == me || &link.b == me);
        state.links = kept;
        for link in mine {
            let (other, other_sees) = if &link.a == me {
                (link.b, link.b_sees)
            } else {
                (link.a, link.a_sees)
            };
            state.deliver(&other, TransportEvent::ConnectionClosed { peer: other_sees });
        }

        let calls: Vec<CallId> = state
            .calls
            .iter()
            .filter(|(_, record)| &record.caller == me || &record.callee == me)
            .map(|(id, _)| id.clone())
            .collect();
        for call in calls {
            if let Some(record) = state.calls.remove(&call) {
                let other = if &record.caller == me {
                    record.callee
                } else {
                    record.caller
                };
                state.deliver(&other, TransportEvent::CallClosed { call });
            }
        }

        state.names.retain(|_, node| node != me);
        state.inboxes.remove(me);
    }
}

impl SignalingTransport for MemoryTransport {
    fn local_id(&self) -> PeerId {
        self.id.clone()
    }

    fn open_endpoint(
        &self,
        name: &PeerId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let mut state = self.network.state.lock();
        let result = if state.names.contains_key(name) {
            Err(TransportError::UnavailableId(name.clone()))
        } else {
            state.names.insert(name.clone(), self.id.clone());
            Ok(())
        };
        std::future::ready(result)
    }

    fn close_endpoint(&self, name: &PeerId) {
        let mut state = self.network.state.lock();
        if name != &self.id && state.names.get(name) == Some(&self.id) {
            state.names.remove(name);
        }
    }

    fn connect(&self, remote: &PeerId) -> Result<(), TransportError> {
        let mut state = self.network.state.lock();
        let target = state
            .names
            .get(remote)
            .cloned()
            .ok_or_else(|| TransportError::PeerUnavailable(remote.clone()))?;

        state.links.push(Link {
            a: self.id.clone(),
            a_sees: remote.clone(),
            b: target.clone(),
            b_sees: self.id.clone(),
        });
        state.deliver(
            &self.id,
            TransportEvent::ConnectionOpened {
                peer: remote.clone(),
                direction: Direction::Outbound,
            },
        );
        state.deliver(
            &target,
            TransportEvent::ConnectionOpened {
                peer: self.id.clone(),
                direction: Direction::Inbound,
            },
        );
        Ok(())
    }

    fn send(&self, remote: &PeerId, record: Value) -> Result<(), TransportError> {
        let state = self.network.state.lock();
        let (other, other_sees) = state
            .route(&self.id, remote)
            .ok_or_else(|| TransportError::ConnectionClosed(remote.clone()))?;
        state.deliver(
            &other,
            TransportEvent::MessageReceived {
                peer: other_sees,
                record,
            },
        );
        Ok(())
    }

    fn call(
        &self,
        remote: &PeerId,
        track: &Track,
        metadata: CallMetadata,
    ) -> Result<CallId, TransportError> {
        let mut state = self.network.state.lock();
        let (callee, callee_sees) = match state.route(&self.id, remote) {
            Some(route) => route,
            None => {
                let node = state
                    .names
                    .get(remote)
                    .cloned()
                    .ok_or_else(|| TransportError::PeerUnavailable(remote.clone()))?;
                (node, self.id.clone())
            }
        };

        state.next_call += 1;
        let call = CallId::new(format!("call-{}", state.next_call));
        state.calls.insert(
            call.clone(),
            CallRecord {
                caller: self.id.clone(),
                callee: callee.clone(),
                caller_track: track.clone(),
            },
        );
        state.deliver(
            &callee,
            TransportEvent::CallReceived {
                call: call.clone(),
                peer: callee_sees,
                metadata,
            },
        );
        Ok(call)
    }

    fn answer(&self, call: &CallId, track: &Track) -> Result<(), TransportError> {
        let state = self.network.state.lock();
        let record = state
            .calls
            .get(call)
            .filter(|record| record.callee == self.id)
            .ok_or_else(|| TransportError::UnknownCall(call.clone()))?;

        state.deliver(
            &record.callee,
            TransportEvent::StreamReceived {
                call: call.clone(),
                track: record.caller_track.clone(),
            },
        );
        state.deliver(
            &record.caller,
            TransportEvent::StreamReceived {
                call: call.clone(),
                track: track.clone(),
            },
        );
        Ok(())
    }

    fn hang_up(&self, call: &CallId) {
        let mut state = self.network.state.lock();
        if let Some(record) = state.calls.remove(call) {
            state.deliver(&record.caller, TransportEvent::CallClosed { call: call.clone() });
            state.deliver(&record.callee, TransportEvent::CallClosed { call: call.clone() });
        }
    }

    fn disconnect(&self, remote: &PeerId) {
        let mut state = self.network.state.lock();
        let me = &self.id;
        let position = state.links.iter().position(|link| {
            (&link.a == me && &link.a_sees == remote) || (&link.b == me && &link.b_sees == remote)
        });

        if let Some(index) = position {
            let link = state.links.remove(index);
            let (other, other_sees) = if &link.a == me {
                (link.b, link.b_sees)
            } else {
                (link.a, link.a_sees)
            };
            state.deliver(me, TransportEvent::ConnectionClosed { peer: remote.clone() });
            state.deliver(&other, TransportEvent::ConnectionClosed { peer: other_sees });
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[tokio::test]
    async fn test_endpoint_names_are_exclusive() {
        let network = MemoryNetwork::new();
        let (a, _rx_a) = network.attach();
        let (b, _rx_b) = network.attach();
        let name = PeerId::from("viewcal-AB12CD");

        assert_ok!(a.open_endpoint(&name).await);
        let err = assert_err!(b.open_endpoint(&name).await);
        assert_eq!(err, TransportError::UnavailableId(name.clone()));

        a.close_endpoint(&name);
        assert!(!network.is_registered(&name));
        assert_ok!(b.open_endpoint(&name).await);
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let network = MemoryNetwork::new();
        let (hub, mut hub_rx) = network.attach_as(PeerId::from("hub-node"));
        let (cam, mut cam_rx) = network.attach_as(PeerId::from("cam"));
        let name = PeerId::from("viewcal-ZZZZZZ");
        assert_ok!(hub.open_endpoint(&name).await);

        assert_ok!(cam.connect(&name));
        assert!(matches!(
            cam_rx.try_recv(),
            Ok(TransportEvent::ConnectionOpened { ref peer, direction: Direction::Outbound }) if peer == &name
        ));
        assert!(matches!(
            hub_rx.try_recv(),
            Ok(TransportEvent::ConnectionOpened { ref peer, direction: Direction::Inbound }) if peer.as_str() == "cam"
        ));

        // Hub replies to the id it sees, camera hears it from the dialed name
        assert_ok!(hub.send(&PeerId::from("cam"), json!({"type": "role-request"})));
        match cam_rx.try_recv() {
            Ok(TransportEvent::MessageReceived { peer, record }) => {
                assert_eq!(peer, name);
                assert_eq!(record["type"], "role-request");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_answer_exchanges_tracks() {
        let network = MemoryNetwork::new();
        let (hub, mut hub_rx) = network.attach_as(PeerId::from("hub"));
        let (cam, mut cam_rx) = network.attach_as(PeerId::from("cam"));
        assert_ok!(cam.connect(&PeerId::from("hub")));
        let _ = hub_rx.try_recv();
        let _ = cam_rx.try_recv();

        let camera = Track::camera("front-0");
        let call = assert_ok!(cam.call(
            &PeerId::from("hub"),
            &camera,
            CallMetadata::new("front".into(), PeerId::from("cam")),
        ));
        let received = match hub_rx.try_recv() {
            Ok(TransportEvent::CallReceived { call, peer, metadata }) => {
                assert_eq!(peer.as_str(), "cam");
                assert_eq!(metadata.tag_or_unknown().as_str(), "front");
                call
            }
            other => panic!("unexpected event: {:?}", other),
        };
        assert_eq!(received, call);

        let blank = Track::placeholder();
        assert_ok!(hub.answer(&call, &blank));
        assert!(matches!(
            hub_rx.try_recv(),
            Ok(TransportEvent::StreamReceived { ref track, .. }) if track == &camera
        ));
        assert!(matches!(
            cam_rx.try_recv(),
            Ok(TransportEvent::StreamReceived { ref track, .. }) if track.is_placeholder()
        ));

        // Only the callee may answer
        assert_err!(cam.answer(&call, &camera));

        hub.hang_up(&call);
        assert!(matches!(hub_rx.try_recv(), Ok(TransportEvent::CallClosed { .. })));
        assert!(matches!(cam_rx.try_recv(), Ok(TransportEvent::CallClosed { .. })));
        assert_eq!(network.call_count(), 0);
    }

    #[tokio::test]
    async fn test_detach_closes_everything() {
        let network = MemoryNetwork::new();
        let (hub, mut hub_rx) = network.attach_as(PeerId::from("hub"));
        let (cam, _cam_rx) = network.attach_as(PeerId::from("cam"));
        assert_ok!(cam.connect(&PeerId::from("hub")));
        assert_ok!(cam.call(&PeerId::from("hub"), &Track::camera("c"), CallMetadata::default()));
        while hub_rx.try_recv().is_ok() {}

        cam.detach();

        let mut closed_connection = false;
        let mut closed_call = false;
        while let Ok(event) = hub_rx.try_recv() {
            match event {
                TransportEvent::ConnectionClosed { peer } => {
                    assert_eq!(peer.as_str(), "cam");
                    closed_connection = true;
                }
                TransportEvent::CallClosed { .. } => closed_call = true,
                _ => {}
            }
        }
        assert!(closed_connection && closed_call);
        assert_eq!(network.link_count(), 0);
        assert!(!network.is_registered(&PeerId::from("cam")));

        let err = assert_err!(hub.send(&PeerId::from("cam"), json!({"type": "ping"})));
        assert_eq!(err, TransportError::ConnectionClosed(PeerId::from("cam")));
    }
}
