//! Producer and subscriber session
//!
//! A peer holds at most one control connection, to the hub it dialed. On
//! open it declares its role straight away; producers then offer their
//! camera, subscribers answer whatever the hub relays to them.
//!
//! ```text
//!   PeerSession                           HubSession
//!      |--- connect(prefix + code) ------------>|
//!      |--- role-announce {role, subtype} ----->|
//!      |<-- role-accepted ----------------------|
//!      |--- call(camera, {roleTag}) ----------->|   producer
//!      |<-- call(relayed, {roleTag, originId}) -|   subscriber
//!      |<-> ping / pong ----------------------->|
//! ```

use tokio::sync::mpsc;

use crate::error::Result;
use crate::identity::dial_name;
use crate::protocol::{ControlMessage, PeerRole, ProtocolError};
use crate::session::latency::{now_millis, ProbeTick};
use crate::session::{ConnectionTable, LinkKind, MediaLink, PeerConnection, SessionEvent};
use crate::transport::{
    CallId, CallMetadata, Direction, PeerId, SignalingTransport, Track, TransportError,
    TransportEvent,
};

use super::capture::{self, DeviceDescriptor, DeviceSelector, MediaAcquisitionError, MediaSource};
use super::config::PeerConfig;

/// User intent delivered to a running peer
#[derive(Debug, Clone)]
pub enum PeerCommand {
    /// Dial a hub by code (bare or prefixed)
    Connect(String),
    /// Switch role, e.g. between front and back camera
    ChangeRole(PeerRole),
    /// Capture from another device and re-offer
    ApplyDevice(DeviceSelector),
    /// Ask the hub to (re-)send media
    RequestMedia,
    /// Close the connection to the hub
    Disconnect,
    /// Close everything and leave the run loop
    Shutdown,
}

type CaptureResult = std::result::Result<(DeviceDescriptor, Track), MediaAcquisitionError>;

/// Producer or subscriber attached to one hub
pub struct PeerSession<T: SignalingTransport, S: MediaSource> {
    config: PeerConfig,
    transport: T,
    source: S,
    role: PeerRole,
    hub: Option<PeerId>,
    table: ConnectionTable,
    local_track: Option<Track>,
    device: Option<DeviceDescriptor>,
    events: mpsc::UnboundedSender<SessionEvent>,
    ticks_tx: mpsc::UnboundedSender<ProbeTick>,
    ticks_rx: Option<mpsc::UnboundedReceiver<ProbeTick>>,
    captures_tx: mpsc::UnboundedSender<CaptureResult>,
    captures_rx: Option<mpsc::UnboundedReceiver<CaptureResult>>,
}

impl<T: SignalingTransport, S: MediaSource> PeerSession<T, S> {
    /// Create a peer and the receiver for its session events
    pub fn new(
        config: PeerConfig,
        transport: T,
        source: S,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let (captures_tx, captures_rx) = mpsc::unbounded_channel();

        let peer = Self {
            role: config.role.clone(),
            config,
            transport,
            source,
            hub: None,
            table: ConnectionTable::new(),
            local_track: None,
            device: None,
            events,
            ticks_tx,
            ticks_rx: Some(ticks_rx),
            captures_tx,
            captures_rx: Some(captures_rx),
        };
        (peer, events_rx)
    }

    /// Acquire the local camera from the configured device
    ///
    /// Failure is reported as [`SessionEvent::MediaUnavailable`]; the role
    /// stays as configured and simply contributes no media.
    pub async fn acquire_media(&mut self) -> std::result::Result<(), MediaAcquisitionError> {
        let result = capture::acquire(&self.source, &self.config.device).await;
        let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
        self.on_media_acquired(result);
        outcome
    }

    /// Dial a hub by code
    ///
    /// Accepts a bare code or an already prefixed endpoint name. Any
    /// existing hub connection is closed first.
    pub fn connect(&mut self, code: &str) -> Result<PeerId> {
        let name = dial_name(&self.config.endpoint_prefix, code)?;
        if let Some(current) = self.hub.clone() {
            self.transport.disconnect(&current);
            self.close_connection(&current);
        }

        self.transport.connect(&name)?;
        tracing::info!(hub = %name, role = %self.role, "Dialing hub");
        self.hub = Some(name.clone());
        Ok(name)
    }

    /// Drive the peer until shutdown
    pub async fn run(
        mut self,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        mut commands: mpsc::Receiver<PeerCommand>,
    ) {
        let (Some(mut ticks), Some(mut captures)) =
            (self.ticks_rx.take(), self.captures_rx.take())
        else {
            tracing::error!("Peer run loop started twice");
            return;
        };

        loop {
            tokio::select! {
                Some(event) = transport_events.recv() => self.handle_event(event),
                Some(tick) = ticks.recv() => self.on_probe_tick(&tick),
                Some(result) = captures.recv() => self.on_media_acquired(result),
                command = commands.recv() => match command {
                    Some(PeerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }

        self.disconnect();
        tracing::info!("Peer shut down");
    }

    /// Apply one transport event
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionOpened { peer, direction } => {
                self.on_connection_opened(peer, direction)
            }
            TransportEvent::MessageReceived { peer, record } => self.on_message(&peer, record),
            TransportEvent::CallReceived {
                call,
                peer,
                metadata,
            } => self.on_call(call, &peer, metadata),
            TransportEvent::StreamReceived { call, track } => self.on_stream(&call, track),
            TransportEvent::CallClosed { call } => self.on_call_closed(&call),
            TransportEvent::ConnectionClosed { peer } => {
                tracing::info!(peer = %peer, "Connection closed");
                self.close_connection(&peer);
            }
            TransportEvent::Error { peer, error } => self.on_transport_error(peer, error),
        }
    }

    /// Apply one user command
    pub fn handle_command(&mut self, command: PeerCommand) {
        match command {
            PeerCommand::Connect(code) => {
                if let Err(e) = self.connect(&code) {
                    tracing::warn!(code = %code, error = %e, "Failed to dial hub");
                }
            }
            PeerCommand::ChangeRole(role) => self.change_role(role),
            PeerCommand::ApplyDevice(selector) => self.apply_device(selector),
            PeerCommand::RequestMedia => self.request_media(),
            PeerCommand::Disconnect | PeerCommand::Shutdown => self.disconnect(),
        }
    }

    /// Switch role, re-announcing and re-offering media under the new role
    pub fn change_role(&mut self, role: PeerRole) {
        if role == self.role {
            return;
        }
        tracing::info!(previous = %self.role, role = %role, "Changing role");
        self.role = role;
        self.hang_up_links(LinkKind::Publish);

        if self.role.is_producer() && self.local_track.is_none() {
            self.apply_device(self.config.device.clone());
        }

        let Some(hub) = self.live_hub() else {
            return;
        };
        if let Some(conn) = self.table.get_mut(&hub) {
            conn.on_announce(self.role.clone());
            conn.activate();
        }
        self.send(&hub, &ControlMessage::announce(&self.role));
        self.emit_state(&hub);
        self.offer_media();
    }

    /// Acquire from another device in the background
    ///
    /// The new track replaces the current one and is re-offered once ready.
    pub fn apply_device(&mut self, selector: DeviceSelector) {
        self.config.device = selector.clone();

        let source = self.source.clone();
        let results = self.captures_tx.clone();
        tokio::spawn(async move {
            let result = capture::acquire(&source, &selector).await;
            let _ = results.send(result);
        });
    }

    /// Ask for media again
    ///
    /// Subscribers send `media-updated` so the hub re-offers what they are
    /// missing; producers re-offer their own track.
    pub fn request_media(&mut self) {
        if self.role.is_producer() {
            self.offer_media();
        } else if let Some(hub) = self.live_hub() {
            self.send(&hub, &ControlMessage::MediaUpdated);
        }
    }

    /// Outcome of a capture attempt
    pub fn on_media_acquired(&mut self, result: CaptureResult) {
        match result {
            Ok((device, track)) => {
                tracing::info!(device = %device.device_id, track = track.id(), "Camera acquired");
                self.device = Some(device);
                self.local_track = Some(track);
                if self.role.is_producer() {
                    self.offer_media();
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, role = %self.role, "Camera unavailable");
                self.emit(SessionEvent::MediaUnavailable { error });
            }
        }
    }

    /// Send the next ping on a probe tick
    pub fn on_probe_tick(&mut self, tick: &ProbeTick) {
        let peer = &tick.peer;
        let ping = match self.table.get_mut(peer) {
            Some(conn) if conn.is_active() && conn.control_open && conn.probe().accepts(tick) => {
                conn.probe_mut().next_ping(now_millis())
            }
            _ => return,
        };
        self.send(peer, &ping);
    }

    /// Close the hub connection, if any
    pub fn disconnect(&mut self) {
        if let Some(hub) = self.hub.clone() {
            self.transport.disconnect(&hub);
            self.close_connection(&hub);
        }
    }

    pub fn role(&self) -> &PeerRole {
        &self.role
    }

    /// Endpoint name of the hub currently dialed
    pub fn hub(&self) -> Option<&PeerId> {
        self.hub.as_ref()
    }

    /// Control connection to the hub
    pub fn connection(&self) -> Option<&PeerConnection> {
        self.hub.as_ref().and_then(|hub| self.table.get(hub))
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some_and(|conn| conn.is_active())
    }

    pub fn local_track(&self) -> Option<&Track> {
        self.local_track.as_ref()
    }

    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    /// Relayed streams currently flowing, sorted by tag
    pub fn views(&self) -> Vec<&MediaLink> {
        let Some(hub) = self.hub.as_ref() else {
            return Vec::new();
        };
        let mut views: Vec<&MediaLink> = self
            .table
            .links_for(hub)
            .filter(|link| link.kind == LinkKind::View && link.is_flowing())
            .collect();
        views.sort_by(|a, b| a.tag.cmp(&b.tag));
        views
    }

    fn live_hub(&self) -> Option<PeerId> {
        self.connection()
            .filter(|conn| conn.is_active() && conn.control_open)
            .map(|conn| conn.peer.clone())
    }

    fn on_connection_opened(&mut self, peer: PeerId, direction: Direction) {
        if direction == Direction::Inbound || self.hub.as_ref() != Some(&peer) {
            tracing::debug!(peer = %peer, "Unexpected connection refused");
            self.transport.disconnect(&peer);
            return;
        }

        let mut conn = PeerConnection::new(peer.clone(), direction, self.config.probe_timeout);
        conn.on_announce(self.role.clone());
        conn.activate();
        conn.ensure_probe(self.config.probe_interval, &self.ticks_tx);
        self.table.insert(conn);

        tracing::info!(hub = %peer, role = %self.role, "Connected to hub");
        self.send(&peer, &ControlMessage::announce(&self.role));
        self.emit_state(&peer);
        self.offer_media();
    }

    fn on_message(&mut self, peer: &PeerId, record: serde_json::Value) {
        let message = match ControlMessage::decode(record) {
            Ok(message) => message,
            Err(e) => {
                self.violation(peer, e.to_string());
                return;
            }
        };

        if !self.table.contains(peer) {
            tracing::debug!(peer = %peer, kind = message.kind(), "Message from unknown connection dropped");
            return;
        }

        match message {
            ControlMessage::Ping { id, timestamp } => {
                self.send(peer, &ControlMessage::pong(id, timestamp));
            }
            ControlMessage::Pong { id, .. } => self.on_pong(peer, &id),
            ControlMessage::RoleRequest => {
                self.send(peer, &ControlMessage::announce(&self.role));
            }
            ControlMessage::RoleAccepted { role } => {
                tracing::info!(hub = %peer, role = %role, "Role acknowledged");
            }
            ControlMessage::ConnectionAccepted => {
                tracing::info!(hub = %peer, "Connection acknowledged");
            }
            ControlMessage::MediaUpdated => {
                if self.role.is_producer() {
                    self.offer_media();
                } else {
                    tracing::debug!(hub = %peer, "Hub media updated");
                }
            }
            ControlMessage::RoleAnnounce { .. } => {
                let detail = ProtocolError::UnexpectedMessage("role-announce".into()).to_string();
                self.violation(peer, detail);
            }
            ControlMessage::Unknown { kind } => {
                self.violation(peer, format!("unknown message type: {}", kind));
            }
        }
    }

    fn on_pong(&mut self, peer: &PeerId, id: &str) {
        let latency = self
            .table
            .get_mut(peer)
            .and_then(|conn| conn.probe_mut().resolve(id, now_millis()));

        match latency {
            Some(latency) => self.emit(SessionEvent::LatencyUpdated {
                peer: peer.clone(),
                latency,
            }),
            None => tracing::debug!(peer = %peer, id = id, "Unmatched pong dropped"),
        }
    }

    /// Place the camera call to the hub, replacing any previous one
    fn offer_media(&mut self) {
        let (PeerRole::Producer(tag), Some(track)) = (&self.role, &self.local_track) else {
            return;
        };
        let Some(hub) = self.live_hub() else {
            return;
        };
        let tag = tag.clone();
        let track = track.clone();

        self.hang_up_links(LinkKind::Publish);
        let metadata = CallMetadata::new(tag.clone(), self.transport.local_id());
        match self.transport.call(&hub, &track, metadata) {
            Ok(call) => {
                tracing::info!(hub = %hub, tag = %tag, call = %call, "Camera offered");
                self.table
                    .add_link(MediaLink::new(call, hub, tag, LinkKind::Publish));
            }
            Err(e) => self.connection_error(&hub, e),
        }
    }

    fn on_call(&mut self, call: CallId, peer: &PeerId, metadata: CallMetadata) {
        let live = self
            .table
            .get(peer)
            .is_some_and(|conn| conn.is_active() && conn.control_open);
        if !live {
            tracing::debug!(peer = %peer, call = %call, "Call without live connection rejected");
            self.transport.hang_up(&call);
            return;
        }

        if let Err(e) = self.transport.answer(&call, &Track::placeholder()) {
            self.connection_error(peer, e);
            return;
        }

        if !self.role.is_subscriber() {
            tracing::debug!(peer = %peer, call = %call, role = %self.role, "Call answered without viewing");
            return;
        }

        let tag = metadata.tag_or_unknown();
        tracing::debug!(peer = %peer, call = %call, tag = %tag, "Relayed call answered");
        let mut link = MediaLink::new(call, peer.clone(), tag, LinkKind::View);
        link.origin = metadata.origin_id;
        self.table.add_link(link);
    }

    fn on_stream(&mut self, call: &CallId, track: Track) {
        let Some(link) = self.table.link_mut(call) else {
            tracing::debug!(call = %call, "Late stream dropped");
            return;
        };
        link.track = Some(track.clone());

        if link.kind == LinkKind::View {
            let tag = link.tag.clone();
            let origin = link.origin.clone();
            if !tag.is_well_known() {
                tracing::debug!(tag = %tag, "Stream with unrecognized tag");
            }
            tracing::info!(tag = %tag, "Stream available");
            self.emit(SessionEvent::StreamAvailable { tag, origin, track });
        }
    }

    fn on_call_closed(&mut self, call: &CallId) {
        let Some(link) = self.table.remove_link(call) else {
            return;
        };
        if link.kind == LinkKind::View && link.is_flowing() {
            tracing::info!(tag = %link.tag, "Stream ended");
            self.emit(SessionEvent::StreamEnded { tag: link.tag });
        }
    }

    fn on_transport_error(&mut self, peer: Option<PeerId>, error: TransportError) {
        match peer {
            Some(peer) => {
                self.connection_error(&peer, error);
                self.transport.disconnect(&peer);
                self.close_connection(&peer);
            }
            None => tracing::warn!(error = %error, "Transport error"),
        }
    }

    fn close_connection(&mut self, peer: &PeerId) {
        if self.hub.as_ref() == Some(peer) {
            self.hub = None;
        }
        let Some((conn, links)) = self.table.remove(peer) else {
            return;
        };

        for link in links {
            self.transport.hang_up(&link.call);
            if link.kind == LinkKind::View && link.is_flowing() {
                self.emit(SessionEvent::StreamEnded { tag: link.tag });
            }
        }
        tracing::info!(hub = %peer, "Disconnected from hub");
        self.emit(SessionEvent::ConnectionStateChanged {
            peer: peer.clone(),
            phase: conn.phase,
            role: conn.role,
        });
    }

    fn hang_up_links(&mut self, kind: LinkKind) {
        let Some(hub) = self.hub.clone() else {
            return;
        };
        let calls: Vec<CallId> = self
            .table
            .links_for(&hub)
            .filter(|link| link.kind == kind)
            .map(|link| link.call.clone())
            .collect();
        for call in calls {
            self.table.remove_link(&call);
            self.transport.hang_up(&call);
        }
    }

    fn send(&self, peer: &PeerId, message: &ControlMessage) -> bool {
        let sent = message
            .encode()
            .map_err(|e| e.to_string())
            .and_then(|record| self.transport.send(peer, record).map_err(|e| e.to_string()));

        match sent {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(peer = %peer, kind = message.kind(), error = %e, "Failed to send message");
                false
            }
        }
    }

    fn violation(&self, peer: &PeerId, detail: String) {
        tracing::warn!(peer = %peer, detail = %detail, "Protocol violation");
        self.emit(SessionEvent::ProtocolViolation {
            peer: peer.clone(),
            detail,
        });
    }

    fn connection_error(&self, peer: &PeerId, error: TransportError) {
        tracing::warn!(peer = %peer, error = %error, "Connection error");
        self.emit(SessionEvent::ConnectionError {
            peer: peer.clone(),
            error,
        });
    }

    fn emit_state(&self, peer: &PeerId) {
        if let Some(conn) = self.table.get(peer) {
            self.emit(SessionEvent::ConnectionStateChanged {
                peer: peer.clone(),
                phase: conn.phase,
                role: conn.role.clone(),
            });
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::assert_ok;

    use super::*;
    use crate::client::capture::{NoCapture, StaticSource};
    use crate::error::Error;
    use crate::identity::{IdentityError, SessionIdentity};
    use crate::protocol::RoleTag;
    use crate::server::{HubCommand, HubConfig, HubSession};
    use crate::session::SessionPhase;
    use crate::transport::{MemoryNetwork, MemoryTransport};

    type Inbox = mpsc::UnboundedReceiver<TransportEvent>;

    const HUB: &str = "viewcal-AB12CD";

    fn cameras() -> StaticSource {
        StaticSource::new(vec![
            DeviceDescriptor::new("cam-0", "Front camera"),
            DeviceDescriptor::new("cam-1", "Back camera"),
        ])
    }

    /// Bare hub endpoint that the test drives by hand
    async fn fake_hub(network: &MemoryNetwork) -> (MemoryTransport, Inbox) {
        let (hub, rx) = network.attach_as(PeerId::from("hub"));
        assert_ok!(hub.open_endpoint(&PeerId::from(HUB)).await);
        (hub, rx)
    }

    fn pump<S: MediaSource>(peer: &mut PeerSession<MemoryTransport, S>, rx: &mut Inbox) {
        while let Ok(event) = rx.try_recv() {
            peer.handle_event(event);
        }
    }

    fn drain(rx: &mut Inbox) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn drain_events(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn messages(events: &[TransportEvent]) -> Vec<ControlMessage> {
        events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::MessageReceived { record, .. } => {
                    ControlMessage::decode(record.clone()).ok()
                }
                _ => None,
            })
            .collect()
    }

    fn calls(events: &[TransportEvent]) -> Vec<(CallId, CallMetadata)> {
        events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::CallReceived { call, metadata, .. } => {
                    Some((call.clone(), metadata.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_producer_announces_then_offers() {
        let network = MemoryNetwork::new();
        let (_hub, mut hub_rx) = fake_hub(&network).await;
        let (transport, mut rx) = network.attach_as(PeerId::from("cam"));
        let (mut peer, _events) =
            PeerSession::new(PeerConfig::producer("front"), transport, cameras());

        assert_ok!(peer.acquire_media().await);
        assert_eq!(peer.device().unwrap().device_id, "cam-0");

        let name = assert_ok!(peer.connect("ab12cd"));
        assert_eq!(name.as_str(), HUB);
        pump(&mut peer, &mut rx);

        let events = drain(&mut hub_rx);
        assert_eq!(
            messages(&events),
            vec![ControlMessage::RoleAnnounce {
                role: "producer".into(),
                subtype: Some("front".into()),
            }]
        );
        let offered = calls(&events);
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].1.role_tag, Some(RoleTag::front()));
        assert_eq!(offered[0].1.origin_id, Some(PeerId::from("cam")));

        // Announcement precedes the call on the hub's side
        let announce_at = events
            .iter()
            .position(|e| matches!(e, TransportEvent::MessageReceived { .. }))
            .unwrap();
        let call_at = events
            .iter()
            .position(|e| matches!(e, TransportEvent::CallReceived { .. }))
            .unwrap();
        assert!(announce_at < call_at);
        assert!(peer.is_connected());
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_code() {
        let network = MemoryNetwork::new();
        let (transport, _rx) = network.attach();
        let (mut peer, _events) = PeerSession::new(PeerConfig::subscriber(), transport, NoCapture);

        let err = peer.connect("nope").unwrap_err();
        assert!(matches!(err, Error::Identity(IdentityError::InvalidCode(_))));

        // Well-formed but nobody registered it
        let err = peer.connect("ZZZZZZ").unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::PeerUnavailable(_))));
        assert!(peer.hub().is_none());
    }

    #[tokio::test]
    async fn test_control_messages() {
        let network = MemoryNetwork::new();
        let (hub, mut hub_rx) = fake_hub(&network).await;
        let (transport, mut rx) = network.attach_as(PeerId::from("v1"));
        let (mut peer, _events) = PeerSession::new(PeerConfig::subscriber(), transport, NoCapture);
        peer.connect(HUB).unwrap();
        pump(&mut peer, &mut rx);
        drain(&mut hub_rx);

        let v1 = PeerId::from("v1");
        hub.send(&v1, ControlMessage::ping("abc", 5).encode().unwrap()).unwrap();
        hub.send(&v1, ControlMessage::RoleRequest.encode().unwrap()).unwrap();
        pump(&mut peer, &mut rx);

        assert_eq!(
            messages(&drain(&mut hub_rx)),
            vec![
                ControlMessage::pong("abc", 5),
                ControlMessage::announce(&PeerRole::Subscriber),
            ]
        );
    }

    #[tokio::test]
    async fn test_subscriber_renders_relayed_stream() {
        let network = MemoryNetwork::new();
        let (hub, mut hub_rx) = fake_hub(&network).await;
        let (transport, mut rx) = network.attach_as(PeerId::from("v1"));
        let (mut peer, mut events) =
            PeerSession::new(PeerConfig::subscriber(), transport, NoCapture);
        peer.connect(HUB).unwrap();
        pump(&mut peer, &mut rx);
        drain(&mut hub_rx);
        drain_events(&mut events);

        let camera = Track::camera("front-cam");
        let call = hub
            .call(
                &PeerId::from("v1"),
                &camera,
                CallMetadata::new(RoleTag::front(), PeerId::from("cam")),
            )
            .unwrap();
        pump(&mut peer, &mut rx);

        // Answered with a placeholder
        assert!(drain(&mut hub_rx).iter().any(|e| matches!(
            e,
            TransportEvent::StreamReceived { track, .. } if track.is_placeholder()
        )));
        match drain_events(&mut events).as_slice() {
            [SessionEvent::StreamAvailable { tag, origin, track }] => {
                assert_eq!(tag, &RoleTag::front());
                assert_eq!(origin, &Some(PeerId::from("cam")));
                assert_eq!(track, &camera);
            }
            other => panic!("unexpected events: {:?}", other),
        }
        assert_eq!(peer.views().len(), 1);

        hub.hang_up(&call);
        pump(&mut peer, &mut rx);
        assert!(matches!(
            drain_events(&mut events).as_slice(),
            [SessionEvent::StreamEnded { tag }] if tag == &RoleTag::front()
        ));
        assert!(peer.views().is_empty());
    }

    #[tokio::test]
    async fn test_stream_after_close_is_dropped() {
        let network = MemoryNetwork::new();
        let (hub, _hub_rx) = fake_hub(&network).await;
        let (transport, mut rx) = network.attach_as(PeerId::from("v1"));
        let (mut peer, mut events) =
            PeerSession::new(PeerConfig::subscriber(), transport, NoCapture);
        peer.connect(HUB).unwrap();
        pump(&mut peer, &mut rx);

        hub.call(
            &PeerId::from("v1"),
            &Track::camera("back-cam"),
            CallMetadata::new(RoleTag::back(), PeerId::from("cam")),
        )
        .unwrap();

        // Answer the call, but hold back the stream it produces
        let received = rx.try_recv().unwrap();
        assert!(matches!(received, TransportEvent::CallReceived { .. }));
        peer.handle_event(received);
        let stream = rx.try_recv().unwrap();
        assert!(matches!(stream, TransportEvent::StreamReceived { .. }));

        peer.handle_event(TransportEvent::ConnectionClosed {
            peer: PeerId::from(HUB),
        });
        drain_events(&mut events);
        peer.handle_event(stream);

        assert!(!drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, SessionEvent::StreamAvailable { .. })));
        assert!(peer.connection().is_none());
    }

    #[tokio::test]
    async fn test_capture_failure_keeps_role() {
        let network = MemoryNetwork::new();
        let (_hub, mut hub_rx) = fake_hub(&network).await;
        let (transport, mut rx) = network.attach_as(PeerId::from("cam"));
        let source = StaticSource::denied(vec![DeviceDescriptor::new("cam-0", "Front")]);
        let (mut peer, mut events) =
            PeerSession::new(PeerConfig::producer("front"), transport, source);

        assert_eq!(
            peer.acquire_media().await,
            Err(MediaAcquisitionError::PermissionDenied)
        );
        assert!(matches!(
            drain_events(&mut events).as_slice(),
            [SessionEvent::MediaUnavailable {
                error: MediaAcquisitionError::PermissionDenied
            }]
        ));

        peer.connect(HUB).unwrap();
        pump(&mut peer, &mut rx);
        let events = drain(&mut hub_rx);
        assert_eq!(messages(&events).len(), 1);
        assert!(calls(&events).is_empty());
        assert_eq!(peer.connection().unwrap().phase, SessionPhase::Active);
    }

    #[tokio::test]
    async fn test_role_change_reoffers_under_new_tag() {
        let network = MemoryNetwork::new();
        let (_hub, mut hub_rx) = fake_hub(&network).await;
        let (transport, mut rx) = network.attach_as(PeerId::from("cam"));
        let (mut peer, _events) =
            PeerSession::new(PeerConfig::producer("front"), transport, cameras());
        peer.acquire_media().await.unwrap();
        peer.connect(HUB).unwrap();
        pump(&mut peer, &mut rx);
        let (first, _) = calls(&drain(&mut hub_rx)).pop().unwrap();

        peer.change_role(PeerRole::Producer(RoleTag::back()));
        pump(&mut peer, &mut rx);

        let events = drain(&mut hub_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, TransportEvent::CallClosed { call } if call == &first)));
        assert_eq!(
            messages(&events),
            vec![ControlMessage::announce(&PeerRole::Producer(RoleTag::back()))]
        );
        let offered = calls(&events);
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].1.role_tag, Some(RoleTag::back()));
    }

    #[tokio::test]
    async fn test_media_updated_makes_producer_reoffer() {
        let network = MemoryNetwork::new();
        let (hub, mut hub_rx) = fake_hub(&network).await;
        let (transport, mut rx) = network.attach_as(PeerId::from("cam"));
        let (mut peer, _events) =
            PeerSession::new(PeerConfig::producer("back"), transport, cameras());
        peer.acquire_media().await.unwrap();
        peer.connect(HUB).unwrap();
        pump(&mut peer, &mut rx);
        drain(&mut hub_rx);

        hub.send(&PeerId::from("cam"), ControlMessage::MediaUpdated.encode().unwrap())
            .unwrap();
        pump(&mut peer, &mut rx);

        let offered = calls(&drain(&mut hub_rx));
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].1.role_tag, Some(RoleTag::back()));
    }

    #[tokio::test]
    async fn test_disconnect_hangs_up_and_stops_probe() {
        let network = MemoryNetwork::new();
        let (_hub, mut hub_rx) = fake_hub(&network).await;
        let (transport, mut rx) = network.attach_as(PeerId::from("cam"));
        let (mut peer, _events) =
            PeerSession::new(PeerConfig::producer("front"), transport, cameras());
        peer.acquire_media().await.unwrap();
        peer.connect(HUB).unwrap();
        pump(&mut peer, &mut rx);
        assert!(peer.connection().unwrap().probe().is_running());
        let tick = peer.connection().unwrap().probe_tick().unwrap();
        drain(&mut hub_rx);

        peer.disconnect();
        assert!(peer.connection().is_none());
        assert_eq!(network.call_count(), 0);
        assert_eq!(network.link_count(), 0);

        peer.on_probe_tick(&tick);
        assert!(messages(&drain(&mut hub_rx)).is_empty());
    }

    /// Hub, producer and subscriber each on their own run loop
    #[tokio::test]
    async fn test_end_to_end_relay() {
        let network = MemoryNetwork::new();

        let (hub_transport, hub_rx) = network.attach_as(PeerId::from("hub"));
        let (mut hub, _hub_events) = HubSession::new(HubConfig::default(), hub_transport);
        let endpoint = hub
            .start(Some(SessionIdentity::parse("AB12CD").unwrap()))
            .await
            .unwrap();
        assert_eq!(endpoint.name.as_str(), HUB);
        let (hub_commands, rx) = mpsc::channel(8);
        let hub_task = tokio::spawn(hub.run(hub_rx, rx));

        let (cam_transport, cam_rx) = network.attach_as(PeerId::from("cam"));
        let (mut cam, _cam_events) =
            PeerSession::new(PeerConfig::producer("front"), cam_transport, cameras());
        cam.acquire_media().await.unwrap();
        cam.connect("AB12CD").unwrap();
        let (cam_commands, rx) = mpsc::channel(8);
        let cam_task = tokio::spawn(cam.run(cam_rx, rx));

        let (viewer_transport, viewer_rx) = network.attach_as(PeerId::from("viewer"));
        let (mut viewer, mut viewer_events) =
            PeerSession::new(PeerConfig::subscriber(), viewer_transport, NoCapture);
        viewer.connect("AB12CD").unwrap();
        let (viewer_commands, rx) = mpsc::channel(8);
        let viewer_task = tokio::spawn(viewer.run(viewer_rx, rx));

        let available = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match viewer_events.recv().await {
                    Some(SessionEvent::StreamAvailable { tag, origin, .. }) => {
                        break (tag, origin)
                    }
                    Some(_) => continue,
                    None => panic!("viewer stopped"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(available.0, RoleTag::front());
        assert_eq!(available.1, Some(PeerId::from("cam")));

        // Switching camera ends the old tag and relays the new one
        cam_commands
            .send(PeerCommand::ChangeRole(PeerRole::Producer(RoleTag::back())))
            .await
            .unwrap();
        let tags = tokio::time::timeout(Duration::from_secs(5), async {
            let mut ended = None;
            loop {
                match viewer_events.recv().await {
                    Some(SessionEvent::StreamEnded { tag }) => ended = Some(tag),
                    Some(SessionEvent::StreamAvailable { tag, .. }) => break (ended, tag),
                    Some(_) => continue,
                    None => panic!("viewer stopped"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(tags, (Some(RoleTag::front()), RoleTag::back()));

        cam_commands.send(PeerCommand::Shutdown).await.unwrap();
        viewer_commands.send(PeerCommand::Shutdown).await.unwrap();
        hub_commands.send(HubCommand::Shutdown).await.unwrap();
        cam_task.await.unwrap();
        viewer_task.await.unwrap();
        hub_task.await.unwrap();
        assert_eq!(network.link_count(), 0);
    }
}
