//! Hub session
//!
//! The hub owns the rendezvous endpoint, classifies every inbound control
//! connection by role and relays producer media to subscribers. All state is
//! mutated from one task: [`HubSession::run`] multiplexes transport events,
//! user commands, probe ticks and identity claims onto the handlers below, so
//! the connection table and the calls actually open never drift apart.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::identity::{Endpoint, IdentityError, IdentityRegistry, SessionIdentity};
use crate::protocol::{ControlMessage, PeerRole, ProtocolError};
use crate::relay::StreamRelay;
use crate::session::latency::{now_millis, ProbeTick};
use crate::session::{ConnectionTable, LinkKind, MediaLink, PeerConnection, SessionEvent};
use crate::stats::{connection_stats, ConnectionStats, HubStats};
use crate::transport::{
    CallId, CallMetadata, Direction, PeerId, SignalingTransport, Track, TransportError,
    TransportEvent,
};

use super::config::HubConfig;

/// User intent delivered to a running hub
#[derive(Debug, Clone)]
pub enum HubCommand {
    /// Claim a fresh code; established connections are kept
    RotateIdentity,
    /// Close the connection to one peer
    Disconnect(PeerId),
    /// Close everything and leave the run loop
    Shutdown,
}

type ClaimResult = std::result::Result<Endpoint, IdentityError>;

/// Relay peer that producers and subscribers dial by code
pub struct HubSession<T: SignalingTransport> {
    config: HubConfig,
    transport: T,
    registry: IdentityRegistry,
    endpoint: Option<Endpoint>,
    table: ConnectionTable,
    relay: StreamRelay,
    events: mpsc::UnboundedSender<SessionEvent>,
    ticks_tx: mpsc::UnboundedSender<ProbeTick>,
    ticks_rx: Option<mpsc::UnboundedReceiver<ProbeTick>>,
    claims_tx: mpsc::UnboundedSender<ClaimResult>,
    claims_rx: Option<mpsc::UnboundedReceiver<ClaimResult>>,
    rotating: bool,
    started_at: Instant,
}

impl<T: SignalingTransport> HubSession<T> {
    /// Create a hub and the receiver for its session events
    pub fn new(config: HubConfig, transport: T) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let (claims_tx, claims_rx) = mpsc::unbounded_channel();
        let registry = IdentityRegistry::new(config.endpoint_prefix.clone(), config.retry);

        let hub = Self {
            config,
            transport,
            registry,
            endpoint: None,
            table: ConnectionTable::new(),
            relay: StreamRelay::new(),
            events,
            ticks_tx,
            ticks_rx: Some(ticks_rx),
            claims_tx,
            claims_rx: Some(claims_rx),
            rotating: false,
            started_at: Instant::now(),
        };
        (hub, events_rx)
    }

    /// Claim the rendezvous endpoint
    ///
    /// Starts from `preferred` when given, otherwise from a random code.
    /// Running out of registration attempts is fatal to startup.
    pub async fn start(&mut self, preferred: Option<SessionIdentity>) -> Result<Endpoint> {
        match self.registry.claim(&self.transport, preferred).await {
            Ok(endpoint) => {
                tracing::info!(
                    code = %endpoint.identity,
                    endpoint = %endpoint.name,
                    "Hub started"
                );
                self.install_endpoint(endpoint.clone());
                Ok(endpoint)
            }
            Err(e) => {
                tracing::error!(error = %e, "Hub registration failed");
                Err(e.into())
            }
        }
    }

    /// Drive the hub until shutdown
    ///
    /// Returns when a [`HubCommand::Shutdown`] arrives or every command
    /// sender is dropped.
    pub async fn run(
        mut self,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        mut commands: mpsc::Receiver<HubCommand>,
    ) {
        let (Some(mut ticks), Some(mut claims)) = (self.ticks_rx.take(), self.claims_rx.take())
        else {
            tracing::error!("Hub run loop started twice");
            return;
        };

        loop {
            tokio::select! {
                Some(event) = transport_events.recv() => self.handle_event(event),
                Some(tick) = ticks.recv() => self.on_probe_tick(&tick),
                Some(result) = claims.recv() => self.on_identity_claimed(result),
                command = commands.recv() => match command {
                    Some(HubCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }

        self.shutdown();
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
            } => self.on_call(call, peer, metadata),
            TransportEvent::StreamReceived { call, track } => self.on_stream(&call, track),
            TransportEvent::CallClosed { call } => self.on_call_closed(&call),
            TransportEvent::ConnectionClosed { peer } => {
                tracing::info!(peer = %peer, "Connection closed");
                self.drop_connection(&peer);
            }
            TransportEvent::Error { peer, error } => self.on_transport_error(peer, error),
        }
    }

    /// Apply one user command
    pub fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::RotateIdentity => self.rotate_identity(),
            HubCommand::Disconnect(peer) => {
                self.transport.disconnect(&peer);
                self.drop_connection(&peer);
            }
            HubCommand::Shutdown => self.shutdown(),
        }
    }

    /// Start claiming a fresh code in the background
    ///
    /// The current code stays registered until the new one is claimed.
    pub fn rotate_identity(&mut self) {
        if self.rotating {
            tracing::debug!("Identity rotation already in progress");
            return;
        }
        self.rotating = true;

        let registry = self.registry.clone();
        let transport = self.transport.clone();
        let results = self.claims_tx.clone();
        tokio::spawn(async move {
            let result = registry.claim(&transport, None).await;
            let _ = results.send(result);
        });
    }

    /// Outcome of a background identity claim
    pub fn on_identity_claimed(&mut self, result: ClaimResult) {
        self.rotating = false;
        match result {
            Ok(endpoint) => {
                tracing::info!(
                    code = %endpoint.identity,
                    endpoint = %endpoint.name,
                    connections = self.table.len(),
                    "Identity rotated"
                );
                self.install_endpoint(endpoint);
            }
            Err(error) => {
                tracing::warn!(error = %error, "Identity rotation failed, keeping current code");
                self.emit(SessionEvent::RegistrationFailed { error });
            }
        }
    }

    /// Send the next ping on a connection's probe tick
    pub fn on_probe_tick(&mut self, tick: &ProbeTick) {
        let peer = &tick.peer;
        let ping = match self.table.get_mut(peer) {
            Some(conn) if conn.is_active() && conn.control_open && conn.probe().accepts(tick) => {
                conn.probe_mut().next_ping(now_millis())
            }
            _ => {
                tracing::debug!(peer = %peer, generation = tick.generation, "Stale probe tick ignored");
                return;
            }
        };
        self.send(peer, &ping);
    }

    /// Close every connection and release the endpoint
    pub fn shutdown(&mut self) {
        for peer in self.table.peers() {
            self.transport.disconnect(&peer);
            self.drop_connection(&peer);
        }
        if let Some(endpoint) = self.endpoint.take() {
            self.transport.close_endpoint(&endpoint.name);
        }
        tracing::info!("Hub shut down");
    }

    /// Currently registered endpoint
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Currently advertised code
    pub fn code(&self) -> Option<&SessionIdentity> {
        self.endpoint.as_ref().map(|e| &e.identity)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    pub fn relay(&self) -> &StreamRelay {
        &self.relay
    }

    /// Hub-wide statistics
    pub fn stats(&self) -> HubStats {
        HubStats::collect(&self.table, self.relay.live_tags(), self.started_at.elapsed())
    }

    /// Per-connection statistics, sorted by peer
    pub fn connection_stats(&self) -> Vec<ConnectionStats> {
        connection_stats(&self.table)
    }

    fn install_endpoint(&mut self, endpoint: Endpoint) {
        let code = endpoint.identity.clone();
        let name = endpoint.name.clone();
        if let Some(old) = self.endpoint.replace(endpoint) {
            if old.name != name {
                self.transport.close_endpoint(&old.name);
            }
        }
        self.emit(SessionEvent::IdentityChanged {
            code,
            endpoint: name,
        });
    }

    fn on_connection_opened(&mut self, peer: PeerId, direction: Direction) {
        match self.table.get_mut(&peer) {
            Some(conn) => {
                // Media arrived first; the control channel catches up
                conn.attach_control();
                conn.ensure_probe(self.config.probe_interval, &self.ticks_tx);
            }
            None => {
                self.table.insert(PeerConnection::new(
                    peer.clone(),
                    direction,
                    self.config.probe_timeout,
                ));
            }
        }

        tracing::info!(peer = %peer, direction = ?direction, "Connection opened");
        self.send(&peer, &ControlMessage::RoleRequest);
        self.emit_state(&peer);
        self.emit_peer_list();
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
            ControlMessage::RoleAnnounce { role, subtype } => {
                self.on_announce(peer, PeerRole::from_announcement(&role, subtype.as_deref()))
            }
            ControlMessage::MediaUpdated => self.on_media_updated(peer),
            ControlMessage::RoleRequest
            | ControlMessage::RoleAccepted { .. }
            | ControlMessage::ConnectionAccepted => {
                self.violation(
                    peer,
                    ProtocolError::UnexpectedMessage(message.kind().to_string()).to_string(),
                );
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
            Some(latency) => {
                tracing::debug!(peer = %peer, latency_ms = latency.as_millis() as u64, "Latency measured");
                self.emit(SessionEvent::LatencyUpdated {
                    peer: peer.clone(),
                    latency,
                });
            }
            None => tracing::debug!(peer = %peer, id = id, "Unmatched pong dropped"),
        }
    }

    fn on_announce(&mut self, peer: &PeerId, role: PeerRole) {
        let Some(conn) = self.table.get_mut(peer) else {
            return;
        };
        let previous = conn.role.clone();
        if !conn.on_announce(role.clone()) {
            return;
        }
        conn.activate();
        conn.ensure_probe(self.config.probe_interval, &self.ticks_tx);

        if let PeerRole::Unknown(raw) = &role {
            self.violation(peer, ProtocolError::UnknownRole(raw.clone()).to_string());
        }
        tracing::info!(peer = %peer, role = %role, "Role accepted");
        self.send(peer, &ControlMessage::accepted(&role));

        if previous != role && previous != PeerRole::Unset {
            self.retire_role(peer, &previous);
        }
        if role.is_subscriber() {
            self.relay
                .on_subscriber_join(&mut self.table, &self.transport, peer);
        }

        self.emit_state(peer);
        self.emit_peer_list();
    }

    /// Tear down the media of a role the peer no longer holds
    fn retire_role(&mut self, peer: &PeerId, previous: &PeerRole) {
        tracing::info!(peer = %peer, previous = %previous, "Role changed");

        let kinds: &[LinkKind] = match previous {
            PeerRole::Producer(_) => {
                self.relay
                    .on_producer_leave(&mut self.table, &self.transport, peer);
                &[LinkKind::Ingest]
            }
            PeerRole::Subscriber => &[LinkKind::Forward, LinkKind::Request],
            _ => &[],
        };

        let calls: Vec<CallId> = self
            .table
            .links_for(peer)
            .filter(|link| kinds.contains(&link.kind))
            .map(|link| link.call.clone())
            .collect();
        for call in calls {
            self.table.remove_link(&call);
            self.transport.hang_up(&call);
        }
    }

    fn on_media_updated(&mut self, peer: &PeerId) {
        let placed = self
            .relay
            .on_subscriber_join(&mut self.table, &self.transport, peer);
        tracing::debug!(peer = %peer, calls = placed, "Media update handled");
    }

    fn on_call(&mut self, call: CallId, peer: PeerId, metadata: CallMetadata) {
        if !self.table.contains(&peer) {
            tracing::info!(peer = %peer, call = %call, "Media arrived before control channel");
            self.table
                .insert(PeerConnection::media_only(peer.clone(), self.config.probe_timeout));
        }

        let mut promoted = false;
        let role = match self.table.get_mut(&peer) {
            Some(conn) => {
                if !conn.is_active() {
                    if let Some(tag) = metadata.tag() {
                        promoted = conn.promote(PeerRole::Producer(tag));
                    }
                }
                conn.role.clone()
            }
            None => return,
        };

        if let Err(e) = self.transport.answer(&call, &Track::placeholder()) {
            self.connection_error(&peer, e);
            return;
        }

        let link = match &role {
            PeerRole::Producer(own) => {
                let tag = metadata.tag().unwrap_or_else(|| own.clone());
                tracing::info!(peer = %peer, call = %call, tag = %tag, "Producer call accepted");
                MediaLink::new(call, peer.clone(), tag, LinkKind::Ingest).with_origin(peer.clone())
            }
            _ => {
                tracing::debug!(peer = %peer, call = %call, role = %role, "Media request answered");
                MediaLink::new(call, peer.clone(), metadata.tag_or_unknown(), LinkKind::Request)
            }
        };
        self.table.add_link(link);

        if role.is_subscriber() {
            self.relay
                .on_subscriber_join(&mut self.table, &self.transport, &peer);
        }
        if promoted {
            self.emit_state(&peer);
            self.emit_peer_list();
        }
    }

    fn on_stream(&mut self, call: &CallId, track: Track) {
        let Some(link) = self.table.link_mut(call) else {
            tracing::debug!(call = %call, "Stream for unknown call dropped");
            return;
        };
        link.track = Some(track.clone());

        if link.kind == LinkKind::Ingest {
            let producer = link.peer.clone();
            let tag = link.tag.clone();
            self.relay.on_inbound_media(
                &mut self.table,
                &self.transport,
                &producer,
                call,
                tag,
                track,
            );
        }
    }

    fn on_call_closed(&mut self, call: &CallId) {
        let Some(link) = self.table.remove_link(call) else {
            return;
        };
        tracing::debug!(call = %call, peer = %link.peer, kind = ?link.kind, "Call closed");

        if link.kind == LinkKind::Ingest {
            self.relay
                .on_ingest_closed(&mut self.table, &self.transport, call);
        }

        // Media-only connections have no channel close to end them
        let orphaned = match self.table.get(&link.peer) {
            Some(conn) => !conn.control_open && self.table.links_for(&link.peer).next().is_none(),
            None => false,
        };
        if orphaned {
            tracing::info!(peer = %link.peer, "Media-only connection ended with its last call");
            self.drop_connection(&link.peer);
        }
    }

    fn on_transport_error(&mut self, peer: Option<PeerId>, error: TransportError) {
        match peer {
            Some(peer) => {
                self.connection_error(&peer, error);
                self.transport.disconnect(&peer);
                self.drop_connection(&peer);
            }
            None => tracing::warn!(error = %error, "Transport error"),
        }
    }

    /// Remove a connection and everything bound to it
    fn drop_connection(&mut self, peer: &PeerId) {
        let Some((conn, links)) = self.table.remove(peer) else {
            return;
        };

        for link in &links {
            self.transport.hang_up(&link.call);
        }
        let tags = self
            .relay
            .on_producer_leave(&mut self.table, &self.transport, peer);

        tracing::info!(
            peer = %peer,
            role = %conn.role,
            calls = links.len(),
            tags_removed = tags.len(),
            "Connection removed"
        );
        self.emit(SessionEvent::ConnectionStateChanged {
            peer: peer.clone(),
            phase: conn.phase,
            role: conn.role,
        });
        self.emit_peer_list();
    }

    fn send(&self, peer: &PeerId, message: &ControlMessage) -> bool {
        let record = match message.encode() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "Failed to encode message");
                return false;
            }
        };

        match self.transport.send(peer, record) {
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

    fn emit_peer_list(&self) {
        self.emit(SessionEvent::PeerListChanged {
            peers: connection_stats(&self.table),
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
