//! Per-connection role state machine
//!
//! ```text
//!            role-announce            ack sent
//! Pending ─────────────────► Announced ────────► Active
//!    │                                             ▲
//!    └──────────── inbound call metadata ──────────┘
//!
//!  any state ── channel closed ──► Closed (terminal)
//! ```

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::protocol::PeerRole;
use crate::transport::{Direction, PeerId};

use super::latency::{LatencyProbe, ProbeTick};

/// Lifecycle phase of a control connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Just opened, role unknown
    Pending,
    /// Remote declared a role, not yet acknowledged
    Announced,
    /// Role acknowledged; usable for media negotiation
    Active,
    /// Channel closed
    Closed,
}

/// One control channel to a remote peer
#[derive(Debug)]
pub struct PeerConnection {
    /// Remote peer identifier
    pub peer: PeerId,

    /// Which side dialed
    pub direction: Direction,

    /// Assigned role
    pub role: PeerRole,

    /// Current phase
    pub phase: SessionPhase,

    /// Whether the control channel itself is open (a media call can arrive
    /// before it)
    pub control_open: bool,

    /// When the entry was created
    pub opened_at: Instant,

    /// When the connection last became active
    pub activated_at: Option<Instant>,

    probe: LatencyProbe,
}

impl PeerConnection {
    /// Entry for a freshly opened control channel
    pub fn new(peer: PeerId, direction: Direction, probe_timeout: Duration) -> Self {
        Self {
            peer,
            direction,
            role: PeerRole::Unset,
            phase: SessionPhase::Pending,
            control_open: true,
            opened_at: Instant::now(),
            activated_at: None,
            probe: LatencyProbe::new(probe_timeout),
        }
    }

    /// Entry for a peer whose media call arrived before its control channel
    pub fn media_only(peer: PeerId, probe_timeout: Duration) -> Self {
        Self {
            control_open: false,
            ..Self::new(peer, Direction::Inbound, probe_timeout)
        }
    }

    /// Record a declared role
    ///
    /// Accepted while pending, and while active to allow role changes.
    /// Returns false if the connection is closed.
    pub fn on_announce(&mut self, role: PeerRole) -> bool {
        match self.phase {
            SessionPhase::Closed => false,
            _ => {
                self.role = role;
                self.phase = SessionPhase::Announced;
                true
            }
        }
    }

    /// Acknowledge the declared role
    pub fn activate(&mut self) {
        if matches!(self.phase, SessionPhase::Pending | SessionPhase::Announced) {
            self.phase = SessionPhase::Active;
            self.activated_at = Some(Instant::now());
        }
    }

    /// Promote straight to active from inbound call metadata
    ///
    /// Has no effect once the connection is already active or closed; the
    /// explicit announcement wins over later call metadata.
    pub fn promote(&mut self, role: PeerRole) -> bool {
        match self.phase {
            SessionPhase::Pending | SessionPhase::Announced => {
                self.role = role;
                self.activate();
                true
            }
            SessionPhase::Active | SessionPhase::Closed => false,
        }
    }

    /// Mark the control channel open on an entry created from media
    pub fn attach_control(&mut self) {
        if self.phase != SessionPhase::Closed {
            self.control_open = true;
        }
    }

    /// Terminal transition; stops probing
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
        self.control_open = false;
        self.probe.stop();
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Active subscriber with an open control channel
    pub fn is_live_subscriber(&self) -> bool {
        self.is_active() && self.control_open && self.role.is_subscriber()
    }

    /// Start latency probing if the connection qualifies and it is not
    /// already running
    pub fn ensure_probe(&mut self, period: Duration, ticks: &mpsc::UnboundedSender<ProbeTick>) -> bool {
        if !self.is_active() || !self.control_open {
            return false;
        }
        self.probe.start(self.peer.clone(), period, ticks.clone())
    }

    /// The tick the running ticker would deliver next
    pub fn probe_tick(&self) -> Option<ProbeTick> {
        self.probe.generation().map(|generation| ProbeTick {
            peer: self.peer.clone(),
            generation,
        })
    }

    pub fn probe(&self) -> &LatencyProbe {
        &self.probe
    }

    pub fn probe_mut(&mut self) -> &mut LatencyProbe {
        &mut self.probe
    }

    /// Most recent round-trip latency
    pub fn latency(&self) -> Option<Duration> {
        self.probe.last_latency()
    }

    /// Time since the entry was created
    pub fn duration(&self) -> Duration {
        self.opened_at.elapsed()
    }
}
