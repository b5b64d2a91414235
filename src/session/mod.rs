//! Session state shared by hubs and peers
//!
//! - [`PeerConnection`]: role state machine for one control channel
//! - [`ConnectionTable`]: all connections and media links of a session
//! - [`LatencyProbe`]: ping/pong round-trip measurement
//! - [`SessionEvent`]: what a session reports to its user interface

pub mod event;
pub mod latency;
pub mod link;
pub mod state;
pub mod table;

pub use event::SessionEvent;
pub use latency::{LatencyProbe, ProbeTick};
pub use link::{LinkKind, MediaLink};
pub use state::{PeerConnection, SessionPhase};
pub use table::ConnectionTable;
