//! Rendezvous hub and stream relay for peer-to-peer camera viewing
//!
//! Camera producers and viewers meet at a hub located by a short code.
//! The hub classifies every control connection by role, relays each
//! producer's tagged track to every subscriber and keeps a round-trip
//! latency probe running on each connection.
//!
//! # Example
//! ```no_run
//! use viewcal::transport::MemoryNetwork;
//! use viewcal::{HubCommand, HubConfig, HubSession};
//!
//! # async fn example() -> viewcal::Result<()> {
//! let network = MemoryNetwork::new();
//! let (transport, transport_events) = network.attach();
//! let (mut hub, mut events) = HubSession::new(HubConfig::default(), transport);
//!
//! let endpoint = hub.start(None).await?;
//! println!("Share this code: {}", endpoint.identity);
//!
//! let (commands, commands_rx) = tokio::sync::mpsc::channel(16);
//! tokio::spawn(hub.run(transport_events, commands_rx));
//!
//! while let Some(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! # drop(commands);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;
pub mod transport;

pub use client::{PeerCommand, PeerConfig, PeerSession};
pub use error::{Error, Result};
pub use identity::{Endpoint, IdentityRegistry, RetryPolicy, SessionIdentity};
pub use protocol::{ControlMessage, PeerRole, RoleTag};
pub use server::{HubCommand, HubConfig, HubSession};
pub use session::SessionEvent;
pub use transport::{SignalingTransport, TransportEvent};
