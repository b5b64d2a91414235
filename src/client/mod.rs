//! Peer side of the rendezvous
//!
//! Provides the sessions that dial a hub by code:
//! - Producers publishing a tagged camera track
//! - Subscribers viewing everything the hub relays

pub mod capture;
pub mod config;
pub mod peer;

pub use capture::{
    DeviceDescriptor, DeviceSelector, MediaAcquisitionError, MediaSource, NoCapture, StaticSource,
};
pub use config::PeerConfig;
pub use peer::{PeerCommand, PeerSession};
