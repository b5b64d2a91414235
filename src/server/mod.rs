//! Hub side of the rendezvous
//!
//! [`HubSession`] registers the rendezvous endpoint and relays producer
//! media to subscribers; [`HubConfig`] carries its tunables.

pub mod config;
pub mod hub;

pub use config::HubConfig;
pub use hub::{HubCommand, HubSession};
