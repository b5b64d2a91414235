//! Control-channel protocol
//!
//! This module provides:
//! - The control message vocabulary and its codec
//! - Peer roles and role tags
//! - Wire constants shared by hubs and peers

pub mod constants;
pub mod error;
pub mod message;
pub mod role;

pub use error::ProtocolError;
pub use message::ControlMessage;
pub use role::{PeerRole, RoleTag};
