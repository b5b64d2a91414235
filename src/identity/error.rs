//! Identity error types

use thiserror::Error;

use crate::transport::{PeerId, TransportError};

/// Error claiming or parsing a rendezvous identity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Input is not a 6-character `[A-Z0-9]` code
    #[error("invalid rendezvous code {0:?}")]
    InvalidCode(String),

    /// Another hub already holds the endpoint name
    #[error("endpoint {0} is already registered")]
    Collision(PeerId),

    /// Every registration attempt collided
    #[error("no free endpoint after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// Registration failed for a reason other than a collision
    #[error("registration failed: {0}")]
    Transport(TransportError),
}
