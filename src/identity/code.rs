//! Rendezvous codes

use std::fmt;

use crate::protocol::constants::{CODE_ALPHABET, CODE_LENGTH};
use crate::transport::PeerId;

use super::error::IdentityError;

/// Short human-shareable code locating a hub (e.g. `AB12CD`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity(String);

impl SessionIdentity {
    /// Fresh random code
    ///
    /// No state is consulted, so collisions surface only when the
    /// signaling layer rejects the registration.
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(CODE_LENGTH, &CODE_ALPHABET))
    }

    /// Parse a user-entered code
    ///
    /// Surrounding whitespace is ignored and lowercase letters are folded to
    /// uppercase, since codes are read aloud and typed by hand.
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let code = input.trim().to_ascii_uppercase();
        if Self::is_valid(&code) {
            Ok(Self(code))
        } else {
            Err(IdentityError::InvalidCode(input.to_string()))
        }
    }

    /// Whether `code` has the right length and alphabet
    pub fn is_valid(code: &str) -> bool {
        code.chars().count() == CODE_LENGTH && code.chars().all(|c| CODE_ALPHABET.contains(&c))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Externally dialed endpoint name for this code
    pub fn endpoint_name(&self, prefix: &str) -> PeerId {
        PeerId::new(format!("{}{}", prefix, self.0))
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve what a user typed into the endpoint name to dial
///
/// Accepts either a bare code or an already prefixed name.
pub fn dial_name(prefix: &str, input: &str) -> Result<PeerId, IdentityError> {
    let trimmed = input.trim();
    let bare = trimmed.strip_prefix(prefix).unwrap_or(trimmed);
    Ok(SessionIdentity::parse(bare)?.endpoint_name(prefix))
}
