//! Rendezvous identities
//!
//! A hub is located by a 6-character code drawn from `[A-Z0-9]`. The name
//! registered on the signaling network is the code behind a deployment
//! prefix (`viewcal-AB12CD`). Uniqueness is enforced by the signaling layer:
//! a duplicate registration is rejected and the registry mints a new code,
//! up to a bounded number of attempts.

pub mod code;
pub mod error;
pub mod registry;

pub use code::{dial_name, SessionIdentity};
pub use error::IdentityError;
pub use registry::{Endpoint, IdentityRegistry, RetryPolicy};
