//! Identity registration with bounded collision retry

use std::time::Duration;

use crate::protocol::constants::DEFAULT_ENDPOINT_PREFIX;
use crate::transport::{PeerId, SignalingTransport, TransportError};

use super::code::SessionIdentity;
use super::error::IdentityError;

/// Retry schedule for endpoint registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total registration attempts before giving up
    pub max_attempts: u32,
    /// Delay after the first collision
    pub initial_backoff: Duration,
    /// Upper bound on the delay between attempts
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// A successfully claimed identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Bare code shown to users
    pub identity: SessionIdentity,
    /// Name registered on the signaling network
    pub name: PeerId,
}

/// Issues rendezvous codes and claims their endpoint names
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    prefix: String,
    policy: RetryPolicy,
}

impl IdentityRegistry {
    pub fn new(prefix: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            prefix: prefix.into(),
            policy,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fresh random identity
    pub fn generate(&self) -> SessionIdentity {
        SessionIdentity::generate()
    }

    /// Try once to claim `prefix + identity`
    pub async fn register<T: SignalingTransport>(
        &self,
        transport: &T,
        identity: SessionIdentity,
    ) -> Result<Endpoint, IdentityError> {
        let name = identity.endpoint_name(&self.prefix);

        match transport.open_endpoint(&name).await {
            Ok(()) => Ok(Endpoint { identity, name }),
            Err(TransportError::UnavailableId(taken)) => Err(IdentityError::Collision(taken)),
            Err(e) => Err(IdentityError::Transport(e)),
        }
    }

    /// Claim an endpoint, minting a new code after every collision
    ///
    /// Starts from `preferred` when given. Gives up with
    /// [`IdentityError::Exhausted`] once the policy's attempts are spent;
    /// non-collision failures are returned immediately.
    pub async fn claim<T: SignalingTransport>(
        &self,
        transport: &T,
        preferred: Option<SessionIdentity>,
    ) -> Result<Endpoint, IdentityError> {
        let mut next = preferred;

        for attempt in 1..=self.policy.max_attempts {
            let identity = next.take().unwrap_or_else(|| self.generate());

            match self.register(transport, identity).await {
                Ok(endpoint) => {
                    tracing::info!(
                        endpoint = %endpoint.name,
                        attempt = attempt,
                        "Identity registered"
                    );
                    return Ok(endpoint);
                }
                Err(IdentityError::Collision(name)) => {
                    tracing::warn!(
                        endpoint = %name,
                        attempt = attempt,
                        max_attempts = self.policy.max_attempts,
                        "Identity collision, regenerating"
                    );
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(IdentityError::Exhausted {
            attempts: self.policy.max_attempts,
        })
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT_PREFIX, RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::transport::MemoryNetwork;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_register_reports_collision() {
        let network = MemoryNetwork::new();
        let (first, _rx1) = network.attach();
        let (second, _rx2) = network.attach();
        let registry = IdentityRegistry::default();
        let code = SessionIdentity::parse("AB12CD").unwrap();

        let endpoint = assert_ok!(registry.register(&first, code.clone()).await);
        assert_eq!(endpoint.name.as_str(), "viewcal-AB12CD");

        let err = assert_err!(registry.register(&second, code).await);
        assert_eq!(err, IdentityError::Collision(PeerId::from("viewcal-AB12CD")));
    }

    #[tokio::test]
    async fn test_claim_recovers_from_same_code() {
        let network = MemoryNetwork::new();
        let (hub_a, _rx1) = network.attach();
        let (hub_b, _rx2) = network.attach();
        let registry = IdentityRegistry::new("viewcal-", fast_policy(5));
        let code = SessionIdentity::parse("AB12CD").unwrap();

        let a = assert_ok!(registry.claim(&hub_a, Some(code.clone())).await);
        let b = assert_ok!(registry.claim(&hub_b, Some(code)).await);

        assert_eq!(a.identity.as_str(), "AB12CD");
        assert_ne!(a.identity, b.identity);
        assert!(network.is_registered(&a.name));
        assert!(network.is_registered(&b.name));
    }

    #[tokio::test]
    async fn test_claim_is_bounded() {
        let network = MemoryNetwork::new();
        let (holder, _rx1) = network.attach();
        let (late, _rx2) = network.attach();
        let registry = IdentityRegistry::new("viewcal-", fast_policy(1));
        let code = SessionIdentity::parse("QQQQQQ").unwrap();

        assert_ok!(registry.claim(&holder, Some(code.clone())).await);
        let err = assert_err!(registry.claim(&late, Some(code)).await);
        assert_eq!(err, IdentityError::Exhausted { attempts: 1 });
    }
}
