//! Peer configuration

use std::time::Duration;

use crate::protocol::constants::*;
use crate::protocol::{PeerRole, RoleTag};

use super::capture::DeviceSelector;

/// Configuration of a producer or subscriber peer
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Namespace prefix added to bare codes before dialing
    pub endpoint_prefix: String,

    /// Role announced to the hub
    pub role: PeerRole,

    /// Period between pings to the hub
    pub probe_interval: Duration,

    /// Outstanding pings older than this are discarded
    pub probe_timeout: Duration,

    /// Capture device a producer acquires from
    pub device: DeviceSelector,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            endpoint_prefix: DEFAULT_ENDPOINT_PREFIX.to_string(),
            role: PeerRole::Subscriber,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            device: DeviceSelector::First,
        }
    }
}

impl PeerConfig {
    /// Producer publishing under `tag`
    pub fn producer(tag: impl Into<RoleTag>) -> Self {
        Self {
            role: PeerRole::Producer(tag.into()),
            ..Default::default()
        }
    }

    /// Subscriber viewing every relayed tag
    pub fn subscriber() -> Self {
        Self::default()
    }

    /// Set the endpoint prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoint_prefix = prefix.into();
        self
    }

    /// Set the announced role
    pub fn role(mut self, role: PeerRole) -> Self {
        self.role = role;
        self
    }

    /// Set the probe interval
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Set the probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the capture device
    pub fn device(mut self, device: DeviceSelector) -> Self {
        self.device = device;
        self
    }
}
