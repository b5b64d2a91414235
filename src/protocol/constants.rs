//! Protocol constants

use std::time::Duration;

/// Prefix added to a bare rendezvous code to form the dialed endpoint name
pub const DEFAULT_ENDPOINT_PREFIX: &str = "viewcal-";

/// Length of a rendezvous code
pub const CODE_LENGTH: usize = 6;

/// Characters a rendezvous code is drawn from
pub const CODE_ALPHABET: [char; 36] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Length of a ping correlation token
pub const PING_ID_LENGTH: usize = 12;

/// Period between latency probes on an active control connection
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Outstanding pings older than this are discarded
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Role tag used when a call carries no tag
pub const UNKNOWN_TAG: &str = "unknown";

/// Producer subtype used when an announcement omits one
pub const DEFAULT_PRODUCER_TAG: &str = "front";

// Wire names of the control vocabulary
pub const TYPE_PING: &str = "ping";
pub const TYPE_PONG: &str = "pong";
pub const TYPE_ROLE_REQUEST: &str = "role-request";
pub const TYPE_ROLE_ANNOUNCE: &str = "role-announce";
pub const TYPE_CONNECTION_TYPE: &str = "connection-type";
pub const TYPE_ROLE_ACCEPTED: &str = "role-accepted";
pub const TYPE_CONNECTION_ACCEPTED: &str = "connection-accepted";
pub const TYPE_MEDIA_UPDATED: &str = "media-updated";

/// Every `type` value the codec understands
pub const KNOWN_TYPES: [&str; 8] = [
    TYPE_PING,
    TYPE_PONG,
    TYPE_ROLE_REQUEST,
    TYPE_ROLE_ANNOUNCE,
    TYPE_CONNECTION_TYPE,
    TYPE_ROLE_ACCEPTED,
    TYPE_CONNECTION_ACCEPTED,
    TYPE_MEDIA_UPDATED,
];
