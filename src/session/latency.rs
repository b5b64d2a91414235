//! Round-trip latency probing over the control channel
//!
//! ```text
//!   local                                  remote
//!     |--- ping {id, timestamp} ------------->|
//!     |<-- pong {id, timestamp} --------------|   (echoed verbatim)
//!     |
//!   latency = now - timestamp
//! ```
//!
//! One ticker task per active connection fires every probe interval and
//! hands a [`ProbeTick`] back to the owning session's event loop, which sends
//! the ping. The ticker is aborted when the connection closes. Each start
//! gets a fresh generation, so a tick queued by an aborted ticker never
//! matches a later connection from the same peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::constants::PING_ID_LENGTH;
use crate::protocol::ControlMessage;
use crate::transport::PeerId;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// One firing of a connection's probe ticker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTick {
    pub peer: PeerId,
    pub generation: u64,
}

/// Wall-clock milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Latency probe state for one connection
#[derive(Debug)]
pub struct LatencyProbe {
    /// Ticker task, present while probing
    ticker: Option<JoinHandle<()>>,
    /// Generation of the running ticker
    generation: Option<u64>,
    /// Outstanding pings: correlation id to send timestamp
    outstanding: HashMap<String, u64>,
    /// Pings older than this are forgotten
    timeout: Duration,
    /// Most recent measurement
    last_latency: Option<Duration>,
}

impl LatencyProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ticker: None,
            generation: None,
            outstanding: HashMap::new(),
            timeout,
            last_latency: None,
        }
    }

    /// Start the periodic ticker
    ///
    /// Returns false (and does nothing) if it is already running, so a
    /// connection never accumulates concurrent tickers.
    pub fn start(
        &mut self,
        peer: PeerId,
        period: Duration,
        ticks: mpsc::UnboundedSender<ProbeTick>,
    ) -> bool {
        if self.ticker.is_some() {
            return false;
        }

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let tick = ProbeTick { peer, generation };
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                if ticks.send(tick.clone()).is_err() {
                    break;
                }
            }
        });
        self.ticker = Some(handle);
        self.generation = Some(generation);
        true
    }

    /// Stop the ticker and forget outstanding pings
    pub fn stop(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
        self.generation = None;
        self.outstanding.clear();
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Generation of the running ticker, if any
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// Whether a tick came from the ticker currently running
    pub fn accepts(&self, tick: &ProbeTick) -> bool {
        self.generation == Some(tick.generation)
    }

    /// Build the next ping and remember it
    pub fn next_ping(&mut self, now_ms: u64) -> ControlMessage {
        self.prune(now_ms);

        let id = nanoid::nanoid!(PING_ID_LENGTH);
        self.outstanding.insert(id.clone(), now_ms);
        ControlMessage::ping(id, now_ms)
    }

    /// Resolve a pong
    ///
    /// Returns the measured latency, or `None` for an unknown, duplicate or
    /// expired id.
    pub fn resolve(&mut self, id: &str, now_ms: u64) -> Option<Duration> {
        let sent_at = self.outstanding.remove(id)?;
        let latency = Duration::from_millis(now_ms.saturating_sub(sent_at));
        self.last_latency = Some(latency);
        Some(latency)
    }

    /// Number of pings awaiting a pong
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    fn prune(&mut self, now_ms: u64) {
        let timeout_ms = self.timeout.as_millis() as u64;
        self.outstanding
            .retain(|_, sent_at| now_ms.saturating_sub(*sent_at) <= timeout_ms);
    }
}

impl Drop for LatencyProbe {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping_id(msg: &ControlMessage) -> String {
        match msg {
            ControlMessage::Ping { id, .. } => id.clone(),
            other => panic!("expected ping, got {:?}", other),
        }
    }

    #[test]
    fn test_pong_resolves_once() {
        let mut probe = LatencyProbe::new(Duration::from_secs(10));
        let id = ping_id(&probe.next_ping(1_000));

        assert_eq!(probe.resolve(&id, 1_045), Some(Duration::from_millis(45)));
        assert_eq!(probe.last_latency(), Some(Duration::from_millis(45)));

        // Duplicate pong is discarded
        assert_eq!(probe.resolve(&id, 1_100), None);
        assert_eq!(probe.last_latency(), Some(Duration::from_millis(45)));
    }

    #[test]
    fn test_unmatched_pong_discarded() {
        let mut probe = LatencyProbe::new(Duration::from_secs(10));
        probe.next_ping(0);
        assert_eq!(probe.resolve("not-ours", 10), None);
        assert_eq!(probe.outstanding(), 1);
    }

    #[test]
    fn test_latency_never_negative() {
        let mut probe = LatencyProbe::new(Duration::from_secs(10));
        let id = ping_id(&probe.next_ping(5_000));

        // Clock stepped backwards between ping and pong
        assert_eq!(probe.resolve(&id, 4_000), Some(Duration::ZERO));
    }

    #[test]
    fn test_stale_pings_pruned() {
        let mut probe = LatencyProbe::new(Duration::from_secs(10));
        let old = ping_id(&probe.next_ping(0));
        probe.next_ping(20_000);

        assert_eq!(probe.outstanding(), 1);
        assert_eq!(probe.resolve(&old, 20_010), None);
    }

    #[test]
    fn test_ping_ids_are_fresh() {
        let mut probe = LatencyProbe::new(Duration::from_secs(10));
        let a = ping_id(&probe.next_ping(0));
        let b = ping_id(&probe.next_ping(0));
        assert_ne!(a, b);
        assert_eq!(a.len(), PING_ID_LENGTH);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_and_stops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut probe = LatencyProbe::new(Duration::from_secs(10));
        let peer = PeerId::from("cam");

        let began = tokio::time::Instant::now();
        assert!(probe.start(peer.clone(), Duration::from_secs(2), tx.clone()));
        assert!(!probe.start(peer.clone(), Duration::from_secs(2), tx));
        assert!(probe.is_running());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.peer, peer);
        assert!(probe.accepts(&first));
        assert!(began.elapsed() >= Duration::from_secs(2));
        assert_eq!(rx.recv().await, Some(first));

        probe.stop();
        assert!(!probe.is_running());
        // Aborted ticker drops the last sender
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_restart_rejects_old_ticks() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut probe = LatencyProbe::new(Duration::from_secs(10));
        let peer = PeerId::from("cam");

        assert!(probe.start(peer.clone(), Duration::from_secs(2), tx.clone()));
        let old = ProbeTick {
            peer: peer.clone(),
            generation: probe.generation().unwrap(),
        };
        probe.stop();
        assert!(!probe.accepts(&old));

        assert!(probe.start(peer, Duration::from_secs(2), tx));
        assert!(!probe.accepts(&old));
        assert_ne!(probe.generation(), Some(old.generation));
    }
}
