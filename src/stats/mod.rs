//! Connection and hub statistics

pub mod metrics;

pub use metrics::{connection_stats, ConnectionStats, HubStats};
