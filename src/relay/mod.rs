//! Stream relay for producer to subscriber fan-out
//!
//! The relay routes media arriving at a hub from producers to every live
//! subscriber. Media never flows peer to peer: the hub answers each producer
//! call, then places one call per subscriber carrying the received track.
//!
//! # Architecture
//!
//! ```text
//!                            StreamRelay
//!                     ┌─────────────────────────┐
//!                     │ live: HashMap<RoleTag,  │
//!                     │   LiveTrack {           │
//!                     │     producer, call,     │
//!                     │     track,              │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Producer]             [Subscriber]            [Subscriber]
//!    call(front) ──►        call(front)             call(front)
//!         │                       ▲                       ▲
//!         └──► on_inbound_media() ┴── transport.call() ───┘
//! ```
//!
//! # Late joiners
//!
//! The latest track per tag is kept so a subscriber becoming active after
//! the producer is offered the media at once. A tag disappears when its
//! producer leaves or its ingest call ends.

pub mod entry;
pub mod store;

pub use entry::LiveTrack;
pub use store::StreamRelay;
