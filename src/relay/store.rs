//! Stream relay implementation
//!
//! Binds producer media arriving at the hub to outbound calls towards every
//! live subscriber, one independently placed call per (subscriber, tag).

use std::collections::HashMap;

use crate::protocol::RoleTag;
use crate::session::{ConnectionTable, LinkKind, MediaLink};
use crate::transport::{CallId, CallMetadata, PeerId, SignalingTransport, Track};

use super::entry::LiveTrack;

/// Fan-out of live producer media to subscribers
///
/// Holds the latest live track per role tag; the forwarding calls
/// themselves are media links in the hub's [`ConnectionTable`], so every
/// method takes the table and keeps both in step.
#[derive(Debug, Default)]
pub struct StreamRelay {
    live: HashMap<RoleTag, LiveTrack>,
}

impl StreamRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer media for `tag` arrived on `call`
    ///
    /// Records it as the live track for the tag and places one call per
    /// live subscriber. A different producer call taking over the tag ends
    /// the forwards of the previous one first. Returns the number of calls
    /// placed.
    pub fn on_inbound_media<T: SignalingTransport>(
        &mut self,
        table: &mut ConnectionTable,
        transport: &T,
        producer: &PeerId,
        call: &CallId,
        tag: RoleTag,
        track: Track,
    ) -> usize {
        let entry = LiveTrack::new(tag.clone(), producer.clone(), call.clone(), track);

        if let Some(previous) = self.live.insert(tag.clone(), entry) {
            if !previous.is_fed_by(call) {
                tracing::info!(
                    tag = %tag,
                    previous = %previous.producer,
                    producer = %producer,
                    "Live track replaced"
                );
                Self::close_forwards(table, transport, &tag);
            }
        }

        let mut placed = 0;
        for subscriber in table.live_subscribers() {
            if !table.is_forwarding(&subscriber, &tag)
                && self.offer(table, transport, &subscriber, &tag)
            {
                placed += 1;
            }
        }

        tracing::info!(
            tag = %tag,
            producer = %producer,
            subscribers = placed,
            "Media fanned out"
        );
        placed
    }

    /// Offer every live tag the subscriber is not yet receiving
    ///
    /// Returns the number of calls placed.
    pub fn on_subscriber_join<T: SignalingTransport>(
        &self,
        table: &mut ConnectionTable,
        transport: &T,
        subscriber: &PeerId,
    ) -> usize {
        if !table.get(subscriber).is_some_and(|c| c.is_live_subscriber()) {
            return 0;
        }

        let mut placed = 0;
        for tag in self.live_tags() {
            if !table.is_forwarding(subscriber, &tag)
                && self.offer(table, transport, subscriber, &tag)
            {
                placed += 1;
            }
        }

        if placed > 0 {
            tracing::info!(
                subscriber = %subscriber,
                calls = placed,
                "Live media offered to subscriber"
            );
        }
        placed
    }

    /// Drop every tag the producer was feeding and end their forwards
    ///
    /// Subscribers' control connections are left alone.
    pub fn on_producer_leave<T: SignalingTransport>(
        &mut self,
        table: &mut ConnectionTable,
        transport: &T,
        producer: &PeerId,
    ) -> Vec<RoleTag> {
        let mut tags: Vec<RoleTag> = self
            .live
            .values()
            .filter(|live| &live.producer == producer)
            .map(|live| live.tag.clone())
            .collect();
        tags.sort();

        for tag in &tags {
            self.live.remove(tag);
            let closed = Self::close_forwards(table, transport, tag);
            tracing::info!(
                tag = %tag,
                producer = %producer,
                forwards_closed = closed,
                "Live tag removed"
            );
        }

        tags
    }

    /// An ingest call ended; retire its tag if it was the live one
    pub fn on_ingest_closed<T: SignalingTransport>(
        &mut self,
        table: &mut ConnectionTable,
        transport: &T,
        call: &CallId,
    ) -> Option<RoleTag> {
        let tag = self
            .live
            .values()
            .find(|live| live.is_fed_by(call))
            .map(|live| live.tag.clone())?;

        self.live.remove(&tag);
        Self::close_forwards(table, transport, &tag);
        tracing::info!(tag = %tag, call = %call, "Ingest call ended, live tag removed");
        Some(tag)
    }

    /// Tags with live media, sorted
    pub fn live_tags(&self) -> Vec<RoleTag> {
        let mut tags: Vec<RoleTag> = self.live.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn live(&self, tag: &RoleTag) -> Option<&LiveTrack> {
        self.live.get(tag)
    }

    pub fn is_live(&self, tag: &RoleTag) -> bool {
        self.live.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn offer<T: SignalingTransport>(
        &self,
        table: &mut ConnectionTable,
        transport: &T,
        subscriber: &PeerId,
        tag: &RoleTag,
    ) -> bool {
        let Some(live) = self.live.get(tag) else {
            return false;
        };

        let metadata = CallMetadata::new(tag.clone(), live.producer.clone());
        match transport.call(subscriber, &live.track, metadata) {
            Ok(call) => {
                let link =
                    MediaLink::new(call.clone(), subscriber.clone(), tag.clone(), LinkKind::Forward)
                        .with_origin(live.producer.clone());
                if table.add_link(link) {
                    tracing::debug!(subscriber = %subscriber, tag = %tag, call = %call, "Forward placed");
                    true
                } else {
                    transport.hang_up(&call);
                    false
                }
            }
            Err(e) => {
                tracing::warn!(
                    subscriber = %subscriber,
                    tag = %tag,
                    error = %e,
                    "Failed to place forward"
                );
                false
            }
        }
    }

    fn close_forwards<T: SignalingTransport>(
        table: &mut ConnectionTable,
        transport: &T,
        tag: &RoleTag,
    ) -> usize {
        let calls = table.forwards_of(tag);
        for call in &calls {
            table.remove_link(call);
            transport.hang_up(call);
        }
        calls.len()
    }
}
