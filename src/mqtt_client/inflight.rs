//! Bookkeeping for packets whose handshake has not completed.

use std::collections::{HashMap, HashSet};

use super::callback::Completion;
use crate::mqtt_serde::packet::MqttPacket;

/// A sent command awaiting its acknowledgement.
pub(crate) struct PendingRequest {
    /// The frame as it went out, kept so the original packet type can be
    /// checked against the ack that arrives.
    pub(crate) frame: MqttPacket,
    pub(crate) completion: Completion,
}

impl PendingRequest {
    pub(crate) fn new(frame: MqttPacket, completion: Completion) -> Self {
        Self { frame, completion }
    }
}

/// Pending client requests keyed by message id, plus the id sets tracking
/// server-originated QoS 2 deliveries.
///
/// `delivering` holds ids handed to the listener whose acknowledgement
/// token has not come back yet; `processed` holds ids for which PUBREC is
/// on the wire and PUBREL has not arrived.
pub(crate) struct InflightTable {
    requests: HashMap<u16, PendingRequest>,
    delivering: HashSet<u16>,
    processed: HashSet<u16>,
}

impl InflightTable {
    pub(crate) fn new() -> Self {
        Self {
            requests: HashMap::new(),
            delivering: HashSet::new(),
            processed: HashSet::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: u16, request: PendingRequest) {
        let evicted = self.requests.insert(id, request);
        debug_assert!(evicted.is_none(), "message id {} already in flight", id);
    }

    pub(crate) fn take(&mut self, id: u16) -> Option<PendingRequest> {
        self.requests.remove(&id)
    }

    /// Empties the table, returning every pending request. Also forgets the
    /// server-side QoS 2 state; the connection is past the point of
    /// answering PUBRELs.
    pub(crate) fn drain_all(&mut self) -> Vec<PendingRequest> {
        self.delivering.clear();
        self.processed.clear();
        self.requests.drain().map(|(_, request)| request).collect()
    }

    /// Records that a QoS 2 delivery has been handed to the listener.
    /// Returns `false` when the id is already being delivered (a duplicate
    /// that must not reach the listener again).
    pub(crate) fn begin_delivery(&mut self, id: u16) -> bool {
        self.delivering.insert(id)
    }

    /// The listener acknowledged: the id moves from `delivering` to
    /// `processed` as the PUBREC goes out.
    pub(crate) fn finish_delivery(&mut self, id: u16) {
        self.delivering.remove(&id);
        self.processed.insert(id);
    }

    pub(crate) fn is_processed(&self, id: u16) -> bool {
        self.processed.contains(&id)
    }

    /// PUBREL arrived: the exchange is over for this id.
    pub(crate) fn release(&mut self, id: u16) {
        self.processed.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
