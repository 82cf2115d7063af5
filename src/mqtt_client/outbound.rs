//! Front-of-line overflow buffer between the engine and the transport's
//! non-blocking `offer`.

use std::collections::VecDeque;

use super::callback::OnDone;
use super::transport::FramedTransport;
use crate::mqtt_serde::packet::MqttPacket;

struct OverflowEntry {
    frame: MqttPacket,
    on_accept: Option<OnDone<()>>,
}

/// Result of an offer attempt.
pub(crate) enum OfferOutcome {
    /// The transport took the frame; the accept callback (if any) is
    /// returned for the caller to resolve.
    Accepted(Option<OnDone<()>>),
    /// The frame was appended to the overflow.
    Queued,
}

/// Result of a drain pass.
pub(crate) struct DrainOutcome {
    /// Accept callbacks of the drained entries, in acceptance order.
    pub(crate) resolved: Vec<OnDone<()>>,
    /// How many frames the transport took during this pass.
    pub(crate) accepted_frames: usize,
    /// Whether this pass took the overflow from non-empty to empty.
    pub(crate) emptied: bool,
}

/// FIFO overflow of frames the transport refused.
///
/// Frames bypass the overflow only while it is empty, which keeps wire
/// order equal to acceptance order across direct offers and drains.
pub(crate) struct OutboundQueue {
    overflow: VecDeque<OverflowEntry>,
}

impl OutboundQueue {
    pub(crate) fn new() -> Self {
        Self {
            overflow: VecDeque::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.overflow.is_empty()
    }

    /// Hands the frame to the transport when nothing is queued ahead of it;
    /// otherwise appends it to the overflow.
    pub(crate) fn offer<T: FramedTransport>(
        &mut self,
        transport: &mut T,
        frame: MqttPacket,
        on_accept: Option<OnDone<()>>,
    ) -> OfferOutcome {
        if self.overflow.is_empty() && transport.offer(&frame) {
            OfferOutcome::Accepted(on_accept)
        } else {
            self.overflow.push_back(OverflowEntry { frame, on_accept });
            OfferOutcome::Queued
        }
    }

    /// Re-offers queued frames from the head, stopping at the first
    /// refusal.
    pub(crate) fn drain<T: FramedTransport>(&mut self, transport: &mut T) -> DrainOutcome {
        let was_occupied = !self.overflow.is_empty();
        let mut resolved = Vec::new();
        let mut accepted_frames = 0;
        while let Some(entry) = self.overflow.front() {
            if !transport.offer(&entry.frame) {
                break;
            }
            accepted_frames += 1;
            let entry = self.overflow.pop_front().expect("front just observed");
            if let Some(cb) = entry.on_accept {
                resolved.push(cb);
            }
        }
        DrainOutcome {
            resolved,
            accepted_frames,
            emptied: was_occupied && self.overflow.is_empty(),
        }
    }

    /// Empties the overflow, returning the accept callbacks of the dropped
    /// entries so the caller can fail them.
    pub(crate) fn clear(&mut self) -> Vec<OnDone<()>> {
        self.overflow
            .drain(..)
            .filter_map(|entry| entry.on_accept)
            .collect()
    }
}
