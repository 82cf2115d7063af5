// SPDX-License-Identifier: MPL-2.0

//! The connection core: public API, QoS flows, and failure propagation.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::callback::{
    report_fault, AckReply, Completion, ConnectionListener, DeliveryAck, OnDone, Refiller,
};
use super::error::ConnectionError;
use super::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use super::inflight::{InflightTable, PendingRequest};
use super::message_id::MessageIdAllocator;
use super::outbound::{OfferOutcome, OutboundQueue};
use super::transport::{DispatchGuard, FramedTransport, TransportError};
use crate::mqtt_serde::acks::{MqttPubAck, MqttPubComp, MqttPubRec, MqttPubRel};
use crate::mqtt_serde::packet::{MqttPacket, PacketKind, QoS};
use crate::mqtt_serde::publish::MqttPublish;
use crate::mqtt_serde::signals::{MqttDisconnect, MqttPingReq};
use crate::mqtt_serde::subscribe::{MqttSubscribe, SubscriptionTopic};
use crate::mqtt_serde::unsubscribe::MqttUnsubscribe;

/// What an acknowledgement packet carries for the pending request.
enum AckPayload {
    None,
    GrantedQos(Vec<u8>),
}

/// DISCONNECT teardown progress.
///
/// `Draining` covers the window between creating the DISCONNECT request and
/// the transport having flushed it; entering `Stopped` is what fires the
/// transport stop, so the stop action runs at most once.
#[derive(Debug, Clone, Copy)]
enum Teardown {
    Active,
    Draining { request_id: u16 },
    Stopped,
}

/// A callback-driven MQTT 3.1 connection over an established framed
/// transport.
///
/// All methods must be invoked on the connection's owning execution context
/// (the one running the transport's callbacks); this is asserted at every
/// entry point. The embedder wires the transport's events to
/// [`process_packet`](Self::process_packet),
/// [`handle_refill`](Self::handle_refill) and
/// [`handle_transport_failure`](Self::handle_transport_failure), and drives
/// the keep-alive clock through [`handle_tick`](Self::handle_tick) /
/// [`next_tick_at`](Self::next_tick_at).
pub struct MqttConnection<T: FramedTransport> {
    transport: T,
    guard: DispatchGuard,
    listener: Option<Box<dyn ConnectionListener>>,
    refiller: Option<Refiller>,
    inflight: InflightTable,
    outbound: OutboundQueue,
    ids: MessageIdAllocator,
    heartbeat: Option<HeartbeatMonitor>,
    failure: Option<ConnectionError>,
    connected: bool,
    teardown: Teardown,
    on_disconnected: Option<OnDone<()>>,
}

impl<T: FramedTransport> MqttConnection<T> {
    /// Wraps a connected transport. A zero `keep_alive` disables the
    /// heartbeat entirely.
    pub fn new(transport: T, keep_alive: Duration) -> Self {
        let guard = transport.dispatch_guard();
        let heartbeat =
            (!keep_alive.is_zero()).then(|| HeartbeatMonitor::new(keep_alive, Instant::now()));
        Self {
            transport,
            guard,
            listener: None,
            refiller: None,
            inflight: InflightTable::new(),
            outbound: OutboundQueue::new(),
            ids: MessageIdAllocator::new(),
            heartbeat,
            failure: None,
            connected: true,
            teardown: Teardown::Active,
            on_disconnected: None,
        }
    }

    /// Installs the receiver for server-originated messages.
    pub fn listener(&mut self, listener: Box<dyn ConnectionListener>) {
        self.guard.assert_executing();
        self.listener = Some(listener);
    }

    /// Installs the callback invoked when the outbound overflow drains.
    pub fn refiller(&mut self, refiller: Refiller) {
        self.guard.assert_executing();
        self.refiller = Some(refiller);
    }

    /// Whether the transport currently refuses offers.
    pub fn full(&self) -> bool {
        self.guard.assert_executing();
        self.transport.full()
    }

    /// The terminal failure, if the connection has failed.
    pub fn failure(&self) -> Option<&ConnectionError> {
        self.guard.assert_executing();
        self.failure.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Pauses inbound delivery, together with the heartbeat's read side.
    pub fn suspend(&mut self) {
        self.guard.assert_executing();
        self.transport.suspend_read();
        if let Some(hb) = self.heartbeat.as_mut() {
            hb.suspend_read();
        }
    }

    /// Resumes inbound delivery and the heartbeat's read side.
    pub fn resume(&mut self) {
        self.guard.assert_executing();
        self.transport.resume_read();
        if let Some(hb) = self.heartbeat.as_mut() {
            hb.resume_read(Instant::now());
        }
    }

    /// Publishes `payload` to `topic`.
    ///
    /// `on_done` resolves when the delivery guarantee is met: transport
    /// acceptance for QoS 0, PUBACK for QoS 1, PUBCOMP for QoS 2.
    pub fn publish(
        &mut self,
        topic: impl Into<String>,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        on_done: OnDone<()>,
    ) {
        self.guard.assert_executing();
        if let Some(error) = &self.failure {
            on_done(Err(error.clone()));
            return;
        }
        match qos {
            QoS::AtMostOnce => {
                let frame = MqttPacket::Publish(MqttPublish::new(
                    topic.into(),
                    0,
                    payload,
                    None,
                    retain,
                    false,
                ));
                self.offer_frame(frame, Some(on_done));
            }
            QoS::AtLeastOnce | QoS::ExactlyOnce => {
                let id = self.ids.next_id();
                let frame = MqttPacket::Publish(MqttPublish::new(
                    topic.into(),
                    qos.as_u8(),
                    payload,
                    Some(id),
                    retain,
                    false,
                ));
                self.track_request(id, frame, Completion::Publish(on_done));
            }
        }
    }

    /// Requests the given subscriptions. `on_done` resolves on SUBACK with
    /// the granted-QoS byte per filter.
    ///
    /// Fails synchronously when no listener is installed: messages matching
    /// the subscription would be silently lost.
    pub fn subscribe(&mut self, topics: Vec<SubscriptionTopic>, on_done: OnDone<Vec<u8>>) {
        self.guard.assert_executing();
        if self.listener.is_none() {
            on_done(Err(ConnectionError::ListenerNotSet));
            return;
        }
        if let Some(error) = &self.failure {
            on_done(Err(error.clone()));
            return;
        }
        let id = self.ids.next_id();
        let frame = MqttPacket::Subscribe(MqttSubscribe::new(id, topics));
        self.track_request(id, frame, Completion::Subscribe(on_done));
    }

    /// Removes the given subscriptions. `on_done` resolves on UNSUBACK.
    pub fn unsubscribe(&mut self, topic_filters: Vec<String>, on_done: OnDone<()>) {
        self.guard.assert_executing();
        if let Some(error) = &self.failure {
            on_done(Err(error.clone()));
            return;
        }
        let id = self.ids.next_id();
        let frame = MqttPacket::Unsubscribe(MqttUnsubscribe::new(id, topic_filters));
        self.track_request(id, frame, Completion::Unsubscribe(on_done));
    }

    /// Sends DISCONNECT, waits for it to reach the wire, then stops the
    /// transport. `on_complete` resolves with success once the transport
    /// reports the stop finished, even when the drain was cut short by a
    /// failure.
    pub fn disconnect(&mut self, on_complete: OnDone<()>) {
        self.guard.assert_executing();
        if let Some(error) = &self.failure {
            on_complete(Err(error.clone()));
            return;
        }
        if !matches!(self.teardown, Teardown::Active) {
            on_complete(Err(ConnectionError::InvalidState {
                message: "disconnect already in progress".to_string(),
            }));
            return;
        }
        self.connected = false;
        let request_id = self.ids.next_id();
        let frame = MqttPacket::Disconnect(MqttDisconnect::new());
        // Registered as a pending request so a failure while draining still
        // reaches the stop path.
        self.inflight
            .insert(request_id, PendingRequest::new(frame.clone(), Completion::Teardown));
        self.on_disconnected = Some(on_complete);
        self.teardown = Teardown::Draining { request_id };
        self.offer_frame(frame, None);
    }

    /// Releases a delivery: puts the PUBACK/PUBREC for it on the wire.
    pub fn acknowledge(&mut self, ack: DeliveryAck) {
        self.guard.assert_executing();
        match ack.reply {
            None => {}
            Some(AckReply::PubAck(id)) => {
                self.offer_frame(MqttPacket::PubAck(MqttPubAck::new(id)), None)
            }
            Some(AckReply::PubRec(id)) => {
                self.inflight.finish_delivery(id);
                self.offer_frame(MqttPacket::PubRec(MqttPubRec::new(id)), None);
            }
        }
    }

    /// Entry point for decoded frames arriving from the transport.
    pub fn process_packet(&mut self, packet: MqttPacket) {
        self.guard.assert_executing();
        if self.failure.is_some() {
            return;
        }
        trace!(kind = %packet.kind(), "inbound frame");
        match packet {
            MqttPacket::Publish(publish) => self.deliver(publish),
            MqttPacket::PubAck(ack) => {
                self.complete_request(ack.message_id, PacketKind::Publish, AckPayload::None)
            }
            MqttPacket::PubRec(ack) => {
                // Stateless on purpose: a duplicate PUBREC after our PUBREL
                // must produce another PUBREL.
                self.offer_frame(MqttPacket::PubRel(MqttPubRel::new(ack.message_id)), None);
            }
            MqttPacket::PubComp(ack) => {
                self.complete_request(ack.message_id, PacketKind::Publish, AckPayload::None)
            }
            MqttPacket::PubRel(rel) => {
                self.inflight.release(rel.message_id);
                self.offer_frame(MqttPacket::PubComp(MqttPubComp::new(rel.message_id)), None);
            }
            MqttPacket::SubAck(ack) => self.complete_request(
                ack.message_id,
                PacketKind::Subscribe,
                AckPayload::GrantedQos(ack.granted_qos),
            ),
            MqttPacket::UnsubAck(ack) => {
                self.complete_request(ack.message_id, PacketKind::Unsubscribe, AckPayload::None)
            }
            MqttPacket::PingResp(_) => {
                if let Some(hb) = self.heartbeat.as_mut() {
                    hb.on_pingresp();
                }
            }
            other => self.process_failure(ConnectionError::UnexpectedPacket {
                packet_type: other.kind() as u8,
            }),
        }
    }

    /// Entry point for the transport's refill signal.
    pub fn handle_refill(&mut self) {
        self.guard.assert_executing();
        let outcome = self.outbound.drain(&mut self.transport);
        if outcome.accepted_frames > 0 {
            self.note_write();
        }
        for cb in outcome.resolved {
            cb(Ok(()));
        }
        if !self.outbound.is_empty() {
            return;
        }
        if matches!(self.teardown, Teardown::Draining { .. }) {
            // DISCONNECT has reached the wire; nothing further to flush.
            self.run_stop();
        } else if outcome.emptied {
            self.run_refiller();
        }
    }

    /// Entry point for transport-reported failures.
    pub fn handle_transport_failure(&mut self, error: TransportError) {
        self.guard.assert_executing();
        self.process_failure(error.into());
    }

    /// Runs the keep-alive clock. Call at (or after) the deadline reported
    /// by [`next_tick_at`](Self::next_tick_at).
    pub fn handle_tick(&mut self, now: Instant) {
        self.guard.assert_executing();
        if self.failure.is_some() {
            return;
        }
        let Some(action) = self.heartbeat.as_ref().map(|hb| hb.on_tick(now)) else {
            return;
        };
        match action {
            HeartbeatAction::Idle => {}
            HeartbeatAction::SendPing => {
                // Offered straight to the transport; a refusal just means
                // other traffic is already keeping the link busy.
                if self.connected
                    && self.transport.offer(&MqttPacket::PingReq(MqttPingReq::new()))
                {
                    trace!("keep-alive ping issued");
                    if let Some(hb) = self.heartbeat.as_mut() {
                        hb.mark_pinged(now);
                    }
                }
            }
            HeartbeatAction::PingTimeout => {
                self.process_failure(ConnectionError::PingTimeout)
            }
        }
    }

    /// The next instant at which [`handle_tick`](Self::handle_tick) has
    /// work to do, or `None` when no timer is armed.
    pub fn next_tick_at(&self) -> Option<Instant> {
        self.guard.assert_executing();
        if !self.connected || self.failure.is_some() {
            return None;
        }
        self.heartbeat.as_ref().and_then(|hb| hb.next_deadline())
    }

    fn track_request(&mut self, id: u16, frame: MqttPacket, completion: Completion) {
        self.inflight
            .insert(id, PendingRequest::new(frame.clone(), completion));
        self.offer_frame(frame, None);
    }

    /// Single choke point for outbound frames: enforces the no-frames-after-
    /// failure rule and FIFO order across the overflow.
    fn offer_frame(&mut self, frame: MqttPacket, on_accept: Option<OnDone<()>>) {
        if let Some(error) = &self.failure {
            if let Some(cb) = on_accept {
                cb(Err(error.clone()));
            }
            return;
        }
        match self.outbound.offer(&mut self.transport, frame, on_accept) {
            OfferOutcome::Accepted(cb) => {
                self.note_write();
                if let Some(cb) = cb {
                    cb(Ok(()));
                }
            }
            OfferOutcome::Queued => {}
        }
    }

    fn note_write(&mut self) {
        if let Some(hb) = self.heartbeat.as_mut() {
            hb.note_write(Instant::now());
        }
    }

    fn complete_request(&mut self, id: u16, expected: PacketKind, payload: AckPayload) {
        let Some(request) = self.inflight.take(id) else {
            self.process_failure(ConnectionError::InvalidMessageId { message_id: id });
            return;
        };
        if request.frame.kind() != expected {
            let error = ConnectionError::protocol(format!(
                "acknowledgement for message id {} targets a pending {} request, expected {}",
                id,
                request.frame.kind(),
                expected
            ));
            request.completion.fail(&error);
            self.process_failure(error);
            return;
        }
        match (request.completion, payload) {
            (Completion::Publish(cb), AckPayload::None) => cb(Ok(())),
            (Completion::Subscribe(cb), AckPayload::GrantedQos(granted)) => cb(Ok(granted)),
            (Completion::Unsubscribe(cb), AckPayload::None) => cb(Ok(())),
            (completion, _) => {
                let error = ConnectionError::protocol(format!(
                    "acknowledgement for message id {} does not match its pending request",
                    id
                ));
                completion.fail(&error);
                self.process_failure(error);
            }
        }
    }

    fn deliver(&mut self, publish: MqttPublish) {
        if self.listener.is_none() {
            report_fault(&ConnectionError::ListenerNotSet);
            return;
        }
        let ack = match publish.qos {
            0 => DeliveryAck::none(),
            1 => match publish.message_id {
                Some(id) => DeliveryAck::puback(id),
                None => {
                    self.process_failure(ConnectionError::protocol(
                        "QoS 1 PUBLISH without a message id",
                    ));
                    return;
                }
            },
            2 => {
                let Some(id) = publish.message_id else {
                    self.process_failure(ConnectionError::protocol(
                        "QoS 2 PUBLISH without a message id",
                    ));
                    return;
                };
                if self.inflight.is_processed(id) || !self.inflight.begin_delivery(id) {
                    // A duplicate, either of an exchange already answered or
                    // one racing the listener's acknowledgement. Every
                    // duplicate gets a PUBREC on the wire; the listener is
                    // never re-invoked for a live id.
                    debug!(message_id = id, "duplicate QoS 2 publish, re-sending PUBREC");
                    self.offer_frame(MqttPacket::PubRec(MqttPubRec::new(id)), None);
                    return;
                }
                DeliveryAck::pubrec(id)
            }
            other => {
                self.process_failure(ConnectionError::protocol(format!(
                    "invalid QoS level on inbound PUBLISH: {}",
                    other
                )));
                return;
            }
        };
        let listener = self.listener.as_mut().expect("listener presence checked");
        if let Err(error) = listener.on_message(publish.topic_name, publish.payload, ack) {
            self.process_failure(error);
        }
    }

    /// First failure wins: fails every pending request and overflow entry
    /// exactly once, notifies the listener, and blocks all further traffic.
    fn process_failure(&mut self, error: ConnectionError) {
        if self.failure.is_some() {
            return;
        }
        warn!(error = %error, "connection failed");
        self.failure = Some(error.clone());
        for request in self.inflight.drain_all() {
            match request.completion {
                Completion::Teardown => {}
                completion => completion.fail(&error),
            }
        }
        for cb in self.outbound.clear() {
            cb(Err(error.clone()));
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.on_failure(&error);
        }
        // A teardown in progress still owes the embedder a transport stop.
        if matches!(self.teardown, Teardown::Draining { .. }) {
            self.run_stop();
        }
    }

    fn run_stop(&mut self) {
        let Teardown::Draining { request_id } = self.teardown else {
            return;
        };
        self.teardown = Teardown::Stopped;
        self.inflight.take(request_id);
        debug!("stopping transport after disconnect");
        let on_complete = self.on_disconnected.take();
        self.transport.stop(Box::new(move || {
            if let Some(cb) = on_complete {
                cb(Ok(()));
            }
        }));
    }

    fn run_refiller(&mut self) {
        if let Some(refiller) = self.refiller.as_mut() {
            if let Err(error) = refiller() {
                report_fault(&error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_serde::subscribe::MqttSubAck;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct StubTransport {
        accepting: bool,
        wire: Vec<MqttPacket>,
    }

    impl StubTransport {
        fn new() -> Self {
            Self {
                accepting: true,
                wire: Vec::new(),
            }
        }
    }

    impl FramedTransport for StubTransport {
        fn offer(&mut self, frame: &MqttPacket) -> bool {
            if !self.accepting {
                return false;
            }
            self.wire.push(frame.clone());
            true
        }

        fn full(&self) -> bool {
            !self.accepting
        }

        fn suspend_read(&mut self) {}
        fn resume_read(&mut self) {}
        fn stop(&mut self, on_stopped: Box<dyn FnOnce()>) {
            on_stopped();
        }
    }

    fn results_sink<V: 'static>() -> (Rc<RefCell<Vec<Result<V, ConnectionError>>>>, OnDone<V>) {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let handle = sink.clone();
        (sink, Box::new(move |r| handle.borrow_mut().push(r)))
    }

    #[test]
    fn test_ack_for_unknown_id_is_terminal() {
        let mut conn = MqttConnection::new(StubTransport::new(), Duration::ZERO);
        conn.process_packet(MqttPacket::PubAck(MqttPubAck::new(3)));
        assert!(matches!(
            conn.failure(),
            Some(ConnectionError::InvalidMessageId { message_id: 3 })
        ));
    }

    #[test]
    fn test_mismatched_ack_fails_its_request_and_connection() {
        let mut conn = MqttConnection::new(StubTransport::new(), Duration::ZERO);
        let (results, cb) = results_sink::<()>();
        conn.publish("t", b"p".to_vec(), QoS::AtLeastOnce, false, cb);

        // The server answers the PUBLISH id with a SUBACK.
        conn.process_packet(MqttPacket::SubAck(MqttSubAck::new(1, vec![0])));
        assert_eq!(results.borrow().len(), 1);
        assert!(results.borrow()[0].is_err());
        assert!(matches!(conn.failure(), Some(ConnectionError::Protocol { .. })));
    }

    #[test]
    fn test_frames_dropped_after_failure() {
        let mut conn = MqttConnection::new(StubTransport::new(), Duration::ZERO);
        conn.process_packet(MqttPacket::PubAck(MqttPubAck::new(9)));
        assert!(conn.failure().is_some());

        let wire_before = conn.transport().wire.len();
        let (results, cb) = results_sink::<()>();
        conn.publish("t", Vec::new(), QoS::AtMostOnce, false, cb);
        assert_eq!(conn.transport().wire.len(), wire_before);
        assert!(results.borrow()[0].is_err());
    }

    #[test]
    fn test_inbound_frames_ignored_after_failure() {
        let mut conn = MqttConnection::new(StubTransport::new(), Duration::ZERO);
        conn.process_packet(MqttPacket::PubAck(MqttPubAck::new(9)));
        let wire_before = conn.transport().wire.len();

        // A PUBREC would normally trigger a PUBREL response.
        conn.process_packet(MqttPacket::PubRec(MqttPubRec::new(1)));
        assert_eq!(conn.transport().wire.len(), wire_before);
    }

    #[test]
    fn test_unexpected_packet_type_is_terminal() {
        let mut conn = MqttConnection::new(StubTransport::new(), Duration::ZERO);
        conn.process_packet(MqttPacket::PingReq(MqttPingReq::new()));
        assert!(matches!(
            conn.failure(),
            Some(ConnectionError::UnexpectedPacket { packet_type: 12 })
        ));
    }
}
