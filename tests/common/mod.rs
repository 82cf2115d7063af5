//! Scripted transport and recording listener shared by the integration
//! suites.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mqlink::mqtt_client::{
    ConnectionError, ConnectionListener, ConnectionResult, DeliveryAck, FramedTransport, OnDone,
};
use mqlink::mqtt_serde::packet::{MqttPacket, PacketKind};

/// Shared handles into a [`MockTransport`], kept by the test while the
/// transport itself is owned by the connection.
#[derive(Clone)]
pub struct TransportProbe {
    pub wire: Rc<RefCell<Vec<MqttPacket>>>,
    pub accepting: Rc<Cell<bool>>,
    /// When set, only this many further offers are accepted.
    pub accept_budget: Rc<Cell<Option<usize>>>,
    pub stop_count: Rc<Cell<usize>>,
    pub read_suspended: Rc<Cell<bool>>,
}

impl TransportProbe {
    pub fn wire_kinds(&self) -> Vec<PacketKind> {
        self.wire.borrow().iter().map(|p| p.kind()).collect()
    }

    pub fn take_wire(&self) -> Vec<MqttPacket> {
        self.wire.borrow_mut().drain(..).collect()
    }

    pub fn refuse_offers(&self) {
        self.accepting.set(false);
    }

    pub fn accept_offers(&self) {
        self.accepting.set(true);
    }
}

pub struct MockTransport {
    probe: TransportProbe,
}

impl MockTransport {
    pub fn new() -> (Self, TransportProbe) {
        let probe = TransportProbe {
            wire: Rc::new(RefCell::new(Vec::new())),
            accepting: Rc::new(Cell::new(true)),
            accept_budget: Rc::new(Cell::new(None)),
            stop_count: Rc::new(Cell::new(0)),
            read_suspended: Rc::new(Cell::new(false)),
        };
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl FramedTransport for MockTransport {
    fn offer(&mut self, frame: &MqttPacket) -> bool {
        if !self.probe.accepting.get() {
            return false;
        }
        if let Some(budget) = self.probe.accept_budget.get() {
            if budget == 0 {
                return false;
            }
            self.probe.accept_budget.set(Some(budget - 1));
        }
        self.probe.wire.borrow_mut().push(frame.clone());
        true
    }

    fn full(&self) -> bool {
        !self.probe.accepting.get()
    }

    fn suspend_read(&mut self) {
        self.probe.read_suspended.set(true);
    }

    fn resume_read(&mut self) {
        self.probe.read_suspended.set(false);
    }

    fn stop(&mut self, on_stopped: Box<dyn FnOnce()>) {
        self.probe.stop_count.set(self.probe.stop_count.get() + 1);
        on_stopped();
    }
}

/// Shared handles into a [`RecordingListener`].
#[derive(Clone)]
pub struct ListenerProbe {
    pub messages: Rc<RefCell<Vec<(String, Vec<u8>)>>>,
    /// Acknowledgement tokens parked here until the test feeds them back.
    pub acks: Rc<RefCell<Vec<DeliveryAck>>>,
    pub failures: Rc<RefCell<Vec<ConnectionError>>>,
    /// When set, the next delivery reports an error.
    pub fail_next_delivery: Rc<Cell<bool>>,
}

pub struct RecordingListener {
    probe: ListenerProbe,
}

impl RecordingListener {
    pub fn new() -> (Self, ListenerProbe) {
        let probe = ListenerProbe {
            messages: Rc::new(RefCell::new(Vec::new())),
            acks: Rc::new(RefCell::new(Vec::new())),
            failures: Rc::new(RefCell::new(Vec::new())),
            fail_next_delivery: Rc::new(Cell::new(false)),
        };
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl ConnectionListener for RecordingListener {
    fn on_message(
        &mut self,
        topic: String,
        payload: Vec<u8>,
        ack: DeliveryAck,
    ) -> ConnectionResult<()> {
        if self.probe.fail_next_delivery.get() {
            self.probe.fail_next_delivery.set(false);
            return Err(ConnectionError::Delivery {
                message: "listener rejected message".to_string(),
            });
        }
        self.probe.messages.borrow_mut().push((topic, payload));
        self.probe.acks.borrow_mut().push(ack);
        Ok(())
    }

    fn on_failure(&mut self, error: &ConnectionError) {
        self.probe.failures.borrow_mut().push(error.clone());
    }
}

/// A completion callback that records its results for later assertions.
pub fn done_sink<V: 'static>() -> (Rc<RefCell<Vec<ConnectionResult<V>>>>, OnDone<V>) {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let handle = sink.clone();
    (sink, Box::new(move |result| handle.borrow_mut().push(result)))
}
