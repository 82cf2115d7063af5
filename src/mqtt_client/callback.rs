//! Embedder-facing capabilities: operation callbacks, the message listener,
//! the refiller, and the process-wide fault hook.

use std::sync::OnceLock;

use super::error::{ConnectionError, ConnectionResult};

/// Completion callback for a single operation, invoked at most once.
pub type OnDone<T> = Box<dyn FnOnce(ConnectionResult<T>)>;

/// Callback invoked when the outbound overflow drains to empty, signalling
/// that the connection can accept more traffic. Errors are routed to the
/// fault hook and are not terminal.
pub type Refiller = Box<dyn FnMut() -> ConnectionResult<()>>;

/// The continuation stored with a pending request, tagged by the concrete
/// success payload its acknowledgement carries.
pub(crate) enum Completion {
    /// Resolves on PUBACK (QoS 1) or PUBCOMP (QoS 2).
    Publish(OnDone<()>),
    /// Resolves on SUBACK with the granted-QoS bytes.
    Subscribe(OnDone<Vec<u8>>),
    /// Resolves on UNSUBACK.
    Unsubscribe(OnDone<()>),
    /// Marks the pending DISCONNECT; resolution runs through the
    /// connection's teardown state rather than a stored callback.
    Teardown,
}

impl Completion {
    pub(crate) fn fail(self, error: &ConnectionError) {
        match self {
            Completion::Publish(cb) | Completion::Unsubscribe(cb) => cb(Err(error.clone())),
            Completion::Subscribe(cb) => cb(Err(error.clone())),
            Completion::Teardown => {}
        }
    }
}

/// Receiver for messages delivered by the server.
pub trait ConnectionListener {
    /// Called once per delivered PUBLISH, in transport order.
    ///
    /// The acknowledgement token must eventually be passed back to
    /// [`MqttConnection::acknowledge`] to release the exchange; for QoS 1/2
    /// this is what puts the PUBACK/PUBREC on the wire. Returning an error
    /// is terminal for the connection.
    ///
    /// [`MqttConnection::acknowledge`]: super::connection::MqttConnection::acknowledge
    fn on_message(
        &mut self,
        topic: String,
        payload: Vec<u8>,
        ack: DeliveryAck,
    ) -> ConnectionResult<()>;

    /// Terminal notification: the connection has failed and no further
    /// messages will arrive.
    fn on_failure(&mut self, error: &ConnectionError);
}

/// Move-only acknowledgement token handed to the listener with each
/// delivery.
///
/// Consuming it through [`MqttConnection::acknowledge`] releases the
/// exchange; the move-only shape is what enforces the at-most-once
/// acknowledgement contract.
///
/// [`MqttConnection::acknowledge`]: super::connection::MqttConnection::acknowledge
#[must_use = "deliveries must be acknowledged through MqttConnection::acknowledge"]
#[derive(Debug)]
pub struct DeliveryAck {
    pub(crate) reply: Option<AckReply>,
}

#[derive(Debug)]
pub(crate) enum AckReply {
    PubAck(u16),
    PubRec(u16),
}

impl DeliveryAck {
    pub(crate) fn none() -> Self {
        Self { reply: None }
    }

    pub(crate) fn puback(message_id: u16) -> Self {
        Self {
            reply: Some(AckReply::PubAck(message_id)),
        }
    }

    pub(crate) fn pubrec(message_id: u16) -> Self {
        Self {
            reply: Some(AckReply::PubRec(message_id)),
        }
    }
}

static FAULT_HOOK: OnceLock<Box<dyn Fn(&ConnectionError) + Send + Sync>> = OnceLock::new();

/// Installs the process-wide sink for stray errors raised by listener and
/// refiller callbacks. Returns `false` if a hook was already installed.
///
/// Without a hook, stray errors are recorded through `tracing::error!`.
pub fn set_fault_hook(hook: Box<dyn Fn(&ConnectionError) + Send + Sync>) -> bool {
    FAULT_HOOK.set(hook).is_ok()
}

pub(crate) fn report_fault(error: &ConnectionError) {
    match FAULT_HOOK.get() {
        Some(hook) => hook(error),
        None => tracing::error!(error = %error, "unhandled callback fault"),
    }
}
