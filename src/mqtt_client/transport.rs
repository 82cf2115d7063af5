// SPDX-License-Identifier: MPL-2.0

//! The framed-transport collaborator contract and the execution-context
//! guard.

use std::io;
use std::thread::{self, ThreadId};

use super::error::ConnectionError;
use crate::mqtt_serde::packet::MqttPacket;
use crate::mqtt_serde::ParseError;

/// Error type for transport operations, converted into a terminal
/// connection failure when reported through
/// [`MqttConnection::handle_transport_failure`].
///
/// [`MqttConnection::handle_transport_failure`]: super::connection::MqttConnection::handle_transport_failure
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("malformed inbound frame: {0}")]
    Frame(#[from] ParseError),
}

impl From<TransportError> for ConnectionError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Io(e) => ConnectionError::from(e),
            TransportError::ConnectionLost(reason) => ConnectionError::Transport {
                kind: io::ErrorKind::ConnectionReset,
                message: reason,
            },
            TransportError::Frame(e) => ConnectionError::from(e),
        }
    }
}

/// A connected, authenticated transport that exchanges whole MQTT frames.
///
/// Implementations own framing (length-prefix assembly of the byte stream)
/// and deliver decoded packets to [`MqttConnection::process_packet`] on the
/// connection's execution context. Beyond the methods here, the contract
/// includes two signals the embedder must wire up: a refill signal
/// (forwarded to `handle_refill`) emitted whenever the write side drains,
/// and a failure signal (forwarded to `handle_transport_failure`).
///
/// [`MqttConnection::process_packet`]: super::connection::MqttConnection::process_packet
pub trait FramedTransport {
    /// Non-blocking write attempt. Returns `false` when the transport
    /// cannot take the frame right now; a refill signal follows once it
    /// can.
    fn offer(&mut self, frame: &MqttPacket) -> bool;

    /// Whether `offer` would currently refuse.
    fn full(&self) -> bool;

    /// Pause inbound frame delivery.
    fn suspend_read(&mut self);

    /// Resume inbound frame delivery.
    fn resume_read(&mut self);

    /// Flush and close the transport, invoking `on_stopped` once shutdown
    /// has completed.
    fn stop(&mut self, on_stopped: Box<dyn FnOnce()>);

    /// Identifies the serial execution context that owns this transport's
    /// callbacks. The connection captures it at construction and asserts
    /// it on every entry point.
    fn dispatch_guard(&self) -> DispatchGuard {
        DispatchGuard::for_current_thread()
    }
}

/// Identity of the single execution context allowed to drive a connection.
///
/// All public connection methods, transport callbacks and timer ticks must
/// run on this context; anything else is a contract violation, caught by
/// [`DispatchGuard::assert_executing`].
#[derive(Debug, Clone)]
pub struct DispatchGuard {
    owner: ThreadId,
}

impl DispatchGuard {
    pub fn for_current_thread() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    /// Panics when called from any context other than the owning one.
    pub fn assert_executing(&self) {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "connection driven from outside its owning execution context"
        );
    }
}
