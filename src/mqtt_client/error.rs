// SPDX-License-Identifier: MPL-2.0

//! Error types for the connection engine.
//!
//! The taxonomy distinguishes terminal failures (which tear the connection
//! down through the failure path) from usage errors that are reported on the
//! offending operation's own callback.

use std::fmt;
use std::io;

use crate::mqtt_serde::ParseError;

/// Errors surfaced by the connection engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum ConnectionError {
    /// I/O failure reported by the transport.
    Transport {
        #[serde(skip)]
        kind: io::ErrorKind,
        message: String,
    },

    /// The server violated the protocol contract.
    Protocol { message: String },

    /// An acknowledgement referenced a message id with no pending request.
    InvalidMessageId { message_id: u16 },

    /// The server sent a packet type the engine never expects.
    UnexpectedPacket { packet_type: u8 },

    /// An inbound frame could not be decoded.
    MalformedFrame {
        parse_error: String,
        /// Leading bytes of the offending frame, for diagnostics.
        raw_data: Vec<u8>,
    },

    /// No PINGRESP arrived within the keep-alive window.
    PingTimeout,

    /// A subscription was attempted before a listener was installed;
    /// deliveries would be silently lost.
    ListenerNotSet,

    /// Operation attempted in a connection state that cannot serve it.
    InvalidState { message: String },

    /// The listener reported a delivery error.
    Delivery { message: String },
}

impl ConnectionError {
    /// Terminal errors tear down the connection: every pending callback
    /// fails and no further frames are sent.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ListenerNotSet | Self::InvalidState { .. })
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn from_io_error(error: io::Error, context: &str) -> Self {
        Self::Transport {
            kind: error.kind(),
            message: format!("{}: {}", context, error),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { kind, message } => {
                write!(f, "transport failure ({:?}): {}", kind, message)
            }
            Self::Protocol { message } => write!(f, "protocol violation: {}", message),
            Self::InvalidMessageId { message_id } => write!(
                f,
                "command from server contained an invalid message id: {}",
                message_id
            ),
            Self::UnexpectedPacket { packet_type } => {
                write!(f, "unexpected MQTT command type: {}", packet_type)
            }
            Self::MalformedFrame {
                parse_error,
                raw_data,
            } => {
                let preview = if raw_data.len() > 20 {
                    format!("{}... ({} bytes)", hex::encode(&raw_data[..20]), raw_data.len())
                } else {
                    hex::encode(raw_data)
                };
                write!(f, "malformed frame: {} (data: {})", parse_error, preview)
            }
            Self::PingTimeout => write!(f, "ping timeout"),
            Self::ListenerNotSet => write!(
                f,
                "no connection listener set to handle messages received from the server"
            ),
            Self::InvalidState { message } => write!(f, "invalid state: {}", message),
            Self::Delivery { message } => write!(f, "message delivery failed: {}", message),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        Self::Transport {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<ParseError> for ConnectionError {
    fn from(error: ParseError) -> Self {
        Self::MalformedFrame {
            parse_error: error.to_string(),
            raw_data: Vec::new(),
        }
    }
}

/// Type alias for results carrying a [`ConnectionError`].
pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(ConnectionError::PingTimeout.is_terminal());
        assert!(ConnectionError::protocol("x").is_terminal());
        assert!(ConnectionError::InvalidMessageId { message_id: 9 }.is_terminal());
        assert!(!ConnectionError::ListenerNotSet.is_terminal());
    }

    #[test]
    fn test_from_io_error() {
        let err = ConnectionError::from_io_error(
            io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"),
            "write",
        );
        match err {
            ConnectionError::Transport { kind, message } => {
                assert_eq!(kind, io::ErrorKind::ConnectionReset);
                assert!(message.contains("write"));
            }
            other => panic!("expected Transport, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frame_preview() {
        let err = ConnectionError::MalformedFrame {
            parse_error: "bad flags".to_string(),
            raw_data: vec![0x41, 0x02],
        };
        assert_eq!(
            err.to_string(),
            "malformed frame: bad flags (data: 4102)"
        );
    }

    #[test]
    fn test_display_invalid_id() {
        let err = ConnectionError::InvalidMessageId { message_id: 77 };
        assert_eq!(
            err.to_string(),
            "command from server contained an invalid message id: 77"
        );
    }
}
