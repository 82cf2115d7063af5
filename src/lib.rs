// SPDX-License-Identifier: MPL-2.0

//! A callback-driven MQTT 3.1 client connection engine.
//!
//! This crate implements the protocol core that sits above an
//! already-established framed transport: the QoS 0/1/2 handshakes,
//! message-id allocation, keep-alive, outbound backpressure, and failure
//! propagation. Connection establishment (TCP/TLS/WebSocket and the
//! CONNECT/CONNACK exchange) is the embedder's job; the engine receives a
//! connected transport and drives everything after that.
//!
//! # Architecture
//!
//! The engine is a single-threaded state machine owned by one serial
//! execution context (usually the transport's event loop):
//! - **Input**:
//!     - Decoded frames from the transport ([`MqttConnection::process_packet`]).
//!     - Refill signals when the transport can accept more frames
//!       ([`MqttConnection::handle_refill`]).
//!     - Time ticks for keep-alive ([`MqttConnection::handle_tick`]).
//!     - Application commands: `publish`, `subscribe`, `unsubscribe`,
//!       `disconnect`.
//! - **Output**:
//!     - Frames offered to the transport.
//!     - Completion callbacks resolved as acks arrive.
//!     - Message deliveries to the installed listener.
//!
//! No operation blocks: apparent suspension is a stored continuation (a
//! pending completion, the refiller, a delivery-acknowledgement token)
//! resumed by a later event.
//!
//! [`MqttConnection::process_packet`]: mqtt_client::MqttConnection::process_packet
//! [`MqttConnection::handle_refill`]: mqtt_client::MqttConnection::handle_refill
//! [`MqttConnection::handle_tick`]: mqtt_client::MqttConnection::handle_tick

pub mod mqtt_client;
pub mod mqtt_serde;
