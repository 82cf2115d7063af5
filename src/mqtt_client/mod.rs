//! The connection engine: public API, QoS state machines, backpressure and
//! keep-alive.

pub mod callback;
pub mod connection;
pub mod error;
pub mod transport;

mod heartbeat;
mod inflight;
mod message_id;
mod outbound;

pub use callback::{set_fault_hook, ConnectionListener, DeliveryAck, OnDone, Refiller};
pub use connection::MqttConnection;
pub use error::{ConnectionError, ConnectionResult};
pub use transport::{DispatchGuard, FramedTransport, TransportError};
