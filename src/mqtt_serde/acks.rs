//! The message-id-only acknowledgement packets: PUBACK, PUBREC, PUBREL,
//! PUBCOMP and UNSUBACK.
//!
//! All five share the same two-byte body; they differ only in packet type
//! and in PUBREL's reserved fixed-header flags (the protocol fixes its bits
//! 3..0 at 0b0010).

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::packet::{encode_frame, MqttPacket, PacketKind};
use crate::mqtt_serde::{put_u16, read_u16, ParseError};

macro_rules! id_only_packet {
    ($(#[$doc:meta])* $name:ident, $kind:ident, $flags:expr) => {
        $(#[$doc])*
        #[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
        #[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
        pub struct $name {
            /// Identifier of the packet being acknowledged.
            pub message_id: u16,
        }

        impl $name {
            pub fn new(message_id: u16) -> Self {
                Self { message_id }
            }

            pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
                encode_frame(PacketKind::$kind, $flags, |out| {
                    put_u16(out, self.message_id);
                    Ok(())
                })
            }

            pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<MqttPacket, ParseError> {
                if flags != $flags {
                    return Err(ParseError::Malformed(format!(
                        "{} has invalid fixed header flags: {:#04x}",
                        stringify!($kind),
                        flags
                    )));
                }
                if body.len() != 2 {
                    return Err(ParseError::Malformed(format!(
                        "{} body must be exactly 2 bytes",
                        stringify!($kind)
                    )));
                }
                let (message_id, _) = read_u16(body)?;
                Ok(MqttPacket::$kind($name::new(message_id)))
            }
        }
    };
}

id_only_packet!(
    /// Acknowledges a QoS 1 PUBLISH.
    MqttPubAck,
    PubAck,
    0x00
);

id_only_packet!(
    /// First acknowledgement of a QoS 2 PUBLISH.
    MqttPubRec,
    PubRec,
    0x00
);

id_only_packet!(
    /// Release of a QoS 2 exchange, answering PUBREC.
    MqttPubRel,
    PubRel,
    0x02
);

id_only_packet!(
    /// Final acknowledgement of a QoS 2 exchange.
    MqttPubComp,
    PubComp,
    0x00
);

id_only_packet!(
    /// Acknowledges an UNSUBSCRIBE.
    MqttUnsubAck,
    UnsubAck,
    0x00
);
