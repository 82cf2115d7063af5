//! The body-less control packets: PINGREQ, PINGRESP and DISCONNECT.

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::packet::{encode_frame, MqttPacket, PacketKind};
use crate::mqtt_serde::ParseError;

macro_rules! empty_packet {
    ($(#[$doc:meta])* $name:ident, $kind:ident) => {
        $(#[$doc])*
        #[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
        #[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
        pub struct $name {}

        impl $name {
            pub fn new() -> Self {
                Self {}
            }

            pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
                encode_frame(PacketKind::$kind, 0x00, |_| Ok(()))
            }

            pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<MqttPacket, ParseError> {
                if flags != 0x00 {
                    return Err(ParseError::Malformed(format!(
                        "{} has invalid fixed header flags: {:#04x}",
                        stringify!($kind),
                        flags
                    )));
                }
                if !body.is_empty() {
                    return Err(ParseError::Malformed(format!(
                        "{} must have an empty body",
                        stringify!($kind)
                    )));
                }
                Ok(MqttPacket::$kind($name {}))
            }
        }
    };
}

empty_packet!(
    /// Keep-alive probe sent by the client.
    MqttPingReq,
    PingReq
);

empty_packet!(
    /// Server's answer to PINGREQ.
    MqttPingResp,
    PingResp
);

empty_packet!(
    /// Clean session shutdown notice.
    MqttDisconnect,
    Disconnect
);
