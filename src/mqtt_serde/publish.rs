use serde::{Deserialize, Serialize};

use crate::mqtt_serde::packet::{encode_frame, MqttPacket, PacketKind};
use crate::mqtt_serde::{put_string, put_u16, read_string, read_u16, ParseError};

/// The PUBLISH packet: transports one application message in either
/// direction.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttPublish {
    pub dup: bool,
    pub qos: u8,
    pub retain: bool,
    pub topic_name: String,
    /// Present only for QoS 1 and 2.
    pub message_id: Option<u16>,
    pub payload: Vec<u8>,
}

impl MqttPublish {
    pub fn new(
        topic_name: String,
        qos: u8,
        payload: Vec<u8>,
        message_id: Option<u16>,
        retain: bool,
        dup: bool,
    ) -> Self {
        Self {
            dup,
            qos,
            retain,
            topic_name,
            message_id,
            payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        let flags = (self.dup as u8) << 3 | self.qos << 1 | self.retain as u8;
        encode_frame(PacketKind::Publish, flags, |out| {
            put_string(out, &self.topic_name);
            if self.qos > 0 {
                let id = self.message_id.ok_or_else(|| {
                    ParseError::Malformed("message id is required for QoS > 0".to_string())
                })?;
                put_u16(out, id);
            }
            out.extend_from_slice(&self.payload);
            Ok(())
        })
    }
}

pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<MqttPacket, ParseError> {
    let dup = flags & 0x08 != 0;
    let qos = (flags & 0x06) >> 1;
    let retain = flags & 0x01 != 0;
    if qos > 2 {
        return Err(ParseError::Malformed("invalid QoS level: 3".to_string()));
    }

    let (topic_name, mut offset) = read_string(body)?;
    let message_id = if qos > 0 {
        let (id, consumed) = read_u16(&body[offset..]).map_err(|_| {
            ParseError::Malformed("missing message id for QoS > 0".to_string())
        })?;
        offset += consumed;
        Some(id)
    } else {
        None
    };
    let payload = body[offset..].to_vec();

    Ok(MqttPacket::Publish(MqttPublish {
        dup,
        qos,
        retain,
        topic_name,
        message_id,
        payload,
    }))
}
