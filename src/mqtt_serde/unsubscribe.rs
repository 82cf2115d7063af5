use serde::{Deserialize, Serialize};

use crate::mqtt_serde::packet::{encode_frame, MqttPacket, PacketKind};
use crate::mqtt_serde::{put_string, put_u16, read_string, read_u16, ParseError};

/// The UNSUBSCRIBE packet.
///
/// Reserved fixed-header flags are 0b0010, like SUBSCRIBE.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttUnsubscribe {
    pub message_id: u16,
    pub topic_filters: Vec<String>,
}

impl MqttUnsubscribe {
    pub fn new(message_id: u16, topic_filters: Vec<String>) -> Self {
        Self {
            message_id,
            topic_filters,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        encode_frame(PacketKind::Unsubscribe, 0x02, |out| {
            put_u16(out, self.message_id);
            for filter in &self.topic_filters {
                put_string(out, filter);
            }
            Ok(())
        })
    }
}

pub(crate) fn decode(flags: u8, body: &[u8]) -> Result<MqttPacket, ParseError> {
    if flags != 0x02 {
        return Err(ParseError::Malformed(format!(
            "UNSUBSCRIBE has invalid fixed header flags: {:#04x}",
            flags
        )));
    }
    let (message_id, mut offset) = read_u16(body)?;
    let mut topic_filters = Vec::new();
    while offset < body.len() {
        let (filter, consumed) = read_string(&body[offset..])?;
        offset += consumed;
        topic_filters.push(filter);
    }
    if topic_filters.is_empty() {
        return Err(ParseError::Malformed(
            "UNSUBSCRIBE must carry at least one topic filter".to_string(),
        ));
    }
    Ok(MqttPacket::Unsubscribe(MqttUnsubscribe {
        message_id,
        topic_filters,
    }))
}
