//! SUBSCRIBE and its acknowledgement SUBACK.

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::packet::{encode_frame, MqttPacket, PacketKind, QoS};
use crate::mqtt_serde::{put_string, put_u16, read_string, read_u16, ParseError};

/// One requested subscription inside a SUBSCRIBE packet.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct SubscriptionTopic {
    pub topic_filter: String,
    pub qos: u8,
}

impl SubscriptionTopic {
    pub fn new(topic_filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos: qos.as_u8(),
        }
    }
}

/// The SUBSCRIBE packet.
///
/// Reserved fixed-header flags are 0b0010, and the payload must carry at
/// least one topic filter.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttSubscribe {
    pub message_id: u16,
    pub subscriptions: Vec<SubscriptionTopic>,
}

impl MqttSubscribe {
    pub fn new(message_id: u16, subscriptions: Vec<SubscriptionTopic>) -> Self {
        Self {
            message_id,
            subscriptions,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        encode_frame(PacketKind::Subscribe, 0x02, |out| {
            put_u16(out, self.message_id);
            for sub in &self.subscriptions {
                if sub.qos > 2 {
                    return Err(ParseError::Malformed(format!(
                        "invalid requested QoS: {}",
                        sub.qos
                    )));
                }
                put_string(out, &sub.topic_filter);
                out.push(sub.qos);
            }
            Ok(())
        })
    }
}

/// The SUBACK packet, carrying one granted-QoS byte per requested filter.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttSubAck {
    pub message_id: u16,
    pub granted_qos: Vec<u8>,
}

impl MqttSubAck {
    pub fn new(message_id: u16, granted_qos: Vec<u8>) -> Self {
        Self {
            message_id,
            granted_qos,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        encode_frame(PacketKind::SubAck, 0x00, |out| {
            put_u16(out, self.message_id);
            out.extend_from_slice(&self.granted_qos);
            Ok(())
        })
    }
}

pub(crate) fn decode_subscribe(flags: u8, body: &[u8]) -> Result<MqttPacket, ParseError> {
    if flags != 0x02 {
        return Err(ParseError::Malformed(format!(
            "SUBSCRIBE has invalid fixed header flags: {:#04x}",
            flags
        )));
    }
    let (message_id, mut offset) = read_u16(body)?;
    let mut subscriptions = Vec::new();
    while offset < body.len() {
        let (topic_filter, consumed) = read_string(&body[offset..])?;
        offset += consumed;
        let qos = *body
            .get(offset)
            .ok_or_else(|| ParseError::Malformed("truncated subscription entry".to_string()))?;
        offset += 1;
        if qos > 2 {
            return Err(ParseError::Malformed(format!(
                "invalid requested QoS: {}",
                qos
            )));
        }
        subscriptions.push(SubscriptionTopic { topic_filter, qos });
    }
    if subscriptions.is_empty() {
        return Err(ParseError::Malformed(
            "SUBSCRIBE must carry at least one topic filter".to_string(),
        ));
    }
    Ok(MqttPacket::Subscribe(MqttSubscribe {
        message_id,
        subscriptions,
    }))
}

pub(crate) fn decode_suback(flags: u8, body: &[u8]) -> Result<MqttPacket, ParseError> {
    if flags != 0x00 {
        return Err(ParseError::Malformed(format!(
            "SUBACK has invalid fixed header flags: {:#04x}",
            flags
        )));
    }
    let (message_id, offset) = read_u16(body)?;
    let granted_qos = body[offset..].to_vec();
    if granted_qos.is_empty() {
        return Err(ParseError::Malformed(
            "SUBACK must carry at least one granted QoS".to_string(),
        ));
    }
    for &qos in &granted_qos {
        if qos > 2 {
            return Err(ParseError::Malformed(format!(
                "invalid granted QoS: {}",
                qos
            )));
        }
    }
    Ok(MqttPacket::SubAck(MqttSubAck {
        message_id,
        granted_qos,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_serde::ParseOk;

    #[test]
    fn test_subscribe_wire_format() {
        let subscribe = MqttSubscribe::new(10, vec![SubscriptionTopic::new("a/b", QoS::AtLeastOnce)]);
        assert_eq!(
            subscribe.to_bytes().unwrap(),
            vec![0x82, 8, 0x00, 0x0A, 0x00, 0x03, b'a', b'/', b'b', 0x01]
        );
    }

    #[test]
    fn test_subscribe_roundtrip_multiple_topics() {
        let original = MqttSubscribe::new(
            42,
            vec![
                SubscriptionTopic::new("sensors/+/temp", QoS::AtLeastOnce),
                SubscriptionTopic::new("alerts/#", QoS::ExactlyOnce),
            ],
        );
        let bytes = original.to_bytes().unwrap();
        match MqttPacket::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Subscribe(parsed), _) => assert_eq!(parsed, original),
            other => panic!("expected SUBSCRIBE, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_empty_rejected() {
        let bytes = [0x82, 0x02, 0x00, 0x01];
        assert!(matches!(
            MqttPacket::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_suback_roundtrip() {
        let original = MqttSubAck::new(42, vec![0, 1, 2]);
        let bytes = original.to_bytes().unwrap();
        match MqttPacket::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::SubAck(parsed), _) => assert_eq!(parsed, original),
            other => panic!("expected SUBACK, got {:?}", other),
        }
    }

    #[test]
    fn test_suback_invalid_granted_qos() {
        let bytes = [0x90, 0x03, 0x00, 0x01, 0x03];
        assert!(matches!(
            MqttPacket::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }
}
