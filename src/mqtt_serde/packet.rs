use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

use crate::mqtt_serde::{
    acks, frame_body, publish, put_var_len, signals, subscribe, unsubscribe, FrameSplit,
    ParseError, ParseOk,
};

/// MQTT delivery guarantee requested for a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn as_u8(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, ParseError> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(ParseError::Malformed(format!("invalid QoS level: {}", other))),
        }
    }
}

/// Control packet type, as carried in the high nibble of the fixed header.
///
/// Only the types the connection engine exchanges are representable;
/// CONNECT (1), CONNACK (2) and anything above DISCONNECT decode to
/// [`ParseError::InvalidPacketType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketKind {
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketKind {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(PacketKind::Publish),
            4 => Ok(PacketKind::PubAck),
            5 => Ok(PacketKind::PubRec),
            6 => Ok(PacketKind::PubRel),
            7 => Ok(PacketKind::PubComp),
            8 => Ok(PacketKind::Subscribe),
            9 => Ok(PacketKind::SubAck),
            10 => Ok(PacketKind::Unsubscribe),
            11 => Ok(PacketKind::UnsubAck),
            12 => Ok(PacketKind::PingReq),
            13 => Ok(PacketKind::PingResp),
            14 => Ok(PacketKind::Disconnect),
            other => Err(ParseError::InvalidPacketType(other)),
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A decoded MQTT 3.1 control packet.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(tag = "type")]
pub enum MqttPacket {
    Publish(publish::MqttPublish),
    PubAck(acks::MqttPubAck),
    PubRec(acks::MqttPubRec),
    PubRel(acks::MqttPubRel),
    PubComp(acks::MqttPubComp),
    Subscribe(subscribe::MqttSubscribe),
    SubAck(subscribe::MqttSubAck),
    Unsubscribe(unsubscribe::MqttUnsubscribe),
    UnsubAck(acks::MqttUnsubAck),
    PingReq(signals::MqttPingReq),
    PingResp(signals::MqttPingResp),
    Disconnect(signals::MqttDisconnect),
}

impl MqttPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            MqttPacket::Publish(_) => PacketKind::Publish,
            MqttPacket::PubAck(_) => PacketKind::PubAck,
            MqttPacket::PubRec(_) => PacketKind::PubRec,
            MqttPacket::PubRel(_) => PacketKind::PubRel,
            MqttPacket::PubComp(_) => PacketKind::PubComp,
            MqttPacket::Subscribe(_) => PacketKind::Subscribe,
            MqttPacket::SubAck(_) => PacketKind::SubAck,
            MqttPacket::Unsubscribe(_) => PacketKind::Unsubscribe,
            MqttPacket::UnsubAck(_) => PacketKind::UnsubAck,
            MqttPacket::PingReq(_) => PacketKind::PingReq,
            MqttPacket::PingResp(_) => PacketKind::PingResp,
            MqttPacket::Disconnect(_) => PacketKind::Disconnect,
        }
    }

    /// Encodes the packet into a complete frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        match self {
            MqttPacket::Publish(p) => p.to_bytes(),
            MqttPacket::PubAck(p) => p.to_bytes(),
            MqttPacket::PubRec(p) => p.to_bytes(),
            MqttPacket::PubRel(p) => p.to_bytes(),
            MqttPacket::PubComp(p) => p.to_bytes(),
            MqttPacket::Subscribe(p) => p.to_bytes(),
            MqttPacket::SubAck(p) => p.to_bytes(),
            MqttPacket::Unsubscribe(p) => p.to_bytes(),
            MqttPacket::UnsubAck(p) => p.to_bytes(),
            MqttPacket::PingReq(p) => p.to_bytes(),
            MqttPacket::PingResp(p) => p.to_bytes(),
            MqttPacket::Disconnect(p) => p.to_bytes(),
        }
    }

    /// Decodes one frame from the front of `buffer`.
    ///
    /// Returns [`ParseOk::Continue`] with a byte-count hint when the buffer
    /// holds only a prefix of a frame, so callers can accumulate input
    /// incrementally.
    pub fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        if buffer.is_empty() {
            return Err(ParseError::BufferTooShort);
        }
        let kind = PacketKind::try_from(buffer[0] >> 4)?;
        let (flags, body, total) = match frame_body(buffer)? {
            FrameSplit::Continue(needed) => return Ok(ParseOk::Continue(needed)),
            FrameSplit::Body { flags, body, total } => (flags, body, total),
        };
        let packet = match kind {
            PacketKind::Publish => publish::decode(flags, body)?,
            PacketKind::PubAck => acks::MqttPubAck::decode(flags, body)?,
            PacketKind::PubRec => acks::MqttPubRec::decode(flags, body)?,
            PacketKind::PubRel => acks::MqttPubRel::decode(flags, body)?,
            PacketKind::PubComp => acks::MqttPubComp::decode(flags, body)?,
            PacketKind::Subscribe => subscribe::decode_subscribe(flags, body)?,
            PacketKind::SubAck => subscribe::decode_suback(flags, body)?,
            PacketKind::Unsubscribe => unsubscribe::decode(flags, body)?,
            PacketKind::UnsubAck => acks::MqttUnsubAck::decode(flags, body)?,
            PacketKind::PingReq => signals::MqttPingReq::decode(flags, body)?,
            PacketKind::PingResp => signals::MqttPingResp::decode(flags, body)?,
            PacketKind::Disconnect => signals::MqttDisconnect::decode(flags, body)?,
        };
        Ok(ParseOk::Packet(packet, total))
    }
}

/// Assembles a frame: fixed header byte, remaining length, then the body
/// produced by `build`.
pub(crate) fn encode_frame<F>(kind: PacketKind, flags: u8, build: F) -> Result<Vec<u8>, ParseError>
where
    F: FnOnce(&mut Vec<u8>) -> Result<(), ParseError>,
{
    let mut body = Vec::new();
    build(&mut body)?;
    let mut frame = Vec::with_capacity(body.len() + 2);
    frame.push((kind as u8) << 4 | flags);
    put_var_len(&mut frame, body.len());
    frame.extend_from_slice(&body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_rejected() {
        // CONNECT (type 1) belongs to the handshake layer, not the engine.
        let bytes = [0x10, 0x00];
        assert!(matches!(
            MqttPacket::from_bytes(&bytes),
            Err(ParseError::InvalidPacketType(1))
        ));
    }

    #[test]
    fn test_packet_kind_roundtrip() {
        for raw in 3u8..=14 {
            let kind = PacketKind::try_from(raw).unwrap();
            assert_eq!(kind as u8, raw);
        }
        assert!(PacketKind::try_from(0).is_err());
        assert!(PacketKind::try_from(15).is_err());
    }

    #[test]
    fn test_qos_conversions() {
        for qos in [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce] {
            assert_eq!(QoS::from_u8(qos.as_u8()).unwrap(), qos);
        }
        assert!(QoS::from_u8(3).is_err());
    }

    #[test]
    fn test_packet_serialization_tagged() {
        let pkt = MqttPacket::PubAck(acks::MqttPubAck::new(7));
        let json = serde_json::to_string(&pkt).unwrap();
        assert_eq!(json, "{\"type\":\"PubAck\",\"message_id\":7}");
    }
}
