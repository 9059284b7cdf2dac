use glam::{Quat, Vec3};
use thiserror::Error;
use uuid::Uuid;

use crate::header::{PacketType, StandardHeader};
use crate::wire::{ByteReader, ByteWriter, Wire, WireError};

/// Errors produced while decoding an incoming datagram.
///
/// All of these are recoverable: the caller drops the datagram and the
/// receive loop continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The packet header could not be read
    #[error("Malformed packet header: {0}")]
    Header(WireError),

    /// The message-kind tag did not match any known message
    #[error("Unknown message kind {kind}")]
    UnknownKind { kind: u16 },

    /// The message body could not be read
    #[error("Malformed {kind:?} body: {source}")]
    Body {
        kind: MessageKind,
        source: WireError,
    },
}

/// Wire tag identifying each message type.
#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub enum MessageKind {
    UseCircuitCode,
    AgentUpdate,
    ChatFromViewer,
    ObjectTouch,
    ImprovedInstantMessage,
    ObjectUpdate,
    ChatFromSimulator,
    KickUser,
}

impl MessageKind {
    pub fn to_u16(self) -> u16 {
        match self {
            MessageKind::UseCircuitCode => 1,
            MessageKind::AgentUpdate => 2,
            MessageKind::ChatFromViewer => 3,
            MessageKind::ObjectTouch => 4,
            MessageKind::ImprovedInstantMessage => 5,
            MessageKind::ObjectUpdate => 6,
            MessageKind::ChatFromSimulator => 7,
            MessageKind::KickUser => 8,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(MessageKind::UseCircuitCode),
            2 => Some(MessageKind::AgentUpdate),
            3 => Some(MessageKind::ChatFromViewer),
            4 => Some(MessageKind::ObjectTouch),
            5 => Some(MessageKind::ImprovedInstantMessage),
            6 => Some(MessageKind::ObjectUpdate),
            7 => Some(MessageKind::ChatFromSimulator),
            8 => Some(MessageKind::KickUser),
            _ => None,
        }
    }
}

/// An immutable typed message, decoded once from wire bytes and consumed
/// once by a handler.
///
/// This is a representative slice of the region protocol: the handshake,
/// avatar movement, chat, touch, instant messages inbound; object updates,
/// simulator chat and kicks outbound.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Handshake: the first message on a new circuit, carrying the
    /// pre-arranged circuit code
    UseCircuitCode {
        code: u32,
        agent_id: Uuid,
        session_id: Uuid,
    },
    AgentUpdate {
        agent_id: Uuid,
        session_id: Uuid,
        position: Vec3,
        rotation: Quat,
    },
    ChatFromViewer {
        agent_id: Uuid,
        session_id: Uuid,
        channel: i32,
        text: String,
    },
    ObjectTouch {
        agent_id: Uuid,
        session_id: Uuid,
        object_id: Uuid,
    },
    ImprovedInstantMessage {
        agent_id: Uuid,
        session_id: Uuid,
        to_agent: Uuid,
        im_session_id: Uuid,
        group: bool,
        text: String,
    },
    ObjectUpdate {
        object_id: Uuid,
        position: Vec3,
        rotation: Quat,
        velocity: Vec3,
    },
    ChatFromSimulator {
        channel: i32,
        source: Uuid,
        text: String,
    },
    KickUser {
        reason: String,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::UseCircuitCode { .. } => MessageKind::UseCircuitCode,
            Message::AgentUpdate { .. } => MessageKind::AgentUpdate,
            Message::ChatFromViewer { .. } => MessageKind::ChatFromViewer,
            Message::ObjectTouch { .. } => MessageKind::ObjectTouch,
            Message::ImprovedInstantMessage { .. } => MessageKind::ImprovedInstantMessage,
            Message::ObjectUpdate { .. } => MessageKind::ObjectUpdate,
            Message::ChatFromSimulator { .. } => MessageKind::ChatFromSimulator,
            Message::KickUser { .. } => MessageKind::KickUser,
        }
    }

    /// Whether this message type defaults to reliable delivery.
    pub fn reliable_by_default(&self) -> bool {
        match self.kind() {
            // high-rate movement and spatial updates tolerate loss
            MessageKind::AgentUpdate | MessageKind::ObjectUpdate => false,
            _ => true,
        }
    }

    /// The agent/session identity embedded in the payload, for messages
    /// that carry one. NotTrusted handlers compare this against the
    /// circuit's authenticated identity.
    pub fn agent_session(&self) -> Option<(Uuid, Uuid)> {
        match self {
            Message::UseCircuitCode {
                agent_id,
                session_id,
                ..
            }
            | Message::AgentUpdate {
                agent_id,
                session_id,
                ..
            }
            | Message::ChatFromViewer {
                agent_id,
                session_id,
                ..
            }
            | Message::ObjectTouch {
                agent_id,
                session_id,
                ..
            }
            | Message::ImprovedInstantMessage {
                agent_id,
                session_id,
                ..
            } => Some((*agent_id, *session_id)),
            Message::ObjectUpdate { .. }
            | Message::ChatFromSimulator { .. }
            | Message::KickUser { .. } => None,
        }
    }

    fn ser_body(&self, writer: &mut ByteWriter) {
        match self {
            Message::UseCircuitCode {
                code,
                agent_id,
                session_id,
            } => {
                code.ser(writer);
                agent_id.ser(writer);
                session_id.ser(writer);
            }
            Message::AgentUpdate {
                agent_id,
                session_id,
                position,
                rotation,
            } => {
                agent_id.ser(writer);
                session_id.ser(writer);
                position.ser(writer);
                rotation.ser(writer);
            }
            Message::ChatFromViewer {
                agent_id,
                session_id,
                channel,
                text,
            } => {
                agent_id.ser(writer);
                session_id.ser(writer);
                channel.ser(writer);
                text.ser(writer);
            }
            Message::ObjectTouch {
                agent_id,
                session_id,
                object_id,
            } => {
                agent_id.ser(writer);
                session_id.ser(writer);
                object_id.ser(writer);
            }
            Message::ImprovedInstantMessage {
                agent_id,
                session_id,
                to_agent,
                im_session_id,
                group,
                text,
            } => {
                agent_id.ser(writer);
                session_id.ser(writer);
                to_agent.ser(writer);
                im_session_id.ser(writer);
                group.ser(writer);
                text.ser(writer);
            }
            Message::ObjectUpdate {
                object_id,
                position,
                rotation,
                velocity,
            } => {
                object_id.ser(writer);
                position.ser(writer);
                rotation.ser(writer);
                velocity.ser(writer);
            }
            Message::ChatFromSimulator {
                channel,
                source,
                text,
            } => {
                channel.ser(writer);
                source.ser(writer);
                text.ser(writer);
            }
            Message::KickUser { reason } => {
                reason.ser(writer);
            }
        }
    }

    fn de_body(kind: MessageKind, reader: &mut ByteReader) -> Result<Self, WireError> {
        let message = match kind {
            MessageKind::UseCircuitCode => Message::UseCircuitCode {
                code: u32::de(reader)?,
                agent_id: Uuid::de(reader)?,
                session_id: Uuid::de(reader)?,
            },
            MessageKind::AgentUpdate => Message::AgentUpdate {
                agent_id: Uuid::de(reader)?,
                session_id: Uuid::de(reader)?,
                position: Vec3::de(reader)?,
                rotation: Quat::de(reader)?,
            },
            MessageKind::ChatFromViewer => Message::ChatFromViewer {
                agent_id: Uuid::de(reader)?,
                session_id: Uuid::de(reader)?,
                channel: i32::de(reader)?,
                text: String::de(reader)?,
            },
            MessageKind::ObjectTouch => Message::ObjectTouch {
                agent_id: Uuid::de(reader)?,
                session_id: Uuid::de(reader)?,
                object_id: Uuid::de(reader)?,
            },
            MessageKind::ImprovedInstantMessage => Message::ImprovedInstantMessage {
                agent_id: Uuid::de(reader)?,
                session_id: Uuid::de(reader)?,
                to_agent: Uuid::de(reader)?,
                im_session_id: Uuid::de(reader)?,
                group: bool::de(reader)?,
                text: String::de(reader)?,
            },
            MessageKind::ObjectUpdate => Message::ObjectUpdate {
                object_id: Uuid::de(reader)?,
                position: Vec3::de(reader)?,
                rotation: Quat::de(reader)?,
                velocity: Vec3::de(reader)?,
            },
            MessageKind::ChatFromSimulator => Message::ChatFromSimulator {
                channel: i32::de(reader)?,
                source: Uuid::de(reader)?,
                text: String::de(reader)?,
            },
            MessageKind::KickUser => Message::KickUser {
                reason: String::de(reader)?,
            },
        };
        Ok(message)
    }
}

/// What a packet carries after its header.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Message(Message),
    Acks(Vec<u16>),
    Empty,
}

/// One decoded packet: header plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: StandardHeader,
    pub payload: Payload,
}

impl Packet {
    pub fn data(sequence: u16, reliable: bool, message: Message) -> Self {
        Self {
            header: StandardHeader::new(PacketType::Data, sequence, reliable),
            payload: Payload::Message(message),
        }
    }

    pub fn acks(sequence: u16, acks: Vec<u16>) -> Self {
        Self {
            header: StandardHeader::new(PacketType::Ack, sequence, false),
            payload: Payload::Acks(acks),
        }
    }

    pub fn control(packet_type: PacketType, sequence: u16) -> Self {
        Self {
            header: StandardHeader::new(packet_type, sequence, false),
            payload: Payload::Empty,
        }
    }
}

/// Encodes a packet to wire bytes.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    packet.header.ser(&mut writer);
    match &packet.payload {
        Payload::Message(message) => {
            message.kind().to_u16().ser(&mut writer);
            message.ser_body(&mut writer);
        }
        Payload::Acks(acks) => {
            acks.ser(&mut writer);
        }
        Payload::Empty => {}
    }
    writer.into_bytes()
}

/// Decodes wire bytes into a packet.
///
/// Fails with a `DecodeError` on malformed input; the caller must drop
/// the datagram. This is the untrusted-input boundary and never panics.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    let mut reader = ByteReader::new(bytes);
    let header = StandardHeader::de(&mut reader).map_err(DecodeError::Header)?;

    let payload = match header.packet_type {
        PacketType::Data => {
            let raw_kind = u16::de(&mut reader).map_err(DecodeError::Header)?;
            let kind = MessageKind::from_u16(raw_kind)
                .ok_or(DecodeError::UnknownKind { kind: raw_kind })?;
            let message = Message::de_body(kind, &mut reader)
                .map_err(|source| DecodeError::Body { kind, source })?;
            Payload::Message(message)
        }
        PacketType::Ack => {
            let acks = Vec::<u16>::de(&mut reader).map_err(DecodeError::Header)?;
            Payload::Acks(acks)
        }
        PacketType::Ping | PacketType::Pong | PacketType::Disconnect => Payload::Empty,
    };

    Ok(Packet { header, payload })
}
