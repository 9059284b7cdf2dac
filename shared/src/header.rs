use crate::wire::{ByteReader, ByteWriter, Wire, WireError};

/// The different types of packets a circuit can carry.
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum PacketType {
    /// A packet carrying one typed message
    Data,
    /// A standalone acknowledgment of received reliable sequences
    Ack,
    /// A Ping, used to keep the circuit alive. Must be answered with a Pong
    Ping,
    /// The response to a Ping
    Pong,
    /// Orderly circuit teardown
    Disconnect,
}

impl Wire for PacketType {
    fn ser(&self, writer: &mut ByteWriter) {
        let index: u8 = match self {
            PacketType::Data => 0,
            PacketType::Ack => 1,
            PacketType::Ping => 2,
            PacketType::Pong => 3,
            PacketType::Disconnect => 4,
        };
        writer.write_u8(index);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        match reader.read_u8()? {
            0 => Ok(PacketType::Data),
            1 => Ok(PacketType::Ack),
            2 => Ok(PacketType::Ping),
            3 => Ok(PacketType::Pong),
            4 => Ok(PacketType::Disconnect),
            // unknown indices come from malformed or hostile datagrams
            _ => Err(WireError::InvalidValue { what: "packet type" }),
        }
    }
}

/// Header attached to every outgoing packet.
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub struct StandardHeader {
    pub packet_type: PacketType,
    /// Wrapping sequence number assigned by the sending circuit
    pub sequence: u16,
    /// Whether the sender expects this sequence to be acknowledged
    pub reliable: bool,
}

impl StandardHeader {
    pub fn new(packet_type: PacketType, sequence: u16, reliable: bool) -> Self {
        Self {
            packet_type,
            sequence,
            reliable,
        }
    }
}

impl Wire for StandardHeader {
    fn ser(&self, writer: &mut ByteWriter) {
        self.packet_type.ser(writer);
        self.sequence.ser(writer);
        self.reliable.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            packet_type: PacketType::de(reader)?,
            sequence: u16::de(reader)?,
            reliable: bool::de(reader)?,
        })
    }
}
