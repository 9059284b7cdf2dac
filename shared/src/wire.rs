use glam::{Quat, Vec3};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while reading wire data.
///
/// The reader operates on untrusted network input, so every failure mode
/// is an error value consumed by the caller; nothing here panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Ran out of bytes mid-field
    #[error("Unexpected end of input: wanted {wanted} more bytes, {remaining} remain")]
    UnexpectedEnd { wanted: usize, remaining: usize },

    /// A field held a value outside its valid range
    #[error("Invalid value while reading {what}")]
    InvalidValue { what: &'static str },
}

/// Append-only byte buffer for encoding wire data.
///
/// All multi-byte integers are little-endian; variable-length fields carry
/// a u16 length prefix.
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over a received byte slice for decoding wire data.
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < count {
            return Err(WireError::UnexpectedEnd {
                wanted: count,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buffer[self.cursor..self.cursor + count];
        self.cursor += count;
        Ok(slice)
    }
}

/// Serialization to/from the veldt wire format.
///
/// `de` must tolerate arbitrary input: malformed bytes yield a `WireError`,
/// never a panic, so the transport can drop a bad datagram and carry on.
pub trait Wire: Sized {
    fn ser(&self, writer: &mut ByteWriter);
    fn de(reader: &mut ByteReader) -> Result<Self, WireError>;
}

macro_rules! wire_int {
    ($t:ty) => {
        impl Wire for $t {
            fn ser(&self, writer: &mut ByteWriter) {
                writer.write_bytes(&self.to_le_bytes());
            }

            fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
                let size = std::mem::size_of::<$t>();
                let bytes = reader.read_bytes(size)?;
                let mut array = [0u8; std::mem::size_of::<$t>()];
                array.copy_from_slice(bytes);
                Ok(<$t>::from_le_bytes(array))
            }
        }
    };
}

wire_int!(u8);
wire_int!(u16);
wire_int!(u32);
wire_int!(u64);
wire_int!(i32);
wire_int!(f32);
wire_int!(f64);

impl Wire for bool {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u8(*self as u8);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(WireError::InvalidValue { what: "bool" }),
        }
    }
}

impl Wire for String {
    fn ser(&self, writer: &mut ByteWriter) {
        let bytes = self.as_bytes();
        // truncate rather than overflow the u16 prefix
        let len = bytes.len().min(u16::MAX as usize);
        (len as u16).ser(writer);
        writer.write_bytes(&bytes[..len]);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let len = u16::de(reader)? as usize;
        let bytes = reader.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| WireError::InvalidValue { what: "utf-8 string" })
    }
}

impl Wire for Uuid {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_bytes(self.as_bytes());
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let bytes = reader.read_bytes(16)?;
        let mut array = [0u8; 16];
        array.copy_from_slice(bytes);
        Ok(Uuid::from_bytes(array))
    }
}

impl Wire for Vec3 {
    fn ser(&self, writer: &mut ByteWriter) {
        self.x.ser(writer);
        self.y.ser(writer);
        self.z.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Vec3::new(f32::de(reader)?, f32::de(reader)?, f32::de(reader)?))
    }
}

impl Wire for Quat {
    fn ser(&self, writer: &mut ByteWriter) {
        self.x.ser(writer);
        self.y.ser(writer);
        self.z.ser(writer);
        self.w.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let x = f32::de(reader)?;
        let y = f32::de(reader)?;
        let z = f32::de(reader)?;
        let w = f32::de(reader)?;
        Ok(Quat::from_xyzw(x, y, z, w))
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn ser(&self, writer: &mut ByteWriter) {
        let len = self.len().min(u16::MAX as usize);
        (len as u16).ser(writer);
        for item in &self[..len] {
            item.ser(writer);
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, WireError> {
        let len = u16::de(reader)? as usize;
        let mut output = Vec::new();
        for _ in 0..len {
            output.push(T::de(reader)?);
        }
        Ok(output)
    }
}
