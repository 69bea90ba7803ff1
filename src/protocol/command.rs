//! Command and response records.

use std::fmt;

use bytes::{BufMut, BytesMut};

use super::RECORD_HEADER_SIZE;

/// Record opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Read a byte range.
    Read = 0x52, // 'R'
    /// Write a byte range.
    Write = 0x57, // 'W'
    /// Erase a region.
    Erase = 0x45, // 'E'
    /// CRC check of a region.
    Crc = 0x43, // 'C'
}

impl Opcode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x52 => Some(Self::Read),
            0x57 => Some(Self::Write),
            0x45 => Some(Self::Erase),
            0x43 => Some(Self::Crc),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Erase => write!(f, "erase"),
            Self::Crc => write!(f, "crc"),
        }
    }
}

/// One register operation inside a batched request.
///
/// Addresses are flat 32-bit offsets into the device's memory map; the codec
/// attaches no meaning to them and enforces no alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read `length` bytes starting at `address`.
    Read { address: u32, length: u32 },
    /// Write `payload` starting at `address`.
    Write { address: u32, payload: Vec<u8> },
}

impl Command {
    /// Create a read command.
    pub fn read(address: u32, length: u32) -> Self {
        Self::Read { address, length }
    }

    /// Create a write command.
    pub fn write(address: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self::Write {
            address,
            payload: payload.into(),
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Read { .. } => Opcode::Read,
            Self::Write { .. } => Opcode::Write,
        }
    }

    pub fn address(&self) -> u32 {
        match self {
            Self::Read { address, .. } | Self::Write { address, .. } => *address,
        }
    }

    /// Size of the fixed-format encoding.
    pub(crate) fn encoded_len(&self) -> usize {
        match self {
            Self::Read { .. } => RECORD_HEADER_SIZE,
            Self::Write { payload, .. } => RECORD_HEADER_SIZE + payload.len(),
        }
    }

    /// Append the record encoding: opcode, address (LE), size (LE), payload.
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.opcode().as_u8());
        match self {
            Self::Read { address, length } => {
                buf.put_u32_le(*address);
                buf.put_u32_le(*length);
            }
            Self::Write { address, payload } => {
                buf.put_u32_le(*address);
                buf.put_u32_le(payload.len() as u32);
                buf.put_slice(payload);
            }
        }
    }
}

/// One record of a reply, positionally matching the command that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Raw opcode byte echoed by the device.
    pub opcode: u8,
    /// Address the operation applied to.
    pub address: u32,
    /// Declared size: bytes carried for a read, bytes written for a write
    /// acknowledgment, zero when the device rejected the command.
    pub declared_size: u32,
    /// Present only for successful payload-carrying (non-write) responses.
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// The device rejected this command. Holds for any opcode.
    pub fn is_nak(&self) -> bool {
        self.declared_size == 0
    }

    /// Decoded opcode, if it is one we know.
    pub fn kind(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for op in [Opcode::Read, Opcode::Write, Opcode::Erase, Opcode::Crc] {
            assert_eq!(Opcode::from_u8(op.as_u8()), Some(op));
        }
        assert_eq!(Opcode::from_u8(0x00), None);
        assert_eq!(Opcode::from_u8(b'X'), None);
    }

    #[test]
    fn test_read_command_encoding() {
        let cmd = Command::read(0x0102_0304, 16);
        let mut buf = BytesMut::new();
        cmd.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[b'R', 0x04, 0x03, 0x02, 0x01, 0x10, 0x00, 0x00, 0x00]
        );
        assert_eq!(cmd.encoded_len(), buf.len());
    }

    #[test]
    fn test_write_command_encoding() {
        let cmd = Command::write(0x10, vec![0xaa, 0xbb]);
        let mut buf = BytesMut::new();
        cmd.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[b'W', 0x10, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0xaa, 0xbb]
        );
        assert_eq!(cmd.encoded_len(), buf.len());
    }

    #[test]
    fn test_nak_regardless_of_opcode() {
        for opcode in [b'R', b'W', b'E', 0x00] {
            let resp = Response {
                opcode,
                address: 0x100,
                declared_size: 0,
                payload: None,
            };
            assert!(resp.is_nak());
        }
    }
}
