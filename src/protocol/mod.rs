//! Wire protocol for PBus.
//!
//! A frame is the delimited, escaped, checksummed unit carrying one batched
//! request or one reply:
//!
//! ```text
//! ┌──────┬───────────────────────────────────────────────────┬──────┐
//! │ STX  │ ESCAPED( body ++ CRC16-LE(2) )                    │ ETX  │
//! └──────┴───────────────────────────────────────────────────┴──────┘
//!
//! request body:  TAG(4) ++ command record*
//! response body: "MZO" ++ protocol_id:u16-LE ++ TAG(4) ++ response record*
//! ```
//!
//! The CRC is computed over the unescaped body (including the response
//! header), then escaping is applied to body and CRC together. Only the two
//! delimiter bytes sit outside the escaped span.

mod command;
mod escape;
mod packet;
pub mod values;

pub use command::{Command, Opcode, Response};
pub use escape::{escape, unescape};
pub use packet::{build_request, parse_response};

use crc::{Crc, CRC_16_XMODEM};

/// Start-of-frame delimiter.
pub const STX: u8 = 0x02;

/// End-of-frame delimiter.
pub const ETX: u8 = 0x03;

/// Escape marker.
pub const ESC: u8 = 0x1B;

/// Offset added to escaped byte values.
pub const ESCAPE_OFFSET: u8 = 0x40;

/// Magic number opening every response body.
pub const MAGIC: [u8; 3] = *b"MZO";

/// Protocol identifier following the magic number.
pub const PROTOCOL_ID: u16 = 0x0001;

/// Smallest valid response frame:
/// STX + magic(3) + protocol id(2) + tag(4) + CRC(2) + ETX.
pub const MIN_RESPONSE_FRAME: usize = 13;

/// Fixed part of a command/response record: opcode(1) + address(4) + size(4).
pub const RECORD_HEADER_SIZE: usize = 9;

/// CRC16-CCITT, polynomial 0x1021, init 0, MSB-first. The device verifies
/// this value, so it must match the reference table bit-for-bit.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculate the CRC16 of a byte span.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}
