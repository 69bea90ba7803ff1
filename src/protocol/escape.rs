//! Byte escaping for frame bodies.
//!
//! The three reserved values (STX, ETX, ESC) must never appear bare inside a
//! frame body, or the receiver could not find frame boundaries. Each is
//! replaced by ESC followed by the original value plus a fixed offset.
//! Escaping applies to the body only, never to the delimiters bounding it.

use super::{ESC, ESCAPE_OFFSET, ETX, STX};

/// Replace every reserved byte with its two-byte escape sequence.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        if matches!(byte, STX | ETX | ESC) {
            out.push(ESC);
            out.push(byte.wrapping_add(ESCAPE_OFFSET));
        } else {
            out.push(byte);
        }
    }
    out
}

/// Exact inverse of [`escape`]: an escape marker consumes the following byte
/// and subtracts the offset to recover the original value.
///
/// A lone trailing ESC has no byte to consume and passes through unchanged.
pub fn unescape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == ESC && i + 1 < data.len() {
            out.push(data[i + 1].wrapping_sub(ESCAPE_OFFSET));
            i += 2;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}
