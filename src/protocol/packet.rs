//! Frame building and parsing.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::types::Tag;

use super::{
    crc16, escape, unescape, Command, Opcode, Response, ETX, MAGIC, MIN_RESPONSE_FRAME,
    PROTOCOL_ID, RECORD_HEADER_SIZE, STX,
};

/// Build a request frame from a correlation tag and a command batch.
///
/// Always succeeds for any input, including an empty batch (though nothing
/// useful will correlate to one).
pub fn build_request(tag: Tag, commands: &[Command]) -> Vec<u8> {
    let body_len = 4 + commands.iter().map(Command::encoded_len).sum::<usize>();
    let mut body = BytesMut::with_capacity(body_len + 2);

    body.put_slice(tag.as_bytes());
    for command in commands {
        command.encode(&mut body);
    }

    let crc = crc16(&body);
    body.put_u16_le(crc);

    let escaped = escape(&body);
    let mut frame = Vec::with_capacity(escaped.len() + 2);
    frame.push(STX);
    frame.extend_from_slice(&escaped);
    frame.push(ETX);
    frame
}

/// Parse a reply frame into its correlation tag and ordered response list.
///
/// Validation order: frame length, delimiters, unescape, CRC, magic,
/// protocol id, then one record at a time until the body is exhausted.
/// Response *i* corresponds to command *i* of the request; the list may be
/// shorter than the request if the device stopped early, and individual
/// records may be NAKs, so callers check [`Response::is_nak`] per record.
pub fn parse_response(packet: &[u8]) -> Result<(Tag, Vec<Response>)> {
    if packet.len() < MIN_RESPONSE_FRAME {
        return Err(ProtocolError::FrameTooShort { len: packet.len() }.into());
    }
    if packet[0] != STX {
        return Err(ProtocolError::InvalidStx { got: packet[0] }.into());
    }
    let last = packet[packet.len() - 1];
    if last != ETX {
        return Err(ProtocolError::InvalidEtx { got: last }.into());
    }

    let body = unescape(&packet[1..packet.len() - 1]);

    // Trailing CRC covers everything before it, header included.
    if body.len() < 2 {
        return Err(ProtocolError::FrameTooShort { len: body.len() }.into());
    }
    let (payload, crc_bytes) = body.split_at(body.len() - 2);
    let received = LittleEndian::read_u16(crc_bytes);
    let computed = crc16(payload);
    if received != computed {
        return Err(ProtocolError::ChecksumMismatch { received, computed }.into());
    }

    // Header: magic(3) + protocol id(2) + tag(4)
    if payload.len() < 9 {
        return Err(ProtocolError::FrameTooShort { len: payload.len() }.into());
    }
    if payload[0..3] != MAGIC {
        return Err(ProtocolError::InvalidMagic.into());
    }
    let protocol_id = LittleEndian::read_u16(&payload[3..5]);
    if protocol_id != PROTOCOL_ID {
        return Err(ProtocolError::InvalidProtocolId { got: protocol_id }.into());
    }

    let mut tag_bytes = [0u8; 4];
    tag_bytes.copy_from_slice(&payload[5..9]);
    let tag = Tag::new(tag_bytes);

    let mut responses = Vec::new();
    let mut offset = 9;

    while offset < payload.len() {
        if payload.len() - offset < RECORD_HEADER_SIZE {
            return Err(ProtocolError::TruncatedResponse.into());
        }

        let opcode = payload[offset];
        let address = LittleEndian::read_u32(&payload[offset + 1..offset + 5]);
        let declared_size = LittleEndian::read_u32(&payload[offset + 5..offset + 9]);
        offset += RECORD_HEADER_SIZE;

        // A write response declares how many bytes were written but carries
        // no payload bytes; treating it as payload-carrying would shift the
        // offset of every following record. Reads (and other opcodes) with a
        // nonzero size carry that many bytes inline. Size zero is a NAK.
        let data = if declared_size > 0 && opcode != Opcode::Write.as_u8() {
            let size = declared_size as usize;
            if payload.len() - offset < size {
                return Err(ProtocolError::PayloadOverrun.into());
            }
            let data = payload[offset..offset + size].to_vec();
            offset += size;
            Some(data)
        } else {
            None
        };

        responses.push(Response {
            opcode,
            address,
            declared_size,
            payload: data,
        });
    }

    Ok((tag, responses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::ESC;

    const TAG: Tag = Tag::new([0x11, 0x22, 0x33, 0x44]);

    /// Frame an already-built response body the way a device would.
    fn frame_body(body: &[u8]) -> Vec<u8> {
        let mut full = body.to_vec();
        let crc = crc16(body);
        full.extend_from_slice(&crc.to_le_bytes());
        let escaped = escape(&full);
        let mut frame = vec![STX];
        frame.extend_from_slice(&escaped);
        frame.push(ETX);
        frame
    }

    /// Build a response body: header plus raw records.
    fn response_body(tag: Tag, records: &[(u8, u32, u32, Option<&[u8]>)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&MAGIC);
        body.extend_from_slice(&PROTOCOL_ID.to_le_bytes());
        body.extend_from_slice(tag.as_bytes());
        for &(opcode, address, size, data) in records {
            body.push(opcode);
            body.extend_from_slice(&address.to_le_bytes());
            body.extend_from_slice(&size.to_le_bytes());
            if let Some(data) = data {
                body.extend_from_slice(data);
            }
        }
        body
    }

    #[test]
    fn test_build_request_layout() {
        let frame = build_request(TAG, &[Command::read(0x0a, 4)]);

        assert_eq!(frame[0], STX);
        assert_eq!(*frame.last().unwrap(), ETX);

        let body = unescape(&frame[1..frame.len() - 1]);
        assert_eq!(&body[0..4], TAG.as_bytes());
        assert_eq!(body[4], b'R');
        assert_eq!(LittleEndian::read_u32(&body[5..9]), 0x0a);
        assert_eq!(LittleEndian::read_u32(&body[9..13]), 4);

        let crc = LittleEndian::read_u16(&body[13..15]);
        assert_eq!(crc, crc16(&body[..13]));
        assert_eq!(body.len(), 15);
    }

    #[test]
    fn test_build_request_escapes_reserved_bytes() {
        // Tag bytes collide with STX, ETX, and ESC on purpose.
        let tag = Tag::new([STX, ETX, ESC, 0x00]);
        let payload = vec![STX, ETX, ESC];
        let frame = build_request(tag, &[Command::write(0x02031b02, payload.clone())]);

        // Delimiters appear exactly once each.
        assert_eq!(frame.iter().filter(|&&b| b == STX).count(), 1);
        assert_eq!(frame.iter().filter(|&&b| b == ETX).count(), 1);

        let body = unescape(&frame[1..frame.len() - 1]);
        assert_eq!(&body[0..4], tag.as_bytes());
        assert_eq!(&body[body.len() - 2 - 3..body.len() - 2], &payload[..]);
    }

    #[test]
    fn test_build_request_empty_batch() {
        let frame = build_request(TAG, &[]);
        let body = unescape(&frame[1..frame.len() - 1]);
        // Tag plus CRC only
        assert_eq!(body.len(), 6);
    }

    #[test]
    fn test_parse_header_only_response() {
        let frame = frame_body(&response_body(TAG, &[]));
        let (tag, responses) = parse_response(&frame).unwrap();
        assert_eq!(tag, TAG);
        assert!(responses.is_empty());
    }

    #[test]
    fn test_build_parse_symmetry_mixed_batch() {
        // One read, one write, as a device would answer them.
        let commands = [
            Command::read(0x1000, 4),
            Command::write(0x2000, vec![1, 2, 3, 4, 5, 6]),
        ];
        let frame = build_request(TAG, &commands);
        assert_eq!(frame[0], STX);

        let read_data = [0xca, 0xfe, 0xba, 0xbe];
        let reply = frame_body(&response_body(
            TAG,
            &[
                (b'R', 0x1000, 4, Some(&read_data)),
                (b'W', 0x2000, 6, None),
            ],
        ));

        let (tag, responses) = parse_response(&reply).unwrap();
        assert_eq!(tag, TAG);
        assert_eq!(responses.len(), 2);

        assert_eq!(responses[0].address, commands[0].address());
        assert_eq!(responses[0].kind(), Some(Opcode::Read));
        assert_eq!(responses[0].declared_size, 4);
        assert_eq!(responses[0].payload.as_deref(), Some(&read_data[..]));

        assert_eq!(responses[1].address, commands[1].address());
        assert_eq!(responses[1].kind(), Some(Opcode::Write));
        assert_eq!(responses[1].declared_size, 6);
        assert_eq!(responses[1].payload, None);
        assert!(!responses[1].is_nak());
    }

    #[test]
    fn test_write_ack_does_not_desync_following_record() {
        // If the parser consumed the write's declared size as payload, the
        // following read record would be misread.
        let read_data = [0x01, 0x02];
        let reply = frame_body(&response_body(
            TAG,
            &[
                (b'W', 0x10, 8, None),
                (b'R', 0x20, 2, Some(&read_data)),
            ],
        ));

        let (_, responses) = parse_response(&reply).unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].address, 0x20);
        assert_eq!(responses[1].payload.as_deref(), Some(&read_data[..]));
    }

    #[test]
    fn test_nak_record_carries_no_payload() {
        let reply = frame_body(&response_body(
            TAG,
            &[(b'R', 0x10, 0, None), (b'R', 0x20, 1, Some(&[0x7f]))],
        ));

        let (_, responses) = parse_response(&reply).unwrap();
        assert!(responses[0].is_nak());
        assert_eq!(responses[0].payload, None);
        assert!(!responses[1].is_nak());
    }

    #[test]
    fn test_rejects_short_frame() {
        let err = parse_response(&[STX, ETX]).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::FrameTooShort { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_delimiters() {
        let mut frame = frame_body(&response_body(TAG, &[]));

        let mut bad_stx = frame.clone();
        bad_stx[0] = 0x7e;
        assert!(matches!(
            parse_response(&bad_stx).unwrap_err(),
            Error::Protocol(ProtocolError::InvalidStx { got: 0x7e })
        ));

        let last = frame.len() - 1;
        frame[last] = 0x7e;
        assert!(matches!(
            parse_response(&frame).unwrap_err(),
            Error::Protocol(ProtocolError::InvalidEtx { got: 0x7e })
        ));
    }

    #[test]
    fn test_any_crc_bit_flip_is_rejected() {
        let body = response_body(TAG, &[(b'R', 0x10, 1, Some(&[0x55]))]);
        let mut full = body.clone();
        let crc = crc16(&body);
        full.extend_from_slice(&crc.to_le_bytes());

        for byte in 0..2 {
            for bit in 0..8 {
                let mut corrupted = full.clone();
                let idx = body.len() + byte;
                corrupted[idx] ^= 1 << bit;

                let escaped = escape(&corrupted);
                let mut frame = vec![STX];
                frame.extend_from_slice(&escaped);
                frame.push(ETX);

                assert!(matches!(
                    parse_response(&frame).unwrap_err(),
                    Error::Protocol(ProtocolError::ChecksumMismatch { .. })
                ));
            }
        }
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut body = response_body(TAG, &[]);
        body[0] = b'X';
        assert!(matches!(
            parse_response(&frame_body(&body)).unwrap_err(),
            Error::Protocol(ProtocolError::InvalidMagic)
        ));
    }

    #[test]
    fn test_rejects_bad_protocol_id() {
        let mut body = response_body(TAG, &[]);
        body[3] = 0x99;
        assert!(matches!(
            parse_response(&frame_body(&body)).unwrap_err(),
            Error::Protocol(ProtocolError::InvalidProtocolId { got: 0x0099 })
        ));
    }

    #[test]
    fn test_rejects_truncated_record_header() {
        let mut body = response_body(TAG, &[]);
        body.extend_from_slice(&[b'R', 0x10, 0x00]); // partial record
        assert!(matches!(
            parse_response(&frame_body(&body)).unwrap_err(),
            Error::Protocol(ProtocolError::TruncatedResponse)
        ));
    }

    #[test]
    fn test_rejects_payload_overrun() {
        // Read record declares 8 bytes but carries 2.
        let reply = frame_body(&response_body(TAG, &[(b'R', 0x10, 8, Some(&[1, 2]))]));
        assert!(matches!(
            parse_response(&reply).unwrap_err(),
            Error::Protocol(ProtocolError::PayloadOverrun)
        ));
    }

    #[test]
    fn test_parse_recovers_reserved_heavy_tag() {
        let tag = Tag::new([STX, ETX, ESC, ESC]);
        let reply = frame_body(&response_body(tag, &[(b'R', 2, 1, Some(&[STX]))]));
        let (parsed, responses) = parse_response(&reply).unwrap();
        assert_eq!(parsed, tag);
        assert_eq!(responses[0].payload.as_deref(), Some(&[STX][..]));
    }
}
