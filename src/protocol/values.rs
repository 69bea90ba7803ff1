//! Payload value conversions.
//!
//! The codec treats payloads as opaque bytes; consumers that know what a
//! register holds use these helpers to convert to and from the device's
//! little-endian encodings. Fixed-width decoders reject wrong-length input
//! instead of guessing.

use crate::error::{ProtocolError, Result};

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N]> {
    data.try_into().map_err(|_| {
        ProtocolError::ValueLength {
            expected: N,
            got: data.len(),
        }
        .into()
    })
}

/// Encode an f32 as 4 little-endian bytes.
pub fn f32_to_bytes(value: f32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Decode 4 little-endian bytes as an f32.
pub fn f32_from_bytes(data: &[u8]) -> Result<f32> {
    Ok(f32::from_le_bytes(fixed::<4>(data)?))
}

/// Encode a u32 as 4 little-endian bytes.
pub fn u32_to_bytes(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Decode 4 little-endian bytes as a u32.
pub fn u32_from_bytes(data: &[u8]) -> Result<u32> {
    Ok(u32::from_le_bytes(fixed::<4>(data)?))
}

/// Encode an i32 as 4 little-endian bytes.
pub fn i32_to_bytes(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Decode 4 little-endian bytes as an i32.
pub fn i32_from_bytes(data: &[u8]) -> Result<i32> {
    Ok(i32::from_le_bytes(fixed::<4>(data)?))
}

/// Encode a u8 as a single byte.
pub fn u8_to_bytes(value: u8) -> [u8; 1] {
    [value]
}

/// Decode a single byte as a u8.
pub fn u8_from_bytes(data: &[u8]) -> Result<u8> {
    Ok(fixed::<1>(data)?[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_f32_round_trip() {
        for value in [-12.5f32, 0.0, 1.0, f32::MAX] {
            let bytes = f32_to_bytes(value);
            assert_eq!(f32_from_bytes(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn test_u32_round_trip_and_endianness() {
        assert_eq!(u32_to_bytes(0x0102_0304), [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(u32_from_bytes(&[0x04, 0x03, 0x02, 0x01]).unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_i32_round_trip() {
        for value in [i32::MIN, -1, 0, 42, i32::MAX] {
            assert_eq!(i32_from_bytes(&i32_to_bytes(value)).unwrap(), value);
        }
    }

    #[test]
    fn test_u8_round_trip() {
        assert_eq!(u8_from_bytes(&u8_to_bytes(0x7f)).unwrap(), 0x7f);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = f32_from_bytes(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ValueLength {
                expected: 4,
                got: 2
            })
        ));
        assert!(u8_from_bytes(&[]).is_err());
        assert!(u32_from_bytes(&[0; 5]).is_err());
    }
}
