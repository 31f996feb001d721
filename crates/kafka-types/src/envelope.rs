//! Schema envelope framing.
//!
//! Format: `[magic_byte(1)][schema_id(4, big-endian)][payload(N)]`

use crate::error::{Result, WireError};
use bytes::{Buf, BufMut, BytesMut};

/// Magic byte that starts every schema-framed record.
pub const MAGIC_BYTE: u8 = 0x00;

/// Length of the magic byte plus schema ID prefix.
pub const ENVELOPE_LEN: usize = 5;

/// Prefix `payload` with the magic byte and `schema_id`.
pub fn wrap(schema_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(ENVELOPE_LEN + payload.len());
    buf.put_u8(MAGIC_BYTE);
    buf.put_u32(schema_id);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Split a framed record into its schema ID and payload.
pub fn unwrap(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < ENVELOPE_LEN {
        return Err(WireError::MalformedEnvelope(format!(
            "record is {} bytes, shorter than the {ENVELOPE_LEN}-byte schema prefix",
            data.len()
        )));
    }

    if data[0] != MAGIC_BYTE {
        return Err(WireError::MalformedEnvelope(format!(
            "invalid magic byte: expected 0x00, got 0x{:02x}",
            data[0]
        )));
    }

    let mut id_bytes = &data[1..ENVELOPE_LEN];
    let schema_id = id_bytes.get_u32();

    Ok((schema_id, &data[ENVELOPE_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_layout() {
        let framed = wrap(0x0102_0304, b"hello");
        assert_eq!(framed, [0x00, 0x01, 0x02, 0x03, 0x04, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_unwrap() {
        let framed = wrap(123, b"payload");
        let (schema_id, payload) = unwrap(&framed).unwrap();
        assert_eq!(schema_id, 123);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_unwrap_empty_payload() {
        let (schema_id, payload) = unwrap(&[0, 0, 0, 0, 7]).unwrap();
        assert_eq!(schema_id, 7);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_unwrap_too_short() {
        let err = unwrap(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(err, WireError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_unwrap_invalid_magic_byte() {
        let err = unwrap(&[0xFF, 0x00, 0x00, 0x00, 0x01, 0x42]).unwrap_err();
        assert!(matches!(err, WireError::MalformedEnvelope(_)));
    }
}
