//! Binary wire formats
//!
//! # Ingress Datagram
//!
//! Producers on the platform send one datagram per message:
//!
//! ```text
//! ┌────────────────┬──────────────────┬──────────────────────────────┐
//! │ Code (2 bytes) │ Length (2 bytes) │ Payload (≤ payload_size - 4) │
//! │ i16 LE         │ i16 LE           │ opaque bytes or text         │
//! └────────────────┴──────────────────┴──────────────────────────────┘
//! ```
//!
//! # Sensor Payloads
//!
//! | Stream | Size | Layout |
//! |--------|------|--------|
//! | attitude | 32 bytes | `[roll, pitch, yaw, temperature]` f64 LE |
//! | radiation | 4 bytes | counts per interval, i32 LE |
//!
//! # Viewer Framing
//!
//! Everything sent to a viewer over TCP is length-prefixed:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ stream message or report │
//! └──────────────────┴──────────────────────────┘
//! ```

use crate::error::{Error, Result};
use std::io::Read;

/// Datagram header size in bytes
pub const HEADER_LEN: usize = 4;

/// Encoded attitude sample size in bytes
pub const ATTITUDE_LEN: usize = 32;

/// Largest viewer frame accepted from a client (handshakes are tiny)
pub const MAX_CLIENT_FRAME: usize = 256;

/// Decoded datagram header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    /// Routing code
    pub code: i16,
    /// Declared payload length
    pub length: i16,
}

/// Read the 4-byte little-endian header at the start of a datagram
pub fn decode_header(bytes: &[u8]) -> Result<DatagramHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::MalformedHeader {
            available: bytes.len(),
        });
    }
    Ok(DatagramHeader {
        code: i16::from_le_bytes([bytes[0], bytes[1]]),
        length: i16::from_le_bytes([bytes[2], bytes[3]]),
    })
}

/// Inverse of [`decode_header`]
pub fn encode_header(code: i16, length: i16) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..2].copy_from_slice(&code.to_le_bytes());
    out[2..].copy_from_slice(&length.to_le_bytes());
    out
}

/// Build a complete datagram (header + payload)
///
/// Payloads longer than `i16::MAX` are truncated to fit the length field.
pub fn encode_datagram(code: i16, payload: &[u8]) -> Vec<u8> {
    let len = payload.len().min(i16::MAX as usize);
    let mut out = Vec::with_capacity(HEADER_LEN + len);
    out.extend_from_slice(&encode_header(code, len as i16));
    out.extend_from_slice(&payload[..len]);
    out
}

/// Encode an attitude sample: roll, pitch, yaw (rad) and temperature (°C)
pub fn encode_attitude(roll: f64, pitch: f64, yaw: f64, temperature: f64) -> [u8; ATTITUDE_LEN] {
    let mut out = [0u8; ATTITUDE_LEN];
    for (chunk, value) in out.chunks_exact_mut(8).zip([roll, pitch, yaw, temperature]) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode a 32-byte attitude payload back into `[roll, pitch, yaw, temperature]`
pub fn decode_attitude(bytes: &[u8]) -> Option<[f64; 4]> {
    if bytes.len() != ATTITUDE_LEN {
        return None;
    }
    let mut out = [0.0; 4];
    for (value, chunk) in out.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        *value = f64::from_le_bytes(raw);
    }
    Some(out)
}

/// Encode a per-interval pulse count
#[inline]
pub fn encode_count(n: i32) -> [u8; 4] {
    n.to_le_bytes()
}

/// Prefix a payload with its big-endian u32 length for viewer delivery
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Read one length-prefixed frame, rejecting frames above `max_len`
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(Error::Other(format!("Frame too large: {} bytes", len)));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_roundtrip() {
        for (code, length) in [(0, 0), (1, 1020), (-1, 0), (i16::MIN, i16::MAX), (42, -7)] {
            let bytes = encode_header(code, length);
            let header = decode_header(&bytes).unwrap();
            assert_eq!(header, DatagramHeader { code, length });
        }
    }

    #[test]
    fn test_header_is_little_endian() {
        let header = decode_header(&[0x01, 0x00, 0x10, 0x02, 0xff]).unwrap();
        assert_eq!(header.code, 1);
        assert_eq!(header.length, 0x0210);

        let header = decode_header(&[0xff, 0xff, 0x00, 0x00]).unwrap();
        assert_eq!(header.code, -1);
    }

    #[test]
    fn test_short_header_rejected() {
        for len in 0..HEADER_LEN {
            let bytes = vec![0u8; len];
            match decode_header(&bytes) {
                Err(Error::MalformedHeader { available }) => assert_eq!(available, len),
                other => panic!("expected MalformedHeader, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_encode_datagram() {
        let dgram = encode_datagram(1, b"abc");
        assert_eq!(dgram, vec![1, 0, 3, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_attitude_layout() {
        let bytes = encode_attitude(1.0, -2.5, 0.0, 36.53);
        assert_eq!(bytes.len(), ATTITUDE_LEN);
        assert_eq!(&bytes[0..8], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[8..16], &(-2.5f64).to_le_bytes());
        assert_eq!(&bytes[16..24], &0.0f64.to_le_bytes());
        assert_eq!(&bytes[24..32], &36.53f64.to_le_bytes());
        assert_eq!(decode_attitude(&bytes), Some([1.0, -2.5, 0.0, 36.53]));
    }

    #[test]
    fn test_decode_attitude_wrong_size() {
        assert_eq!(decode_attitude(&[0u8; 31]), None);
    }

    #[test]
    fn test_count_layout() {
        assert_eq!(encode_count(1), [1, 0, 0, 0]);
        assert_eq!(encode_count(258), [2, 1, 0, 0]);
        assert_eq!(encode_count(-1), [0xff; 4]);
    }

    #[test]
    fn test_frame_and_read_frame() {
        let framed = frame(b"attitude");
        assert_eq!(&framed[..4], &[0, 0, 0, 8]);

        let mut cursor = Cursor::new(framed);
        let payload = read_frame(&mut cursor, MAX_CLIENT_FRAME).unwrap();
        assert_eq!(payload, b"attitude");
    }

    #[test]
    fn test_read_frame_rejects_oversized() {
        let framed = frame(&[0u8; 300]);
        let mut cursor = Cursor::new(framed);
        assert!(read_frame(&mut cursor, MAX_CLIENT_FRAME).is_err());
    }
}
