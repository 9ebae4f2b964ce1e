//! Transport-mode length codecs: compact (Abridged), medium (Intermediate)
//! and padded-Intermediate.

use rand::RngCore;

use crate::constants::{COMPACT_FIRST_BYTE, MEDIUM_MAGIC, PADDED_MAGIC};
use crate::{ProtocolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Compact,
    Medium,
    Padded,
    Obfuscated2,
}

/// Inspect the first bytes of a freshly accepted connection and decide which
/// transport mode the client is using. Anything not matching one of the
/// three plain-mode prefixes is treated as an obfuscated2 candidate.
pub fn detect_prefix(prefix: &[u8]) -> TransportMode {
    if prefix.first() == Some(&COMPACT_FIRST_BYTE) {
        return TransportMode::Compact;
    }
    if prefix.len() >= 4 {
        let magic = u32::from_le_bytes(prefix[0..4].try_into().unwrap());
        if magic == MEDIUM_MAGIC {
            return TransportMode::Medium;
        }
        if magic == PADDED_MAGIC {
            return TransportMode::Padded;
        }
    }
    TransportMode::Obfuscated2
}

/// Result of decoding a compact-mode length header.
pub struct CompactHeader {
    /// Bytes consumed by the header itself (1 or 4).
    pub header_len: usize,
    pub payload_len: usize,
}

/// Decode a compact (Abridged) length header from the start of `buf`. `buf`
/// must already contain at least 1 byte, and at least 4 if that byte is the
/// extended marker.
pub fn decode_compact_header(buf: &[u8]) -> Result<CompactHeader> {
    let first = *buf
        .first()
        .ok_or(ProtocolError::BadFrame("empty compact header"))?;
    if first != 0x7f {
        return Ok(CompactHeader {
            header_len: 1,
            payload_len: first as usize * 4,
        });
    }
    if buf.len() < 4 {
        return Err(ProtocolError::BadFrame("truncated extended compact header"));
    }
    let quartered = u32::from_le_bytes([buf[1], buf[2], buf[3], 0]) as usize;
    Ok(CompactHeader {
        header_len: 4,
        payload_len: quartered * 4,
    })
}

/// Encode a compact-mode length header for an outbound payload of
/// `payload_len` bytes (must be a multiple of 4).
pub fn encode_compact_header(payload_len: usize) -> Vec<u8> {
    let quartered = payload_len / 4;
    if quartered <= 0x7e {
        vec![quartered as u8]
    } else {
        let mut out = vec![0x7f];
        out.extend_from_slice(&(quartered as u32).to_le_bytes()[0..3]);
        out
    }
}

/// Decode a medium (Intermediate) length header: always exactly 4 bytes.
pub fn decode_medium_header(buf: &[u8]) -> Result<usize> {
    if buf.len() < 4 {
        return Err(ProtocolError::BadFrame("truncated medium header"));
    }
    Ok(u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize)
}

pub fn encode_medium_header(payload_len: usize) -> [u8; 4] {
    (payload_len as u32).to_le_bytes()
}

/// Decode a padded-Intermediate length header, returning `(bytes_to_read,
/// effective_payload_len)`. `bytes_to_read` includes the trailing pad;
/// `effective_payload_len` has it truncated off.
pub fn decode_padded_header(buf: &[u8]) -> Result<(usize, usize)> {
    if buf.len() < 4 {
        return Err(ProtocolError::BadFrame("truncated padded header"));
    }
    let total = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    Ok((total, total & !3))
}

/// Encode a padded-Intermediate length header and 0..3 random pad bytes for
/// a response of `payload_len` bytes, returning `(header, pad)`.
pub fn encode_padded_frame(payload_len: usize, rng: &mut impl RngCore) -> ([u8; 4], Vec<u8>) {
    let pad_len = (rng.next_u32() % 4) as usize;
    let mut pad = vec![0u8; pad_len];
    rng.fill_bytes(&mut pad);
    let header = ((payload_len + pad_len) as u32).to_le_bytes();
    (header, pad)
}
