//! `ParseMTProtoPacket` (C2): tells an encrypted packet from a DH-handshake
//! one by inspecting only the minimum header bytes.

use crate::constants::DH_HANDSHAKE_FUNCTIONS;
use crate::{ProtocolError, Result};

/// Classification of one inbound frame, carrying only the fields downstream
/// components need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedPacket {
    Encrypted { auth_key_id: u64, length: usize },
    DhHandshake {
        inner_length: i32,
        function: u32,
        length: usize,
    },
}

impl ParsedPacket {
    pub fn length(&self) -> usize {
        match self {
            ParsedPacket::Encrypted { length, .. } => *length,
            ParsedPacket::DhHandshake { length, .. } => *length,
        }
    }

    pub fn is_handshake(&self) -> bool {
        matches!(self, ParsedPacket::DhHandshake { .. })
    }
}

/// Classify a raw inbound frame. Any malformed input yields a `bad-frame`
/// error; this function never panics.
pub fn parse_mtproto_packet(frame: &[u8]) -> Result<ParsedPacket> {
    if frame.len() < 28 {
        return Err(ProtocolError::BadFrame("frame shorter than 28 bytes"));
    }
    if frame.len() % 4 != 0 {
        return Err(ProtocolError::BadFrame("frame length not a multiple of 4"));
    }

    let auth_key_id = u64::from_le_bytes(frame[0..8].try_into().unwrap());
    if auth_key_id != 0 {
        if frame.len() < 56 {
            return Err(ProtocolError::BadFrame(
                "encrypted frame shorter than 56 bytes",
            ));
        }
        return Ok(ParsedPacket::Encrypted {
            auth_key_id,
            length: frame.len(),
        });
    }

    let inner_length = i32::from_le_bytes(frame[16..20].try_into().unwrap());
    if inner_length < 20 {
        return Err(ProtocolError::BadFrame("inner length below 20"));
    }
    let Some(total) = inner_length.checked_add(20) else {
        return Err(ProtocolError::BadFrame("inner length overflow"));
    };
    if (total as i64) > frame.len() as i64 {
        return Err(ProtocolError::BadFrame("inner length exceeds frame"));
    }

    let function = u32::from_le_bytes(frame[20..24].try_into().unwrap());
    if !DH_HANDSHAKE_FUNCTIONS.contains(&function) {
        return Err(ProtocolError::BadFrame("unrecognized handshake function"));
    }

    Ok(ParsedPacket::DhHandshake {
        inner_length,
        function,
        length: frame.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of_len(len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    #[test]
    fn rejects_short_frame() {
        // S1 in spec.md: 24-byte zero frame.
        let frame = frame_of_len(24);
        assert!(matches!(
            parse_mtproto_packet(&frame),
            Err(ProtocolError::BadFrame(_))
        ));
    }

    #[test]
    fn rejects_unaligned_length() {
        let frame = frame_of_len(29);
        assert!(matches!(
            parse_mtproto_packet(&frame),
            Err(ProtocolError::BadFrame(_))
        ));
    }

    #[test]
    fn classifies_dh_handshake() {
        // S1 in spec.md: 40-byte frame, inner length 20, function
        // 0x60469778.
        let mut frame = frame_of_len(40);
        frame[16..20].copy_from_slice(&20i32.to_le_bytes());
        frame[20..24].copy_from_slice(&0x6046_9778u32.to_le_bytes());
        let parsed = parse_mtproto_packet(&frame).unwrap();
        assert_eq!(
            parsed,
            ParsedPacket::DhHandshake {
                inner_length: 20,
                function: 0x6046_9778,
                length: 40,
            }
        );
    }

    #[test]
    fn classifies_encrypted() {
        // S1 in spec.md: 56-byte frame, auth-key-id 0x1122334455667788.
        let mut frame = frame_of_len(56);
        frame[0..8].copy_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        let parsed = parse_mtproto_packet(&frame).unwrap();
        assert_eq!(
            parsed,
            ParsedPacket::Encrypted {
                auth_key_id: 0x1122_3344_5566_7788,
                length: 56,
            }
        );
    }

    #[test]
    fn rejects_unknown_function_code() {
        // S1 in spec.md: 40-byte frame, function 0x12345678.
        let mut frame = frame_of_len(40);
        frame[16..20].copy_from_slice(&20i32.to_le_bytes());
        frame[20..24].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        assert!(matches!(
            parse_mtproto_packet(&frame),
            Err(ProtocolError::BadFrame(_))
        ));
    }

    #[test]
    fn rejects_encrypted_frame_shorter_than_56() {
        let mut frame = frame_of_len(40);
        frame[0..8].copy_from_slice(&1u64.to_le_bytes());
        assert!(matches!(
            parse_mtproto_packet(&frame),
            Err(ProtocolError::BadFrame(_))
        ));
    }

    #[test]
    fn rejects_inner_length_exceeding_frame() {
        let mut frame = frame_of_len(40);
        frame[16..20].copy_from_slice(&1000i32.to_le_bytes());
        frame[20..24].copy_from_slice(&0x6046_9778u32.to_le_bytes());
        assert!(matches!(
            parse_mtproto_packet(&frame),
            Err(ProtocolError::BadFrame(_))
        ));
    }
}
