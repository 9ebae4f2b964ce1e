//! Obfuscated2 camouflage header: key derivation and transport-tag
//! detection.
//!
//! The client sends a 64-byte header that looks like random noise. The
//! server tries each configured secret, derives a candidate key/IV pair from
//! the raw header bytes, decrypts the header with it, and checks whether
//! bytes [56..60) land on one of the three known transport tags. The first
//! secret that decrypts to a recognized tag wins.

use mtrelay_crypto::aes::CtrStream;
use mtrelay_crypto::hash::sha256;

use crate::constants::{
    OBFUSCATED2_HEADER_LEN, PROTO_TAG_ABRIDGED, PROTO_TAG_INTERMEDIATE, PROTO_TAG_PADDED,
};
use crate::framing::TransportMode;
use crate::{ProtocolError, Result};

/// Read/write key and IV pair derived from one obfuscated2 header.
#[derive(Debug, Clone)]
pub struct ObfuscationKeys {
    pub read_key: [u8; 32],
    pub read_iv: [u8; 16],
    pub write_key: [u8; 32],
    pub write_iv: [u8; 16],
}

/// The outcome of successfully detecting a client's obfuscated2 header.
pub struct Obfuscated2Handshake {
    pub keys: ObfuscationKeys,
    pub inner_mode: TransportMode,
    pub target_dc: i16,
}

fn reversed(data: &[u8]) -> Vec<u8> {
    data.iter().rev().copied().collect()
}

/// Derive the key/IV pairs from a raw (not yet decrypted) 64-byte header, for
/// one candidate secret. `secret` of `None` models a server configured with
/// no secrets at all: the unhashed header bytes are used directly.
fn derive_keys(header: &[u8; OBFUSCATED2_HEADER_LEN], secret: Option<&[u8]>) -> ObfuscationKeys {
    let read_iv: [u8; 16] = header[40..56].try_into().unwrap();
    let write_iv: [u8; 16] = reversed(&header[8..24]).try_into().unwrap();

    let read_key: [u8; 32] = match secret {
        Some(secret) => {
            let mut material = header[8..40].to_vec();
            material.extend_from_slice(secret);
            sha256(&material)
        }
        None => header[8..40].try_into().unwrap(),
    };

    let write_key_material = reversed(&header[24..56]);
    let write_key: [u8; 32] = match secret {
        Some(secret) => {
            let mut material = write_key_material.clone();
            material.extend_from_slice(secret);
            sha256(&material)
        }
        None => write_key_material.try_into().unwrap(),
    };

    ObfuscationKeys {
        read_key,
        read_iv,
        write_key,
        write_iv,
    }
}

fn tag_to_mode(tag: u32) -> Option<TransportMode> {
    match tag {
        PROTO_TAG_ABRIDGED => Some(TransportMode::Compact),
        PROTO_TAG_INTERMEDIATE => Some(TransportMode::Medium),
        PROTO_TAG_PADDED => Some(TransportMode::Padded),
        _ => None,
    }
}

/// Try every configured secret (or, with an empty slice, the unhashed
/// fallback) against a raw 64-byte header, returning the first candidate
/// that decrypts to a recognized transport tag along with a fresh read/write
/// CTR stream pair.
pub fn detect(
    header: &[u8; OBFUSCATED2_HEADER_LEN],
    secrets: &[Vec<u8>],
) -> Result<(Obfuscated2Handshake, CtrStream, CtrStream)> {
    let candidates: Vec<Option<&[u8]>> = if secrets.is_empty() {
        vec![None]
    } else {
        secrets.iter().map(|s| Some(s.as_slice())).collect()
    };

    for secret in candidates {
        let keys = derive_keys(header, secret);
        let mut read_stream = CtrStream::new(&keys.read_key, &keys.read_iv)
            .map_err(|_| ProtocolError::InvalidObfuscationHeader)?;
        let mut decrypted = *header;
        read_stream.apply(&mut decrypted);

        let tag = u32::from_le_bytes(decrypted[56..60].try_into().unwrap());
        let Some(inner_mode) = tag_to_mode(tag) else {
            continue;
        };
        let target_dc = i16::from_le_bytes(decrypted[60..62].try_into().unwrap());

        // Re-derive fresh streams: `read_stream` already consumed its first
        // 64 bytes of keystream decrypting the header, which is exactly
        // where a freshly constructed stream needs to be for the frames
        // that follow, so we keep it. The write stream starts untouched and
        // is advanced the same 64 bytes to stay in lock-step.
        let mut write_stream = CtrStream::new(&keys.write_key, &keys.write_iv)
            .map_err(|_| ProtocolError::InvalidObfuscationHeader)?;
        let mut discard = [0u8; OBFUSCATED2_HEADER_LEN];
        write_stream.apply(&mut discard);

        return Ok((
            Obfuscated2Handshake {
                keys,
                inner_mode,
                target_dc,
            },
            read_stream,
            write_stream,
        ));
    }

    Err(ProtocolError::InvalidObfuscationHeader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtrelay_crypto::aes::ctr_apply;

    fn build_client_header(secret: &[u8], tag: u32, target_dc: i16) -> [u8; 64] {
        let mut raw = [0u8; 64];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = i as u8;
        }

        let keys = derive_keys(&raw, Some(secret));
        let mut plaintext = raw;
        plaintext[56..60].copy_from_slice(&tag.to_le_bytes());
        plaintext[60..62].copy_from_slice(&target_dc.to_le_bytes());

        // The client encrypts `plaintext` with its write stream (== our
        // read stream) and sends the ciphertext as the header.
        let ciphertext = ctr_apply(&keys.read_key, &keys.read_iv, &plaintext).unwrap();
        let mut header = [0u8; 64];
        header.copy_from_slice(&ciphertext);
        header
    }

    #[test]
    fn detects_padded_mode_with_matching_secret() {
        let secret = vec![0x42u8; 16];
        let header = build_client_header(&secret, PROTO_TAG_PADDED, 3);

        let (handshake, _read, _write) = detect(&header, &[secret]).unwrap();
        assert!(matches!(handshake.inner_mode, TransportMode::Padded));
        assert_eq!(handshake.target_dc, 3);
    }

    #[test]
    fn tries_each_secret_in_order() {
        let right_secret = vec![0x11u8; 16];
        let wrong_secret = vec![0x22u8; 16];
        let header = build_client_header(&right_secret, PROTO_TAG_ABRIDGED, -1);

        let (handshake, _read, _write) =
            detect(&header, &[wrong_secret, right_secret]).unwrap();
        assert!(matches!(handshake.inner_mode, TransportMode::Compact));
        assert_eq!(handshake.target_dc, -1);
    }

    #[test]
    fn rejects_header_matching_no_secret() {
        let secret = vec![0x33u8; 16];
        let header = [0u8; 64];
        assert!(detect(&header, &[secret]).is_err());
    }
}
