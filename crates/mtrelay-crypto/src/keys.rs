//! Obfuscation/session key derivation (`CreateAESKeys`).
//!
//! Builds a fixed-layout little-endian buffer out of the handshake nonces,
//! timestamp, and both endpoints' addresses, then derives four AES-256
//! key/IV pairs from it. The write pair is hashed from the buffer as built;
//! the read pair is hashed from the same buffer with a 6-byte role marker
//! flipped between the literal ASCII strings `CLIENT` and `SERVER` — since
//! the two strings are the same length, XORing either one with
//! `CLIENT ^ SERVER` produces the other. This is why a client's write pair
//! always equals its peer server's read pair, and vice versa.

use crate::{hash, CryptoError, Result};

const MARKER_OFFSET: usize = 42;
const CLIENT: [u8; 6] = *b"CLIENT";
const SERVER: [u8; 6] = *b"SERVER";

fn client_server_xor() -> [u8; 6] {
    let mut out = [0u8; 6];
    for i in 0..6 {
        out[i] = CLIENT[i] ^ SERVER[i];
    }
    out
}

/// The four key/IV pairs derived by [`create_aes_keys`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AesKeys {
    pub read_key: [u8; 32],
    pub read_iv: [u8; 16],
    pub write_key: [u8; 32],
    pub write_iv: [u8; 16],
}

#[allow(clippy::too_many_arguments)]
fn build_buffer(
    am_client: bool,
    nonce_server: &[u8; 16],
    nonce_client: &[u8; 16],
    ts: u32,
    server_ip4: u32,
    server_port: u16,
    server_ip6: &[u8; 16],
    client_ip4: u32,
    client_port: u16,
    client_ip6: &[u8; 16],
    secret: &[u8],
    temp_key: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(88 + secret.len() + temp_key.len());
    buf.push(0); // offset 0: reserved
    buf.extend_from_slice(nonce_server); // 1..17
    buf.extend_from_slice(nonce_client); // 17..33
    buf.extend_from_slice(&ts.to_le_bytes()); // 33..37
    buf.extend_from_slice(&server_ip4.to_le_bytes()); // 37..41
    buf.push(0); // offset 41: reserved
    debug_assert_eq!(buf.len(), MARKER_OFFSET);
    buf.extend_from_slice(if am_client { &CLIENT } else { &SERVER }); // 42..48
    buf.extend_from_slice(&server_port.to_le_bytes()); // 48..50
    buf.extend_from_slice(server_ip6); // 50..66
    buf.extend_from_slice(&client_ip4.to_le_bytes()); // 66..70
    buf.extend_from_slice(&client_port.to_le_bytes()); // 70..72
    buf.extend_from_slice(client_ip6); // 72..88
    buf.extend_from_slice(secret);
    buf.extend_from_slice(temp_key);
    buf
}

fn derive_pair(buf: &[u8]) -> ([u8; 32], [u8; 16]) {
    let md5_tail = hash::md5(&buf[1..]);
    let sha1_whole = hash::sha1(buf);
    let mut key = [0u8; 32];
    key[..12].copy_from_slice(&md5_tail[..12]);
    key[12..].copy_from_slice(&sha1_whole[..20]);
    let iv = hash::md5(&buf[2..]);
    (key, iv)
}

/// Deterministically derive the read/write key and IV pairs for one
/// obfuscated connection.
#[allow(clippy::too_many_arguments)]
pub fn create_aes_keys(
    am_client: bool,
    nonce_server: &[u8; 16],
    nonce_client: &[u8; 16],
    ts: u32,
    server_ip4: u32,
    server_port: u16,
    server_ip6: &[u8; 16],
    client_ip4: u32,
    client_port: u16,
    client_ip6: &[u8; 16],
    secret: &[u8],
    temp_key: &[u8],
) -> Result<AesKeys> {
    if secret.len() < 32 || secret.len() > 256 {
        return Err(CryptoError::InvalidSecretLength(secret.len()));
    }

    let mut buf = build_buffer(
        am_client,
        nonce_server,
        nonce_client,
        ts,
        server_ip4,
        server_port,
        server_ip6,
        client_ip4,
        client_port,
        client_ip6,
        secret,
        temp_key,
    );
    let (write_key, write_iv) = derive_pair(&buf);

    let flip = client_server_xor();
    for (i, byte) in flip.iter().enumerate() {
        buf[MARKER_OFFSET + i] ^= byte;
    }
    let (read_key, read_iv) = derive_pair(&buf);

    Ok(AesKeys {
        read_key,
        read_iv,
        write_key,
        write_iv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(am_client: bool) -> Result<AesKeys> {
        create_aes_keys(
            am_client,
            &[0xaa; 16],
            &[0xbb; 16],
            12345,
            0x0100_007f,
            443,
            &[0; 16],
            0x0200_007f,
            80,
            &[0; 16],
            &[0x11; 32],
            &[0x22; 64],
        )
    }

    #[test]
    fn matches_pinned_vector() {
        let keys = fixture(true).unwrap();
        assert_eq!(
            hex::encode(keys.write_key),
            "2f8b2b75d6a046ec3b1da74042a37c1d3779045efc10acc4a98df0f471f80060"
        );
        assert_eq!(hex::encode(keys.write_iv), "cc386829e022969ad9c010a6b7410b6b");
        assert_eq!(
            hex::encode(keys.read_key),
            "2e52354be3cdd27fbe522a29570a372b1ec2140ba789cde6b3c73217b494701c"
        );
        assert_eq!(hex::encode(keys.read_iv), "cb0dfe5c31aebe966a85745a015b5c0c");
    }

    #[test]
    fn client_write_equals_server_read() {
        let client = fixture(true).unwrap();
        let server = fixture(false).unwrap();
        assert_eq!(client.write_key, server.read_key);
        assert_eq!(client.write_iv, server.read_iv);
        assert_eq!(client.read_key, server.write_key);
        assert_eq!(client.read_iv, server.write_iv);
    }

    #[test]
    fn rejects_short_secret() {
        let err = create_aes_keys(
            true,
            &[0; 16],
            &[0; 16],
            0,
            0,
            0,
            &[0; 16],
            0,
            0,
            &[0; 16],
            &[0x11; 16],
            &[0x22; 64],
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidSecretLength(16)));
    }

    #[test]
    fn rejects_long_secret() {
        let err = create_aes_keys(
            true,
            &[0; 16],
            &[0; 16],
            0,
            0,
            0,
            &[0; 16],
            0,
            0,
            &[0; 16],
            &[0x11; 257],
            &[0x22; 64],
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidSecretLength(257)));
    }
}
