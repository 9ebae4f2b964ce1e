//! SHA-1, SHA-256 and HMAC-SHA-256 hashing.
//!
//! The relay never uses these for content integrity claims — only as the
//! building blocks the MTProto obfuscation layer and DH handshake specify.
//! Each single-shot function has a two-chunk sibling that hashes two byte
//! slices back-to-back without requiring the caller to concatenate them
//! first; this matches the way the wire format builds hash inputs out of
//! several disjoint fields.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Compute the SHA-1 digest of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-1 digest of `a || b` without concatenating them first.
pub fn sha1_two_chunk(a: &[u8], b: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest of `a || b` without concatenating them first.
pub fn sha256_two_chunk(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Compute HMAC-SHA-256 of `message` under `key`.
///
/// Accepts any key length; `Hmac` handles the block-size padding/hashing
/// per RFC 2104.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Compute the MD5 digest of `data`.
///
/// Used only for the config snapshot digest (§3 Snapshot); never for
/// anything security-relevant.
pub fn md5(data: &[u8]) -> [u8; 16] {
    use md5::{Digest as Md5Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}
