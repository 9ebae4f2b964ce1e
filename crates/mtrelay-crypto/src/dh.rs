//! Fixed-prime Diffie-Hellman.
//!
//! The group is not negotiated: both ends of the handshake share a single
//! 2048-bit safe prime and generator 3, published here byte-exact and
//! big-endian as `DH_PRIME`. `first_round`/`second_round`/`third_round`
//! mirror the three message exchange of the handshake this relay classifies
//! (but does not terminate) — `first_round` is the shape a client-side
//! implementation would use to generate its half, `second_round` is the
//! server's reply, `third_round` recovers the same shared secret from the
//! client's side once the server's public value arrives.

use std::sync::OnceLock;

use num_bigint::BigUint;
use num_traits::Num;
use rand_core::RngCore;

use crate::{hash, CryptoError, Result};

/// Handshake magic carried in [`DhParams`].
pub const MAGIC: u32 = 0xab45ccd3;

const GENERATOR: u32 = 3;

const DH_PRIME_HEX: &str = concat!(
    "C71CAEB9C6B1C9048E6C522F70F13F73980D40238E3E21C14934D037563D930",
    "F48198A0AA7C14058229493D22530F4DBFA336F6E0AC925139543AED44CCE7C3",
    "720FD51F69458705AC68CD4FE6B6B13ABDC9746512969328454F18FAF8C595F6",
    "42477FE96BB2A941D5BCD1D4AC8CC49880708FA9B378E3C4F3A9060BEE67CF9A4",
    "A4A695811051907E162753B56B0F6B410DBA74D8A84B2A14B3144E0EF1284754F",
    "D17ED950D5965B4B9DD46582DB1178D169C6BC465B0D6FF9CA3928FEF5B9AE4E4",
    "18FC15E83EBEA0F87FA9FF5EED70050DED2849F47BF959D956850CE929851F0D8",
    "115F635B105EE2E4E15D04B2454BF6F4FADF034B10403119CD8E3B92FCC5B",
);

/// Maximum regeneration attempts before giving up on a DH round.
const MAX_ATTEMPTS: u32 = 64;

/// The fixed 2048-bit DH prime, big-endian, zero-padded to 256 bytes.
pub fn dh_prime_bytes() -> &'static [u8; 256] {
    static PRIME: OnceLock<[u8; 256]> = OnceLock::new();
    PRIME.get_or_init(|| {
        let bytes = hex::decode(DH_PRIME_HEX).expect("DH_PRIME_HEX is valid hex");
        let mut out = [0u8; 256];
        out.copy_from_slice(&bytes);
        out
    })
}

fn dh_prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| {
        BigUint::from_str_radix(DH_PRIME_HEX, 16).expect("DH_PRIME_HEX is valid hex")
    })
}

/// Opaque state carried from [`first_round`] to [`third_round`].
pub struct DhParams {
    pub magic: u32,
    pub dh_params_hash: [u8; 4],
    a: BigUint,
}

/// `y` is acceptable as a peer public value: it must not be degenerate (at
/// least one non-zero byte in the top 8) and must be strictly less than the
/// prime when compared as a big-endian integer.
pub fn is_good_public_value(y: &[u8]) -> bool {
    let prime = dh_prime_bytes();
    if y.len() != prime.len() {
        return false;
    }
    if y[..8].iter().all(|&b| b == 0) {
        return false;
    }
    y < prime.as_slice()
}

fn pad_if_valid(n: &BigUint) -> Option<[u8; 256]> {
    let raw = n.to_bytes_be();
    if raw.is_empty() || raw.len() <= 240 || raw.len() > 256 {
        return None;
    }
    let mut out = [0u8; 256];
    out[256 - raw.len()..].copy_from_slice(&raw);
    Some(out)
}

fn dh_params_hash() -> [u8; 4] {
    let mut buf = Vec::with_capacity(4 + 4 + 256);
    buf.extend_from_slice(&GENERATOR.to_le_bytes());
    buf.extend_from_slice(&0x0001_00feu32.to_le_bytes());
    buf.extend_from_slice(dh_prime_bytes());
    let digest = hash::sha1(&buf);
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Generate a fresh 256-byte private scalar and its public value `g^x mod p`,
/// regenerating until the public value's unpadded length falls in `(240,
/// 256]`.
fn random_scalar_and_public(rng: &mut impl RngCore) -> Result<(BigUint, [u8; 256])> {
    let prime = dh_prime();
    let generator = BigUint::from(GENERATOR);
    for _ in 0..MAX_ATTEMPTS {
        let mut scalar_bytes = [0u8; 256];
        rng.fill_bytes(&mut scalar_bytes);
        let x = BigUint::from_bytes_be(&scalar_bytes);
        let public = generator.modpow(&x, prime);
        if let Some(padded) = pad_if_valid(&public) {
            return Ok((x, padded));
        }
    }
    Err(CryptoError::DhRetriesExhausted(MAX_ATTEMPTS))
}

/// First message of the handshake: generates this side's private scalar and
/// public value, along with the params needed to complete [`third_round`]
/// later.
pub fn first_round(rng: &mut impl RngCore) -> Result<([u8; 256], DhParams)> {
    let (a, public_a) = random_scalar_and_public(rng)?;
    let params = DhParams {
        magic: MAGIC,
        dh_params_hash: dh_params_hash(),
        a,
    };
    Ok((public_a, params))
}

/// Second message: validates the peer's public value, derives the shared
/// secret and this side's public value.
pub fn second_round(peer_public: &[u8], rng: &mut impl RngCore) -> Result<([u8; 256], [u8; 256])> {
    if !is_good_public_value(peer_public) {
        return Err(CryptoError::InvalidDhPublicValue);
    }
    let prime = dh_prime();
    let generator = BigUint::from(GENERATOR);
    let peer = BigUint::from_bytes_be(peer_public);
    for _ in 0..MAX_ATTEMPTS {
        let mut scalar_bytes = [0u8; 256];
        rng.fill_bytes(&mut scalar_bytes);
        let b = BigUint::from_bytes_be(&scalar_bytes);
        let public_b = match pad_if_valid(&generator.modpow(&b, prime)) {
            Some(v) => v,
            None => continue,
        };
        let shared = match pad_if_valid(&peer.modpow(&b, prime)) {
            Some(v) => v,
            None => continue,
        };
        return Ok((shared, public_b));
    }
    Err(CryptoError::DhRetriesExhausted(MAX_ATTEMPTS))
}

/// Third message: recovers the shared secret from the peer's public value
/// using the private scalar retained since [`first_round`].
pub fn third_round(peer_public: &[u8], params: &DhParams) -> Result<[u8; 256]> {
    if !is_good_public_value(peer_public) {
        return Err(CryptoError::InvalidDhPublicValue);
    }
    let prime = dh_prime();
    let peer = BigUint::from_bytes_be(peer_public);
    let shared = peer.modpow(&params.a, prime);
    let raw = shared.to_bytes_be();
    let mut out = [0u8; 256];
    out[256 - raw.len()..].copy_from_slice(&raw);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn dh_prime_is_256_bytes() {
        assert_eq!(dh_prime_bytes().len(), 256);
    }

    #[test]
    fn rejects_zero_public_value() {
        assert!(!is_good_public_value(&[0u8; 256]));
    }

    #[test]
    fn rejects_public_value_equal_to_prime() {
        assert!(!is_good_public_value(dh_prime_bytes()));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_good_public_value(&[1u8; 255]));
    }

    #[test]
    fn accepts_small_nonzero_value_below_prime() {
        let mut y = [0u8; 256];
        y[0] = 1;
        assert!(is_good_public_value(&y));
    }

    #[test]
    fn third_round_agrees_both_directions() {
        // Property 4 in spec.md.
        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(2);

        let (pub_a, params_a) = first_round(&mut rng_a).unwrap();
        let (shared_b, pub_b) = second_round(&pub_a, &mut rng_b).unwrap();
        let shared_a = third_round(&pub_b, &params_a).unwrap();

        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn second_round_rejects_bad_peer_value() {
        let mut rng = StdRng::seed_from_u64(3);
        let err = second_round(&[0u8; 256], &mut rng).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidDhPublicValue));
    }

    #[test]
    fn dh_params_hash_is_stable() {
        let mut rng = StdRng::seed_from_u64(4);
        let (_, params) = first_round(&mut rng).unwrap();
        assert_eq!(params.magic, MAGIC);
        let again = dh_params_hash();
        assert_eq!(params.dh_params_hash, again);
    }
}
