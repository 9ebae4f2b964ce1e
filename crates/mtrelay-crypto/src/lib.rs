//! # mtrelay-crypto
//!
//! Cryptographic primitives for the MTProto relay.
//!
//! This crate implements every cryptographic operation the relay's core
//! needs. No algorithm negotiation is permitted — the suite is fixed by the
//! MTProto obfuscation layer and the Diffie-Hellman handshake it classifies.
//!
//! ## Modules
//!
//! - [`hash`] — SHA-1, SHA-256, HMAC-SHA-256
//! - [`crc`] — CRC-32/IEEE and CRC-32C/Castagnoli, with partial-state variants
//! - [`aes`] — AES-CBC and AES-CTR
//! - [`dh`] — Fixed-prime Diffie-Hellman (RFC 2409 2048-bit group analogue)
//! - [`keys`] — Obfuscation/session key derivation (`CreateAESKeys`)

pub mod aes;
pub mod crc;
pub mod dh;
pub mod hash;
pub mod keys;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Input buffer had the wrong length for the requested operation.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// AES-CBC input was not a multiple of the block size.
    #[error("AES-CBC input length {0} is not a multiple of the block size")]
    NotBlockAligned(usize),

    /// AES-CBC/CTR padding or unpadding failed.
    #[error("AES padding error: {0}")]
    Padding(String),

    /// A Diffie-Hellman public value failed validation.
    #[error("invalid Diffie-Hellman public value")]
    InvalidDhPublicValue,

    /// Diffie-Hellman output regeneration exceeded the retry budget.
    #[error("failed to generate a valid Diffie-Hellman value after {0} attempts")]
    DhRetriesExhausted(u32),

    /// The obfuscation secret had an unsupported length.
    #[error("invalid secret length: expected 32..=256 bytes, got {0}")]
    InvalidSecretLength(usize),
}

/// Convenience result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
