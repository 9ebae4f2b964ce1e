//! # mtrelay-protocol
//!
//! Wire framing and classification for the MTProto-obfuscation-aware
//! transport: the handshake/encrypted classifier, the per-connection session
//! state machine, the transport-mode length codecs, and the obfuscated2
//! camouflage header.
//!
//! ## Modules
//!
//! - [`constants`] — handshake function codes and transport tag words
//! - [`classifier`] — `parse_mtproto_packet`
//! - [`session`] — the absorbing session state machine
//! - [`framing`] — compact/medium/padded length codecs
//! - [`obfuscation`] — obfuscated2 header key derivation and detection

pub mod classifier;
pub mod constants;
pub mod framing;
pub mod obfuscation;
pub mod session;

pub use classifier::{parse_mtproto_packet, ParsedPacket};
pub use session::SessionState;

/// Error type for protocol-layer operations. Every rejection is a value, not
/// a panic.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bad frame: {0}")]
    BadFrame(&'static str),

    #[error("invalid obfuscated2 header")]
    InvalidObfuscationHeader,
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
