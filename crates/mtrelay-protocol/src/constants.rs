//! Handshake function codes and transport tag words.

/// Function codes that identify a DH-handshake packet (as opposed to an
/// encrypted one).
pub const DH_HANDSHAKE_FUNCTIONS: [u32; 4] =
    [0x6046_9778, 0xbe7e_8ef1, 0xd712_e4be, 0xf504_5f1f];

/// First byte of a compact/Abridged frame.
pub const COMPACT_FIRST_BYTE: u8 = 0xef;

/// First 4 bytes of a medium/Intermediate frame.
pub const MEDIUM_MAGIC: u32 = 0xeeee_eeee;

/// First 4 bytes of a padded-Intermediate frame.
pub const PADDED_MAGIC: u32 = 0xdddd_dddd;

/// Tag word revealed inside a decrypted obfuscated2 header, selecting
/// Abridged framing for the underlying stream.
pub const PROTO_TAG_ABRIDGED: u32 = 0xefef_efef;

/// Tag word revealed inside a decrypted obfuscated2 header, selecting
/// Intermediate framing.
pub const PROTO_TAG_INTERMEDIATE: u32 = 0xeeee_eeee;

/// Tag word revealed inside a decrypted obfuscated2 header, selecting
/// padded-Intermediate framing.
pub const PROTO_TAG_PADDED: u32 = 0xdddd_dddd;

/// Length, in bytes, of the obfuscated2 client camouflage header.
pub const OBFUSCATED2_HEADER_LEN: usize = 64;
