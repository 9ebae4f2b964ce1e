//! CRC-32/IEEE and CRC-32C/Castagnoli, with partial-state variants.
//!
//! Both checksums are used by upstream RPC framing (CRC-32/IEEE by default,
//! CRC-32C when `--crc32c` is configured). The partial-state entry points let
//! a frame be checksummed across several writes without buffering it whole:
//! `crc32_ieee_partial(chunk, seed)` feeds one chunk through the running
//! register and returns the new register value. `seed` and the return value
//! are both *raw register* state (not yet inverted) — starting a fresh
//! checksum means seeding with `0xffff_ffff`, and the finished checksum is
//! `register ^ 0xffff_ffff`. This mirrors the classic streaming CRC APIs the
//! upstream RPC framing was built against, where the inversion is a step the
//! caller performs, not something baked into every call.

use std::sync::OnceLock;

const IEEE_POLY: u32 = 0xedb8_8320;
const CASTAGNOLI_POLY: u32 = 0x82f6_3b78;

fn build_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ poly
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn ieee_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| build_table(IEEE_POLY))
}

fn castagnoli_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| build_table(CASTAGNOLI_POLY))
}

fn update(table: &[u32; 256], mut reg: u32, data: &[u8]) -> u32 {
    for &byte in data {
        let idx = ((reg ^ u32::from(byte)) & 0xff) as usize;
        reg = table[idx] ^ (reg >> 8);
    }
    reg
}

/// Compute the CRC-32/IEEE checksum of `data`.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    crc32_ieee_partial(data, 0xffff_ffff) ^ 0xffff_ffff
}

/// Fold `data` into a running CRC-32/IEEE register. See the module docs for
/// the seed/finalization contract.
pub fn crc32_ieee_partial(data: &[u8], seed: u32) -> u32 {
    update(ieee_table(), seed, data)
}

/// Compute the CRC-32C/Castagnoli checksum of `data`.
pub fn crc32c(data: &[u8]) -> u32 {
    crc32c_partial(data, 0xffff_ffff) ^ 0xffff_ffff
}

/// Fold `data` into a running CRC-32C register. See the module docs for the
/// seed/finalization contract.
pub fn crc32c_partial(data: &[u8], seed: u32) -> u32 {
    update(castagnoli_table(), seed, data)
}
