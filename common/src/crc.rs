//! Checksum Engine.
//!
//! Two table-driven CRC variants, matching what external flashing and
//! boot tools compute over firmware images:
//!
//! | Variant          | Poly     | Seed       | Reflected | Final XOR  | check("123456789") |
//! |------------------|----------|------------|-----------|------------|--------------------|
//! | CRC-16/XMODEM    | 0x1021   | 0x0000     | no        | 0x0000     | 0x31C3             |
//! | CRC-32/ISO-HDLC  | 0x04C11DB7 (0xEDB88320 reflected) | 0xFFFFFFFF | yes | 0xFFFFFFFF | 0xCBF43926 |
//!
//! The accumulator API (`*_init`, `*_update`, `*_finalize`) threads raw state
//! through successive chunks, so a checksum can be computed over data that
//! never sits in one buffer (flash read in pages, frames received over UART).

use thiserror::Error;

const CRC16_POLY: u16 = 0x1021;
const CRC32_POLY_REFLECTED: u32 = 0xEDB8_8320;

static CRC16_TABLE: [u16; 256] = crc16_table();
static CRC32_TABLE: [u32; 256] = crc32_table();

const fn crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLY_REFLECTED
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

// ============================================================================
// CRC-16/XMODEM
// ============================================================================

/// Seed for a fresh CRC-16 accumulator.
#[inline]
pub const fn crc16_init() -> u16 {
    0x0000
}

/// Feed `data` into a CRC-16 accumulator.
pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        let index = ((crc >> 8) as u8 ^ byte) as usize;
        crc = (crc << 8) ^ CRC16_TABLE[index];
    }
    crc
}

/// Produce the externally visible CRC-16 value. XMODEM has no final XOR.
#[inline]
pub const fn crc16_finalize(crc: u16) -> u16 {
    crc
}

/// One-shot CRC-16 over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_finalize(crc16_update(crc16_init(), data))
}

// ============================================================================
// CRC-32/ISO-HDLC
// ============================================================================

/// Seed for a fresh CRC-32 accumulator.
#[inline]
pub const fn crc32_init() -> u32 {
    0xFFFF_FFFF
}

/// Feed `data` into a CRC-32 accumulator.
pub fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        let index = ((crc as u8) ^ byte) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    crc
}

/// Produce the externally visible CRC-32 value.
#[inline]
pub const fn crc32_finalize(crc: u32) -> u32 {
    !crc
}

/// One-shot CRC-32 over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    crc32_finalize(crc32_update(crc32_init(), data))
}

// ============================================================================
// Streaming digests
// ============================================================================

/// Streaming CRC-16/XMODEM digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    state: u16,
}

impl Crc16 {
    pub const fn new() -> Self {
        Self {
            state: crc16_init(),
        }
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.state = crc16_update(self.state, data);
        self
    }

    pub const fn finish(&self) -> u16 {
        crc16_finalize(self.state)
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming CRC-32 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    pub const fn new() -> Self {
        Self {
            state: crc32_init(),
        }
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.state = crc32_update(self.state, data);
        self
    }

    pub const fn finish(&self) -> u32 {
        crc32_finalize(self.state)
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Verification
// ============================================================================

/// A computed checksum did not match the value the caller expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("checksum mismatch: computed {computed:#010x}, expected {expected:#010x}")]
pub struct ChecksumMismatch {
    pub computed: u32,
    pub expected: u32,
}

/// Check `data` against an expected CRC-32.
pub fn verify_crc32(data: &[u8], expected: u32) -> Result<(), ChecksumMismatch> {
    check(crc32(data), expected)
}

/// Check `data` against an expected CRC-16.
pub fn verify_crc16(data: &[u8], expected: u16) -> Result<(), ChecksumMismatch> {
    check(crc16(data) as u32, expected as u32)
}

/// Compare an already computed checksum against an expected one.
pub fn check(computed: u32, expected: u32) -> Result<(), ChecksumMismatch> {
    if computed == expected {
        Ok(())
    } else {
        Err(ChecksumMismatch { computed, expected })
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::vec::Vec;

    const CHECK_INPUT: &[u8] = b"123456789";

    #[test]
    fn check_values_match_catalogue() {
        assert_eq!(crc16(CHECK_INPUT), 0x31C3);
        assert_eq!(crc32(CHECK_INPUT), 0xCBF4_3926);
    }

    #[test]
    fn empty_input_is_identity() {
        assert_eq!(crc16(&[]), crc16_finalize(crc16_init()));
        assert_eq!(crc16(&[]), 0);
        assert_eq!(crc32(&[]), crc32_finalize(crc32_init()));
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn chunked_updates_match_single_pass() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut acc32 = crc32_init();
        let mut acc16 = crc16_init();
        for chunk in data.chunks(7) {
            acc32 = crc32_update(acc32, chunk);
            acc16 = crc16_update(acc16, chunk);
        }

        assert_eq!(crc32_finalize(acc32), crc32(&data));
        assert_eq!(crc16_finalize(acc16), crc16(&data));
    }

    #[test]
    fn streaming_digest_matches_one_shot() {
        let mut digest = Crc32::new();
        digest.update(b"1234").update(b"56789");
        assert_eq!(digest.finish(), 0xCBF4_3926);

        let mut digest = Crc16::default();
        digest.update(b"12345").update(b"6789");
        assert_eq!(digest.finish(), 0x31C3);
    }

    #[test]
    fn matches_crc32fast() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect();
        assert_eq!(crc32(&data), crc32fast::hash(&data));
    }

    #[test]
    fn verify_reports_both_values() {
        assert_eq!(verify_crc32(CHECK_INPUT, 0xCBF4_3926), Ok(()));

        let err = verify_crc32(CHECK_INPUT, 0xDEAD_BEEF).unwrap_err();
        assert_eq!(err.computed, 0xCBF4_3926);
        assert_eq!(err.expected, 0xDEAD_BEEF);

        assert!(verify_crc16(CHECK_INPUT, 0x31C3).is_ok());
        assert!(verify_crc16(CHECK_INPUT, 0x0000).is_err());
    }

    #[test]
    fn single_bit_flip_changes_checksum() {
        let mut data = *b"firmware image payload";
        let before = crc32(&data);
        data[5] ^= 0x10;
        assert_ne!(crc32(&data), before);
    }
}
