//! CRC-32 with word alignment and seed chaining.
//!
//! The hub verifies uploads with the standard reflected CRC-32
//! (CRC-32/ISO-HDLC) over data zero-padded to a 4-byte boundary. Large files
//! are checksummed per chunk, feeding each result into the next call as the
//! seed:
//!
//! ```
//! use hublink::protocol::{crc, crc32};
//!
//! let program = [0x41u8; 12];
//! let first = crc(&program[..8], 0, 4);
//! let chained = crc(&program[8..], first, 4);
//! assert_eq!(chained, crc32(&program));
//! ```
//!
//! Chaining only matches the whole-buffer value when every chunk except the
//! last has a length that is a multiple of the alignment.

use crc32fast::Hasher;

/// Default alignment used by the hub.
pub const DEFAULT_ALIGN: usize = 4;

/// Compute the CRC-32 of `data`, padded with zeros to a multiple of `align`,
/// continuing from `seed`.
///
/// An `align` of 0 or 1 disables padding.
pub fn crc(data: &[u8], seed: u32, align: usize) -> u32 {
    let mut hasher = Hasher::new_with_initial(seed);
    hasher.update(data);

    if align > 1 {
        let remainder = data.len() % align;
        if remainder != 0 {
            const ZEROS: [u8; 64] = [0u8; 64];
            let mut padding = align - remainder;
            while padding > 0 {
                let n = padding.min(ZEROS.len());
                hasher.update(&ZEROS[..n]);
                padding -= n;
            }
        }
    }

    hasher.finalize()
}

/// CRC-32 with seed 0 and the default alignment.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc(data, 0, DEFAULT_ALIGN)
}

/// Running checksum over consecutive chunks of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningChecksum {
    value: u32,
    align: usize,
}

impl RunningChecksum {
    /// Start a new running checksum from seed 0.
    pub fn new() -> Self {
        Self::with_seed(0, DEFAULT_ALIGN)
    }

    /// Start from an explicit seed and alignment.
    pub fn with_seed(seed: u32, align: usize) -> Self {
        Self { value: seed, align }
    }

    /// Fold the next chunk in and return the updated value.
    pub fn update(&mut self, chunk: &[u8]) -> u32 {
        self.value = crc(chunk, self.value, self.align);
        self.value
    }

    /// Current value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }
}

impl Default for RunningChecksum {
    fn default() -> Self {
        Self::new()
    }
}
