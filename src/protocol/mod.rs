//! Protocol module - framing codec, checksums, and notification reassembly.
//!
//! This module implements the byte level of the hub protocol:
//! - COBS framing with XOR obfuscation and a `0x02` terminator
//! - CRC-32 with alignment padding and chunk chaining
//! - Reassembly of frames split across notifications

mod checksum;
mod cobs;
mod frame_buffer;

pub use checksum::{crc, crc32, RunningChecksum, DEFAULT_ALIGN};
pub use cobs::{
    FrameCodec, CODE_OFFSET, DELIMITER, MAX_BLOCK_SIZE, NO_DELIMITER, PRIORITY_BYTE, XOR_MASK,
};
pub use frame_buffer::{NotificationBuffer, DEFAULT_MAX_FRAME_SIZE};
