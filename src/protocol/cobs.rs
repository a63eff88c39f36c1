//! Frame codec: COBS byte stuffing, XOR obfuscation, and delimiter framing.
//!
//! A frame on the wire looks like this:
//! ```text
//! ┌──────────────┬──────────────────────────────┬───────────┐
//! │ [priority]   │ COBS(payload) XOR 0x03       │ delimiter │
//! │ 0x01, opt.   │ never contains 0x01 or 0x02  │ 0x02      │
//! └──────────────┴──────────────────────────────┴───────────┘
//! ```
//!
//! The COBS variant removes the three reserved values `0x00`, `0x01` and
//! `0x02` from the payload. Each block starts with a code byte that records
//! how many literal bytes follow and which reserved value (if any) the
//! decoder has to re-insert after them:
//!
//! - `code = reserved * 84 + (literals + 1) + 2` for a block cut short by a
//!   reserved value
//! - `code = 0xFF` for a full block of 84 literals with nothing to re-insert
//!
//! The last block of a frame carries no terminator; its reserved value is
//! never emitted by the decoder.
//!
//! # Example
//!
//! ```
//! use hublink::protocol::FrameCodec;
//!
//! let frame = FrameCodec::pack(&[0x00, 0x01, 0x02, 0x42], false);
//! assert_eq!(*frame.last().unwrap(), 0x02);
//!
//! let payload = FrameCodec::unpack(&frame).unwrap();
//! assert_eq!(payload, vec![0x00, 0x01, 0x02, 0x42]);
//! ```

use crate::error::{HubError, Result};

/// Frame terminator.
pub const DELIMITER: u8 = 0x02;

/// Code byte of a full block that ends without a reserved value.
pub const NO_DELIMITER: u8 = 0xFF;

/// Offset added to every code byte so it never collides with a reserved value.
pub const CODE_OFFSET: u8 = DELIMITER;

/// Maximum literal bytes in one block.
pub const MAX_BLOCK_SIZE: usize = 84;

/// Mask applied to every encoded byte.
pub const XOR_MASK: u8 = 0x03;

/// Optional leading byte marking a high-priority frame.
pub const PRIORITY_BYTE: u8 = 0x01;

/// Marker struct for the hub frame codec.
///
/// All functions are pure transformations over byte buffers.
pub struct FrameCodec;

impl FrameCodec {
    /// COBS-encode `data` so that no reserved value (0, 1, 2) remains.
    ///
    /// Any input is encodable, including an empty slice (which encodes to a
    /// single code byte).
    pub fn encode(data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(data.len() + data.len() / MAX_BLOCK_SIZE + 2);

        // `block` counts the code byte plus literals of the open block.
        let mut code_index = buf.len();
        buf.push(NO_DELIMITER);
        let mut block = 1usize;

        for &byte in data {
            if byte > DELIMITER {
                buf.push(byte);
                block += 1;
            }

            if byte <= DELIMITER || block > MAX_BLOCK_SIZE {
                if byte <= DELIMITER {
                    // Full blocks keep the NO_DELIMITER placeholder.
                    buf[code_index] = block_code(byte, block);
                }
                code_index = buf.len();
                buf.push(NO_DELIMITER);
                block = 1;
            }
        }

        buf[code_index] = block_code(0, block);
        buf
    }

    /// Decode COBS-encoded data back into the original payload.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Framing`] if a code byte is not a valid code or
    /// declares more literal bytes than remain in the input.
    pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len());
        let mut pos = 0;

        while pos < data.len() {
            let code = data[pos];
            pos += 1;

            let (value, literals) = unescape(code)?;
            let end = pos + literals;
            if end > data.len() {
                return Err(HubError::Framing(format!(
                    "code byte 0x{:02X} declares {} bytes but only {} remain",
                    code,
                    literals,
                    data.len() - pos
                )));
            }

            out.extend_from_slice(&data[pos..end]);
            pos = end;

            // The terminator only exists between blocks.
            if pos < data.len() {
                if let Some(value) = value {
                    out.push(value);
                }
            }
        }

        Ok(out)
    }

    /// Encode and frame a payload for transmission.
    ///
    /// With `high_priority` the frame is prefixed with [`PRIORITY_BYTE`].
    pub fn pack(payload: &[u8], high_priority: bool) -> Vec<u8> {
        let encoded = Self::encode(payload);

        let mut frame = Vec::with_capacity(encoded.len() + 2);
        if high_priority {
            frame.push(PRIORITY_BYTE);
        }
        frame.extend(encoded.iter().map(|b| b ^ XOR_MASK));
        frame.push(DELIMITER);
        frame
    }

    /// Unframe and decode a frame received from the hub.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Framing`] if the frame does not end with
    /// [`DELIMITER`], contains a delimiter before its end, or fails to decode.
    pub fn unpack(frame: &[u8]) -> Result<Vec<u8>> {
        let (&last, body) = frame
            .split_last()
            .ok_or_else(|| HubError::Framing("empty frame".to_string()))?;

        if last != DELIMITER {
            return Err(HubError::Framing("missing delimiter".to_string()));
        }

        let body = match body.split_first() {
            Some((&PRIORITY_BYTE, rest)) => rest,
            _ => body,
        };

        if body.contains(&DELIMITER) {
            return Err(HubError::Framing(
                "delimiter inside frame body".to_string(),
            ));
        }

        let unmasked: Vec<u8> = body.iter().map(|b| b ^ XOR_MASK).collect();
        Self::decode(&unmasked)
    }
}

/// Code byte for a block of `block - 1` literals terminated by `reserved`.
#[inline]
fn block_code(reserved: u8, block: usize) -> u8 {
    (reserved as usize * MAX_BLOCK_SIZE + block + CODE_OFFSET as usize) as u8
}

/// Split a code byte into (re-inserted value, literal count).
fn unescape(code: u8) -> Result<(Option<u8>, usize)> {
    if code == NO_DELIMITER {
        return Ok((None, MAX_BLOCK_SIZE));
    }
    if code <= CODE_OFFSET {
        return Err(HubError::Framing(format!("invalid code byte 0x{:02X}", code)));
    }

    let adjusted = (code - CODE_OFFSET) as usize;
    let mut value = adjusted / MAX_BLOCK_SIZE;
    let mut block = adjusted % MAX_BLOCK_SIZE;
    if block == 0 {
        block = MAX_BLOCK_SIZE;
        value -= 1;
    }

    Ok((Some(value as u8), block - 1))
}
