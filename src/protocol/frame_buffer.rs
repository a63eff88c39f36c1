//! Reassembly buffer for inbound notifications.
//!
//! The hub may split one frame across several GATT notifications, or pack
//! the tail of one frame and the head of the next into a single one. The
//! buffer accumulates bytes with `bytes::BytesMut` and hands out every
//! complete delimiter-terminated frame.
//!
//! # Example
//!
//! ```
//! use hublink::protocol::{FrameCodec, NotificationBuffer};
//!
//! let frame = FrameCodec::pack(b"hello", false);
//! let (head, tail) = frame.split_at(3);
//!
//! let mut buffer = NotificationBuffer::new();
//! assert!(buffer.push(head).unwrap().is_empty());
//!
//! let frames = buffer.push(tail).unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(FrameCodec::unpack(&frames[0]).unwrap(), b"hello".to_vec());
//! ```

use bytes::{Bytes, BytesMut};

use super::cobs::DELIMITER;
use crate::error::{HubError, Result};

/// Default upper bound for a single buffered frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Accumulates notification bytes and extracts complete frames.
pub struct NotificationBuffer {
    /// Bytes not yet terminated by a delimiter.
    buffer: BytesMut,
    /// Maximum bytes allowed before a delimiter must appear.
    max_frame_size: usize,
}

impl NotificationBuffer {
    /// Create a buffer with the default frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a buffer with a custom frame size limit.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            max_frame_size,
        }
    }

    /// Push notification bytes and extract all complete frames.
    ///
    /// Each returned frame still ends with the delimiter, ready for
    /// [`FrameCodec::unpack`](super::FrameCodec::unpack).
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Framing`] if the unterminated tail grows beyond
    /// the size limit. The buffer is cleared in that case so the next
    /// frame can still be received.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == DELIMITER) {
            let frame = self.buffer.split_to(pos + 1).freeze();
            frames.push(frame);
        }

        if self.buffer.len() > self.max_frame_size {
            let dropped = self.buffer.len();
            self.buffer.clear();
            return Err(HubError::Framing(format!(
                "unterminated frame of {} bytes exceeds maximum {}",
                dropped, self.max_frame_size
            )));
        }

        Ok(frames)
    }

    /// Number of buffered bytes awaiting a delimiter.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for NotificationBuffer {
    fn default() -> Self {
        Self::new()
    }
}
