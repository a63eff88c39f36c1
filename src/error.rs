//! Error types for hublink.

use std::fmt;

use thiserror::Error;

/// Step of the program upload sequence that reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    /// The hub refused to clear the target slot.
    ClearSlot,
    /// The hub refused to start the file upload.
    StartUpload,
    /// The hub rejected a chunk (zero-based index).
    TransferChunk { index: usize },
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStage::ClearSlot => f.write_str("clear slot rejected"),
            UploadStage::StartUpload => f.write_str("start file upload rejected"),
            UploadStage::TransferChunk { index } => write!(f, "chunk {} rejected", index),
        }
    }
}

/// Main error type for all hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// Malformed, truncated, or unterminated frame.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Unknown message identifier or malformed message body.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device selection, GATT connect, or discovery failed after retries.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The link went away while the operation was in flight.
    #[error("Disconnected")]
    Disconnected,

    /// No correlated response arrived in time.
    #[error("Timed out waiting for message 0x{message_id:02X}")]
    Timeout { message_id: u8 },

    /// A characteristic write failed after retries.
    #[error("Write error: {0}")]
    Write(String),

    /// A step of the upload sequence reported failure.
    #[error("Upload failed: {0}")]
    Upload(UploadStage),

    /// Starting or stopping a program failed.
    #[error("Program control error: {0}")]
    ProgramControl(String),

    /// Invalid session configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using HubError.
pub type Result<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_stage_display_names_chunk() {
        let err = HubError::Upload(UploadStage::TransferChunk { index: 1 });
        assert_eq!(err.to_string(), "Upload failed: chunk 1 rejected");
    }

    #[test]
    fn test_timeout_display() {
        let err = HubError::Timeout { message_id: 0x11 };
        assert_eq!(err.to_string(), "Timed out waiting for message 0x11");
    }
}
