//! Program upload and run control.
//!
//! An upload is a fixed sequence of round trips on a ready [`Session`]:
//!
//! ```text
//! ClearSlot(slot)
//! StartFileUpload(filename, slot, crc32(program))
//! TransferChunk(running_crc₀, chunk₀)
//! TransferChunk(running_crc₁, chunk₁)    running_crcₙ = crc(chunkₙ, running_crcₙ₋₁)
//! ...
//! ```
//!
//! Chunks are at most the hub's `max_chunk_size`, rounded down to the
//! checksum alignment so that the last running checksum equals the whole-file
//! checksum. The first rejected step aborts the upload; nothing further is
//! sent.

use bytes::Bytes;

use crate::error::{HubError, Result, UploadStage};
use crate::message::{
    ClearSlotRequest, ProgramFlowRequest, StartFileUploadRequest, TransferChunkRequest,
};
use crate::protocol::{crc32, RunningChecksum, DEFAULT_ALIGN};
use crate::session::Session;

/// Uploads programs to hub slots and starts or stops them.
#[derive(Clone)]
pub struct ProgramUploader {
    session: Session,
}

impl ProgramUploader {
    /// Wrap a session. The session must be connected before uploading.
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// The session requests are sent on.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Store `program` under `filename` in `slot`.
    ///
    /// # Errors
    ///
    /// - [`HubError::Upload`] naming the step the hub rejected.
    /// - [`HubError::Protocol`] for an invalid filename.
    /// - Any transport error from the underlying requests.
    pub async fn upload_program(&self, filename: &str, slot: u8, program: &[u8]) -> Result<()> {
        let start = StartFileUploadRequest::new(filename, slot, crc32(program))?;
        let max_chunk_size = self
            .session
            .max_chunk_size()
            .ok_or(HubError::Disconnected)?;
        let chunk_size = aligned_chunk_size(max_chunk_size)?;

        tracing::info!(filename, slot, len = program.len(), "Uploading program");

        let cleared = self.session.send_request(&ClearSlotRequest::new(slot)).await?;
        if !cleared.success() {
            return Err(HubError::Upload(UploadStage::ClearSlot));
        }

        let started = self.session.send_request(&start).await?;
        if !started.success() {
            return Err(HubError::Upload(UploadStage::StartUpload));
        }

        let program = Bytes::copy_from_slice(program);
        let mut checksum = RunningChecksum::new();
        let total = program.len().div_ceil(chunk_size);

        for (index, offset) in (0..program.len()).step_by(chunk_size).enumerate() {
            let end = (offset + chunk_size).min(program.len());
            let chunk = program.slice(offset..end);
            let running_crc = checksum.update(&chunk);

            let request = TransferChunkRequest::new(running_crc, chunk)?;
            let response = self.session.send_request(&request).await?;
            if !response.success() {
                tracing::warn!(index, total, "Hub rejected chunk");
                return Err(HubError::Upload(UploadStage::TransferChunk { index }));
            }
            tracing::debug!(index, total, running_crc, "Chunk accepted");
        }

        tracing::info!(filename, slot, "Upload complete");
        Ok(())
    }

    /// Start the program stored in `slot`.
    pub async fn start_program(&self, slot: u8) -> Result<()> {
        self.program_flow(ProgramFlowRequest::start(slot)).await
    }

    /// Stop the program running from `slot`.
    pub async fn stop_program(&self, slot: u8) -> Result<()> {
        self.program_flow(ProgramFlowRequest::stop(slot)).await
    }

    /// Upload `program` and start it.
    pub async fn upload_and_run(&self, filename: &str, slot: u8, program: &[u8]) -> Result<()> {
        self.upload_program(filename, slot, program).await?;
        self.start_program(slot).await
    }

    async fn program_flow(&self, request: ProgramFlowRequest) -> Result<()> {
        let action = if request.stop { "stop" } else { "start" };
        let response = self.session.send_request(&request).await?;
        if !response.success() {
            return Err(HubError::ProgramControl(format!(
                "hub refused to {} slot {} (status 0x{:02X})",
                action, request.slot, response.status
            )));
        }
        tracing::info!(slot = request.slot, "Program {}", action);
        Ok(())
    }
}

/// Largest multiple of the checksum alignment not above `max_chunk_size`.
fn aligned_chunk_size(max_chunk_size: usize) -> Result<usize> {
    let size = max_chunk_size - max_chunk_size % DEFAULT_ALIGN;
    if size == 0 {
        return Err(HubError::Protocol(format!(
            "hub chunk size {} is below the checksum alignment",
            max_chunk_size
        )));
    }
    Ok(size)
}
