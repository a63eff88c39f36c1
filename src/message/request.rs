//! Host-to-hub requests.

use bytes::{BufMut, Bytes, BytesMut};

use super::response::{
    ClearSlotResponse, DeviceNotificationResponse, InfoResponse, ProgramFlowResponse,
    StartFileUploadResponse, TransferChunkResponse,
};
use super::{ids, Body, Request};
use crate::error::{HubError, Result};

/// Longest filename the hub accepts, in UTF-8 bytes without the terminator.
pub const MAX_FILENAME_LEN: usize = 31;

/// Ask the hub for its firmware versions and transfer limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoRequest;

impl InfoRequest {
    pub(crate) fn parse(_body: &mut Body<'_>) -> Result<Self> {
        Ok(Self)
    }
}

impl Request for InfoRequest {
    type Response = InfoResponse;
    const ID: u8 = ids::INFO_REQUEST;

    fn serialize(&self) -> Bytes {
        Bytes::from_static(&[ids::INFO_REQUEST])
    }
}

/// Enable periodic device state notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNotificationRequest {
    /// Interval between notifications in milliseconds (0 disables them).
    pub interval_ms: u16,
}

impl DeviceNotificationRequest {
    pub fn new(interval_ms: u16) -> Self {
        Self { interval_ms }
    }

    pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
        Ok(Self {
            interval_ms: body.get_u16()?,
        })
    }
}

impl Request for DeviceNotificationRequest {
    type Response = DeviceNotificationResponse;
    const ID: u8 = ids::DEVICE_NOTIFICATION_REQUEST;

    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(3);
        buf.put_u8(ids::DEVICE_NOTIFICATION_REQUEST);
        buf.put_u16_le(self.interval_ms);
        buf.freeze()
    }
}

/// Erase the program stored in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearSlotRequest {
    pub slot: u8,
}

impl ClearSlotRequest {
    pub fn new(slot: u8) -> Self {
        Self { slot }
    }

    pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
        Ok(Self {
            slot: body.get_u8()?,
        })
    }
}

impl Request for ClearSlotRequest {
    type Response = ClearSlotResponse;
    const ID: u8 = ids::CLEAR_SLOT_REQUEST;

    fn serialize(&self) -> Bytes {
        Bytes::copy_from_slice(&[ids::CLEAR_SLOT_REQUEST, self.slot])
    }
}

/// Announce a file upload into a slot.
///
/// `crc` is the checksum of the complete file, see [`crc32`](crate::protocol::crc32).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartFileUploadRequest {
    filename: String,
    slot: u8,
    crc: u32,
}

impl StartFileUploadRequest {
    /// Create a request, validating the filename.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Protocol`] if the filename is longer than
    /// [`MAX_FILENAME_LEN`] bytes or contains a NUL byte.
    pub fn new(filename: impl Into<String>, slot: u8, crc: u32) -> Result<Self> {
        let filename = filename.into();
        if filename.len() > MAX_FILENAME_LEN {
            return Err(HubError::Protocol(format!(
                "filename is {} bytes, maximum is {}",
                filename.len(),
                MAX_FILENAME_LEN
            )));
        }
        if filename.contains('\0') {
            return Err(HubError::Protocol(
                "filename contains a NUL byte".to_string(),
            ));
        }
        Ok(Self {
            filename,
            slot,
            crc,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
        let filename = body.get_cstr()?;
        let slot = body.get_u8()?;
        let crc = body.get_u32()?;
        Self::new(filename, slot, crc)
    }
}

impl Request for StartFileUploadRequest {
    type Response = StartFileUploadResponse;
    const ID: u8 = ids::START_FILE_UPLOAD_REQUEST;

    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.filename.len() + 7);
        buf.put_u8(ids::START_FILE_UPLOAD_REQUEST);
        buf.put_slice(self.filename.as_bytes());
        buf.put_u8(0);
        buf.put_u8(self.slot);
        buf.put_u32_le(self.crc);
        buf.freeze()
    }
}

/// One chunk of an upload together with the running checksum up to and
/// including this chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferChunkRequest {
    running_crc: u32,
    payload: Bytes,
}

impl TransferChunkRequest {
    /// # Errors
    ///
    /// Returns [`HubError::Protocol`] if the chunk does not fit the 16-bit
    /// size field.
    pub fn new(running_crc: u32, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > u16::MAX as usize {
            return Err(HubError::Protocol(format!(
                "chunk of {} bytes does not fit a 16-bit size",
                payload.len()
            )));
        }
        Ok(Self {
            running_crc,
            payload,
        })
    }

    pub fn running_crc(&self) -> u32 {
        self.running_crc
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
        let running_crc = body.get_u32()?;
        let size = body.get_u16()? as usize;
        let payload = body.get_bytes(size)?;
        Ok(Self {
            running_crc,
            payload,
        })
    }
}

impl Request for TransferChunkRequest {
    type Response = TransferChunkResponse;
    const ID: u8 = ids::TRANSFER_CHUNK_REQUEST;

    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 7);
        buf.put_u8(ids::TRANSFER_CHUNK_REQUEST);
        buf.put_u32_le(self.running_crc);
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Start or stop the program in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramFlowRequest {
    pub stop: bool,
    pub slot: u8,
}

impl ProgramFlowRequest {
    pub fn start(slot: u8) -> Self {
        Self { stop: false, slot }
    }

    pub fn stop(slot: u8) -> Self {
        Self { stop: true, slot }
    }

    pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
        let stop = body.get_u8()? != 0;
        let slot = body.get_u8()?;
        Ok(Self { stop, slot })
    }
}

impl Request for ProgramFlowRequest {
    type Response = ProgramFlowResponse;
    const ID: u8 = ids::PROGRAM_FLOW_REQUEST;

    fn serialize(&self) -> Bytes {
        Bytes::copy_from_slice(&[ids::PROGRAM_FLOW_REQUEST, self.stop as u8, self.slot])
    }
}
