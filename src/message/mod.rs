//! Message catalog - typed hub messages and their binary layout.
//!
//! Every message starts with a one-byte identifier followed by a
//! little-endian body:
//!
//! ```text
//! ┌──────┬──────────────────────────────┐
//! │ ID   │ body (layout per message)    │
//! │ u8   │ u8 / u16 LE / u32 LE / bytes │
//! └──────┴──────────────────────────────┘
//! ```
//!
//! Requests implement [`Request`], which names the single [`Response`] type
//! the hub answers with. The session correlates the two purely through
//! [`Response::ID`].
//!
//! # Example
//!
//! ```
//! use hublink::message::{ClearSlotRequest, ClearSlotResponse, Message, Request, Response};
//!
//! let bytes = ClearSlotRequest::new(4).serialize();
//! assert_eq!(&bytes[..], &[ClearSlotRequest::ID, 4]);
//!
//! let message = Message::deserialize(&[ClearSlotResponse::ID, 0x00]).unwrap();
//! let response = ClearSlotResponse::from_message(message).unwrap();
//! assert!(response.success());
//! ```

mod notification;
mod request;
mod response;

use bytes::{Buf, Bytes};

pub use notification::{ConsoleNotification, DeviceNotification, ProgramFlowNotification};
pub use request::{
    ClearSlotRequest, DeviceNotificationRequest, InfoRequest, ProgramFlowRequest,
    StartFileUploadRequest, TransferChunkRequest, MAX_FILENAME_LEN,
};
pub use response::{
    ClearSlotResponse, DeviceNotificationResponse, InfoResponse, ProgramFlowResponse,
    StartFileUploadResponse, TransferChunkResponse, STATUS_FAILED, STATUS_OK,
};

use crate::error::{HubError, Result};

/// Message identifiers.
pub mod ids {
    pub const INFO_REQUEST: u8 = 0x00;
    pub const INFO_RESPONSE: u8 = 0x01;
    pub const START_FILE_UPLOAD_REQUEST: u8 = 0x0C;
    pub const START_FILE_UPLOAD_RESPONSE: u8 = 0x0D;
    pub const TRANSFER_CHUNK_REQUEST: u8 = 0x10;
    pub const TRANSFER_CHUNK_RESPONSE: u8 = 0x11;
    pub const PROGRAM_FLOW_REQUEST: u8 = 0x1E;
    pub const PROGRAM_FLOW_RESPONSE: u8 = 0x1F;
    pub const PROGRAM_FLOW_NOTIFICATION: u8 = 0x20;
    pub const CONSOLE_NOTIFICATION: u8 = 0x21;
    pub const DEVICE_NOTIFICATION_REQUEST: u8 = 0x28;
    pub const DEVICE_NOTIFICATION_RESPONSE: u8 = 0x29;
    pub const DEVICE_NOTIFICATION: u8 = 0x3C;
    pub const CLEAR_SLOT_REQUEST: u8 = 0x46;
    pub const CLEAR_SLOT_RESPONSE: u8 = 0x47;
}

/// A message the host sends and expects exactly one response type for.
pub trait Request: Send + Sync {
    /// The response the hub answers this request with.
    type Response: Response;

    /// Identifier of this request.
    const ID: u8;

    /// Serialize into a message payload (identifier included).
    fn serialize(&self) -> Bytes;
}

/// A message the hub sends in answer to a [`Request`].
pub trait Response: Sized + Send + 'static {
    /// Identifier used to route the response to its waiting caller.
    const ID: u8;

    /// Extract this response from a deserialized message.
    fn from_message(message: Message) -> Option<Self>;
}

/// Any message of the catalog, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    InfoRequest(InfoRequest),
    InfoResponse(InfoResponse),
    StartFileUploadRequest(StartFileUploadRequest),
    StartFileUploadResponse(StartFileUploadResponse),
    TransferChunkRequest(TransferChunkRequest),
    TransferChunkResponse(TransferChunkResponse),
    ProgramFlowRequest(ProgramFlowRequest),
    ProgramFlowResponse(ProgramFlowResponse),
    ProgramFlowNotification(ProgramFlowNotification),
    ConsoleNotification(ConsoleNotification),
    DeviceNotificationRequest(DeviceNotificationRequest),
    DeviceNotificationResponse(DeviceNotificationResponse),
    DeviceNotification(DeviceNotification),
    ClearSlotRequest(ClearSlotRequest),
    ClearSlotResponse(ClearSlotResponse),
}

impl Message {
    /// Decode a message payload, dispatching on its identifier byte.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Protocol`] for an empty payload, an unknown
    /// identifier, or a body too short for its layout.
    pub fn deserialize(data: &[u8]) -> Result<Message> {
        let (&id, rest) = data
            .split_first()
            .ok_or_else(|| HubError::Protocol("empty message".to_string()))?;
        let mut body = Body::new(id, rest);

        let message = match id {
            ids::INFO_REQUEST => Message::InfoRequest(InfoRequest::parse(&mut body)?),
            ids::INFO_RESPONSE => Message::InfoResponse(InfoResponse::parse(&mut body)?),
            ids::START_FILE_UPLOAD_REQUEST => {
                Message::StartFileUploadRequest(StartFileUploadRequest::parse(&mut body)?)
            }
            ids::START_FILE_UPLOAD_RESPONSE => {
                Message::StartFileUploadResponse(StartFileUploadResponse::parse(&mut body)?)
            }
            ids::TRANSFER_CHUNK_REQUEST => {
                Message::TransferChunkRequest(TransferChunkRequest::parse(&mut body)?)
            }
            ids::TRANSFER_CHUNK_RESPONSE => {
                Message::TransferChunkResponse(TransferChunkResponse::parse(&mut body)?)
            }
            ids::PROGRAM_FLOW_REQUEST => {
                Message::ProgramFlowRequest(ProgramFlowRequest::parse(&mut body)?)
            }
            ids::PROGRAM_FLOW_RESPONSE => {
                Message::ProgramFlowResponse(ProgramFlowResponse::parse(&mut body)?)
            }
            ids::PROGRAM_FLOW_NOTIFICATION => {
                Message::ProgramFlowNotification(ProgramFlowNotification::parse(&mut body)?)
            }
            ids::CONSOLE_NOTIFICATION => {
                Message::ConsoleNotification(ConsoleNotification::parse(&mut body)?)
            }
            ids::DEVICE_NOTIFICATION_REQUEST => {
                Message::DeviceNotificationRequest(DeviceNotificationRequest::parse(&mut body)?)
            }
            ids::DEVICE_NOTIFICATION_RESPONSE => {
                Message::DeviceNotificationResponse(DeviceNotificationResponse::parse(&mut body)?)
            }
            ids::DEVICE_NOTIFICATION => {
                Message::DeviceNotification(DeviceNotification::parse(&mut body)?)
            }
            ids::CLEAR_SLOT_REQUEST => {
                Message::ClearSlotRequest(ClearSlotRequest::parse(&mut body)?)
            }
            ids::CLEAR_SLOT_RESPONSE => {
                Message::ClearSlotResponse(ClearSlotResponse::parse(&mut body)?)
            }
            other => {
                return Err(HubError::Protocol(format!(
                    "unknown message type 0x{:02X}",
                    other
                )))
            }
        };

        Ok(message)
    }

    /// Serialize into a message payload.
    pub fn serialize(&self) -> Bytes {
        match self {
            Message::InfoRequest(m) => m.serialize(),
            Message::InfoResponse(m) => m.serialize(),
            Message::StartFileUploadRequest(m) => m.serialize(),
            Message::StartFileUploadResponse(m) => m.serialize(),
            Message::TransferChunkRequest(m) => m.serialize(),
            Message::TransferChunkResponse(m) => m.serialize(),
            Message::ProgramFlowRequest(m) => m.serialize(),
            Message::ProgramFlowResponse(m) => m.serialize(),
            Message::ProgramFlowNotification(m) => m.serialize(),
            Message::ConsoleNotification(m) => m.serialize(),
            Message::DeviceNotificationRequest(m) => m.serialize(),
            Message::DeviceNotificationResponse(m) => m.serialize(),
            Message::DeviceNotification(m) => m.serialize(),
            Message::ClearSlotRequest(m) => m.serialize(),
            Message::ClearSlotResponse(m) => m.serialize(),
        }
    }

    /// Identifier of this message.
    pub fn id(&self) -> u8 {
        match self {
            Message::InfoRequest(_) => ids::INFO_REQUEST,
            Message::InfoResponse(_) => ids::INFO_RESPONSE,
            Message::StartFileUploadRequest(_) => ids::START_FILE_UPLOAD_REQUEST,
            Message::StartFileUploadResponse(_) => ids::START_FILE_UPLOAD_RESPONSE,
            Message::TransferChunkRequest(_) => ids::TRANSFER_CHUNK_REQUEST,
            Message::TransferChunkResponse(_) => ids::TRANSFER_CHUNK_RESPONSE,
            Message::ProgramFlowRequest(_) => ids::PROGRAM_FLOW_REQUEST,
            Message::ProgramFlowResponse(_) => ids::PROGRAM_FLOW_RESPONSE,
            Message::ProgramFlowNotification(_) => ids::PROGRAM_FLOW_NOTIFICATION,
            Message::ConsoleNotification(_) => ids::CONSOLE_NOTIFICATION,
            Message::DeviceNotificationRequest(_) => ids::DEVICE_NOTIFICATION_REQUEST,
            Message::DeviceNotificationResponse(_) => ids::DEVICE_NOTIFICATION_RESPONSE,
            Message::DeviceNotification(_) => ids::DEVICE_NOTIFICATION,
            Message::ClearSlotRequest(_) => ids::CLEAR_SLOT_REQUEST,
            Message::ClearSlotResponse(_) => ids::CLEAR_SLOT_RESPONSE,
        }
    }

    /// Whether this message is an unsolicited notification.
    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            Message::ProgramFlowNotification(_)
                | Message::ConsoleNotification(_)
                | Message::DeviceNotification(_)
        )
    }
}

/// Bounds-checked little-endian reader over a message body.
pub(crate) struct Body<'a> {
    id: u8,
    buf: &'a [u8],
}

impl<'a> Body<'a> {
    fn new(id: u8, buf: &'a [u8]) -> Self {
        Self { id, buf }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(HubError::Protocol(format!(
                "message 0x{:02X} truncated: need {} more bytes, have {}",
                self.id,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn get_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn get_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn get_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.need(n)?;
        Ok(self.buf.copy_to_bytes(n))
    }

    /// NUL-terminated UTF-8 string.
    pub(crate) fn get_cstr(&mut self) -> Result<String> {
        let end = self.buf.iter().position(|&b| b == 0).ok_or_else(|| {
            HubError::Protocol(format!("message 0x{:02X}: unterminated string", self.id))
        })?;
        let text = std::str::from_utf8(&self.buf[..end])
            .map_err(|e| HubError::Protocol(format!("message 0x{:02X}: {}", self.id, e)))?
            .to_string();
        self.buf.advance(end + 1);
        Ok(text)
    }
}
