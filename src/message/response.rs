//! Hub-to-host responses.

use bytes::{BufMut, Bytes, BytesMut};

use super::{ids, Body, Message, Response};
use crate::error::Result;

/// Status byte the hub sends for an acknowledged request.
pub const STATUS_OK: u8 = 0x00;

/// Status byte used when serializing a failed response.
pub const STATUS_FAILED: u8 = 0x01;

/// Firmware versions and transfer limits reported by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoResponse {
    pub rpc_major: u8,
    pub rpc_minor: u8,
    pub rpc_build: u16,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub firmware_build: u16,
    /// Largest single BLE write the hub accepts.
    pub max_packet_size: u16,
    /// Largest complete message the hub accepts.
    pub max_message_size: u16,
    /// Largest payload for one [`TransferChunkRequest`](super::TransferChunkRequest).
    pub max_chunk_size: u16,
    pub product_group_device: u16,
}

impl InfoResponse {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(17);
        buf.put_u8(ids::INFO_RESPONSE);
        buf.put_u8(self.rpc_major);
        buf.put_u8(self.rpc_minor);
        buf.put_u16_le(self.rpc_build);
        buf.put_u8(self.firmware_major);
        buf.put_u8(self.firmware_minor);
        buf.put_u16_le(self.firmware_build);
        buf.put_u16_le(self.max_packet_size);
        buf.put_u16_le(self.max_message_size);
        buf.put_u16_le(self.max_chunk_size);
        buf.put_u16_le(self.product_group_device);
        buf.freeze()
    }

    pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
        Ok(Self {
            rpc_major: body.get_u8()?,
            rpc_minor: body.get_u8()?,
            rpc_build: body.get_u16()?,
            firmware_major: body.get_u8()?,
            firmware_minor: body.get_u8()?,
            firmware_build: body.get_u16()?,
            max_packet_size: body.get_u16()?,
            max_message_size: body.get_u16()?,
            max_chunk_size: body.get_u16()?,
            product_group_device: body.get_u16()?,
        })
    }
}

impl Response for InfoResponse {
    const ID: u8 = ids::INFO_RESPONSE;

    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::InfoResponse(response) => Some(response),
            _ => None,
        }
    }
}

/// Responses that carry nothing but a status byte.
macro_rules! status_response {
    ($(#[$meta:meta])* $name:ident, $id:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            /// Raw status byte, [`STATUS_OK`] on success.
            pub status: u8,
        }

        impl $name {
            /// A successful response.
            pub fn ok() -> Self {
                Self { status: STATUS_OK }
            }

            /// A failed response.
            pub fn failed() -> Self {
                Self {
                    status: STATUS_FAILED,
                }
            }

            /// Whether the hub acknowledged the request.
            #[inline]
            pub fn success(&self) -> bool {
                self.status == STATUS_OK
            }

            pub fn serialize(&self) -> Bytes {
                Bytes::copy_from_slice(&[$id, self.status])
            }

            pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
                Ok(Self {
                    status: body.get_u8()?,
                })
            }
        }

        impl Response for $name {
            const ID: u8 = $id;

            fn from_message(message: Message) -> Option<Self> {
                match message {
                    Message::$name(response) => Some(response),
                    _ => None,
                }
            }
        }
    };
}

status_response!(
    /// Answer to [`DeviceNotificationRequest`](super::DeviceNotificationRequest).
    DeviceNotificationResponse,
    ids::DEVICE_NOTIFICATION_RESPONSE
);

status_response!(
    /// Answer to [`ClearSlotRequest`](super::ClearSlotRequest).
    ClearSlotResponse,
    ids::CLEAR_SLOT_RESPONSE
);

status_response!(
    /// Answer to [`StartFileUploadRequest`](super::StartFileUploadRequest).
    StartFileUploadResponse,
    ids::START_FILE_UPLOAD_RESPONSE
);

status_response!(
    /// Answer to [`TransferChunkRequest`](super::TransferChunkRequest).
    TransferChunkResponse,
    ids::TRANSFER_CHUNK_RESPONSE
);

status_response!(
    /// Answer to [`ProgramFlowRequest`](super::ProgramFlowRequest).
    ProgramFlowResponse,
    ids::PROGRAM_FLOW_RESPONSE
);
