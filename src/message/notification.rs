//! Unsolicited hub-to-host notifications.
//!
//! These never answer a request; the session publishes them to event
//! subscribers.

use bytes::{BufMut, Bytes, BytesMut};

use super::{ids, Body};
use crate::error::Result;

/// A program started or stopped on the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramFlowNotification {
    pub stop: bool,
}

impl ProgramFlowNotification {
    pub fn serialize(&self) -> Bytes {
        Bytes::copy_from_slice(&[ids::PROGRAM_FLOW_NOTIFICATION, self.stop as u8])
    }

    pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
        Ok(Self {
            stop: body.get_u8()? != 0,
        })
    }
}

/// Text printed by the running program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleNotification {
    pub text: String,
}

impl ConsoleNotification {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.text.len() + 2);
        buf.put_u8(ids::CONSOLE_NOTIFICATION);
        buf.put_slice(self.text.as_bytes());
        buf.put_u8(0);
        buf.freeze()
    }

    pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
        Ok(Self {
            text: body.get_cstr()?,
        })
    }
}

/// Periodic device state snapshot.
///
/// The payload is a sequence of sensor/motor records whose vocabulary is
/// left to the caller; the session only carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNotification {
    pub payload: Bytes,
}

impl DeviceNotification {
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 3);
        buf.put_u8(ids::DEVICE_NOTIFICATION);
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub(crate) fn parse(body: &mut Body<'_>) -> Result<Self> {
        let size = body.get_u16()? as usize;
        Ok(Self {
            payload: body.get_bytes(size)?,
        })
    }
}
