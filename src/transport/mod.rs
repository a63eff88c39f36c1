//! Transport module - the link between a session and a physical hub.
//!
//! The session never talks to a BLE stack directly. It goes through two
//! object-safe traits:
//!
//! - [`HubAdapter`] finds a hub advertising the configured service.
//! - [`HubDevice`] is one connected hub: GATT connect, characteristic
//!   discovery, a notification stream, and raw packet writes.
//!
//! The BLE implementation lives in [`btle`] behind the `btleplug` feature.
//! Tests drive the session with an in-memory implementation.

#[cfg(feature = "btleplug")]
pub mod btle;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::Result;

/// Boxed future type used by the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that happened on the notify side of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A raw notification value, possibly a fragment of a frame.
    Notification(Bytes),
    /// The hub dropped the connection.
    Disconnected,
}

/// Discovers hubs.
pub trait HubAdapter: Send + Sync + 'static {
    /// Find a hub advertising `config.service_uuid`.
    ///
    /// Fails with [`HubError::Connection`](crate::HubError::Connection) if
    /// none shows up within `config.scan_timeout`.
    fn select_device<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Arc<dyn HubDevice>>>;
}

/// A single hub.
///
/// Calls arrive in order: `connect`, `discover`, `subscribe`, then any
/// number of `write`s, then `disconnect`. Only one writer task calls
/// `write`, so implementations need not serialize writes themselves.
pub trait HubDevice: Send + Sync + 'static {
    /// Human readable name for logs.
    fn name(&self) -> String;

    /// Establish the GATT connection.
    fn connect(&self) -> BoxFuture<'_, Result<()>>;

    /// Locate the write and notify characteristics.
    fn discover<'a>(&'a self, config: &'a SessionConfig) -> BoxFuture<'a, Result<()>>;

    /// Enable notifications. The returned receiver yields every notification
    /// value and, if the link drops, a final [`LinkEvent::Disconnected`].
    fn subscribe(&self) -> BoxFuture<'_, Result<mpsc::Receiver<LinkEvent>>>;

    /// Write one packet to the write characteristic, without response.
    fn write<'a>(&'a self, packet: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Tear down the GATT connection.
    fn disconnect(&self) -> BoxFuture<'_, Result<()>>;
}
