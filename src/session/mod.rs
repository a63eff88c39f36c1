//! Transport session - connection lifecycle and request/response correlation.
//!
//! A [`Session`] owns one link to a hub:
//!
//! ```text
//!                 ┌──────────── Session ─────────────┐
//! send_request ──►│ lane(id) ─► pending[id] ─► pack  │──► writer task ──► HubDevice::write
//!                 │                ▲                 │
//!                 │                │ resolve         │
//! subscribe_events◄── unclaimed ◄──┴── deserialize ◄─┤◄── reader task ◄── LinkEvent stream
//!                 └──────────────────────────────────┘
//! ```
//!
//! Responses carry no sequence number, so a response is matched to its
//! request purely by identifier. Requests expecting the same response type
//! are queued on a per-identifier lane; requests of different types run
//! concurrently.
//!
//! The request timeout covers the whole exchange, write included. Leaving
//! [`ConnectionState::Ready`] always passes through
//! [`ConnectionState::Disconnecting`], whether the host or the hub closed
//! the link.
//!
//! # Example
//!
//! ```ignore
//! use hublink::message::ProgramFlowRequest;
//!
//! let session = Session::new(SessionConfig::default(), adapter)?;
//! session.connect().await?;
//! let response = session.send_request(&ProgramFlowRequest::start(0)).await?;
//! assert!(response.success());
//! session.disconnect().await?;
//! ```

mod pending;
mod state;

pub use state::ConnectionState;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SessionConfig;
use crate::error::{HubError, Result};
use crate::message::{DeviceNotificationRequest, InfoRequest, InfoResponse, Message, Request, Response};
use crate::protocol::{FrameCodec, NotificationBuffer};
use crate::transport::{HubAdapter, HubDevice, LinkEvent};
use crate::writer::{spawn_writer_task, WriterHandle};

use pending::{PendingGuard, PendingTable};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connect steps report [`HubError::Connection`] once retries are spent.
fn connection_step(e: HubError) -> HubError {
    match e {
        HubError::Connection(_) => e,
        HubError::Disconnected => HubError::Connection("link lost during handshake".to_string()),
        other => HubError::Connection(other.to_string()),
    }
}

/// A dropped reply sender means the entry was flushed with the link.
fn settle(
    reply: std::result::Result<Result<Message>, oneshot::error::RecvError>,
) -> Result<Message> {
    reply.unwrap_or(Err(HubError::Disconnected))
}

/// Resources that live exactly as long as one connection.
struct Link {
    generation: u64,
    device: Arc<dyn HubDevice>,
    writer: WriterHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Link {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

struct Inner {
    config: SessionConfig,
    adapter: Arc<dyn HubAdapter>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<Message>,
    pending: PendingTable,
    lanes: Mutex<HashMap<u8, Arc<tokio::sync::Mutex<()>>>>,
    buffer: Mutex<NotificationBuffer>,
    link: Mutex<Option<Link>>,
    info: Mutex<Option<InfoResponse>>,
    generation: AtomicU64,
    /// Serializes connect and disconnect.
    lifecycle: tokio::sync::Mutex<()>,
}

/// A connection to one hub.
///
/// Cheaply cloneable; clones share the same connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create a disconnected session.
    ///
    /// Fails with [`HubError::Config`] if the configuration is invalid.
    pub fn new(config: SessionConfig, adapter: Arc<dyn HubAdapter>) -> Result<Self> {
        config.validate()?;

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(config.event_capacity);
        let buffer = NotificationBuffer::with_max_frame_size(config.max_frame_size);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                adapter,
                state,
                events,
                pending: PendingTable::new(),
                lanes: Mutex::new(HashMap::new()),
                buffer: Mutex::new(buffer),
                link: Mutex::new(None),
                info: Mutex::new(None),
                generation: AtomicU64::new(0),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Find a hub, connect, and run the handshake.
    ///
    /// On success the session is [`ConnectionState::Ready`] and
    /// [`device_info`](Self::device_info) is populated. On failure the
    /// session is back to [`ConnectionState::Disconnected`].
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if self.state() != ConnectionState::Disconnected {
            return Err(HubError::Connection("already connected".to_string()));
        }
        self.inner.set_state(ConnectionState::Connecting);

        match self.inner.establish().await {
            Ok(()) if self.inner.has_link() => {
                self.inner.set_state(ConnectionState::Ready);
                Ok(())
            }
            Ok(()) => {
                self.inner.set_state(ConnectionState::Disconnected);
                Err(connection_step(HubError::Disconnected))
            }
            Err(e) => {
                tracing::warn!("Connect failed: {}", e);
                self.inner.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Close the connection, failing every pending request with
    /// [`HubError::Disconnected`].
    ///
    /// Does nothing when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        // Fail an in-flight handshake so a concurrent connect gives up the
        // lifecycle lock.
        self.inner.pending.reject_all(|| HubError::Disconnected);
        let _lifecycle = self.inner.lifecycle.lock().await;

        let link = lock(&self.inner.link).take();
        let Some(link) = link else {
            self.inner.set_state(ConnectionState::Disconnected);
            return Ok(());
        };

        self.inner.set_state(ConnectionState::Disconnecting);
        let rejected = self.inner.pending.reject_all(|| HubError::Disconnected);
        let device = link.device.clone();
        drop(link);

        if let Err(e) = device.disconnect().await {
            tracing::warn!(device = %device.name(), "GATT disconnect failed: {}", e);
        }
        self.inner.set_state(ConnectionState::Disconnected);
        tracing::info!(device = %device.name(), rejected, "Disconnected from hub");
        Ok(())
    }

    /// Send a request and wait for its correlated response.
    ///
    /// Fails with [`HubError::Timeout`] if no response arrives within the
    /// configured request timeout, [`HubError::Disconnected`] if the link
    /// goes away, or the write error if the frame could not be sent.
    pub async fn send_request<R: Request>(&self, request: &R) -> Result<R::Response> {
        self.inner.request(request).await
    }

    /// Feed raw notification bytes into the session, as the reader task does
    /// for every notification value.
    pub fn on_receive(&self, data: &[u8]) {
        self.inner.on_receive(data);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Receive messages that did not answer a pending request: console
    /// output, program flow changes, device state, and stray responses.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Message> {
        self.inner.events.subscribe()
    }

    /// Hub information learned during the handshake.
    pub fn device_info(&self) -> Option<InfoResponse> {
        *lock(&self.inner.info)
    }

    /// Largest program chunk the hub accepts, once known.
    pub fn max_chunk_size(&self) -> Option<usize> {
        self.device_info().map(|info| info.max_chunk_size as usize)
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

impl Inner {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Session state changed");
        }
    }

    fn has_link(&self) -> bool {
        lock(&self.link).is_some()
    }

    fn writer(&self) -> Result<WriterHandle> {
        lock(&self.link)
            .as_ref()
            .map(|link| link.writer.clone())
            .ok_or(HubError::Disconnected)
    }

    fn lane(&self, response_id: u8) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.lanes)
            .entry(response_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn establish(self: &Arc<Self>) -> Result<()> {
        let config = &self.config;
        let retry = config.connect_retry;

        let device = retry
            .run("device selection", || self.adapter.select_device(config))
            .await
            .map_err(connection_step)?;
        tracing::info!(device = %device.name(), "Hub selected");

        if let Err(e) = self.bring_up(device.clone()).await {
            lock(&self.link).take();
            self.pending.reject_all(|| HubError::Disconnected);
            if let Err(close) = device.disconnect().await {
                tracing::debug!("Disconnect after failed connect: {}", close);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn bring_up(self: &Arc<Self>, device: Arc<dyn HubDevice>) -> Result<()> {
        let config = &self.config;
        let retry = config.connect_retry;

        retry
            .run("GATT connect", || device.connect())
            .await
            .map_err(connection_step)?;
        retry
            .run("characteristic discovery", || device.discover(config))
            .await
            .map_err(connection_step)?;
        let link_events = retry
            .run("notification subscribe", || device.subscribe())
            .await
            .map_err(connection_step)?;

        lock(&self.buffer).clear();
        *lock(&self.info) = None;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (writer, writer_task) = spawn_writer_task(
            device.clone(),
            config.write_queue_capacity,
            config.write_retry,
            config.write_timeout,
        );
        let reader_task = tokio::spawn(reader_loop(Arc::downgrade(self), generation, link_events));
        let sweep_task = tokio::spawn(sweep_loop(
            Arc::downgrade(self),
            config.sweep_interval,
            config.stale_after,
        ));

        *lock(&self.link) = Some(Link {
            generation,
            device: device.clone(),
            writer: writer.clone(),
            tasks: vec![writer_task, reader_task, sweep_task],
        });

        let info = self
            .request(&InfoRequest)
            .await
            .map_err(connection_step)?;
        writer.set_packet_size(info.max_packet_size as usize);
        *lock(&self.info) = Some(info);
        tracing::info!(
            firmware = %format!("{}.{}.{}", info.firmware_major, info.firmware_minor, info.firmware_build),
            max_packet_size = info.max_packet_size,
            max_chunk_size = info.max_chunk_size,
            "Hub info received"
        );

        let interval = config.device_notification_interval_ms;
        let response = self
            .request(&DeviceNotificationRequest::new(interval))
            .await
            .map_err(connection_step)?;
        if !response.success() {
            return Err(HubError::Connection(format!(
                "hub refused device notifications (status 0x{:02X})",
                response.status
            )));
        }

        Ok(())
    }

    async fn request<R: Request>(&self, request: &R) -> Result<R::Response> {
        let response_id = <R::Response as Response>::ID;
        let payload = request.serialize();

        let lane = self.lane(response_id);
        let _turn = lane.lock().await;

        let writer = self.writer()?;
        let (token, mut reply) = self.pending.register(response_id)?;
        let _guard = PendingGuard::new(&self.pending, response_id, token);

        let frame = FrameCodec::pack(&payload, false);
        tracing::debug!(id = R::ID, len = frame.len(), "Sending request");

        // A rejection from the sweep or a disconnect can land while the write
        // is still in flight.
        let exchange = async {
            tokio::select! {
                written = writer.send(Bytes::from(frame)) => written?,
                early = &mut reply => return settle(early),
            }
            settle(reply.await)
        };

        let message = match tokio::time::timeout(self.config.request_timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(id = response_id, "Request timed out");
                return Err(HubError::Timeout {
                    message_id: response_id,
                });
            }
        };

        R::Response::from_message(message).ok_or_else(|| {
            HubError::Protocol(format!("unexpected reply to 0x{:02X}", R::ID))
        })
    }

    fn on_receive(&self, data: &[u8]) {
        let frames = match lock(&self.buffer).push(data) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!("Discarding notification buffer: {}", e);
                return;
            }
        };

        for frame in frames {
            self.dispatch(&frame);
        }
    }

    fn dispatch(&self, frame: &[u8]) {
        let payload = match FrameCodec::unpack(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(len = frame.len(), "Dropping frame: {}", e);
                return;
            }
        };

        let message = match Message::deserialize(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping message: {}", e);
                return;
            }
        };

        let id = message.id();
        tracing::debug!(id, "Received message");

        if let Some(unclaimed) = self.pending.resolve(message) {
            if !unclaimed.is_notification() {
                tracing::debug!(id, "No request waiting for message");
            }
            // No subscribers is fine.
            let _ = self.events.send(unclaimed);
        }
    }

    /// The link reported a disconnect or its event stream ended.
    ///
    /// Runs on the reader task, which the dropped link aborts, so nothing
    /// may be awaited after the link goes.
    async fn link_lost(&self, generation: u64) {
        let link = {
            let mut slot = lock(&self.link);
            match slot.as_ref() {
                Some(link) if link.generation == generation => slot.take(),
                _ => return,
            }
        };
        let Some(link) = link else {
            return;
        };

        self.set_state(ConnectionState::Disconnecting);
        let rejected = self.pending.reject_all(|| HubError::Disconnected);
        tracing::warn!(device = %link.device.name(), rejected, "Link to hub lost");

        if let Err(e) = link.device.disconnect().await {
            tracing::debug!(device = %link.device.name(), "GATT disconnect after link loss: {}", e);
        }
        self.set_state(ConnectionState::Disconnected);
        drop(link);
    }
}

async fn reader_loop(inner: Weak<Inner>, generation: u64, mut events: mpsc::Receiver<LinkEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match event {
            LinkEvent::Notification(data) => inner.on_receive(&data),
            LinkEvent::Disconnected => {
                inner.link_lost(generation).await;
                return;
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.link_lost(generation).await;
    }
}

async fn sweep_loop(inner: Weak<Inner>, interval: Duration, stale_after: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let swept = inner.pending.sweep(Instant::now(), stale_after);
        if swept > 0 {
            tracing::warn!(swept, "Rejected stale requests");
        }
    }
}
