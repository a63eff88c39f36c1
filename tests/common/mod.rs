//! In-memory hub for driving a `Session` without Bluetooth.
//!
//! The mock reassembles written packets into frames, decodes them with the
//! same catalog the session uses, records every request, and answers through
//! a configurable responder.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use hublink::message::{
    ClearSlotResponse, DeviceNotificationResponse, InfoResponse, ProgramFlowResponse,
    StartFileUploadResponse, TransferChunkResponse,
};
use hublink::protocol::{FrameCodec, NotificationBuffer};
use hublink::transport::{BoxFuture, HubAdapter, HubDevice, LinkEvent};
use hublink::{Backoff, HubError, Message, Result, RetryPolicy, Session, SessionConfig};

pub type Responder = Box<dyn FnMut(&Message) -> Vec<Message> + Send>;

type DisconnectHook = Box<dyn Fn() + Send>;

pub fn hub_info() -> InfoResponse {
    InfoResponse {
        rpc_major: 1,
        rpc_minor: 0,
        rpc_build: 1,
        firmware_major: 1,
        firmware_minor: 6,
        firmware_build: 62,
        max_packet_size: 20,
        max_message_size: 1000,
        max_chunk_size: 100,
        product_group_device: 0x0081,
    }
}

/// The answers a healthy hub gives.
pub fn default_reply(request: &Message) -> Vec<Message> {
    let reply = match request {
        Message::InfoRequest(_) => Message::InfoResponse(hub_info()),
        Message::DeviceNotificationRequest(_) => {
            Message::DeviceNotificationResponse(DeviceNotificationResponse::ok())
        }
        Message::ClearSlotRequest(_) => Message::ClearSlotResponse(ClearSlotResponse::ok()),
        Message::StartFileUploadRequest(_) => {
            Message::StartFileUploadResponse(StartFileUploadResponse::ok())
        }
        Message::TransferChunkRequest(_) => {
            Message::TransferChunkResponse(TransferChunkResponse::ok())
        }
        Message::ProgramFlowRequest(_) => Message::ProgramFlowResponse(ProgramFlowResponse::ok()),
        _ => return Vec::new(),
    };
    vec![reply]
}

struct HubState {
    responder: Mutex<Responder>,
    requests: Mutex<Vec<Message>>,
    packet_sizes: Mutex<Vec<usize>>,
    buffer: Mutex<NotificationBuffer>,
    link: Mutex<Option<mpsc::Sender<LinkEvent>>>,
    reply_fragment: AtomicUsize,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    on_disconnect: Mutex<Option<DisconnectHook>>,
    connect_failures: AtomicU32,
    connect_attempts: AtomicU32,
    disconnects: AtomicU32,
}

/// A simulated hub. Clones share state.
#[derive(Clone)]
pub struct MockHub {
    state: Arc<HubState>,
}

impl MockHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(HubState {
                responder: Mutex::new(Box::new(default_reply)),
                requests: Mutex::new(Vec::new()),
                packet_sizes: Mutex::new(Vec::new()),
                buffer: Mutex::new(NotificationBuffer::new()),
                link: Mutex::new(None),
                reply_fragment: AtomicUsize::new(0),
                fail_writes: AtomicBool::new(false),
                stall_writes: AtomicBool::new(false),
                on_disconnect: Mutex::new(None),
                connect_failures: AtomicU32::new(0),
                connect_attempts: AtomicU32::new(0),
                disconnects: AtomicU32::new(0),
            }),
        }
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&Message) -> Vec<Message> + Send + 'static,
    {
        *self.state.responder.lock().unwrap() = Box::new(responder);
    }

    /// Split every reply frame into notifications of at most `size` bytes.
    pub fn fragment_replies(&self, size: usize) {
        self.state.reply_fragment.store(size, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every write hang without completing.
    pub fn stall_writes(&self, stall: bool) {
        self.state.stall_writes.store(stall, Ordering::SeqCst);
    }

    /// Run `hook` whenever the host closes the GATT connection.
    pub fn on_disconnect<F>(&self, hook: F)
    where
        F: Fn() + Send + 'static,
    {
        *self.state.on_disconnect.lock().unwrap() = Some(Box::new(hook));
    }

    /// Make the next `count` GATT connects fail.
    pub fn fail_connects(&self, count: u32) {
        self.state.connect_failures.store(count, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Every request decoded so far, in arrival order.
    pub fn requests(&self) -> Vec<Message> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn packet_sizes(&self) -> Vec<usize> {
        self.state.packet_sizes.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.state.requests.lock().unwrap().clear();
        self.state.packet_sizes.lock().unwrap().clear();
    }

    /// Send a message to the host as the hub would.
    pub async fn notify(&self, message: &Message) {
        let frame = FrameCodec::pack(&message.serialize(), false);
        self.push_raw(&frame).await;
    }

    /// Deliver raw bytes on the notify characteristic.
    pub async fn push_raw(&self, bytes: &[u8]) {
        let fragment = self.state.reply_fragment.load(Ordering::SeqCst);
        let size = if fragment == 0 { bytes.len().max(1) } else { fragment };
        let link = self.state.link.lock().unwrap().clone();
        if let Some(link) = link {
            for piece in bytes.chunks(size) {
                let _ = link
                    .send(LinkEvent::Notification(Bytes::copy_from_slice(piece)))
                    .await;
            }
        }
    }

    /// Simulate the hub dropping the connection.
    pub async fn drop_link(&self) {
        let link = self.state.link.lock().unwrap().take();
        if let Some(link) = link {
            let _ = link.send(LinkEvent::Disconnected).await;
        }
    }

    fn decode_written(&self, packet: &[u8]) -> Vec<Message> {
        let frames = self.state.buffer.lock().unwrap().push(packet).unwrap();
        let mut replies = Vec::new();
        for frame in frames {
            let payload = FrameCodec::unpack(&frame).unwrap();
            let request = Message::deserialize(&payload).unwrap();
            self.state.requests.lock().unwrap().push(request.clone());
            let mut responder = self.state.responder.lock().unwrap();
            replies.extend((*responder)(&request));
        }
        replies
    }
}

impl Default for MockHub {
    fn default() -> Self {
        Self::new()
    }
}

impl HubAdapter for MockHub {
    fn select_device<'a>(
        &'a self,
        _config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Arc<dyn HubDevice>>> {
        Box::pin(async move {
            let device: Arc<dyn HubDevice> = Arc::new(self.clone());
            Ok(device)
        })
    }
}

impl HubDevice for MockHub {
    fn name(&self) -> String {
        "mock-hub".to_string()
    }

    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.state.connect_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.state.connect_failures.store(left - 1, Ordering::SeqCst);
                return Err(HubError::Connection("hub out of range".to_string()));
            }
            Ok(())
        })
    }

    fn discover<'a>(&'a self, _config: &'a SessionConfig) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn subscribe(&self) -> BoxFuture<'_, Result<mpsc::Receiver<LinkEvent>>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(256);
            *self.state.link.lock().unwrap() = Some(tx);
            self.state.buffer.lock().unwrap().clear();
            Ok(rx)
        })
    }

    fn write<'a>(&'a self, packet: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.state.stall_writes.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.state.fail_writes.load(Ordering::SeqCst) {
                return Err(HubError::Write("characteristic write failed".to_string()));
            }
            self.state.packet_sizes.lock().unwrap().push(packet.len());

            let replies = self.decode_written(packet);
            for reply in &replies {
                self.notify(reply).await;
            }
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.state.disconnects.fetch_add(1, Ordering::SeqCst);
            if let Some(hook) = self.state.on_disconnect.lock().unwrap().as_ref() {
                hook();
            }
            self.state.link.lock().unwrap().take();
            Ok(())
        })
    }
}

/// Configuration with fast retries for tests.
pub fn test_config() -> SessionConfig {
    SessionConfig::new()
        .connect_retry(RetryPolicy::new(2, Backoff::None))
        .write_retry(RetryPolicy::new(2, Backoff::None))
}

pub async fn connected_session(hub: &MockHub, config: SessionConfig) -> Session {
    let session = Session::new(config, Arc::new(hub.clone())).unwrap();
    session.connect().await.unwrap();
    hub.clear_log();
    session
}

/// Wait until `session` has `count` requests in flight.
pub async fn wait_for_pending(session: &Session, count: usize) {
    for _ in 0..1000 {
        if session.pending_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!(
        "expected {} pending requests, found {}",
        count,
        session.pending_count()
    );
}
