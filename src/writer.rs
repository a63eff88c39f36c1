//! Dedicated writer task for characteristic writes.
//!
//! Every outbound frame goes through one task that owns the device's write
//! side, so concurrent requests queue instead of interleaving their packets.
//!
//! ```text
//! send_request 1 ─┐
//! send_request 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► HubDevice::write
//! send_request N ─┘                                   (fragments ≤ packet size)
//! ```
//!
//! Until the hub reports its maximum packet size the packet size is zero and
//! each frame goes out in a single write. Every write attempt is bounded by
//! the write timeout, so a stalled radio cannot wedge the task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{HubError, Result};
use crate::retry::RetryPolicy;
use crate::transport::HubDevice;

/// A packed frame waiting to be written.
#[derive(Debug)]
pub(crate) struct OutboundFrame {
    frame: Bytes,
    /// Receives the outcome once the last packet is written.
    done: oneshot::Sender<Result<()>>,
}

/// Handle for queueing frames on the writer task.
///
/// Cheaply cloneable; every clone feeds the same task.
#[derive(Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    packet_size: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Queue a frame and wait until it has been written.
    ///
    /// Fails with [`HubError::Disconnected`] if the writer task is gone.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        let (done, result) = oneshot::channel();
        self.tx
            .send(OutboundFrame { frame, done })
            .await
            .map_err(|_| HubError::Disconnected)?;
        result.await.map_err(|_| HubError::Disconnected)?
    }

    /// Set the largest single write. Zero disables fragmentation.
    pub fn set_packet_size(&self, size: usize) {
        self.packet_size.store(size, Ordering::Release);
    }

    #[cfg(test)]
    pub fn packet_size(&self) -> usize {
        self.packet_size.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for queueing frames.
///
/// The task ends when every handle has been dropped.
pub(crate) fn spawn_writer_task(
    device: Arc<dyn HubDevice>,
    capacity: usize,
    retry: RetryPolicy,
    write_timeout: Duration,
) -> (WriterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let packet_size = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        packet_size: packet_size.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, device, packet_size, retry, write_timeout));

    (handle, task)
}

async fn writer_loop(
    mut rx: mpsc::Receiver<OutboundFrame>,
    device: Arc<dyn HubDevice>,
    packet_size: Arc<AtomicUsize>,
    retry: RetryPolicy,
    write_timeout: Duration,
) {
    while let Some(outbound) = rx.recv().await {
        let size = packet_size.load(Ordering::Acquire);
        let result =
            write_frame(device.as_ref(), &outbound.frame, size, &retry, write_timeout).await;

        if let Err(e) = &result {
            tracing::error!(len = outbound.frame.len(), "Frame write failed: {}", e);
        }
        // The caller may have timed out and gone away.
        let _ = outbound.done.send(result);
    }

    tracing::debug!("Writer task finished");
}

/// Write one frame as consecutive packets of at most `packet_size` bytes.
async fn write_frame(
    device: &dyn HubDevice,
    frame: &[u8],
    packet_size: usize,
    retry: &RetryPolicy,
    write_timeout: Duration,
) -> Result<()> {
    let size = if packet_size == 0 {
        frame.len().max(1)
    } else {
        packet_size
    };

    for packet in frame.chunks(size) {
        retry
            .run("packet write", || async move {
                tokio::time::timeout(write_timeout, device.write(packet))
                    .await
                    .map_err(|_| {
                        HubError::Write(format!("no completion within {:?}", write_timeout))
                    })?
            })
            .await
            .map_err(|e| match e {
                HubError::Disconnected | HubError::Write(_) => e,
                other => HubError::Write(other.to_string()),
            })?;
    }

    Ok(())
}
