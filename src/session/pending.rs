//! Pending request table.
//!
//! Maps a response identifier to the one caller waiting for it. The lock is
//! a `std::sync::Mutex` held only for map operations, never across an
//! `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{HubError, Result};
use crate::message::Message;

type Reply = oneshot::Sender<Result<Message>>;

struct PendingRequest {
    /// Distinguishes this entry from a later one under the same identifier.
    token: u64,
    tx: Reply,
    created: Instant,
}

#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<u8, PendingRequest>>,
    next_token: AtomicU64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u8, PendingRequest>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `response_id`.
    ///
    /// Returns the entry token and the receiving end of the reply.
    pub fn register(&self, response_id: u8) -> Result<(u64, oneshot::Receiver<Result<Message>>)> {
        let mut entries = self.entries();
        if entries.contains_key(&response_id) {
            return Err(HubError::Protocol(format!(
                "response 0x{:02X} already awaited",
                response_id
            )));
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        entries.insert(
            response_id,
            PendingRequest {
                token,
                tx,
                created: Instant::now(),
            },
        );
        Ok((token, rx))
    }

    /// Hand `message` to its waiter.
    ///
    /// Returns the message back if nobody was waiting for it.
    pub fn resolve(&self, message: Message) -> Option<Message> {
        let entry = self.entries().remove(&message.id());
        match entry {
            Some(entry) => match entry.tx.send(Ok(message)) {
                Ok(()) => None,
                Err(Ok(message)) => Some(message),
                Err(Err(_)) => None,
            },
            None => Some(message),
        }
    }

    /// Remove the entry for `response_id` if it still carries `token`.
    pub fn cancel(&self, response_id: u8, token: u64) -> bool {
        let mut entries = self.entries();
        match entries.get(&response_id) {
            Some(entry) if entry.token == token => {
                entries.remove(&response_id);
                true
            }
            _ => false,
        }
    }

    /// Fail every waiter with the error produced by `error`.
    pub fn reject_all(&self, error: impl Fn() -> HubError) -> usize {
        let drained: Vec<PendingRequest> = self.entries().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.tx.send(Err(error()));
        }
        count
    }

    /// Fail waiters registered more than `stale_after` before `now` with
    /// [`HubError::Timeout`].
    pub fn sweep(&self, now: Instant, stale_after: Duration) -> usize {
        let stale: Vec<(u8, PendingRequest)> = {
            let mut entries = self.entries();
            let ids: Vec<u8> = entries
                .iter()
                .filter(|(_, entry)| now.saturating_duration_since(entry.created) > stale_after)
                .map(|(&id, _)| id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let count = stale.len();
        for (message_id, entry) in stale {
            let _ = entry.tx.send(Err(HubError::Timeout { message_id }));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[cfg(test)]
    pub fn contains(&self, response_id: u8) -> bool {
        self.entries().contains_key(&response_id)
    }
}

/// Removes a pending entry when the waiting future goes away, whatever the
/// reason: timeout, write failure, or the caller dropping the future.
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingTable,
    response_id: u8,
    token: u64,
}

impl<'a> PendingGuard<'a> {
    pub fn new(table: &'a PendingTable, response_id: u8, token: u64) -> Self {
        Self {
            table,
            response_id,
            token,
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.cancel(self.response_id, self.token);
    }
}
