//! Connection manager for the push channel.
//!
//! Maps account id → the outbound queue of that account's live WebSocket.
//! At most one channel is registered per account; a new registration
//! replaces the old one. Delivery is best effort: no queuing for absent
//! accounts, no replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::lock_or_recover;
use crate::protocol::PushMessage;

/// Identifies one registration so a stale socket can't deregister its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(u64);

struct Entry {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<PushMessage>,
}

#[derive(Default)]
pub struct ConnectionManager {
    entries: Mutex<HashMap<i64, Entry>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tx` as the channel for `account_id`, replacing any previous one.
    pub fn register(&self, account_id: i64, tx: mpsc::UnboundedSender<PushMessage>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let replaced = lock_or_recover(&self.entries).insert(account_id, Entry { id, tx });
        if replaced.is_some() {
            debug!(account_id, "push channel replaced");
        }
        id
    }

    /// Remove the channel for `account_id` if it is still `connection`.
    /// Returns whether an entry was removed.
    pub fn deregister(&self, account_id: i64, connection: ConnectionId) -> bool {
        let mut entries = lock_or_recover(&self.entries);
        match entries.get(&account_id) {
            Some(entry) if entry.id == connection => {
                entries.remove(&account_id);
                true
            }
            _ => false,
        }
    }

    /// Queue `message` for `account_id`. Returns whether a live channel took it.
    pub fn send(&self, account_id: i64, message: PushMessage) -> bool {
        let mut entries = lock_or_recover(&self.entries);
        let Some(entry) = entries.get(&account_id) else {
            return false;
        };
        if entry.tx.send(message).is_ok() {
            return true;
        }
        // Receiver gone: the socket task ended without deregistering yet.
        entries.remove(&account_id);
        false
    }

    pub fn is_connected(&self, account_id: i64) -> bool {
        lock_or_recover(&self.entries).contains_key(&account_id)
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
