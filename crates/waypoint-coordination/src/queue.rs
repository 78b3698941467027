//! Bounded priority message queue with acknowledgment tracking.
//!
//! Messages are ordered by priority (highest first) and, within one
//! priority, by arrival. [`MessageQueue::dequeue`] hands an actor the first
//! message addressed to it or broadcast, discarding expired messages it
//! passes over and leaving everything else in place.
//!
//! The queue is safe to share via `Arc<MessageQueue>`: all state sits behind
//! a single mutex and every method takes `&self`.

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;
use waypoint_types::{AgentId, Message, MessageId, MessageKind, Priority};

/// Default maximum number of queued messages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default number of messages kept in the history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Default number of entries returned by [`MessageQueue::history`] callers
/// that do not pick their own limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Ordering key: priority descending, then arrival sequence ascending.
type QueueKey = (Reverse<Priority>, u64);

/// Thread-safe bounded priority queue.
#[derive(Debug)]
pub struct MessageQueue {
    /// Maximum number of queued messages.
    capacity: usize,
    /// Size of the history ring.
    history_capacity: usize,
    /// Mutable state protected by a mutex.
    inner: Mutex<QueueInner>,
}

/// Queue state held inside the mutex.
#[derive(Debug, Default)]
struct QueueInner {
    /// Queued messages in dequeue order.
    entries: BTreeMap<QueueKey, Message>,
    /// Ack-required messages not yet acknowledged.
    pending_acks: BTreeMap<MessageId, Message>,
    /// Most recently enqueued messages, oldest first.
    history: VecDeque<Message>,
    /// Next arrival sequence number.
    next_sequence: u64,
}

impl MessageQueue {
    /// Create a queue with the given message and history capacities.
    pub fn new(capacity: usize, history_capacity: usize) -> Self {
        Self {
            capacity,
            history_capacity,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Lock the inner state, recovering from a poisoned mutex.
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a message. Returns `false` (and drops the message) at capacity.
    pub fn enqueue(&self, message: Message) -> bool {
        let mut inner = self.lock();
        if inner.entries.len() >= self.capacity {
            debug!(message_id = %message.id, capacity = self.capacity, "Queue full, dropping message");
            return false;
        }

        let sequence = inner.next_sequence;
        inner.next_sequence = inner.next_sequence.saturating_add(1);

        if message.requires_ack {
            inner.pending_acks.insert(message.id, message.clone());
        }
        if self.history_capacity > 0 {
            while inner.history.len() >= self.history_capacity {
                inner.history.pop_front();
            }
            inner.history.push_back(message.clone());
        }

        debug!(message_id = %message.id, sender = %message.sender, "Enqueued message");
        inner
            .entries
            .insert((Reverse(message.priority), sequence), message);
        true
    }

    /// Take the next message deliverable to `agent`.
    ///
    /// Expired messages passed over during the scan are discarded. Messages
    /// for other actors keep their position.
    pub fn dequeue(&self, agent: AgentId) -> Option<Message> {
        let now = Utc::now();
        let mut inner = self.lock();

        let mut expired = Vec::new();
        let mut found = None;
        for (key, message) in &inner.entries {
            if message.is_expired(now) {
                expired.push(*key);
                continue;
            }
            if message.is_for(agent) {
                found = Some(*key);
                break;
            }
        }

        for key in expired {
            if let Some(message) = inner.entries.remove(&key) {
                debug!(message_id = %message.id, "Message expired, dropping");
            }
        }
        found.and_then(|key| inner.entries.remove(&key))
    }

    /// Remove a message from the pending-ack set.
    ///
    /// Returns `true` if the message was awaiting acknowledgment.
    pub fn acknowledge(&self, message_id: MessageId, agent: AgentId) -> bool {
        let removed = self.lock().pending_acks.remove(&message_id).is_some();
        if removed {
            debug!(%message_id, %agent, "Message acknowledged");
        }
        removed
    }

    /// Messages still awaiting acknowledgment. Expired ones are purged.
    pub fn pending_acks(&self) -> Vec<Message> {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.pending_acks.retain(|_, message| !message.is_expired(now));
        inner.pending_acks.values().cloned().collect()
    }

    /// Up to `limit` recently enqueued messages, newest first.
    pub fn history(&self, limit: usize) -> Vec<Message> {
        self.lock().history.iter().rev().take(limit).cloned().collect()
    }

    /// Clones of queued messages of `kind`, in dequeue order.
    pub fn queued_of_kind(&self, kind: MessageKind) -> Vec<Message> {
        self.lock()
            .entries
            .values()
            .filter(|message| message.kind == kind)
            .cloned()
            .collect()
    }

    /// Remove queued messages by id. Returns how many were removed.
    pub fn remove(&self, ids: &[MessageId]) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, message| !ids.contains(&message.id));
        before.saturating_sub(inner.entries.len())
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the queue holds no messages.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Maximum number of queued messages.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_HISTORY_CAPACITY)
    }
}
