//! Bounded per-session notification queue.
//!
//! Overflow policy is drop-oldest: producers never block, a slow SSE
//! consumer loses the oldest undelivered messages first. Every enqueued
//! message gets a session-monotonic event id; a separate replay buffer
//! (disabled by default) retains recently assigned messages for
//! `Last-Event-Id` resumption independently of consumption.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// A queued notification or server-initiated request, ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    /// Session-monotonic event id (starts at 1).
    pub event_id: u64,
    /// The serialized JSON-RPC envelope.
    pub message: Value,
}

#[derive(Debug)]
struct QueueInner {
    items: VecDeque<QueuedMessage>,
    replay: VecDeque<QueuedMessage>,
    next_event_id: u64,
    dropped: u64,
    closed: bool,
}

/// The queue. `push` is synchronous and never blocks; `pop` awaits the
/// next message or queue closure.
#[derive(Debug)]
pub struct NotificationQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
    replay_capacity: usize,
}

/// Error returned when pushing into a closed queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("notification queue closed")]
pub struct QueueClosed;

impl NotificationQueue {
    pub fn new(capacity: usize, replay_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                replay: VecDeque::new(),
                next_event_id: 1,
                dropped: 0,
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            replay_capacity,
        }
    }

    /// Enqueue a message, returning its event id.
    ///
    /// On overflow the oldest undelivered message is dropped. A drop is
    /// not an error.
    pub fn push(&self, message: Value) -> Result<u64, QueueClosed> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        if inner.closed {
            return Err(QueueClosed);
        }

        let event_id = inner.next_event_id;
        inner.next_event_id += 1;

        let queued = QueuedMessage { event_id, message };

        if self.replay_capacity > 0 {
            if inner.replay.len() == self.replay_capacity {
                inner.replay.pop_front();
            }
            inner.replay.push_back(queued.clone());
        }

        if inner.items.len() == self.capacity {
            inner.items.pop_front();
            inner.dropped += 1;
        }
        inner.items.push_back(queued);
        drop(inner);

        self.notify.notify_waiters();
        Ok(event_id)
    }

    /// Await the next message. Returns `None` once the queue is closed
    /// and drained.
    pub async fn pop(&self) -> Option<QueuedMessage> {
        loop {
            // register interest before the emptiness check so a push
            // landing in between still wakes us
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take everything currently queued without waiting.
    pub fn drain(&self) -> Vec<QueuedMessage> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.items.drain(..).collect()
    }

    /// Messages from the replay buffer with event ids greater than
    /// `after`. Empty when replay is disabled.
    pub fn replay_after(&self, after: u64) -> Vec<QueuedMessage> {
        let inner = self.inner.lock().expect("queue lock poisoned");
        inner
            .replay
            .iter()
            .filter(|m| m.event_id > after)
            .cloned()
            .collect()
    }

    /// Close the queue: producers fail from now on, consumers drain what
    /// remains and then see end-of-stream.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("queue lock poisoned").closed
    }

    /// Messages dropped so far by the overflow policy.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().expect("queue lock poisoned").dropped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
