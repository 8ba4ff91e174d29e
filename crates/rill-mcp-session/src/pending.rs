//! Correlation table for server-initiated requests.
//!
//! Ids come from a per-session counter and use the `srv-` prefix, a
//! namespace client-originated ids can never collide with.

use rill_json_rpc::{JsonRpcMessage, RequestId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub struct PendingRequests {
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcMessage>>>,
    counter: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next server-initiated request id.
    pub fn next_id(&self) -> RequestId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        RequestId::String(format!("srv-{n}"))
    }

    /// Register a waiter for `id`. The returned receiver resolves when
    /// the client posts back a response, or errs when the session is
    /// terminated.
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<JsonRpcMessage> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .expect("pending lock poisoned")
            .insert(id, tx);
        rx
    }

    /// Deliver a posted-back response. Returns whether a waiter matched.
    pub fn complete(&self, reply: JsonRpcMessage) -> bool {
        let id = match reply.id() {
            Some(id) => id.clone(),
            None => return false,
        };
        let waiter = self
            .waiters
            .lock()
            .expect("pending lock poisoned")
            .remove(&id);
        match waiter {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Drop a registration that will never complete (caller cancelled).
    pub fn forget(&self, id: &RequestId) {
        self.waiters
            .lock()
            .expect("pending lock poisoned")
            .remove(id);
    }

    /// Cancel every in-flight waiter. Receivers observe the drop and
    /// surface it as a session-terminated error.
    pub fn cancel_all(&self) -> usize {
        let mut waiters = self.waiters.lock().expect("pending lock poisoned");
        let count = waiters.len();
        waiters.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().expect("pending lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_use_server_namespace() {
        let pending = PendingRequests::new();
        let a = pending.next_id();
        let b = pending.next_id();
        assert_eq!(a, RequestId::from("srv-1"));
        assert_eq!(b, RequestId::from("srv-2"));
        assert!(a.is_server_initiated());
    }

    #[tokio::test]
    async fn test_complete_resolves_waiter() {
        let pending = PendingRequests::new();
        let id = pending.next_id();
        let rx = pending.register(id.clone());

        let reply = JsonRpcMessage::success(id, json!({"ok": true}));
        assert!(pending.complete(reply.clone()));

        assert_eq!(rx.await.unwrap(), reply);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_complete_without_waiter_is_false() {
        let pending = PendingRequests::new();
        let reply = JsonRpcMessage::success(RequestId::from("srv-99"), json!(null));
        assert!(!pending.complete(reply));
    }

    #[tokio::test]
    async fn test_cancel_all_drops_waiters() {
        let pending = PendingRequests::new();
        let rx1 = pending.register(pending.next_id());
        let rx2 = pending.register(pending.next_id());

        assert_eq!(pending.cancel_all(), 2);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }
}
