//! The session manager: single owner of live session state.

use rill_json_rpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId, RequestParams};
use rill_mcp_protocol::McpError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::pending::PendingRequests;
use crate::queue::{NotificationQueue, QueueClosed, QueuedMessage};
use crate::store::{SessionIdGenerator, SessionRecord, SessionStore, SessionStoreError, UuidSessionIds};
use crate::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SESSION_TTL_SECS};

/// Session manager configuration.
#[derive(Clone)]
pub struct SessionConfig {
    /// Idle TTL before the reaper evicts a session.
    pub ttl: Duration,
    /// Per-session notification queue capacity (drop-oldest).
    pub queue_capacity: usize,
    /// Replay buffer size for `Last-Event-Id` resumption. 0 disables.
    pub replay_capacity: usize,
    /// Stateless mode: sessions are transient, ids are not echoed, and
    /// server-initiated requests are disabled.
    pub stateless: bool,
    /// How often the background reaper runs.
    pub reaper_interval: Duration,
    /// Session id generation hook.
    pub id_generator: Arc<dyn SessionIdGenerator>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("ttl", &self.ttl)
            .field("queue_capacity", &self.queue_capacity)
            .field("replay_capacity", &self.replay_capacity)
            .field("stateless", &self.stateless)
            .field("reaper_interval", &self.reaper_interval)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            replay_capacity: 0,
            stateless: false,
            reaper_interval: Duration::from_secs(60),
            id_generator: Arc::new(UuidSessionIds),
        }
    }
}

/// Runtime-only session state. Never persisted.
struct SessionRuntime {
    queue: Arc<NotificationQueue>,
    pending: Arc<PendingRequests>,
}

/// Owns every live session: persistent records via the [`SessionStore`],
/// queues and pending tables in memory.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    runtime: RwLock<HashMap<String, Arc<SessionRuntime>>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            runtime: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::InMemorySessionStore::new()),
            SessionConfig::default(),
        )
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_stateless(&self) -> bool {
        self.config.stateless
    }

    fn new_runtime(&self) -> Arc<SessionRuntime> {
        Arc::new(SessionRuntime {
            queue: Arc::new(NotificationQueue::new(
                self.config.queue_capacity,
                self.config.replay_capacity,
            )),
            pending: Arc::new(PendingRequests::new()),
        })
    }

    /// Create a session. In stateless mode the session is transient: it
    /// is not stored, its id is never echoed to the client, and peer
    /// requests are disabled.
    pub async fn create(&self) -> Result<SessionHandle, SessionStoreError> {
        let id = self.config.id_generator.generate();

        if self.config.stateless {
            return Ok(SessionHandle::transient(
                id,
                Arc::new(NotificationQueue::new(
                    self.config.queue_capacity,
                    self.config.replay_capacity,
                )),
            ));
        }

        self.store.insert(SessionRecord::new(id.clone())).await?;
        let runtime = self.new_runtime();
        self.runtime
            .write()
            .expect("runtime lock poisoned")
            .insert(id.clone(), runtime.clone());

        debug!(session_id = %id, "session created");
        Ok(self.handle(id, runtime))
    }

    /// Resolve a session by id, refreshing its activity timestamp.
    pub async fn get(&self, id: &str) -> Result<Option<SessionHandle>, SessionStoreError> {
        if self.store.get_and_touch(id).await?.is_none() {
            return Ok(None);
        }

        let runtime = {
            let mut map = self.runtime.write().expect("runtime lock poisoned");
            map.entry(id.to_string())
                .or_insert_with(|| self.new_runtime())
                .clone()
        };
        Ok(Some(self.handle(id.to_string(), runtime)))
    }

    /// Terminate a session: remove it, close its queue, and cancel its
    /// pending server→client requests. Terminated ids are never reused
    /// (ids carry enough entropy that the generator cannot repeat them).
    pub async fn terminate(&self, id: &str) -> Result<bool, SessionStoreError> {
        let existed = self.store.delete(id).await?;
        let runtime = self
            .runtime
            .write()
            .expect("runtime lock poisoned")
            .remove(id);

        if let Some(runtime) = runtime {
            runtime.queue.close();
            let cancelled = runtime.pending.cancel_all();
            if cancelled > 0 {
                debug!(session_id = %id, cancelled, "cancelled pending peer requests");
            }
        }

        if existed {
            debug!(session_id = %id, "session terminated");
        }
        Ok(existed)
    }

    /// Push a notification to every live session.
    ///
    /// Non-atomic by design: the iteration never aborts, failures are
    /// counted, and the first error is reported. A queue drop under the
    /// drop-oldest policy is not a failure.
    pub fn broadcast(&self, notification: &JsonRpcNotification) -> (usize, Option<QueueClosed>) {
        let message = match serde_json::to_value(notification) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "unserializable broadcast notification");
                return (0, None);
            }
        };

        let runtimes: Vec<Arc<SessionRuntime>> = {
            let map = self.runtime.read().expect("runtime lock poisoned");
            map.values().cloned().collect()
        };

        let mut failed = 0;
        let mut first_error = None;
        for runtime in runtimes {
            if let Err(err) = runtime.queue.push(message.clone()) {
                failed += 1;
                first_error.get_or_insert(err);
            }
        }
        (failed, first_error)
    }

    /// Evict sessions idle longer than the TTL. Returns the evicted ids.
    pub async fn reap_idle(&self) -> Vec<String> {
        let ttl_millis = self.config.ttl.as_millis() as u64;
        let expired = match self.store.expired(ttl_millis).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "session expiry scan failed");
                return Vec::new();
            }
        };

        let mut evicted = Vec::with_capacity(expired.len());
        for id in expired {
            match self.terminate(&id).await {
                Ok(true) => evicted.push(id),
                Ok(false) => {}
                Err(err) => warn!(session_id = %id, error = %err, "failed to evict session"),
            }
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "reaped idle sessions");
        }
        evicted
    }

    /// Spawn the background reaper.
    pub fn start_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = manager.config.reaper_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.reap_idle().await;
            }
        })
    }

    pub async fn session_count(&self) -> Result<usize, SessionStoreError> {
        self.store.count().await
    }

    /// Record that the session completed the `initialize` handshake.
    pub async fn mark_initialized(&self, id: &str) {
        match self.store.get_and_touch(id).await {
            Ok(Some(mut record)) => {
                record.initialized = true;
                if let Err(err) = self.store.update(record).await {
                    warn!(session_id = %id, error = %err, "failed to mark session initialized");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(session_id = %id, error = %err, "failed to load session"),
        }
    }

    fn handle(&self, id: String, runtime: Arc<SessionRuntime>) -> SessionHandle {
        SessionHandle {
            id,
            store: Some(Arc::clone(&self.store)),
            local: None,
            queue: runtime.queue.clone(),
            pending: Some(runtime.pending.clone()),
        }
    }
}

/// A read/write view of one session, handed to handlers via the request
/// context. Cloneable and cheap; handlers must not retain it beyond the
/// call.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    store: Option<Arc<dyn SessionStore>>,
    /// Transient-session state, when there is no store behind the handle.
    local: Option<Arc<Mutex<HashMap<String, Value>>>>,
    queue: Arc<NotificationQueue>,
    pending: Option<Arc<PendingRequests>>,
}

impl SessionHandle {
    fn transient(id: String, queue: Arc<NotificationQueue>) -> Self {
        Self {
            id,
            store: None,
            local: Some(Arc::new(Mutex::new(HashMap::new()))),
            queue,
            pending: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Transient sessions are never stored and their ids are not echoed.
    pub fn is_transient(&self) -> bool {
        self.store.is_none()
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<Value>, SessionStoreError> {
        match (&self.store, &self.local) {
            (Some(store), _) => store.get_value(&self.id, key).await,
            (None, Some(local)) => Ok(local.lock().expect("state lock poisoned").get(key).cloned()),
            (None, None) => Ok(None),
        }
    }

    pub async fn set_value(&self, key: &str, value: Value) -> Result<(), SessionStoreError> {
        match (&self.store, &self.local) {
            (Some(store), _) => store.set_value(&self.id, key, value).await,
            (None, Some(local)) => {
                local
                    .lock()
                    .expect("state lock poisoned")
                    .insert(key.to_string(), value);
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    pub async fn remove_value(&self, key: &str) -> Result<Option<Value>, SessionStoreError> {
        match (&self.store, &self.local) {
            (Some(store), _) => store.remove_value(&self.id, key).await,
            (None, Some(local)) => Ok(local.lock().expect("state lock poisoned").remove(key)),
            (None, None) => Ok(None),
        }
    }

    /// Enqueue a notification for delivery to this session's consumer.
    pub fn notify(&self, notification: &JsonRpcNotification) -> Result<u64, QueueClosed> {
        let message = serde_json::to_value(notification).map_err(|_| QueueClosed)?;
        self.queue.push(message)
    }

    /// Replay buffered messages after the given event id.
    pub fn replay_after(&self, after: u64) -> Vec<QueuedMessage> {
        self.queue.replay_after(after)
    }

    /// Issue a server→client request over this session and await the
    /// posted-back response.
    ///
    /// Blocks until the client answers, the caller's future is dropped,
    /// or the session is terminated.
    pub async fn call_peer(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let pending = self.pending.as_ref().ok_or_else(|| {
            McpError::InvalidRequest(
                "server-initiated requests are not available in stateless mode".to_string(),
            )
        })?;

        let id = pending.next_id();
        let rx = pending.register(id.clone());
        // drop the waiter if this future is cancelled before completion
        let guard = PendingGuard {
            pending: Arc::clone(pending),
            id: id.clone(),
            armed: true,
        };

        let mut request = JsonRpcRequest::new(id, method);
        if let Some(params) = params {
            request = request.with_params(RequestParams::from(params));
        }
        let envelope = serde_json::to_value(&request)
            .map_err(|err| McpError::internal(format!("unserializable peer request: {err}")))?;
        self.queue
            .push(envelope)
            .map_err(|_| McpError::SessionTerminated)?;

        let reply = rx.await.map_err(|_| McpError::SessionTerminated)?;
        guard.defuse();

        match reply {
            JsonRpcMessage::Response(response) => Ok(response.result),
            JsonRpcMessage::Error(error) => Err(McpError::internal(format!(
                "peer error {}: {}",
                error.error.code, error.error.message
            ))),
        }
    }

    /// Deliver a posted-back response to a waiting `call_peer`.
    pub fn complete_peer_reply(&self, reply: JsonRpcMessage) -> bool {
        match &self.pending {
            Some(pending) => pending.complete(reply),
            None => false,
        }
    }
}

struct PendingGuard {
    pending: Arc<PendingRequests>,
    id: RequestId,
    armed: bool,
}

impl PendingGuard {
    fn defuse(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed {
            self.pending.forget(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager_with(config: SessionConfig) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Arc::new(crate::InMemorySessionStore::new()),
            config,
        ))
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let manager = manager_with(SessionConfig::default());
        let session = manager.create().await.unwrap();
        let id = session.id().to_string();

        assert!(manager.get(&id).await.unwrap().is_some());
        assert!(manager.terminate(&id).await.unwrap());
        assert!(manager.get(&id).await.unwrap().is_none());
        // terminate is idempotent at the store level
        assert!(!manager.terminate(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_stateless_sessions_are_transient() {
        let manager = manager_with(SessionConfig {
            stateless: true,
            ..Default::default()
        });

        let session = manager.create().await.unwrap();
        assert!(session.is_transient());
        assert_eq!(manager.session_count().await.unwrap(), 0);

        // state still works, locally
        session.set_value("k", json!(1)).await.unwrap();
        assert_eq!(session.get_value("k").await.unwrap(), Some(json!(1)));

        // peer requests are disabled
        let err = session.call_peer("roots/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_call_peer_roundtrip() {
        let manager = manager_with(SessionConfig::default());
        let session = manager.create().await.unwrap();

        let responder = {
            let session = session.clone();
            tokio::spawn(async move {
                // consume the enqueued request and post back a response
                let queued = session.queue().pop().await.unwrap();
                let request: JsonRpcRequest = serde_json::from_value(queued.message).unwrap();
                assert_eq!(request.method, "sampling/createMessage");
                assert!(request.id.is_server_initiated());

                session.complete_peer_reply(JsonRpcMessage::success(
                    request.id,
                    json!({"model": "stub"}),
                ));
            })
        };

        let result = session
            .call_peer("sampling/createMessage", Some(json!({"messages": []})))
            .await
            .unwrap();
        assert_eq!(result["model"], "stub");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_cancels_peer_waiters() {
        let manager = manager_with(SessionConfig::default());
        let session = manager.create().await.unwrap();
        let id = session.id().to_string();

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.call_peer("roots/list", None).await })
        };
        tokio::task::yield_now().await;

        manager.terminate(&id).await.unwrap();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::SessionTerminated));
    }

    #[tokio::test]
    async fn test_broadcast_counts_drops_as_success() {
        let manager = manager_with(SessionConfig {
            queue_capacity: 1,
            ..Default::default()
        });

        let a = manager.create().await.unwrap();
        let b = manager.create().await.unwrap();
        let c = manager.create().await.unwrap();

        // fill session b's queue; the broadcast will displace this entry
        b.notify(&JsonRpcNotification::new("notifications/noise"))
            .unwrap();

        let (failed, first_error) =
            manager.broadcast(&JsonRpcNotification::new("notifications/tools/listChanged"));
        assert_eq!(failed, 0);
        assert!(first_error.is_none());

        for session in [&a, &b, &c] {
            let got = session.queue().pop().await.unwrap();
            assert_eq!(got.message["method"], "notifications/tools/listChanged");
        }
    }

    #[tokio::test]
    async fn test_broadcast_reports_closed_queues() {
        let manager = manager_with(SessionConfig::default());
        let a = manager.create().await.unwrap();
        let _b = manager.create().await.unwrap();

        a.queue().close();
        let (failed, first_error) =
            manager.broadcast(&JsonRpcNotification::new("notifications/prompts/listChanged"));
        assert_eq!(failed, 1);
        assert!(first_error.is_some());
    }

    #[tokio::test]
    async fn test_reaper_prunes_idle_sessions() {
        let manager = manager_with(SessionConfig {
            ttl: Duration::from_millis(50),
            ..Default::default()
        });
        let session = manager.create().await.unwrap();
        let id = session.id().to_string();

        tokio::time::sleep(Duration::from_millis(120)).await;
        let evicted = manager.reap_idle().await;
        assert_eq!(evicted, vec![id.clone()]);
        assert!(manager.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activity_refresh_defers_reaping() {
        let manager = manager_with(SessionConfig {
            ttl: Duration::from_millis(100),
            ..Default::default()
        });
        let session = manager.create().await.unwrap();
        let id = session.id().to_string();

        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.get(&id).await.unwrap(); // touches activity
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(manager.reap_idle().await.is_empty());
        assert!(manager.get(&id).await.unwrap().is_some());
    }
}
