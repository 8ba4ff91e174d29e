//! The session storage abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Persistent view of a session. Runtime-only state (notification queue,
/// pending server→client requests) lives in the [`crate::SessionManager`]
/// and is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque, URL-safe session id.
    pub session_id: String,
    /// Creation timestamp (Unix millis).
    pub created_at: u64,
    /// Last activity timestamp (Unix millis).
    pub last_activity_at: u64,
    /// Arbitrary per-session key/value state.
    pub data: HashMap<String, Value>,
    /// Whether the client completed `initialize`.
    pub initialized: bool,
}

impl SessionRecord {
    pub fn new(session_id: String) -> Self {
        let now = now_millis();
        Self {
            session_id,
            created_at: now,
            last_activity_at: now,
            data: HashMap::new(),
            initialized: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = now_millis();
    }

    pub fn idle_longer_than(&self, ttl_millis: u64) -> bool {
        now_millis().saturating_sub(self.last_activity_at) > ttl_millis
    }
}

pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Errors from session storage backends.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session id already exists: {0}")]
    DuplicateId(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Backend(String),
}

/// Pluggable session persistence.
///
/// The in-memory backend is the default; hosts may supply their own to
/// share sessions across processes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Insert a freshly created session record.
    async fn insert(&self, record: SessionRecord) -> Result<(), SessionStoreError>;

    /// Fetch a session by id, updating `last_activity_at` on hit.
    async fn get_and_touch(&self, session_id: &str)
        -> Result<Option<SessionRecord>, SessionStoreError>;

    /// Overwrite a session record.
    async fn update(&self, record: SessionRecord) -> Result<(), SessionStoreError>;

    /// Set one state value.
    async fn set_value(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), SessionStoreError>;

    /// Get one state value.
    async fn get_value(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Value>, SessionStoreError>;

    /// Remove one state value, returning the previous value.
    async fn remove_value(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Value>, SessionStoreError>;

    /// Delete a session. Returns whether it existed.
    async fn delete(&self, session_id: &str) -> Result<bool, SessionStoreError>;

    /// Ids of sessions idle longer than `ttl_millis`.
    async fn expired(&self, ttl_millis: u64) -> Result<Vec<String>, SessionStoreError>;

    /// Number of stored sessions.
    async fn count(&self) -> Result<usize, SessionStoreError>;
}

/// Session id generation hook.
///
/// The default produces UUID v4 strings: opaque, URL-safe, 122 random
/// bits. Hosts needing different id shapes supply their own.
pub trait SessionIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// UUID v4 generator, the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSessionIds;

impl SessionIdGenerator for UuidSessionIds {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_touch_moves_activity() {
        let mut record = SessionRecord::new("s1".to_string());
        record.last_activity_at = 0;
        record.touch();
        assert!(record.last_activity_at > 0);
    }

    #[test]
    fn test_idle_detection() {
        let mut record = SessionRecord::new("s1".to_string());
        assert!(!record.idle_longer_than(60_000));
        record.last_activity_at = now_millis() - 120_000;
        assert!(record.idle_longer_than(60_000));
        assert!(!record.idle_longer_than(600_000));
    }

    #[test]
    fn test_uuid_ids_are_unique_and_url_safe() {
        let generator = UuidSessionIds;
        let a = generator.generate();
        let b = generator.generate();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }
}
