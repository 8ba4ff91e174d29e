//! In-memory session storage, the default backend.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::store::{SessionRecord, SessionStore, SessionStoreError};

/// Sessions held in a process-local map behind a read/write lock.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn insert(&self, record: SessionRecord) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&record.session_id) {
            return Err(SessionStoreError::DuplicateId(record.session_id));
        }
        sessions.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn get_and_touch(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(session_id).map(|record| {
            record.touch();
            record.clone()
        }))
    }

    async fn update(&self, record: SessionRecord) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&record.session_id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(SessionStoreError::NotFound(record.session_id)),
        }
    }

    async fn set_value(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(record) => {
                record.data.insert(key.to_string(), value);
                Ok(())
            }
            None => Err(SessionStoreError::NotFound(session_id.to_string())),
        }
    }

    async fn get_value(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Value>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .and_then(|record| record.data.get(key).cloned()))
    }

    async fn remove_value(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Value>, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(session_id)
            .and_then(|record| record.data.remove(key)))
    }

    async fn delete(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(session_id).is_some())
    }

    async fn expired(&self, ttl_millis: u64) -> Result<Vec<String>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|record| record.idle_longer_than(ttl_millis))
            .map(|record| record.session_id.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.len())
    }
}
