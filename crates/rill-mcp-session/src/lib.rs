//! # Session Management
//!
//! Per-session state and the notification fabric for MCP servers:
//! a pluggable [`SessionStore`] with an in-memory default, bounded
//! drop-oldest notification queues with monotonic event ids, a pending
//! table correlating server-initiated requests with posted-back
//! responses, broadcast, and TTL-based expiry.
//!
//! The [`SessionManager`] is the single owner of live session state;
//! handlers interact through cloneable [`SessionHandle`] views and must
//! not retain them beyond the call.

pub mod in_memory;
pub mod manager;
pub mod pending;
pub mod queue;
pub mod store;

pub use in_memory::InMemorySessionStore;
pub use manager::{SessionConfig, SessionHandle, SessionManager};
pub use pending::PendingRequests;
pub use queue::{NotificationQueue, QueueClosed, QueuedMessage};
pub use store::{SessionIdGenerator, SessionRecord, SessionStore, SessionStoreError, UuidSessionIds};

/// Default idle TTL for sessions, in seconds.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Default per-session notification queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
