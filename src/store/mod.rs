//! Shared store subsystem.
//!
//! # Data Flow
//! ```text
//! Rate limiter   → window_hit (atomic sliding-window log per key)
//! Sessions       → get / set_ex / del + set_* (user → sessions index)
//! Blacklist      → set_ex / exists
//! Health         → ping + throwaway round-trips
//!
//! Backends:
//!     memory.rs       (DashMap, single instance / tests)
//!     redis_store.rs  (Redis, shared by every gateway instance)
//! ```
//!
//! # Design Decisions
//! - No application-level locking; atomicity comes from the backend
//!   (DashMap entry lock, Redis MULTI/EXEC)
//! - Every backend call is bounded by the configured operation timeout
//! - Callers decide how to treat failures (see `resilience::FailurePolicy`)

pub mod memory;
pub mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StoreConfig;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Errors raised by store backends.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("corrupt value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One attempt against a sliding-window log.
#[derive(Debug, Clone)]
pub struct WindowHit<'a> {
    pub key: &'a str,
    /// Event timestamp in milliseconds since the epoch.
    pub now_ms: i64,
    pub window: Duration,
    pub limit: u32,
    /// Unique member recorded for this attempt.
    pub member: String,
    /// Expiry of the whole log (window plus slack).
    pub ttl: Duration,
}

/// Result of a sliding-window attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    pub admitted: bool,
    /// Entries inside the window after the attempt settled.
    pub count: u32,
    /// Timestamp of the oldest entry still inside the window.
    pub oldest_ms: Option<i64>,
}

/// Key/value, set and sliding-window primitives shared by all components.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs and health payloads.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    async fn del(&self, key: &str) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    /// Add a member to a set and (re)set the set's expiry.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<()>;

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn set_len(&self, key: &str) -> StoreResult<usize>;

    /// Drop stale entries, count, tentatively add, and roll back on overflow,
    /// as one atomic unit for the key.
    async fn window_hit(&self, hit: &WindowHit<'_>) -> StoreResult<WindowOutcome>;

    /// Evict expired entries held in process. Returns the number evicted.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// Build the configured backend.
pub fn build_store(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    let op_timeout = Duration::from_millis(config.op_timeout_ms);
    match config.backend.as_str() {
        "redis" => Ok(Arc::new(RedisStore::new(&config.url, op_timeout)?)),
        _ => Ok(Arc::new(MemoryStore::new())),
    }
}
