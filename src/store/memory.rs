//! In-process store backed by DashMap.
//!
//! Expiry is lazy on access plus a periodic [`Store::purge_expired`] sweep.
//! The DashMap entry lock serializes every operation on one key, which is
//! what makes `window_hit` atomic.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use crate::store::{Store, StoreError, StoreResult, WindowHit, WindowOutcome};

#[derive(Debug)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    /// Sliding-window log, ordered by timestamp.
    Log(VecDeque<(i64, String)>),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| t <= now).unwrap_or(false)
    }
}

/// A thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner.iter().filter(|s| !s.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::Corrupt {
            key: key.to_string(),
            reason: "operation against a key holding the wrong kind of value".to_string(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        match self.inner.get(key) {
            Some(slot) if !slot.is_expired(now) => match &slot.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(Self::wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.inner.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .inner
            .get(key)
            .map(|slot| !slot.is_expired(now))
            .unwrap_or(false))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        if let Some(mut slot) = self.inner.get_mut(key) {
            if !slot.is_expired(now) {
                slot.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let mut slot = self.inner.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        if slot.is_expired(now) {
            slot.value = Value::Set(HashSet::new());
        }
        match &mut slot.value {
            Value::Set(set) => {
                set.insert(member.to_string());
            }
            _ => return Err(Self::wrong_type(key)),
        }
        slot.expires_at = Some(now + ttl);
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        if let MapEntry::Occupied(mut entry) = self.inner.entry(key.to_string()) {
            let now_empty = match &mut entry.get_mut().value {
                Value::Set(set) => {
                    set.remove(member);
                    set.is_empty()
                }
                _ => return Err(Self::wrong_type(key)),
            };
            if now_empty {
                entry.remove();
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        match self.inner.get(key) {
            Some(slot) if !slot.is_expired(now) => match &slot.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(Self::wrong_type(key)),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn set_len(&self, key: &str) -> StoreResult<usize> {
        let now = Instant::now();
        match self.inner.get(key) {
            Some(slot) if !slot.is_expired(now) => match &slot.value {
                Value::Set(set) => Ok(set.len()),
                _ => Err(Self::wrong_type(key)),
            },
            _ => Ok(0),
        }
    }

    async fn window_hit(&self, hit: &WindowHit<'_>) -> StoreResult<WindowOutcome> {
        let now = Instant::now();
        let window_start = hit.now_ms - hit.window.as_millis() as i64;

        // Held for the whole check: concurrent hits on this key queue here.
        let mut slot = self.inner.entry(hit.key.to_string()).or_insert_with(|| Slot {
            value: Value::Log(VecDeque::new()),
            expires_at: None,
        });
        if slot.is_expired(now) {
            slot.value = Value::Log(VecDeque::new());
        }
        let log = match &mut slot.value {
            Value::Log(log) => log,
            _ => return Err(Self::wrong_type(hit.key)),
        };

        // Entries stamped exactly at the window start still count.
        log.retain(|(ts, _)| *ts >= window_start);

        let admitted = log.len() < hit.limit as usize;
        if admitted {
            let pos = log.partition_point(|(ts, _)| *ts <= hit.now_ms);
            log.insert(pos, (hit.now_ms, hit.member.clone()));
        }

        let outcome = WindowOutcome {
            admitted,
            count: log.len() as u32,
            oldest_ms: log.front().map(|(ts, _)| *ts),
        };
        slot.expires_at = Some(now + hit.ttl);
        Ok(outcome)
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn hit(key: &str, now_ms: i64, limit: u32) -> WindowHit<'_> {
        WindowHit {
            key,
            now_ms,
            window: Duration::from_secs(60),
            limit,
            member: format!("{}-{}", now_ms, uuid::Uuid::new_v4()),
            ttl: Duration::from_secs(120),
        }
    }

    #[tokio::test]
    async fn test_string_ttl() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::from_millis(30)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set_add("s", "a", ttl).await.unwrap();
        store.set_add("s", "b", ttl).await.unwrap();
        store.set_add("s", "a", ttl).await.unwrap();
        assert_eq!(store.set_len("s").await.unwrap(), 2);

        store.set_remove("s", "a").await.unwrap();
        assert_eq!(store.set_members("s").await.unwrap(), vec!["b".to_string()]);

        store.set_remove("s", "b").await.unwrap();
        assert!(!store.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            store.set_len("k").await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_window_rejects_and_does_not_record() {
        let store = MemoryStore::new();
        for i in 0..3 {
            let outcome = store.window_hit(&hit("w", 1_000 + i, 3)).await.unwrap();
            assert!(outcome.admitted);
            assert_eq!(outcome.count, (i + 1) as u32);
        }

        let rejected = store.window_hit(&hit("w", 1_010, 3)).await.unwrap();
        assert!(!rejected.admitted);
        assert_eq!(rejected.count, 3);
        assert_eq!(rejected.oldest_ms, Some(1_000));

        // The entry at exactly now - window is still inside.
        let boundary = store.window_hit(&hit("w", 61_000, 3)).await.unwrap();
        assert!(!boundary.admitted);
        assert_eq!(boundary.count, 3);

        // Once the first entries slide out, room opens up again.
        let later = store.window_hit(&hit("w", 61_002, 3)).await.unwrap();
        assert!(later.admitted);
        assert_eq!(later.count, 2);
    }

    #[tokio::test]
    async fn test_window_concurrent_hits_never_exceed_limit() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = "concurrent".to_string();
                let h = WindowHit {
                    key: &key,
                    now_ms: 5_000 + i,
                    window: Duration::from_secs(60),
                    limit: 10,
                    member: format!("m-{}", i),
                    ttl: Duration::from_secs(120),
                };
                store.window_hit(&h).await.unwrap().admitted
            }));
        }

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
