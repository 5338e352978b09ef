//! In-process key-value store.

use crate::error::{Error, Result};
use crate::kv::KvStore;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,

    /// Absolute expiration instant. Entries without TTL have `None`.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`KvStore`] backed by a single guarded map.
///
/// Expired entries are treated as absent on read and purged lazily by the
/// next write touching their key. Compound operations (`set_nx`, `incr`,
/// `compare_and_delete`) execute under the write lock, which makes them
/// atomic with respect to every other operation — the same guarantee a
/// server-side script gives against a networked store.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries. Test and introspection helper.
    pub fn live_len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    fn purge_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).map(|e| e.is_expired(now)) == Some(true) {
            entries.remove(key);
        }
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        Self::purge_if_expired(&mut entries, key, now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        Self::purge_if_expired(&mut entries, key, now);
        Ok(entries.remove(key).is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        Self::purge_if_expired(&mut entries, key, now);

        let (current, expires_at) = match entries.get(key) {
            Some(entry) => {
                let text = std::str::from_utf8(&entry.value)
                    .map_err(|_| Error::store("value at counter key is not an integer"))?;
                let n: i64 = text
                    .parse()
                    .map_err(|_| Error::store("value at counter key is not an integer"))?;
                (n, entry.expires_at)
            }
            None => (0, None),
        };

        let next = current
            .checked_add(1)
            .ok_or_else(|| Error::store("counter overflow"))?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Bytes::from(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        Self::purge_if_expired(&mut entries, key, now);
        match entries.get(key) {
            Some(entry) if entry.value.as_ref() == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let kv = MemoryKv::new();
        kv.set("k", Bytes::from("v"), None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some(Bytes::from("v")));
        assert_eq!(kv.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let kv = MemoryKv::new();
        kv.set("k", Bytes::from("v"), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(kv.get("k").await.unwrap().is_some());
        assert_eq!(kv.live_len(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert_eq!(kv.live_len(), 0);
    }

    #[tokio::test]
    async fn test_set_nx_excludes_second_writer() {
        let kv = MemoryKv::new();
        assert!(kv
            .set_nx("k", Bytes::from("a"), Duration::from_secs(10))
            .await
            .unwrap());
        assert!(!kv
            .set_nx("k", Bytes::from("b"), Duration::from_secs(10))
            .await
            .unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some(Bytes::from("a")));
    }

    #[tokio::test]
    async fn test_set_nx_succeeds_after_expiry() {
        let kv = MemoryKv::new();
        assert!(kv
            .set_nx("k", Bytes::from("a"), Duration::from_millis(20))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(kv
            .set_nx("k", Bytes::from("b"), Duration::from_secs(10))
            .await
            .unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some(Bytes::from("b")));
    }

    #[tokio::test]
    async fn test_incr_starts_at_one() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("counter").await.unwrap(), 1);
        assert_eq!(kv.incr("counter").await.unwrap(), 2);
        assert_eq!(kv.incr("counter").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let kv = MemoryKv::new();
        kv.set("k", Bytes::from("not a number"), None).await.unwrap();
        assert!(kv.incr("k").await.is_err());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let kv = MemoryKv::new();
        kv.set("k", Bytes::from("token-a"), None).await.unwrap();

        // Wrong token leaves the entry in place.
        assert!(!kv.compare_and_delete("k", b"token-b").await.unwrap());
        assert!(kv.get("k").await.unwrap().is_some());

        // Matching token deletes it.
        assert!(kv.compare_and_delete("k", b"token-a").await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), None);
    }
}
