//! Generic read-through cache client.
//!
//! Three query strategies protect the backing store:
//!
//! - **Pass-through** ([`CacheClient::query_with_pass_through`]): misses that
//!   find nothing in the backing store are cached as short-lived empty
//!   markers, so repeated lookups for nonexistent ids never reach the store
//!   (penetration protection).
//! - **Mutex** ([`CacheClient::query_with_mutex`]): on a miss, a per-key
//!   distributed lock elects a single loader; everyone else retries the
//!   cache with bounded, jittered backoff (breakdown protection for keys
//!   that may physically expire).
//! - **Logical expiration** ([`CacheClient::query_with_logic_expire`]):
//!   entries are pre-warmed, never physically expire, and embed their own
//!   expiry. Stale reads are served immediately while at most one background
//!   rebuild per key refreshes the entry (breakdown protection without ever
//!   blocking a caller).

mod rebuild;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::lock::{jittered, DistLock};
use crate::types::TimedValue;
use bytes::Bytes;
use chrono::Utc;
use rebuild::RebuildPool;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What a cache read found.
enum CachedState<T> {
    /// A live value.
    Value(T),
    /// An empty marker: the id is known not to exist in the backing store.
    Marker,
    /// Nothing cached.
    Miss,
}

/// Generic read-through cache client over a shared key-value store.
///
/// Values are JSON-serialized. Cache keys are `{prefix}{id}`; rebuild locks
/// live under the distinct `lock:{lock_prefix}{id}` namespace so cache
/// entries and lock leases can never collide.
pub struct CacheClient<S> {
    store: Arc<S>,
    config: CacheConfig,
    rebuild: RebuildPool,
}

impl<S: KvStore> CacheClient<S> {
    /// Create a cache client over `store`. Starts the rebuild worker pool,
    /// so this must be called from within a tokio runtime.
    pub fn new(store: Arc<S>, config: CacheConfig) -> Self {
        let rebuild = RebuildPool::new(config.rebuild_workers, config.rebuild_queue_depth);
        Self {
            store,
            config,
            rebuild,
        }
    }

    /// Serialize `value` and store it under `key` with a physical TTL.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_vec(value)?;
        self.store.set(key, Bytes::from(raw), Some(ttl)).await
    }

    /// Store `value` wrapped in a logical-expiry envelope, without a
    /// physical TTL. Used to pre-warm keys served by
    /// [`query_with_logic_expire`](Self::query_with_logic_expire).
    pub async fn set_with_logical_expiry<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        write_logical(self.store.as_ref(), key, value, ttl).await
    }

    /// Delete the entry under `key`. Write paths call this after mutating
    /// the backing record; the next read repopulates the cache.
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        self.store.delete(key).await?;
        Ok(())
    }

    /// Read-through query with penetration protection.
    ///
    /// On a miss the `loader` is consulted; a loader miss is cached as an
    /// empty marker with the (short) configured null TTL so repeated lookups
    /// for a nonexistent id stop reaching the backing store. Loader errors
    /// propagate uncached.
    pub async fn query_with_pass_through<T, F, Fut>(
        &self,
        key_prefix: &str,
        id: impl Display,
        loader: F,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = format!("{key_prefix}{id}");
        match self.read_cached::<T>(&key).await? {
            CachedState::Value(value) => Ok(Some(value)),
            CachedState::Marker => {
                debug!(key = %key, "empty marker hit");
                Ok(None)
            }
            CachedState::Miss => match loader().await? {
                Some(value) => {
                    self.set(&key, &value, ttl).await?;
                    Ok(Some(value))
                }
                None => {
                    self.store
                        .set(&key, Bytes::new(), Some(self.config.null_ttl))
                        .await?;
                    debug!(key = %key, "cached empty marker");
                    Ok(None)
                }
            },
        }
    }

    /// Read-through query with mutual-exclusion breakdown protection.
    ///
    /// On a miss, contenders race for the `lock:{lock_prefix}{id}` lease;
    /// the winner loads and fills the cache, losers re-read the cache after
    /// a jittered backoff, up to the configured attempt budget. Exhausting
    /// the budget yields [`Error::LockContended`] rather than recursing or
    /// waiting forever. Empty markers are written and honored as in
    /// [`query_with_pass_through`](Self::query_with_pass_through).
    pub async fn query_with_mutex<T, F, Fut>(
        &self,
        key_prefix: &str,
        id: impl Display,
        lock_prefix: &str,
        loader: F,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = format!("{key_prefix}{id}");
        let lock_name = format!("{lock_prefix}{id}");

        let mut attempts = 0;
        let lock = loop {
            match self.read_cached::<T>(&key).await? {
                CachedState::Value(value) => return Ok(Some(value)),
                CachedState::Marker => return Ok(None),
                CachedState::Miss => {}
            }

            let lock = DistLock::new(Arc::clone(&self.store), &lock_name);
            if lock.try_lock(self.config.rebuild_lock_ttl).await? {
                break lock;
            }

            attempts += 1;
            if attempts > self.config.mutex_max_attempts {
                return Err(Error::LockContended { key, attempts });
            }
            tokio::time::sleep(jittered(self.config.mutex_backoff)).await;
        };

        let result = self.load_and_fill(&key, loader, ttl).await;
        lock.unlock().await;
        result
    }

    /// Query with logical expiration: stale-while-revalidate.
    ///
    /// Entries are assumed pre-warmed via
    /// [`set_with_logical_expiry`](Self::set_with_logical_expiry); an absent
    /// key is an authoritative "not found" and triggers no load. A stale
    /// entry is returned to the caller as-is, and if the per-key rebuild
    /// lock is free, one rebuild is handed to the background pool: it re-runs
    /// the loader, rewrites the envelope (or deletes the key if the record
    /// vanished), and releases the lock whatever happens. Callers never
    /// block on a rebuild.
    pub async fn query_with_logic_expire<T, F, Fut>(
        &self,
        key_prefix: &str,
        id: impl Display,
        lock_prefix: &str,
        loader: F,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let key = format!("{key_prefix}{id}");
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let entry: TimedValue<T> = serde_json::from_slice(&raw)?;
        if entry.is_fresh() {
            return Ok(Some(entry.data));
        }

        // Stale. Serve it anyway; whoever wins the rebuild lock refreshes it.
        let lock = Arc::new(DistLock::new(
            Arc::clone(&self.store),
            format!("{lock_prefix}{id}"),
        ));
        if lock.try_lock(self.config.rebuild_lock_ttl).await? {
            let store = Arc::clone(&self.store);
            let task_key = key.clone();
            let task_lock = Arc::clone(&lock);
            let task = async move {
                let outcome = rebuild_entry(store.as_ref(), &task_key, loader, ttl).await;
                if let Err(e) = outcome {
                    warn!(key = %task_key, error = %e, "cache rebuild failed");
                }
                // Loader failure must not leak the lock.
                task_lock.unlock().await;
            };
            if !self.rebuild.try_submit(Box::pin(task)) {
                // Refused submission means no worker will release the lease;
                // do it here so the next stale read can retry.
                lock.unlock().await;
            }
        }

        Ok(Some(entry.data))
    }

    /// Drain the rebuild worker pool. Call at process shutdown.
    pub async fn shutdown(self) {
        self.rebuild.shutdown().await;
    }

    async fn read_cached<T: DeserializeOwned>(&self, key: &str) -> Result<CachedState<T>> {
        match self.store.get(key).await? {
            None => Ok(CachedState::Miss),
            Some(raw) if raw.is_empty() => Ok(CachedState::Marker),
            Some(raw) => Ok(CachedState::Value(serde_json::from_slice(&raw)?)),
        }
    }

    /// Runs under the mutex lock: re-check the cache (another holder may
    /// have filled it while we contended), then load and write back.
    async fn load_and_fill<T, F, Fut>(&self, key: &str, loader: F, ttl: Duration) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        match self.read_cached::<T>(key).await? {
            CachedState::Value(value) => return Ok(Some(value)),
            CachedState::Marker => return Ok(None),
            CachedState::Miss => {}
        }

        match loader().await? {
            Some(value) => {
                self.set(key, &value, ttl).await?;
                Ok(Some(value))
            }
            None => {
                self.store
                    .set(key, Bytes::new(), Some(self.config.null_ttl))
                    .await?;
                Ok(None)
            }
        }
    }
}

impl<S> std::fmt::Debug for CacheClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("config", &self.config)
            .finish()
    }
}

/// Write a logical-expiry envelope without a physical TTL.
async fn write_logical<S: KvStore, T: Serialize>(
    store: &S,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    let entry = TimedValue {
        expire_at: Utc::now() + ttl,
        data: value,
    };
    let raw = serde_json::to_vec(&entry)?;
    store.set(key, Bytes::from(raw), None).await
}

/// Body of a background rebuild: re-run the loader and rewrite the entry.
async fn rebuild_entry<S, T, F, Fut>(store: &S, key: &str, loader: F, ttl: Duration) -> Result<()>
where
    S: KvStore,
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    match loader().await? {
        Some(fresh) => write_logical(store, key, &fresh, ttl).await,
        None => {
            store.delete(key).await?;
            Ok(())
        }
    }
}
