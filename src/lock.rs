//! Distributed mutual exclusion over the shared store.
//!
//! A lock is a TTL-bounded lease under `lock:{name}` tagged with an owner
//! token unique to the acquiring context. Release goes through the store's
//! atomic check-and-delete primitive so a holder whose lease already expired
//! can never delete someone else's freshly-acquired lease.

use crate::error::Result;
use crate::kv::KvStore;
use bytes::Bytes;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Namespace for lock leases, distinct from cache-entry keys.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// A named distributed lock.
///
/// Each instance carries its own owner token; create one instance per
/// acquiring call context and drop it after release. The TTL passed to
/// [`try_lock`](Self::try_lock) is a safety net against crashed holders, not
/// the normal release path.
pub struct DistLock<S> {
    store: Arc<S>,
    key: String,
    token: String,
}

impl<S: KvStore> DistLock<S> {
    /// Create a lock handle for `name`. The stored key is `lock:{name}`.
    pub fn new(store: Arc<S>, name: impl AsRef<str>) -> Self {
        Self {
            store,
            key: format!("{LOCK_KEY_PREFIX}{}", name.as_ref()),
            token: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// The full store key of this lock.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Try to acquire the lease once, without blocking.
    ///
    /// Returns `true` only if this call created the entry. Store errors
    /// propagate, which fails closed: an unreachable store never looks like
    /// an acquired lock.
    pub async fn try_lock(&self, ttl: Duration) -> Result<bool> {
        let acquired = self
            .store
            .set_nx(&self.key, Bytes::from(self.token.clone()), ttl)
            .await?;
        debug!(key = %self.key, acquired, "lock attempt");
        Ok(acquired)
    }

    /// Try to acquire the lease with a bounded number of retries.
    ///
    /// `max_retries` of zero degenerates to a single [`try_lock`]. Sleeps
    /// between attempts are jittered around `backoff` to avoid synchronized
    /// stampedes from contending callers. Returns `false` once the budget is
    /// exhausted; never blocks past `(max_retries + 1)` attempts.
    pub async fn try_lock_with_retry(
        &self,
        ttl: Duration,
        max_retries: u32,
        backoff: Duration,
    ) -> Result<bool> {
        for attempt in 0..=max_retries {
            if self.try_lock(ttl).await? {
                return Ok(true);
            }
            if attempt < max_retries {
                tokio::time::sleep(jittered(backoff)).await;
            }
        }
        Ok(false)
    }

    /// Release the lease if this instance still owns it.
    ///
    /// Errors and lost ownership are logged, not escalated: a lease we no
    /// longer own must be left alone, and a stale lease we failed to delete
    /// is recovered by its own TTL.
    pub async fn unlock(&self) {
        match self
            .store
            .compare_and_delete(&self.key, self.token.as_bytes())
            .await
        {
            Ok(true) => debug!(key = %self.key, "lock released"),
            Ok(false) => warn!(
                key = %self.key,
                "lock not released: lease expired or held by another owner"
            ),
            Err(e) => warn!(key = %self.key, error = %e, "lock release failed"),
        }
    }
}

/// Uniform jitter in `[backoff/2, backoff]`.
pub(crate) fn jittered(backoff: Duration) -> Duration {
    let millis = backoff.as_millis().max(1) as u64;
    Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
}
