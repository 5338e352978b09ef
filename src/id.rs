//! Distributed identifier generation.
//!
//! IDs are 64-bit integers composed of a coarse timestamp and a per-day,
//! per-domain counter held in the shared store:
//!
//! ```text
//!  63            32 31             0
//! ┌────────────────┬────────────────┐
//! │ seconds - epoch│ daily sequence │
//! └────────────────┴────────────────┘
//! ```
//!
//! The counter key embeds the UTC calendar day, so a new day implicitly
//! starts a fresh counter at one; no reset logic exists anywhere. IDs are
//! strictly increasing within a (domain, day) scope because the increment is
//! a single atomic store operation, and ordered by second across days.

use crate::error::{Error, Result};
use crate::kv::KvStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Seconds of 2023-07-07T00:00:00Z, the fixed epoch IDs count from.
const ID_EPOCH_SECS: i64 = 1_688_688_000;

/// Low bits reserved for the daily sequence: up to 2^32 IDs per domain per
/// day before the counter would bleed into the timestamp bits.
const SEQUENCE_BITS: u32 = 32;

/// Namespace for ID counters in the shared store.
const COUNTER_KEY_PREFIX: &str = "icr:";

/// Generator of globally unique, roughly time-ordered 64-bit IDs.
pub struct IdWorker<S> {
    store: Arc<S>,
}

impl<S: KvStore> IdWorker<S> {
    /// Create a generator over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Mint the next ID for `domain` (e.g. `"order"`).
    ///
    /// Fails with [`Error::ClockSkew`] if the wall clock reads before the
    /// epoch (an ID minted then would compare below already-issued ones) and
    /// with [`Error::SequenceExhausted`] if the daily counter would overflow
    /// its 32 bits.
    pub async fn next_id(&self, domain: &str) -> Result<i64> {
        self.next_id_at(domain, Utc::now()).await
    }

    async fn next_id_at(&self, domain: &str, now: DateTime<Utc>) -> Result<i64> {
        let timestamp = now.timestamp() - ID_EPOCH_SECS;
        if timestamp < 0 {
            return Err(Error::ClockSkew);
        }

        let day = now.format("%Y:%m:%d");
        let key = format!("{COUNTER_KEY_PREFIX}{domain}:{day}");
        let count = self.store.incr(&key).await?;
        if count >= 1 << SEQUENCE_BITS {
            return Err(Error::SequenceExhausted(domain.to_string()));
        }

        Ok(timestamp << SEQUENCE_BITS | count)
    }
}
