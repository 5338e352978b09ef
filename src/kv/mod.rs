//! Abstract shared key-value store.
//!
//! The coordination layer never talks to a concrete store directly; every
//! cross-process primitive it relies on (conditional set, atomic increment,
//! atomic check-and-delete) is expressed once on the [`KvStore`] trait.
//! Production deployments implement it over a network-reachable store;
//! [`MemoryKv`] provides an in-process implementation for tests and
//! embedding.

pub mod memory;

pub use memory::MemoryKv;

use crate::error::Result;
use bytes::Bytes;
use std::time::Duration;

/// Operations the coordination layer requires from the shared store.
///
/// Implementations must make `set_nx`, `incr`, and `compare_and_delete`
/// atomic with respect to every other operation on the same key; they are
/// the sole source of cross-process mutual exclusion.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Get the value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Set `key` to `value`, with a physical TTL if given. `None` means the
    /// entry never expires on its own.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Set `key` to `value` with a TTL only if the key is currently absent.
    /// Returns `true` iff this call created the entry.
    async fn set_nx(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool>;

    /// Delete `key`. Returns `true` iff an entry existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically increment the integer at `key` by one, creating it at zero
    /// first if absent. Returns the incremented value.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Atomically delete `key` only if its current value equals `expected`.
    /// Returns `true` iff the entry was deleted.
    ///
    /// This is the check-and-delete primitive lock release depends on; a
    /// separate read-then-delete pair would race with lease expiry.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool>;
}
