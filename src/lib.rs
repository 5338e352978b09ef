//! Resilient cache-aside and distributed-coordination layer for flash-sale
//! workloads.
//!
//! This crate sits between request handlers and a relational store and
//! provides:
//! - **Read-through caching** with penetration protection (cached empty
//!   markers) and breakdown protection (mutex election or logical expiration
//!   with background rebuilds)
//! - **Distributed IDs**: monotonically increasing, time-ordered 64-bit
//!   identifiers minted against the shared store
//! - **Distributed locks**: TTL-bounded leases with ownership-checked,
//!   atomic release
//! - **Seckill order coordination** composing all three to enforce "one
//!   order per user" and "never oversell" under contention from many
//!   processes
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stockade::{
//!     CacheClient, CacheConfig, MemoryKv, MemoryVoucherStore, SeckillConfig,
//!     SeckillCoordinator, SeckillOutcome,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let kv = Arc::new(MemoryKv::new());
//!     let vouchers = Arc::new(MemoryVoucherStore::new());
//!
//!     // Read-through cache with penetration protection.
//!     let cache = CacheClient::new(Arc::clone(&kv), CacheConfig::default());
//!     let shop: Option<String> = cache
//!         .query_with_pass_through(
//!             "cache:shop:",
//!             42,
//!             || async { Ok(Some("loaded from the database".to_string())) },
//!             Duration::from_secs(1800),
//!         )
//!         .await?;
//!     println!("shop: {shop:?}");
//!
//!     // Flash-sale order placement.
//!     let seckill = SeckillCoordinator::new(kv, vouchers, SeckillConfig::default());
//!     match seckill.place_order(7, 1).await? {
//!         SeckillOutcome::Ordered(order_id) => println!("order {order_id}"),
//!         SeckillOutcome::Rejected(why) => println!("rejected: {why}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             Request handlers                │
//! └─────────────────────────────────────────────┘
//!            │                      │
//!            ▼                      ▼
//! ┌────────────────────┐  ┌─────────────────────┐
//! │    CacheClient     │  │ SeckillCoordinator  │
//! │ pass-through /     │  │ window → stock →    │
//! │ mutex / logical    │  │ lock → txn          │
//! └────────────────────┘  └─────────────────────┘
//!            │               │       │      │
//!            │          ┌────┘       │      └────────┐
//!            ▼          ▼            ▼               ▼
//! ┌────────────────────────┐  ┌──────────┐  ┌──────────────┐
//! │    KvStore (shared)    │  │ DistLock │  │ VoucherStore │
//! │ get / set_nx / incr /  │  │ IdWorker │  │ (relational) │
//! │ compare_and_delete     │  └──────────┘  └──────────────┘
//! └────────────────────────┘
//! ```
//!
//! # Consistency model
//!
//! - The relational store's stock column is the single source of truth,
//!   mutated only by the conditional decrement inside the order transaction.
//! - The cache is a secondary, possibly-stale copy; write paths invalidate
//!   it and convergence is bounded by TTL or logical expiry.
//! - All cross-process mutual exclusion comes from the shared store's atomic
//!   primitives; the crate has no scheduler of its own beyond the bounded
//!   rebuild pool.

pub mod cache;
pub mod config;
pub mod error;
pub mod id;
pub mod kv;
pub mod lock;
pub mod seckill;
pub mod types;

pub use cache::CacheClient;
pub use config::{CacheConfig, SeckillConfig};
pub use error::{Error, Result};
pub use id::IdWorker;
pub use kv::{KvStore, MemoryKv};
pub use lock::DistLock;
pub use seckill::{
    MemoryVoucherStore, OrderTxn, Rejection, SeckillCoordinator, SeckillOutcome, VoucherStore,
};
pub use types::{SeckillVoucher, TimedValue, VoucherOrder};
