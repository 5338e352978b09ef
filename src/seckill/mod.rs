//! Flash-sale (seckill) order coordination.
//!
//! [`SeckillCoordinator::place_order`] walks one purchase request through
//! the full protocol:
//!
//! ```text
//! window check → stock pre-check → per-user lock
//!   → { duplicate check → conditional decrement → order insert } → done
//! ```
//!
//! The braced steps run inside a single store transaction. The per-user lock
//! exists solely to serialize the duplicate-order check against concurrent
//! requests from the same user; the conditional decrement alone already makes
//! overselling impossible across users.

pub mod store;

pub use store::{MemoryVoucherStore, OrderTxn, VoucherStore};

use crate::config::SeckillConfig;
use crate::error::Result;
use crate::id::IdWorker;
use crate::kv::KvStore;
use crate::lock::DistLock;
use crate::types::VoucherOrder;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// ID domain for minted order IDs.
const ORDER_ID_DOMAIN: &str = "order";

/// Why a purchase request was refused.
///
/// Every variant maps to a stable code so clients can tell "try again"
/// (`retry-later`) from "permanently no" (everything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No such voucher.
    UnknownVoucher,

    /// The sale window has not opened yet.
    SaleNotStarted,

    /// The sale window has closed.
    SaleEnded,

    /// Stock is exhausted.
    SoldOut,

    /// This user already holds an order for this voucher.
    DuplicateOrder,

    /// A request from the same user is in flight; the per-user lock was
    /// contended past its budget.
    RetryLater,
}

impl Rejection {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownVoucher => "unknown-voucher",
            Self::SaleNotStarted => "sale-not-started",
            Self::SaleEnded => "sale-ended",
            Self::SoldOut => "sold-out",
            Self::DuplicateOrder => "duplicate-order",
            Self::RetryLater => "retry-later",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::UnknownVoucher => "voucher does not exist",
            Self::SaleNotStarted => "flash sale has not started",
            Self::SaleEnded => "flash sale has ended",
            Self::SoldOut => "sold out",
            Self::DuplicateOrder => "order already placed for this voucher",
            Self::RetryLater => "duplicate submission in flight, try again later",
        };
        f.write_str(message)
    }
}

/// Result of a purchase request that reached a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeckillOutcome {
    /// Order created, with its minted ID.
    Ordered(i64),

    /// Request refused for a business reason.
    Rejected(Rejection),
}

/// Coordinates flash-sale order creation across processes.
pub struct SeckillCoordinator<K, V> {
    kv: Arc<K>,
    vouchers: Arc<V>,
    ids: IdWorker<K>,
    config: SeckillConfig,
}

impl<K: KvStore, V: VoucherStore> SeckillCoordinator<K, V> {
    /// Create a coordinator over the shared store and the voucher store.
    pub fn new(kv: Arc<K>, vouchers: Arc<V>, config: SeckillConfig) -> Self {
        let ids = IdWorker::new(Arc::clone(&kv));
        Self {
            kv,
            vouchers,
            ids,
            config,
        }
    }

    /// Attempt to place a flash-sale order for `user_id` on `voucher_id`.
    ///
    /// Business refusals come back as [`SeckillOutcome::Rejected`]; only
    /// store failures surface as errors.
    pub async fn place_order(&self, user_id: u64, voucher_id: u64) -> Result<SeckillOutcome> {
        let Some(voucher) = self.vouchers.get_voucher(voucher_id).await? else {
            return Ok(SeckillOutcome::Rejected(Rejection::UnknownVoucher));
        };

        let now = Utc::now();
        if now < voucher.begin_time {
            return Ok(SeckillOutcome::Rejected(Rejection::SaleNotStarted));
        }
        if now > voucher.end_time {
            return Ok(SeckillOutcome::Rejected(Rejection::SaleEnded));
        }
        // Optimistic pre-check; the conditional decrement inside the
        // transaction is the authoritative guard.
        if voucher.stock < 1 {
            return Ok(SeckillOutcome::Rejected(Rejection::SoldOut));
        }

        let lock = DistLock::new(Arc::clone(&self.kv), format!("order:{user_id}"));
        let acquired = lock
            .try_lock_with_retry(
                self.config.lock_ttl,
                self.config.lock_attempts,
                self.config.lock_backoff,
            )
            .await?;
        if !acquired {
            debug!(user_id, voucher_id, "per-user order lock contended");
            return Ok(SeckillOutcome::Rejected(Rejection::RetryLater));
        }

        let outcome = self.create_order(user_id, voucher_id).await;
        lock.unlock().await;
        outcome
    }

    /// Runs with the per-user lock held. Store errors drop the transaction,
    /// which discards its staged writes.
    async fn create_order(&self, user_id: u64, voucher_id: u64) -> Result<SeckillOutcome> {
        let mut txn = self.vouchers.begin().await?;

        if txn.order_exists(user_id, voucher_id).await? {
            txn.rollback().await?;
            return Ok(SeckillOutcome::Rejected(Rejection::DuplicateOrder));
        }

        if !txn.decrement_stock(voucher_id).await? {
            txn.rollback().await?;
            return Ok(SeckillOutcome::Rejected(Rejection::SoldOut));
        }

        let order_id = self.ids.next_id(ORDER_ID_DOMAIN).await?;
        txn.insert_order(VoucherOrder {
            order_id,
            user_id,
            voucher_id,
            created_at: Utc::now(),
        })
        .await?;
        txn.commit().await?;

        info!(user_id, voucher_id, order_id, "seckill order created");
        Ok(SeckillOutcome::Ordered(order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use crate::types::SeckillVoucher;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn voucher(id: u64, stock: u32) -> SeckillVoucher {
        let now = Utc::now();
        SeckillVoucher {
            voucher_id: id,
            stock,
            begin_time: now - Duration::from_secs(60),
            end_time: now + Duration::from_secs(60),
        }
    }

    async fn coordinator(
        stock: u32,
        config: SeckillConfig,
    ) -> (
        Arc<MemoryVoucherStore>,
        SeckillCoordinator<MemoryKv, MemoryVoucherStore>,
    ) {
        let kv = Arc::new(MemoryKv::new());
        let vouchers = Arc::new(MemoryVoucherStore::new());
        vouchers.put_voucher(voucher(1, stock)).await;
        let coordinator = SeckillCoordinator::new(kv, Arc::clone(&vouchers), config);
        (vouchers, coordinator)
    }

    #[tokio::test]
    async fn test_unknown_voucher_rejected() {
        let (_, coordinator) = coordinator(10, SeckillConfig::default()).await;
        let outcome = coordinator.place_order(7, 99).await.unwrap();
        assert_eq!(
            outcome,
            SeckillOutcome::Rejected(Rejection::UnknownVoucher)
        );
    }

    #[tokio::test]
    async fn test_window_not_open_rejected() {
        let (vouchers, coordinator) = coordinator(10, SeckillConfig::default()).await;
        let now = Utc::now();

        let mut early = voucher(1, 10);
        early.begin_time = now + Duration::from_secs(60);
        early.end_time = now + Duration::from_secs(120);
        vouchers.put_voucher(early).await;
        assert_eq!(
            coordinator.place_order(7, 1).await.unwrap(),
            SeckillOutcome::Rejected(Rejection::SaleNotStarted)
        );

        let mut late = voucher(1, 10);
        late.begin_time = now - Duration::from_secs(120);
        late.end_time = now - Duration::from_secs(60);
        vouchers.put_voucher(late).await;
        assert_eq!(
            coordinator.place_order(7, 1).await.unwrap(),
            SeckillOutcome::Rejected(Rejection::SaleEnded)
        );
    }

    #[tokio::test]
    async fn test_zero_stock_rejected_before_lock() {
        let (_, coordinator) = coordinator(0, SeckillConfig::default()).await;
        assert_eq!(
            coordinator.place_order(7, 1).await.unwrap(),
            SeckillOutcome::Rejected(Rejection::SoldOut)
        );
    }

    #[tokio::test]
    async fn test_second_order_is_duplicate() {
        let (vouchers, coordinator) = coordinator(10, SeckillConfig::default()).await;

        assert!(matches!(
            coordinator.place_order(7, 1).await.unwrap(),
            SeckillOutcome::Ordered(_)
        ));
        assert_eq!(
            coordinator.place_order(7, 1).await.unwrap(),
            SeckillOutcome::Rejected(Rejection::DuplicateOrder)
        );

        assert_eq!(vouchers.stock_of(1).await, Some(9));
        assert_eq!(vouchers.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_two_users_race_for_last_unit() {
        let (vouchers, coordinator) = coordinator(1, SeckillConfig::default()).await;
        let coordinator = Arc::new(coordinator);
        let barrier = Arc::new(Barrier::new(2));

        let mut handles = Vec::new();
        for user_id in [7, 8] {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                coordinator.place_order(user_id, 1).await.unwrap()
            }));
        }

        let mut ordered = 0;
        let mut sold_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                SeckillOutcome::Ordered(_) => ordered += 1,
                SeckillOutcome::Rejected(Rejection::SoldOut) => sold_out += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!((ordered, sold_out), (1, 1));
        assert_eq!(vouchers.stock_of(1).await, Some(0));
    }

    #[tokio::test]
    async fn test_same_user_concurrent_requests_create_one_order() {
        // Generous lock budget so the loser waits out the winner and then
        // hits the duplicate check instead of failing on contention.
        let config = SeckillConfig::default()
            .with_lock_attempts(100)
            .with_lock_backoff(Duration::from_millis(10));
        let (vouchers, coordinator) = coordinator(10, config).await;
        let coordinator = Arc::new(coordinator);
        let barrier = Arc::new(Barrier::new(2));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                coordinator.place_order(7, 1).await.unwrap()
            }));
        }

        let mut ordered = 0;
        let mut duplicate = 0;
        for handle in handles {
            match handle.await.unwrap() {
                SeckillOutcome::Ordered(_) => ordered += 1,
                SeckillOutcome::Rejected(Rejection::DuplicateOrder) => duplicate += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!((ordered, duplicate), (1, 1));
        assert_eq!(vouchers.orders().await.len(), 1);
        assert_eq!(vouchers.stock_of(1).await, Some(9));
    }

    #[tokio::test]
    async fn test_fail_fast_lock_rejects_inflight_duplicate() {
        // Default config does not retry the per-user lock.
        let (_, coordinator) = coordinator(10, SeckillConfig::default()).await;
        let coordinator = Arc::new(coordinator);

        // Hold the user's lock as if another request were mid-flight.
        let kv = Arc::clone(&coordinator.kv);
        let inflight = DistLock::new(kv, "order:7");
        assert!(inflight.try_lock(Duration::from_secs(10)).await.unwrap());

        assert_eq!(
            coordinator.place_order(7, 1).await.unwrap(),
            SeckillOutcome::Rejected(Rejection::RetryLater)
        );
        inflight.unlock().await;
    }

    #[tokio::test]
    async fn test_five_users_three_units() {
        init_logging();
        let (vouchers, coordinator) = coordinator(3, SeckillConfig::default()).await;
        let coordinator = Arc::new(coordinator);
        let barrier = Arc::new(Barrier::new(5));

        let mut handles = Vec::new();
        for user_id in 1..=5u64 {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                coordinator.place_order(user_id, 1).await.unwrap()
            }));
        }

        let mut order_ids = HashSet::new();
        let mut sold_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                SeckillOutcome::Ordered(id) => {
                    assert!(order_ids.insert(id), "duplicate order id {id}");
                }
                SeckillOutcome::Rejected(Rejection::SoldOut) => sold_out += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(order_ids.len(), 3);
        assert_eq!(sold_out, 2);
        assert_eq!(vouchers.stock_of(1).await, Some(0));

        let orders = vouchers.orders().await;
        assert_eq!(orders.len(), 3);
        let users: HashSet<u64> = orders.iter().map(|o| o.user_id).collect();
        assert_eq!(users.len(), 3, "one order per user");
    }
}
