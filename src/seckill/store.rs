//! Relational-store seam for flash-sale orders.
//!
//! The coordinator drives the duplicate-check / stock-decrement / insert
//! sequence through [`OrderTxn`] so the whole unit commits or disappears
//! together; a crash between decrement and insert must never leave stock
//! decremented with no corresponding order. [`MemoryVoucherStore`] implements
//! the seam in-process for tests and embedding.

use crate::error::Result;
use crate::types::{SeckillVoucher, VoucherOrder};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The relational store holding vouchers and orders.
#[async_trait::async_trait]
pub trait VoucherStore: Send + Sync + 'static {
    /// Transaction handle type.
    type Txn: OrderTxn;

    /// Load a voucher by id.
    async fn get_voucher(&self, voucher_id: u64) -> Result<Option<SeckillVoucher>>;

    /// Open a transaction spanning duplicate-check, decrement, and insert.
    async fn begin(&self) -> Result<Self::Txn>;
}

/// A single order-creation transaction.
///
/// Writes are staged until [`commit`](Self::commit); dropping the handle (or
/// calling [`rollback`](Self::rollback)) discards them.
#[async_trait::async_trait]
pub trait OrderTxn: Send {
    /// Whether an order for this (user, voucher) pair already exists.
    async fn order_exists(&mut self, user_id: u64, voucher_id: u64) -> Result<bool>;

    /// The authoritative stock guard: `stock = stock - 1 WHERE stock > 0` as
    /// one conditional update. Returns `true` iff a row changed. Must never
    /// be replaced by a read-check-write sequence.
    async fn decrement_stock(&mut self, voucher_id: u64) -> Result<bool>;

    /// Stage an order row for insertion.
    async fn insert_order(&mut self, order: VoucherOrder) -> Result<()>;

    /// Atomically apply every staged write.
    async fn commit(self) -> Result<()>;

    /// Discard every staged write.
    async fn rollback(self) -> Result<()>;
}

#[derive(Debug, Default)]
struct Inner {
    vouchers: HashMap<u64, SeckillVoucher>,
    orders: Vec<VoucherOrder>,
}

/// In-process [`VoucherStore`].
///
/// Transactions take the single store mutex for their whole lifetime, which
/// makes them fully serialized — the same end state a serializable isolation
/// level would give, at throughput that only matters for tests.
#[derive(Debug, Default)]
pub struct MemoryVoucherStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryVoucherStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a voucher.
    pub async fn put_voucher(&self, voucher: SeckillVoucher) {
        let mut inner = self.inner.lock().await;
        inner.vouchers.insert(voucher.voucher_id, voucher);
    }

    /// Remaining stock for a voucher, if it exists.
    pub async fn stock_of(&self, voucher_id: u64) -> Option<u32> {
        let inner = self.inner.lock().await;
        inner.vouchers.get(&voucher_id).map(|v| v.stock)
    }

    /// Snapshot of all committed orders.
    pub async fn orders(&self) -> Vec<VoucherOrder> {
        self.inner.lock().await.orders.clone()
    }
}

/// Transaction over [`MemoryVoucherStore`]: exclusive guard plus a staged
/// write set.
pub struct MemoryTxn {
    guard: OwnedMutexGuard<Inner>,
    staged_decrements: Vec<u64>,
    staged_orders: Vec<VoucherOrder>,
}

impl MemoryTxn {
    fn effective_stock(&self, voucher_id: u64) -> Option<u32> {
        let stock = self.guard.vouchers.get(&voucher_id)?.stock;
        let staged = self
            .staged_decrements
            .iter()
            .filter(|&&id| id == voucher_id)
            .count() as u32;
        Some(stock.saturating_sub(staged))
    }
}

#[async_trait::async_trait]
impl VoucherStore for MemoryVoucherStore {
    type Txn = MemoryTxn;

    async fn get_voucher(&self, voucher_id: u64) -> Result<Option<SeckillVoucher>> {
        let inner = self.inner.lock().await;
        Ok(inner.vouchers.get(&voucher_id).cloned())
    }

    async fn begin(&self) -> Result<MemoryTxn> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        Ok(MemoryTxn {
            guard,
            staged_decrements: Vec::new(),
            staged_orders: Vec::new(),
        })
    }
}

#[async_trait::async_trait]
impl OrderTxn for MemoryTxn {
    async fn order_exists(&mut self, user_id: u64, voucher_id: u64) -> Result<bool> {
        let committed = self
            .guard
            .orders
            .iter()
            .any(|o| o.user_id == user_id && o.voucher_id == voucher_id);
        let staged = self
            .staged_orders
            .iter()
            .any(|o| o.user_id == user_id && o.voucher_id == voucher_id);
        Ok(committed || staged)
    }

    async fn decrement_stock(&mut self, voucher_id: u64) -> Result<bool> {
        match self.effective_stock(voucher_id) {
            Some(stock) if stock > 0 => {
                self.staged_decrements.push(voucher_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_order(&mut self, order: VoucherOrder) -> Result<()> {
        self.staged_orders.push(order);
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        for voucher_id in std::mem::take(&mut self.staged_decrements) {
            if let Some(voucher) = self.guard.vouchers.get_mut(&voucher_id) {
                voucher.stock = voucher.stock.saturating_sub(1);
            }
        }
        let staged = std::mem::take(&mut self.staged_orders);
        self.guard.orders.extend(staged);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        // Staged writes die with the handle.
        Ok(())
    }
}
