//! Core types used throughout the coordination layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope for logically-expiring cache entries.
///
/// The store-level entry never physically expires; staleness is a property of
/// the payload itself. A stale entry is still served while a single
/// background rebuild refreshes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimedValue<T> {
    /// Instant after which the payload is considered stale.
    pub expire_at: DateTime<Utc>,

    /// The wrapped payload.
    pub data: T,
}

impl<T> TimedValue<T> {
    /// Wrap a payload with an expiry `ttl` from now.
    pub fn new(data: T, ttl: std::time::Duration) -> Self {
        Self {
            expire_at: Utc::now() + ttl,
            data,
        }
    }

    /// Whether the payload is still fresh.
    pub fn is_fresh(&self) -> bool {
        self.expire_at > Utc::now()
    }
}

/// A time-boxed flash-sale voucher with strictly limited stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeckillVoucher {
    /// Voucher identifier.
    pub voucher_id: u64,

    /// Remaining stock. Never negative; decremented only by the
    /// conditional update inside the order transaction.
    pub stock: u32,

    /// Start of the sale window (inclusive).
    pub begin_time: DateTime<Utc>,

    /// End of the sale window (inclusive).
    pub end_time: DateTime<Utc>,
}

impl SeckillVoucher {
    /// Whether `now` falls inside the sale window.
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.begin_time && now <= self.end_time
    }
}

/// A placed flash-sale order. At most one exists per (user, voucher) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoucherOrder {
    /// Globally unique, time-ordered order identifier.
    pub order_id: i64,

    /// Purchasing user.
    pub user_id: u64,

    /// Purchased voucher.
    pub voucher_id: u64,

    /// Creation time.
    pub created_at: DateTime<Utc>,
}
