//! Error types for the coordination layer.

use thiserror::Error;

/// Result type alias for coordination-layer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the coordination layer.
///
/// Business rejections (sale window closed, sold out, duplicate order) are
/// not errors; they are returned as [`crate::seckill::SeckillOutcome::Rejected`]
/// so callers can tell "try again" from "permanently no" without unwinding.
#[derive(Error, Debug)]
pub enum Error {
    /// The shared key-value store or the relational store is unreachable or
    /// misbehaving. Transient; callers fail the request or retry per their
    /// own policy.
    #[error("store error: {0}")]
    Store(String),

    /// A cached payload could not be serialized or deserialized.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A mutex-guarded cache load gave up after exhausting its retry budget.
    #[error("lock contended after {attempts} attempts: {key}")]
    LockContended { key: String, attempts: u32 },

    /// The wall clock reads earlier than the ID epoch. IDs minted now would
    /// compare below already-issued ones, so the operation is refused.
    #[error("clock skew: current time predates the ID epoch")]
    ClockSkew,

    /// The per-day ID counter for a domain ran out of sequence bits.
    #[error("id sequence exhausted for domain {0:?} today")]
    SequenceExhausted(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a store error from any displayable cause.
    pub fn store(cause: impl std::fmt::Display) -> Self {
        Self::Store(cause.to_string())
    }
}
