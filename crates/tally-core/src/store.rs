//! Counter store contract.

use async_trait::async_trait;

use crate::error::Result;

/// Fixed key of the single counter row.
pub const COUNTER_ID: i32 = 1;

/// A durable, single-value counter.
///
/// Implementations must make `increment` a single atomic read-modify-write:
/// N successful concurrent calls return exactly the N consecutive values that
/// follow the pre-increment value. No in-process lock may be relied on for
/// this, since several replicas can share one store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Ensure the counter exists, starting at 0.
    ///
    /// Idempotent and safe to race. An unreachable store is reported as
    /// `TallyError::InitializationSkipped`; callers log it and keep serving.
    async fn initialize(&self) -> Result<()>;

    /// Current value, without side effects.
    async fn read(&self) -> Result<i64>;

    /// Add one and return the new value. On error the value is unchanged.
    async fn increment(&self) -> Result<i64>;

    /// Cheapest possible round-trip to the store.
    async fn ping(&self) -> Result<()>;
}
