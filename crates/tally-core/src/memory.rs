//! In-process counter store.
//!
//! [`MemoryCounterStore`] honors the [`CounterStore`] contract with atomics and
//! is used by tests and by local runs that have no database. It can be switched
//! "offline" to reproduce a disconnected store: every call then fails with
//! `StoreUnavailable` while the value stays untouched.
//!
//! # Limitations
//!
//! - Not durable; the value is lost when the process exits
//! - Not shared between replicas

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;

use crate::error::{Result, TallyError};
use crate::store::CounterStore;

#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    value: AtomicI64,
    initialized: AtomicBool,
    offline: AtomicBool,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (`false`) or regaining (`true`) the store connection.
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
        tracing::debug!(available, "memory store availability changed");
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TallyError::StoreUnavailable(
                "connection refused: memory store is offline".into(),
            ));
        }
        Ok(())
    }

    fn check_row(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(TallyError::StoreUnavailable("counter row does not exist".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn initialize(&self) -> Result<()> {
        self.check_online()
            .map_err(|e| TallyError::InitializationSkipped(e.to_string()))?;
        // Losing the race just means another caller created the row.
        let _ = self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self) -> Result<i64> {
        self.check_online()?;
        self.check_row()?;
        Ok(self.value.load(Ordering::SeqCst))
    }

    async fn increment(&self) -> Result<i64> {
        self.check_online()?;
        self.check_row()?;
        Ok(self.value.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn ping(&self) -> Result<()> {
        self.check_online()
    }
}
