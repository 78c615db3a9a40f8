//! tally core: the counter store contract, an in-process store, and the error surface.
//!
//! This crate defines what every counter backend must guarantee (atomic
//! increment, idempotent initialization) and the error type shared by the
//! server and its handlers. It carries no HTTP or database dependencies so the
//! contract can be exercised without a running Postgres.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `TallyError`/`Result` so a misbehaving
//! store degrades responses instead of crashing the process.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod memory;
pub mod store;

/// Shared result type.
pub use error::{Result, TallyError};
pub use memory::MemoryCounterStore;
pub use store::{CounterStore, COUNTER_ID};
