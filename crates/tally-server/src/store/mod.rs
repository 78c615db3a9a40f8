//! Counter store backends and instrumentation.

pub mod pool;
pub mod postgres;
pub mod traced;

pub use pool::{Lease, StorePool};
pub use postgres::PgCounterStore;
pub use traced::TracedStore;
