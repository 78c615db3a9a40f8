//! tally server library entry.
//!
//! This crate wires the Postgres counter store, request instrumentation,
//! optional span export, and the HTTP handlers into one service. It is
//! consumed by the binary (`main.rs`) and by integration tests.

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod obs;
pub mod ops;
pub mod router;
pub mod store;
