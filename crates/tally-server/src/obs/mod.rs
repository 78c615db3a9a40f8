//! Self-instrumentation: request metrics, log output and span export.
//!
//! Metrics are stored as atomics and rendered by the `/metrics` handler.
//! Span export is optional (feature `otlp` plus a configured endpoint).

pub mod http;
pub mod metrics;
#[cfg(feature = "otlp")]
pub mod otlp;
pub mod trace;
