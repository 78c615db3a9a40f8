//! Span-emitting decorator around any counter store.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tally_core::error::Result;
use tally_core::store::CounterStore;
use tracing::{field, Instrument};

use crate::obs::trace::{KIND_CLIENT, STATUS_ERROR, STATUS_OK};

pub struct TracedStore {
    inner: Arc<dyn CounterStore>,
    system: &'static str,
}

impl TracedStore {
    /// `system` is reported as the `db.system` span attribute.
    pub fn new(inner: Arc<dyn CounterStore>, system: &'static str) -> Self {
        Self { inner, system }
    }

    async fn observe<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let span = tracing::info_span!(
            "counter_store",
            otel.name = %format!("counter_store.{op}"),
            otel.kind = KIND_CLIENT,
            db.system = self.system,
            db.operation = op,
            otel.status_code = field::Empty,
            otel.status_message = field::Empty,
        );

        let res = fut.instrument(span.clone()).await;
        match &res {
            Ok(_) => {
                span.record("otel.status_code", STATUS_OK);
            }
            Err(e) => {
                span.record("otel.status_code", STATUS_ERROR);
                span.record("otel.status_message", field::display(e));
            }
        }
        res
    }
}

#[async_trait]
impl CounterStore for TracedStore {
    async fn initialize(&self) -> Result<()> {
        self.observe("initialize", self.inner.initialize()).await
    }

    async fn read(&self) -> Result<i64> {
        self.observe("read", self.inner.read()).await
    }

    async fn increment(&self) -> Result<i64> {
        self.observe("increment", self.inner.increment()).await
    }

    async fn ping(&self) -> Result<()> {
        self.observe("ping", self.inner.ping()).await
    }
}
