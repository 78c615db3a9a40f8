//! Shared application state for the counter service.
//!
//! One `AppState` is built at startup and cloned into every handler and the
//! request middleware. It owns the counter store (always wrapped in the span
//! decorator) and the metrics registry.

use std::sync::Arc;
use std::time::Duration;

use tally_core::store::CounterStore;

use crate::config::ServiceConfig;
use crate::obs::metrics::{ExtraGauge, ServiceMetrics, POOL_CONNECTIONS};
use crate::store::{PgCounterStore, StorePool, TracedStore};

/// Delay between background attempts to create the counter after a degraded start.
const INIT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ServiceConfig,
    store: Arc<dyn CounterStore>,
    metrics: ServiceMetrics,
    pool: Option<StorePool>,
}

impl AppState {
    /// Assemble state around an arbitrary store.
    ///
    /// `system` names the backend in store spans (`db.system`).
    pub fn new(cfg: ServiceConfig, store: Arc<dyn CounterStore>, system: &'static str) -> Self {
        Self::assemble(cfg, store, system, None)
    }

    fn assemble(
        cfg: ServiceConfig,
        store: Arc<dyn CounterStore>,
        system: &'static str,
        pool: Option<StorePool>,
    ) -> Self {
        let store: Arc<dyn CounterStore> = Arc::new(TracedStore::new(store, system));
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                store,
                metrics: ServiceMetrics::new(),
                pool,
            }),
        }
    }

    /// Production wiring: lazy Postgres pool and best-effort counter
    /// initialization.
    ///
    /// Never fails on an unreachable store. Initialization is then retried in
    /// the background until it succeeds, while requests get store errors.
    pub async fn bootstrap(cfg: ServiceConfig) -> Self {
        let pool = StorePool::connect_lazy(&cfg.store);
        let store = Arc::new(PgCounterStore::new(pool.clone()));
        let state = Self::assemble(cfg, store, "postgresql", Some(pool));

        if let Err(e) = state.store().initialize().await {
            tracing::warn!(error = %e, "counter initialization skipped; serving degraded until the store recovers");
            spawn_init_retry(state.store());
        } else {
            tracing::info!("counter store initialized");
        }
        state
    }

    pub fn cfg(&self) -> &ServiceConfig {
        &self.inner.cfg
    }

    pub fn store(&self) -> Arc<dyn CounterStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.inner.metrics
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    pub fn set_draining(&self) {
        self.inner.metrics.set_draining();
    }

    /// Extra gauges appended to the `/metrics` body.
    pub fn metrics_extra(&self) -> Vec<ExtraGauge> {
        self.inner
            .pool
            .iter()
            .map(|pool| ExtraGauge {
                name: POOL_CONNECTIONS,
                help: "Open store connections (idle and leased)",
                value: u64::from(pool.size()),
            })
            .collect()
    }

    /// Close store connections.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.inner.pool {
            pool.close().await;
        }
    }
}

fn spawn_init_retry(store: Arc<dyn CounterStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(INIT_RETRY_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.initialize().await {
                Ok(()) => {
                    tracing::info!("counter store initialized after degraded start");
                    return;
                }
                Err(e) => tracing::debug!(error = %e, "counter initialization retry failed"),
            }
        }
    });
}
