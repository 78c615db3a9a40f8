//! Bounded Postgres connection pool with scoped leases.
//!
//! Sizing mirrors a classic "pool + overflow" model: `pool_size` connections
//! are expected to be busy under normal load and `max_overflow` more may be
//! opened under bursts. Connections are probed before reuse and recycled after
//! `pool_recycle_secs`, since load balancers silently drop long-idle TCP
//! sessions.
//!
//! The pool is created lazily: an unreachable store at boot does not fail
//! startup, it fails the individual operations that need a connection.

use std::ops::{Deref, DerefMut};

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, PgPool, Postgres};
use tally_core::error::{Result, TallyError};

use crate::config::StoreSection;

#[derive(Clone, Debug)]
pub struct StorePool {
    inner: PgPool,
}

impl StorePool {
    /// Build the pool without opening any connection.
    pub fn connect_lazy(cfg: &StoreSection) -> Self {
        // Avoid logging the password.
        let options = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .database(&cfg.database)
            .username(&cfg.user)
            .password(&cfg.password);

        let inner = PgPoolOptions::new()
            .max_connections(cfg.max_connections())
            .min_connections(0)
            .acquire_timeout(cfg.acquire_timeout())
            .test_before_acquire(true)
            .max_lifetime(Some(cfg.recycle_after()))
            .idle_timeout(Some(cfg.recycle_after()))
            .connect_lazy_with(options);

        tracing::info!(
            host = %cfg.host,
            port = cfg.port,
            database = %cfg.database,
            pool_size = cfg.pool_size,
            max_overflow = cfg.max_overflow,
            "store pool configured"
        );

        Self { inner }
    }

    /// Borrow one connection, waiting at most the configured acquire timeout.
    pub async fn acquire(&self) -> Result<Lease> {
        let conn = self.inner.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => TallyError::PoolExhausted(format!(
                "no connection available (max {})",
                self.inner.options().get_max_connections()
            )),
            other => store_error(other),
        })?;
        Ok(Lease { conn })
    }

    /// Connections currently open (idle + leased).
    pub fn size(&self) -> u32 {
        self.inner.size()
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}

/// One borrowed connection. Returned to the pool when dropped.
pub struct Lease {
    conn: PoolConnection<Postgres>,
}

impl Lease {
    /// Close this connection on drop instead of returning it to the pool.
    pub fn discard(&mut self) {
        self.conn.close_on_drop();
    }

    /// Convert the outcome of a query made on this lease.
    ///
    /// Any driver error other than a missing row discards the connection, so a
    /// half-broken session never goes back into the pool.
    pub fn settle<T>(&mut self, res: std::result::Result<T, sqlx::Error>) -> Result<T> {
        res.map_err(|e| {
            if !matches!(e, sqlx::Error::RowNotFound) {
                self.discard();
            }
            store_error(e)
        })
    }
}

impl Deref for Lease {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        &self.conn
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

/// Convert a driver error into the store error class.
pub fn store_error(e: sqlx::Error) -> TallyError {
    match e {
        sqlx::Error::PoolTimedOut => TallyError::PoolExhausted(e.to_string()),
        sqlx::Error::RowNotFound => {
            TallyError::StoreUnavailable("counter row does not exist".into())
        }
        other => TallyError::StoreUnavailable(other.to_string()),
    }
}
