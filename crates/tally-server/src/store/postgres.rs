//! Postgres-backed counter.
//!
//! The counter lives in one row (`id = 1`) of `request_counter_state`.
//! Increment is a single `UPDATE ... RETURNING`, so Postgres row locking makes
//! concurrent increments from any number of connections or replicas serialize
//! without lost updates. The service holds no lock of its own.

use async_trait::async_trait;
use tally_core::error::{Result, TallyError};
use tally_core::store::{CounterStore, COUNTER_ID};

use super::pool::{store_error, Lease, StorePool};

// Serializes schema creation across replicas for the rest of the transaction.
const SCHEMA_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock($1)";

/// Advisory lock key for schema creation (ASCII "tallyini").
const SCHEMA_LOCK_KEY: i64 = 0x7461_6c6c_7969_6e69;

const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = 'request_counter_state')";

// A failed CREATE TABLE can leave the row type behind; a later CREATE then
// trips over pg_type's unique index.
const DROP_ORPHAN_TYPE_SQL: &str = "DROP TYPE IF EXISTS request_counter_state";

const CREATE_TABLE_SQL: &str = "CREATE TABLE request_counter_state (\
     id INTEGER PRIMARY KEY, \
     value BIGINT NOT NULL DEFAULT 0)";

const SEED_ROW_SQL: &str =
    "INSERT INTO request_counter_state (id, value) VALUES ($1, 0) ON CONFLICT (id) DO NOTHING";

const READ_SQL: &str = "SELECT value FROM request_counter_state WHERE id = $1";

const INCREMENT_SQL: &str =
    "UPDATE request_counter_state SET value = value + 1 WHERE id = $1 RETURNING value";

/// SQLSTATE codes a racing creator can produce while creating the same table.
const UNIQUE_VIOLATION: &str = "23505";
const DUPLICATE_TABLE: &str = "42P07";
const DUPLICATE_OBJECT: &str = "42710";
// DROP TYPE after another session committed the table that owns the type.
const DEPENDENT_OBJECTS_STILL_EXIST: &str = "2BP01";

#[derive(Clone, Debug)]
pub struct PgCounterStore {
    pool: StorePool,
}

impl PgCounterStore {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &StorePool {
        &self.pool
    }

    /// Existence check, create, and seed in one transaction on `lease`.
    ///
    /// Replicas running this code take the advisory lock first, so only one
    /// of them can see the table missing. The race codes in
    /// [`is_creation_race`] still cover creators that skip the lock.
    async fn create_schema(lease: &mut Lease) -> std::result::Result<(), sqlx::Error> {
        let mut tx = sqlx::Connection::begin(&mut **lease).await?;
        sqlx::query(SCHEMA_LOCK_SQL)
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        let exists: bool = sqlx::query_scalar(TABLE_EXISTS_SQL)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            tracing::info!("creating table request_counter_state");
            sqlx::query(DROP_ORPHAN_TYPE_SQL).execute(&mut *tx).await?;
            sqlx::query(CREATE_TABLE_SQL).execute(&mut *tx).await?;
        }
        sqlx::query(SEED_ROW_SQL)
            .bind(COUNTER_ID)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    async fn seed_row(&self) -> Result<()> {
        let mut lease = self.pool.acquire().await?;
        let res = sqlx::query(SEED_ROW_SQL)
            .bind(COUNTER_ID)
            .execute(&mut *lease)
            .await;
        lease.settle(res).map(|_| ())
    }
}

fn is_creation_race(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some(UNIQUE_VIOLATION)
                | Some(DUPLICATE_TABLE)
                | Some(DUPLICATE_OBJECT)
                | Some(DEPENDENT_OBJECTS_STILL_EXIST)
        ),
        _ => false,
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn initialize(&self) -> Result<()> {
        let mut lease = self
            .pool
            .acquire()
            .await
            .map_err(|e| TallyError::InitializationSkipped(e.to_string()))?;
        let res = Self::create_schema(&mut lease).await;
        if res.is_err() {
            lease.discard();
        }
        drop(lease);

        match res {
            Ok(()) => Ok(()),
            Err(e) if is_creation_race(&e) => {
                // Another replica created the table first; make sure the row is there.
                tracing::info!(error = %e, "schema created concurrently, seeding row only");
                self.seed_row()
                    .await
                    .map_err(|e| TallyError::InitializationSkipped(e.to_string()))
            }
            Err(e) => Err(TallyError::InitializationSkipped(store_error(e).to_string())),
        }
    }

    async fn read(&self) -> Result<i64> {
        let mut lease = self.pool.acquire().await?;
        let res = sqlx::query_scalar::<_, i64>(READ_SQL)
            .bind(COUNTER_ID)
            .fetch_one(&mut *lease)
            .await;
        lease.settle(res)
    }

    async fn increment(&self) -> Result<i64> {
        let mut lease = self.pool.acquire().await?;
        let res = sqlx::query_scalar::<_, i64>(INCREMENT_SQL)
            .bind(COUNTER_ID)
            .fetch_one(&mut *lease)
            .await;
        lease.settle(res)
    }

    async fn ping(&self) -> Result<()> {
        let mut lease = self.pool.acquire().await?;
        let res = sqlx::query("SELECT 1").execute(&mut *lease).await;
        lease.settle(res).map(|_| ())
    }
}
