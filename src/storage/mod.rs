//! SQLite storage layer for taxishift.
//!
//! The schema enforces the exclusivity rules itself rather than trusting
//! the application checks that run before each insert:
//!
//! - at most one open shift (`shift_end IS NULL`) per driver
//! - at most one open, non-deleted ride per shift
//! - at most one signal per (shift, sequence number)
//!
//! A losing concurrent insert surfaces as [`StorageError::ConstraintViolation`]
//! and the lifecycles translate it into the matching domain error.
//!
//! Record access lives in the submodules as free functions over a
//! `SqliteConnection`, so the same query runs on a pooled connection or
//! inside a transaction.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

pub mod pauses;
pub mod rides;
pub mod shifts;
pub mod signals;

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A stored value could not be decoded into a domain type.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StorageError::ConstraintViolation(db.message().to_string());
            }
        }
        StorageError::Database(err)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS shifts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        driver_id TEXT NOT NULL,
        shift_start INTEGER NOT NULL,
        shift_end INTEGER,
        planned_duration_ms INTEGER,
        total_duration_ms INTEGER,
        work_time_ms INTEGER,
        break_time_ms INTEGER,
        num_breaks INTEGER,
        average_break_ms INTEGER,
        total_earnings_cents INTEGER
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_shifts_one_open_per_driver
    ON shifts(driver_id) WHERE shift_end IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS shift_signals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        shift_id INTEGER NOT NULL REFERENCES shifts(id) ON DELETE CASCADE,
        driver_id TEXT NOT NULL,
        signal TEXT NOT NULL CHECK (signal IN ('start', 'pause', 'continue', 'stop')),
        seq INTEGER NOT NULL,
        ts INTEGER NOT NULL,
        planned_duration_ms INTEGER,
        UNIQUE (shift_id, seq)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS shift_pauses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        shift_id INTEGER NOT NULL REFERENCES shifts(id) ON DELETE CASCADE,
        pause_start INTEGER NOT NULL,
        pause_end INTEGER NOT NULL,
        duration_ms INTEGER NOT NULL CHECK (duration_ms >= 0)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_shift_pauses_shift
    ON shift_pauses(shift_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rides (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        shift_id INTEGER NOT NULL REFERENCES shifts(id) ON DELETE RESTRICT,
        driver_id TEXT NOT NULL,
        start_lat REAL NOT NULL,
        start_lng REAL NOT NULL,
        dest_lat REAL NOT NULL,
        dest_lng REAL NOT NULL,
        address TEXT,
        predicted_score INTEGER CHECK (predicted_score BETWEEN 1 AND 5),
        start_time INTEGER NOT NULL,
        end_time INTEGER,
        distance_km REAL,
        earnings_cents INTEGER,
        deleted_at INTEGER
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_rides_one_open_per_shift
    ON rides(shift_id) WHERE end_time IS NULL AND deleted_at IS NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_rides_driver_open
    ON rides(driver_id, end_time)
    "#,
];

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:taxishift.db?mode=rwc" or "sqlite::memory:")
    ///
    /// In-memory databases get exactly one pooled connection that is never
    /// recycled; every SQLite connection to `:memory:` would otherwise open
    /// its own empty database.
    pub async fn new(database_url: &str) -> StorageResult<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options = options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// A fresh private in-memory database.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Check out a pooled connection for single-statement work.
    pub async fn acquire(&self) -> StorageResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Open a write transaction.
    ///
    /// The write lock is taken up front with `BEGIN IMMEDIATE`. A deferred
    /// transaction that reads first and writes later cannot wait for a
    /// concurrent writer; SQLite fails its lock upgrade with `SQLITE_BUSY`
    /// straight away. Taking the lock at `BEGIN` lets the busy timeout queue
    /// writers, so the loser of a race re-reads committed state and is
    /// rejected by the domain checks or the unique indexes.
    pub async fn begin(&self) -> StorageResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

/// Timestamps are stored as Unix milliseconds.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::CorruptRow(format!("timestamp out of range: {ms}")))
}

pub(crate) fn from_millis_opt(ms: Option<i64>) -> StorageResult<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DriverId;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let storage = Storage::in_memory().await.unwrap();
        storage.initialize_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_one_open_shift_per_driver() {
        let storage = Storage::in_memory().await.unwrap();
        let mut conn = storage.acquire().await.unwrap();
        let driver = DriverId::new("driver-1");
        let now = Utc::now();

        shifts::insert(&mut conn, &driver, now, None).await.unwrap();
        let second = shifts::insert(&mut conn, &driver, now, None).await;

        assert!(matches!(second, Err(StorageError::ConstraintViolation(_))));

        // Another driver is unaffected.
        shifts::insert(&mut conn, &DriverId::new("driver-2"), now, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_shift_frees_the_slot() {
        let storage = Storage::in_memory().await.unwrap();
        let mut conn = storage.acquire().await.unwrap();
        let driver = DriverId::new("driver-1");
        let now = Utc::now();

        let shift = shifts::insert(&mut conn, &driver, now, None).await.unwrap();
        let closed = shifts::finalize(
            &mut conn,
            shift.id,
            now + ChronoDuration::hours(1),
            &Default::default(),
        )
        .await
        .unwrap();
        assert!(closed);

        shifts::insert(&mut conn, &driver, now + ChronoDuration::hours(2), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_signal_sequence_rejected() {
        let storage = Storage::in_memory().await.unwrap();
        let mut conn = storage.acquire().await.unwrap();
        let driver = DriverId::new("driver-1");
        let now = Utc::now();
        let shift = shifts::insert(&mut conn, &driver, now, None).await.unwrap();

        signals::insert(&mut conn, shift.id, &driver, crate::model::SignalKind::Start, 1, now, None)
            .await
            .unwrap();
        let dup = signals::insert(
            &mut conn,
            shift.id,
            &driver,
            crate::model::SignalKind::Pause,
            1,
            now,
            None,
        )
        .await;

        assert!(matches!(dup, Err(StorageError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_shift_with_rides_cannot_be_deleted() {
        let storage = Storage::in_memory().await.unwrap();
        let mut conn = storage.acquire().await.unwrap();
        let driver = DriverId::new("driver-1");
        let now = Utc::now();
        let shift = shifts::insert(&mut conn, &driver, now, None).await.unwrap();
        let ride = crate::model::NewRide {
            start_lat: 53.35,
            start_lng: -6.26,
            dest_lat: 53.34,
            dest_lng: -6.25,
            address: None,
            predicted_score: None,
        };
        rides::insert(&mut conn, shift.id, &driver, &ride, now).await.unwrap();

        assert!(shifts::delete(&mut conn, shift.id).await.is_err());
        assert_eq!(rides::count_for_shift(&mut conn, shift.id, true).await.unwrap(), 1);
    }

    #[test]
    fn test_millis_round_trip() {
        let ts = DateTime::from_timestamp_millis(1_709_280_000_123).unwrap();
        assert_eq!(from_millis(to_millis(ts)).unwrap(), ts);
        assert!(from_millis(i64::MAX).is_err());
    }
}
