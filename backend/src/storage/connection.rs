use anyhow::Result;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

// The database URL for the production database
pub const DEFAULT_DATABASE_URL: &str = "sqlite:care_scheduler.db";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS templates (
        id TEXT PRIMARY KEY,
        patient_id TEXT NOT NULL,
        office_id TEXT,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        anchor_date TEXT NOT NULL,
        generated_through TEXT,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_templates_active_patient
        ON templates (patient_id) WHERE status = 'ACTIVE'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS template_weeks (
        template_id TEXT NOT NULL REFERENCES templates (id) ON DELETE CASCADE,
        week_index INTEGER NOT NULL,
        PRIMARY KEY (template_id, week_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS template_events (
        id TEXT PRIMARY KEY,
        template_id TEXT NOT NULL,
        week_index INTEGER NOT NULL,
        day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        authorization_id TEXT,
        staff_id TEXT,
        event_code TEXT,
        planned_units INTEGER NOT NULL,
        comment TEXT,
        FOREIGN KEY (template_id, week_index)
            REFERENCES template_weeks (template_id, week_index) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schedule_events (
        id TEXT PRIMARY KEY,
        patient_id TEXT NOT NULL,
        template_id TEXT,
        event_date TEXT NOT NULL,
        start_at TEXT NOT NULL,
        end_at TEXT NOT NULL,
        status TEXT NOT NULL,
        staff_id TEXT,
        authorization_id TEXT,
        event_code TEXT,
        planned_units INTEGER NOT NULL,
        actual_units INTEGER,
        comment TEXT,
        check_in_at TEXT,
        check_out_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_schedule_events_patient_date
        ON schedule_events (patient_id, event_date)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_schedule_events_staff_date
        ON schedule_events (staff_id, event_date)
    "#,
];

/// DbConnection manages the SQLite pool and serializes writers.
///
/// SQLite allows a single writer at a time, so every write transaction is
/// taken through [`DbConnection::begin_write`], which holds the write gate
/// until the transaction is committed or dropped.
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
    write_gate: Arc<Mutex<()>>,
}

impl DbConnection {
    /// Create a new database connection
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::setup_schema(&pool).await?;

        info!("Connected to database at {}", url);
        Ok(Self::from_pool(pool))
    }

    /// Initialize a test database with a unique name.
    ///
    /// The pool keeps exactly one connection open for its whole lifetime, so
    /// the shared in-memory database lives as long as the pool does. Code
    /// holding a [`WriteTx`] must run all of its queries through it.
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().simple().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        let options = SqliteConnectOptions::from_str(&db_url)?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::setup_schema(&pool).await?;

        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Borrow a pooled connection for reads
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, sqlx::Error> {
        self.pool.acquire().await
    }

    /// Start a write transaction. Dropping the returned value without calling
    /// [`WriteTx::commit`] rolls everything back.
    pub async fn begin_write(&self) -> Result<WriteTx, sqlx::Error> {
        let guard = self.write_gate.clone().lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(WriteTx { tx, _guard: guard })
    }
}

/// An open write transaction holding the connection's write gate.
pub struct WriteTx {
    // Declared first so the transaction is rolled back before the gate opens
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl WriteTx {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}
