//! # Database Pool Management
//!
//! Connection pool creation, configuration, and the `Database` handle that
//! hands out repositories, engines and units of work.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Handle                                    │
//! │                                                                         │
//! │  DbConfig::new(path) ← pool sizes, timeouts, checkout policy           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← create pool + run migrations            │
//! │       │                                                                 │
//! │       ├── db.begin()       → UnitOfWork (explicit atomic unit)         │
//! │       ├── db.recorder()    → StockMutationRecorder                     │
//! │       ├── db.transfers()   → TransferEngine                            │
//! │       ├── db.checkout()    → CheckoutEngine                            │
//! │       ├── db.reports()     → ReportAggregator                          │
//! │       └── db.products() / locations() / stock() / ledger() / ...       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL mode is enabled so report reads never block stock writers.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::checkout::CheckoutEngine;
use crate::engine::recorder::StockMutationRecorder;
use crate::engine::report::ReportAggregator;
use crate::engine::transfer::TransferEngine;
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::catalog::{LocationRepository, ProductRepository};
use crate::repository::ledger::StockLedger;
use crate::repository::stock::LocationStockStore;
use crate::repository::transaction::TransactionRepository;
use crate::unit_of_work::UnitOfWork;

// =============================================================================
// Configuration
// =============================================================================

/// Business policy knobs for the checkout engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPolicy {
    /// Whether PENDING → FAILED credits the sold stock back.
    /// Default: false (only cancellation restocks)
    pub restock_on_failure: bool,

    /// Prefix of generated invoice codes.
    /// Default: "INV"
    pub invoice_prefix: String,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        CheckoutPolicy {
            restock_on_failure: false,
            invoice_prefix: "INV".to_string(),
        }
    }
}

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/stockline.db")
///     .max_connections(8)
///     .unit_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Time budget of one self-committing unit of work.
    /// Default: 10 seconds
    pub unit_timeout: Duration,

    /// How long a unit waits for the writer lock before `ConcurrencyConflict`.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Checkout engine policy.
    pub checkout: CheckoutPolicy,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            unit_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            checkout: CheckoutPolicy::default(),
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the time budget of self-committing units of work.
    pub fn unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Sets how long a unit waits for the writer lock.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Sets the checkout policy.
    pub fn checkout_policy(mut self, policy: CheckoutPolicy) -> Self {
        self.checkout = policy;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// A single connection serializes every unit of work, and the in-memory
    /// database lives exactly as long as that connection.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            unit_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            checkout: CheckoutPolicy::default(),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository, engine and unit-of-work access.
///
/// Cheap to clone: clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    unit_timeout: Duration,

    checkout: CheckoutPolicy,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL, NORMAL synchronous, foreign keys on, busy timeout
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout));

        if config.is_in_memory() {
            // closing the last connection would drop the whole database
            pool_options = pool_options
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            unit_timeout_ms = config.unit_timeout.as_millis() as u64,
            restock_on_failure = config.checkout.restock_on_failure,
            "Database pool created"
        );

        let db = Database {
            pool,
            unit_timeout: config.unit_timeout,
            checkout: config.checkout,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The checkout policy this handle was configured with.
    pub fn checkout_policy(&self) -> &CheckoutPolicy {
        &self.checkout
    }

    /// Starts a new unit of work.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mut uow = db.begin().await?;
    /// db.transfers().assign_to_merchant_within(&mut uow, &w, &m, &req).await?;
    /// db.recorder().record_within(&mut uow, &adjustment).await?;
    /// uow.commit().await?;
    /// ```
    pub async fn begin(&self) -> DbResult<UnitOfWork> {
        UnitOfWork::begin(&self.pool).await
    }

    /// Runs `work` under the unit-of-work time budget.
    ///
    /// `work` should own its `UnitOfWork`; on expiry the future is dropped,
    /// which rolls the unit back, and `DbError::Timeout` is returned.
    pub async fn bounded<T, F>(&self, work: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        match tokio::time::timeout(self.unit_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                let after_ms = self.unit_timeout.as_millis() as u64;
                warn!(after_ms, "Unit of work timed out, rolled back");
                Err(DbError::Timeout { after_ms })
            }
        }
    }

    /// Returns the product registry.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Returns the warehouse/merchant registry.
    pub fn locations(&self) -> LocationRepository {
        LocationRepository::new(self.pool.clone())
    }

    /// Returns the stock snapshot store.
    pub fn stock(&self) -> LocationStockStore {
        LocationStockStore::new(self.pool.clone())
    }

    /// Returns the append-only ledger.
    pub fn ledger(&self) -> StockLedger {
        StockLedger::new(self.pool.clone())
    }

    /// Returns the sale transaction repository.
    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository::new(self.pool.clone())
    }

    /// Returns the mutation recorder.
    pub fn recorder(&self) -> StockMutationRecorder {
        StockMutationRecorder::new(self.clone())
    }

    /// Returns the transfer engine.
    pub fn transfers(&self) -> TransferEngine {
        TransferEngine::new(self.clone())
    }

    /// Returns the checkout engine.
    pub fn checkout(&self) -> CheckoutEngine {
        CheckoutEngine::new(self.clone())
    }

    /// Returns the report aggregator.
    pub fn reports(&self) -> ReportAggregator {
        ReportAggregator::new(self.clone())
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .unit_timeout(Duration::from_millis(250))
            .checkout_policy(CheckoutPolicy {
                restock_on_failure: true,
                invoice_prefix: "SO".to_string(),
            });

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.unit_timeout, Duration::from_millis(250));
        assert!(config.checkout.restock_on_failure);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let db = Database::new(DbConfig::in_memory().unit_timeout(Duration::from_millis(20)))
            .await
            .unwrap();

        let result: DbResult<()> = db
            .bounded(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(DbError::Timeout { after_ms: 20 })));
    }
}
