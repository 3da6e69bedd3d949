//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Server Startup                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::from_url(url) ← Configure pool settings                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ Concurrent access from HTTP handlers                           │
//! │       ▼                                                                 │
//! │  Request 1 ──► uses Conn1                                              │
//! │  Request 2 ──► uses Conn2                                              │
//! │  (Writers queue on SQLite's lock, bounded by busy_timeout)             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled for:
//! - Better concurrent read performance
//! - Readers don't block writers
//! - Writers don't block readers

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use torque_core::{Clock, SystemClock};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::cash_flow::CashFlowRepository;
use crate::repository::customer::CustomerRepository;
use crate::repository::customer_vehicle::CustomerVehicleRepository;
use crate::repository::history::ServiceJobHistoryRepository;
use crate::repository::installment::InstallmentRepository;
use crate::repository::outlet::OutletRepository;
use crate::repository::product::ProductRepository;
use crate::repository::reconditioning::ReconditioningRepository;
use crate::repository::sale::VehicleSaleRepository;
use crate::repository::serial::SerialNumberRepository;
use crate::repository::service_catalog::ServiceCatalogRepository;
use crate::repository::service_detail::ServiceDetailRepository;
use crate::repository::service_job::ServiceJobRepository;
use crate::repository::user::UserRepository;
use crate::repository::vehicle::VehicleRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/torque/torque.db")
///     .max_connections(10)
///     .min_connections(2);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// sqlx connection URL, e.g. `sqlite://torque.db?mode=rwc`.
    pub url: String,

    /// Maximum number of connections in the pool.
    /// Default: 10
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 2
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle time before a connection is closed. `None` keeps it forever.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Maximum lifetime of a connection. `None` keeps it forever.
    /// Default: 30 minutes
    pub max_lifetime: Option<Duration>,

    /// How long a writer waits on SQLite's lock before failing.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a configuration for a database file at `path`.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::from_url(format!("sqlite://{}?mode=rwc", path.as_ref().display()))
    }

    /// Creates a configuration from a full sqlx URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        DbConfig {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
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

    /// Sets the connection acquire timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the idle timeout.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// The single connection is never recycled: an in-memory database
    /// lives exactly as long as its connection.
    pub fn in_memory() -> Self {
        DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            max_lifetime: None,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone: the pool and the clock are both reference counted.
///
/// ## Usage in Handlers
/// ```rust,ignore
/// async fn get_queue(
///     State(state): State<AppState>,
///     Path(outlet_id): Path<i64>,
/// ) -> ApiResult<Reply<Vec<ServiceJob>>> {
///     let jobs = state.db.service_jobs().queue(outlet_id).await?;
///     Ok(ok("Queue retrieved", jobs))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Source of "now" handed to every repository.
    clock: Arc<dyn Clock>,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    ///    - Busy timeout so concurrent writers wait instead of failing
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(url = %config.url, "Initializing database connection");

        let connect_options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            clock: Arc::new(SystemClock),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Replaces the clock used by every repository handed out afterwards.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs database migrations.
    ///
    /// ## When To Call
    /// - Automatically called by `new()` if `run_migrations` is true
    /// - Manually call when migrations are disabled in config
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

    /// Returns the clock.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    // ----- Registry -----

    pub fn outlets(&self) -> OutletRepository {
        OutletRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn customer_vehicles(&self) -> CustomerVehicleRepository {
        CustomerVehicleRepository::new(self.pool.clone(), self.clock.clone())
    }

    // ----- Inventory -----

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn serial_numbers(&self) -> SerialNumberRepository {
        SerialNumberRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn services(&self) -> ServiceCatalogRepository {
        ServiceCatalogRepository::new(self.pool.clone(), self.clock.clone())
    }

    // ----- Service jobs -----

    /// Returns the service job repository.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let queue = db.service_jobs().today_queue(outlet_id).await?;
    /// ```
    pub fn service_jobs(&self) -> ServiceJobRepository {
        ServiceJobRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn service_details(&self) -> ServiceDetailRepository {
        ServiceDetailRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn service_job_history(&self) -> ServiceJobHistoryRepository {
        ServiceJobHistoryRepository::new(self.pool.clone())
    }

    // ----- Showroom -----

    pub fn vehicles(&self) -> VehicleRepository {
        VehicleRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn reconditioning(&self) -> ReconditioningRepository {
        ReconditioningRepository::new(self.pool.clone(), self.clock.clone())
    }

    // ----- Sales -----

    pub fn sales(&self) -> VehicleSaleRepository {
        VehicleSaleRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn installments(&self) -> InstallmentRepository {
        InstallmentRepository::new(self.pool.clone(), self.clock.clone())
    }

    pub fn cash_flows(&self) -> CashFlowRepository {
        CashFlowRepository::new(self.pool.clone(), self.clock.clone())
    }

    /// Closes the database connection pool.
    ///
    /// ## Note
    /// After calling close, all repository operations will fail.
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

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let on: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();

        assert_eq!(on, 1);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(20)
            .min_connections(3)
            .idle_timeout(None);

        assert_eq!(config.url, "sqlite:///tmp/test.db?mode=rwc");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 3);
        assert!(config.idle_timeout.is_none());
        assert!(config.run_migrations);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(!db.health_check().await);
    }
}
