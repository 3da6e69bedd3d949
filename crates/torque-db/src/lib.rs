//! # torque-db: Database Layer for Torque POS
//!
//! This crate provides database access for the Torque workshop POS.
//! It uses SQLite with sqlx for async operations, and owns every
//! transactional workflow: intake, status transitions, queue reorder,
//! reconditioning, vehicle sales and installment payments.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Torque POS Data Flow                             │
//! │                                                                         │
//! │  HTTP handler (POST /service-jobs/{id}/status)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     torque-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ServiceJob    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Reconditioning│    │ 001..005.sql │  │   │
//! │  │   │ Clock         │    │ VehicleSale   │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ rules                          │   │
//! │  │                                ▼                                │   │
//! │  │                       torque-core (pure)                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (torque.db)                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per aggregate
//!
//! ## Usage
//!
//! ```rust,ignore
//! use torque_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("torque.db")).await?;
//!
//! let job = db.service_jobs().create(new_job).await?;
//! let queue = db.service_jobs().today_queue(job.outlet_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::cash_flow::CashFlowRepository;
pub use repository::customer::CustomerRepository;
pub use repository::customer_vehicle::CustomerVehicleRepository;
pub use repository::history::{
    HistoryWriter, NewHistoryEntry, ServiceJobHistoryRepository, SqliteHistoryWriter,
};
pub use repository::installment::InstallmentRepository;
pub use repository::outlet::OutletRepository;
pub use repository::product::ProductRepository;
pub use repository::reconditioning::ReconditioningRepository;
pub use repository::sale::VehicleSaleRepository;
pub use repository::serial::SerialNumberRepository;
pub use repository::service_catalog::ServiceCatalogRepository;
pub use repository::service_detail::ServiceDetailRepository;
pub use repository::service_job::ServiceJobRepository;
pub use repository::user::UserRepository;
pub use repository::vehicle::VehicleRepository;
