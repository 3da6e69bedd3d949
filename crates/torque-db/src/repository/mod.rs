//! # Repository Module
//!
//! Database repository implementations for Torque POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  HTTP handler                                                          │
//! │       │                                                                 │
//! │       │  db.service_jobs().transition(id, change)                       │
//! │       ▼                                                                 │
//! │  ServiceJobRepository                                                  │
//! │  ├── opens one transaction                                             │
//! │  ├── loads rows, asks torque-core whether the change is legal          │
//! │  ├── writes rows                                                       │
//! │  └── commits (or drops the transaction → rollback)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories hold a pool and a clock. Work that must share a transaction
//! with another repository is exposed as a `pub(crate)` function taking
//! `&mut SqliteConnection`; such functions never touch the pool.
//!
//! Every read filters `deleted_at IS NULL` unless it says otherwise.
//!
//! ## Available Repositories
//!
//! - Registry: [`OutletRepository`], [`UserRepository`], [`CustomerRepository`],
//!   [`CustomerVehicleRepository`]
//! - Inventory: [`ProductRepository`], [`SerialNumberRepository`],
//!   [`ServiceCatalogRepository`]
//! - Service jobs: [`ServiceJobRepository`], [`ServiceDetailRepository`],
//!   [`ServiceJobHistoryRepository`]
//! - Showroom: [`VehicleRepository`], [`ReconditioningRepository`]
//! - Sales: [`VehicleSaleRepository`], [`InstallmentRepository`],
//!   [`CashFlowRepository`]
//!
//! [`OutletRepository`]: outlet::OutletRepository
//! [`UserRepository`]: user::UserRepository
//! [`CustomerRepository`]: customer::CustomerRepository
//! [`CustomerVehicleRepository`]: customer_vehicle::CustomerVehicleRepository
//! [`ProductRepository`]: product::ProductRepository
//! [`SerialNumberRepository`]: serial::SerialNumberRepository
//! [`ServiceCatalogRepository`]: service_catalog::ServiceCatalogRepository
//! [`ServiceJobRepository`]: service_job::ServiceJobRepository
//! [`ServiceDetailRepository`]: service_detail::ServiceDetailRepository
//! [`ServiceJobHistoryRepository`]: history::ServiceJobHistoryRepository
//! [`VehicleRepository`]: vehicle::VehicleRepository
//! [`ReconditioningRepository`]: reconditioning::ReconditioningRepository
//! [`VehicleSaleRepository`]: sale::VehicleSaleRepository
//! [`InstallmentRepository`]: installment::InstallmentRepository
//! [`CashFlowRepository`]: cash_flow::CashFlowRepository

pub mod cash_flow;
pub mod customer;
pub mod customer_vehicle;
pub mod history;
pub mod installment;
pub mod outlet;
pub mod product;
pub mod reconditioning;
pub mod sale;
pub mod serial;
pub mod service_catalog;
pub mod service_detail;
pub mod service_job;
pub mod user;
pub mod vehicle;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection};

use torque_core::CoreError;

use crate::error::DbResult;

// =============================================================================
// Shared Helpers
// =============================================================================
// Table and column names are always `&'static str` literals from this crate,
// never user input, so formatting them into SQL is safe.

/// Loads a live row by id, or `not_found`.
pub(crate) async fn fetch_live<T>(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: i64,
) -> DbResult<T>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let sql = format!("SELECT * FROM {} WHERE id = ? AND deleted_at IS NULL", table);

    sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found(entity, id).into())
}

/// Whether a live row with this id exists.
pub(crate) async fn exists_live(
    conn: &mut SqliteConnection,
    table: &'static str,
    id: i64,
) -> DbResult<bool> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE id = ? AND deleted_at IS NULL",
        table
    );
    let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(&mut *conn).await?;
    Ok(count > 0)
}

/// Fails with `not_found` unless a live row with this id exists.
pub(crate) async fn require_live(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: i64,
) -> DbResult<()> {
    if exists_live(conn, table, id).await? {
        Ok(())
    } else {
        Err(CoreError::not_found(entity, id).into())
    }
}

/// Fails with `conflict` if another live row already holds `value` in `column`.
///
/// `exclude_id` is the row being updated, which may keep its own value.
pub(crate) async fn ensure_unique(
    conn: &mut SqliteConnection,
    table: &'static str,
    column: &'static str,
    entity: &'static str,
    value: &str,
    exclude_id: Option<i64>,
) -> DbResult<()> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ? AND deleted_at IS NULL AND id != ?",
        table, column
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(value)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(&mut *conn)
        .await?;

    if count > 0 {
        return Err(CoreError::conflict(entity, column, value).into());
    }
    Ok(())
}

/// Soft-deletes a live row.
pub(crate) async fn soft_delete(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let sql = format!(
        "UPDATE {} SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        table
    );
    let result = sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::not_found(entity, id).into());
    }
    Ok(())
}

/// Loads a soft-deleted row, for administrative restore.
pub(crate) async fn fetch_deleted<T>(
    conn: &mut SqliteConnection,
    table: &'static str,
    entity: &'static str,
    id: i64,
) -> DbResult<T>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let sql = format!(
        "SELECT * FROM {} WHERE id = ? AND deleted_at IS NOT NULL",
        table
    );

    sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found(entity, id).into())
}

/// Clears `deleted_at` on a row previously loaded with [`fetch_deleted`].
pub(crate) async fn undelete(
    conn: &mut SqliteConnection,
    table: &'static str,
    id: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let sql = format!(
        "UPDATE {} SET deleted_at = NULL, updated_at = ? WHERE id = ?",
        table
    );
    sqlx::query(&sql).bind(now).bind(id).execute(&mut *conn).await?;
    Ok(())
}

/// Turns a search term into a `LIKE` pattern matching it anywhere.
///
/// `%`, `_` and `\` in the term match literally; pair with `ESCAPE '\'`.
/// SQLite's `LIKE` is case-insensitive for ASCII.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("honda"), "%honda%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
