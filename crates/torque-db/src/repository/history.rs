//! # Service Job History
//!
//! Append-only log of user-visible service job changes.
//!
//! ## Writer Seam
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ServiceJobRepository<H: HistoryWriter>                                │
//! │       │                                                                 │
//! │       │  intake      → H::append inside the transaction (must succeed) │
//! │       │  transition  → H::append inside a savepoint (best effort)      │
//! │       ▼                                                                 │
//! │  SqliteHistoryWriter  → INSERT INTO service_job_histories              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transition code only knows it can append an entry; the storage shape
//! of the log stays behind the trait.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::future::Future;

use torque_core::{ServiceJobHistory, ServiceJobStatus};

use crate::error::DbResult;

/// One entry to append.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub service_job_id: i64,
    pub user_id: i64,
    /// Job status after the change.
    pub status: ServiceJobStatus,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Capability to append to the service job history.
///
/// Implementations write through the connection they are handed so the
/// entry lands in the caller's transaction.
pub trait HistoryWriter: Send + Sync {
    fn append(
        &self,
        conn: &mut SqliteConnection,
        entry: NewHistoryEntry,
    ) -> impl Future<Output = DbResult<ServiceJobHistory>> + Send;
}

/// Writes history rows into `service_job_histories`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteHistoryWriter;

impl HistoryWriter for SqliteHistoryWriter {
    async fn append(
        &self,
        conn: &mut SqliteConnection,
        entry: NewHistoryEntry,
    ) -> DbResult<ServiceJobHistory> {
        let row = sqlx::query_as::<_, ServiceJobHistory>(
            r#"
            INSERT INTO service_job_histories (
                service_job_id, user_id, status, notes, changed_at,
                created_by, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?2, ?5, ?5)
            RETURNING id, service_job_id, user_id, status, notes, changed_at
            "#,
        )
        .bind(entry.service_job_id)
        .bind(entry.user_id)
        .bind(entry.status)
        .bind(&entry.notes)
        .bind(entry.changed_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }
}

/// Read side of the history log. There is no update or delete.
#[derive(Debug, Clone)]
pub struct ServiceJobHistoryRepository {
    pool: SqlitePool,
}

impl ServiceJobHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ServiceJobHistoryRepository { pool }
    }

    /// Entries of one job, oldest first.
    pub async fn list_by_job(&self, service_job_id: i64) -> DbResult<Vec<ServiceJobHistory>> {
        let rows = sqlx::query_as::<_, ServiceJobHistory>(
            r#"
            SELECT id, service_job_id, user_id, status, notes, changed_at
            FROM service_job_histories
            WHERE service_job_id = ? AND deleted_at IS NULL
            ORDER BY changed_at, id
            "#,
        )
        .bind(service_job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
