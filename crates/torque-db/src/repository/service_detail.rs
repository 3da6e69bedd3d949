//! # Service Detail Repository
//!
//! Line items of a service job. Every write recomputes the job's totals in
//! the same transaction, so stored totals never lag behind the lines.
//!
//! ```text
//!   create / update / delete / clear
//!        │
//!        ├── job not terminal (clear: job still queued or working)
//!        ├── item resolves within its kind
//!        ├── serial line: serial consumed (stock −1) / released on delete
//!        └── recompute_totals_in(job)
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use torque_core::service_job::{ensure_details_clearable, ensure_editable};
use torque_core::validation::{normalize_optional, validate_price_cents, validate_quantity};
use torque_core::{
    Clock, ItemKind, NewServiceDetail, Product, ServiceDetail, ServiceJob, UpdateServiceDetail,
    ValidationError,
};

use super::serial::{consume_in, release_in};
use super::service_job::recompute_totals_in;
use super::{fetch_live, require_live, soft_delete};
use crate::error::{DbError, DbResult};

const TABLE: &str = "service_details";
const ENTITY: &str = "service detail";

/// Repository for service job line items.
#[derive(Debug, Clone)]
pub struct ServiceDetailRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl ServiceDetailRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        ServiceDetailRepository { pool, clock }
    }

    /// Adds a line to a job.
    ///
    /// ## Errors
    /// - `invalid_state` if the job has left the workshop, or the serial is
    ///   not available
    /// - `not_found` if the job, item or serial does not exist
    /// - `invalid_input` for a serial on a service line, a serial of another
    ///   product, or a serial line with quantity other than 1
    pub async fn create(&self, job_id: i64, input: NewServiceDetail) -> DbResult<ServiceDetail> {
        validate_quantity(input.quantity)?;
        validate_price_cents("unit_price", input.unit_price_cents)?;
        validate_price_cents("unit_cost", input.unit_cost_cents)?;
        let serial = normalize_optional(input.serial_number.as_deref());

        let mut tx = self.pool.begin().await?;
        let job: ServiceJob = fetch_live(&mut tx, "service_jobs", "service job", job_id).await?;
        ensure_editable(job.status)?;

        let now = self.clock.now();
        match input.item_kind {
            ItemKind::Service => {
                if serial.is_some() {
                    return Err(invalid("serial_number", "service lines carry no serial number"));
                }
                require_live(&mut tx, "services", "service", input.item_id).await?;
            }
            ItemKind::Product => {
                let _: Product = fetch_live(&mut tx, "products", "product", input.item_id).await?;
                if let Some(serial) = &serial {
                    if input.quantity != 1 {
                        return Err(invalid("quantity", "a serial number line has quantity 1"));
                    }
                    consume_in(&mut tx, input.item_id, serial, now).await?;
                }
            }
        }

        debug!(job_id, item_id = input.item_id, quantity = input.quantity, "Inserting service detail");

        let detail = sqlx::query_as::<_, ServiceDetail>(
            r#"
            INSERT INTO service_details (
                service_job_id, item_kind, item_id, description, serial_number, quantity,
                unit_price_cents, unit_cost_cents, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(input.item_kind)
        .bind(input.item_id)
        .bind(normalize_optional(input.description.as_deref()))
        .bind(&serial)
        .bind(input.quantity)
        .bind(input.unit_price_cents)
        .bind(input.unit_cost_cents)
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        recompute_totals_in(&mut tx, job_id, now).await?;
        tx.commit().await?;
        Ok(detail)
    }

    pub async fn get(&self, id: i64) -> DbResult<ServiceDetail> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    /// Live lines of a job in insertion order.
    pub async fn list_by_job(&self, job_id: i64) -> DbResult<Vec<ServiceDetail>> {
        let mut conn = self.pool.acquire().await?;
        require_live(&mut conn, "service_jobs", "service job", job_id).await?;
        live_details(&mut conn, job_id).await
    }

    pub async fn update(&self, id: i64, input: UpdateServiceDetail) -> DbResult<ServiceDetail> {
        let mut tx = self.pool.begin().await?;
        let current: ServiceDetail = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        let job: ServiceJob =
            fetch_live(&mut tx, "service_jobs", "service job", current.service_job_id).await?;
        ensure_editable(job.status)?;

        let quantity = input.quantity.unwrap_or(current.quantity);
        validate_quantity(quantity)?;
        if current.serial_number.is_some() && quantity != 1 {
            return Err(invalid("quantity", "a serial number line has quantity 1"));
        }
        let price = input.unit_price_cents.unwrap_or(current.unit_price_cents);
        let cost = input.unit_cost_cents.unwrap_or(current.unit_cost_cents);
        validate_price_cents("unit_price", price)?;
        validate_price_cents("unit_cost", cost)?;

        debug!(id, "Updating service detail");

        let now = self.clock.now();
        let detail = sqlx::query_as::<_, ServiceDetail>(
            r#"
            UPDATE service_details SET
                description = ?, quantity = ?, unit_price_cents = ?, unit_cost_cents = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(normalize_optional(input.description.as_deref()).or(current.description))
        .bind(quantity)
        .bind(price)
        .bind(cost)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        recompute_totals_in(&mut tx, current.service_job_id, now).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Removes a line; a serial it consumed goes back into stock.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let current: ServiceDetail = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        let job: ServiceJob =
            fetch_live(&mut tx, "service_jobs", "service job", current.service_job_id).await?;
        ensure_editable(job.status)?;

        let now = self.clock.now();
        remove_in(&mut tx, &current, now).await?;
        recompute_totals_in(&mut tx, job.id, now).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Removes every line of a job still in the queue. Returns how many went.
    pub async fn clear(&self, job_id: i64) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let job: ServiceJob = fetch_live(&mut tx, "service_jobs", "service job", job_id).await?;
        ensure_details_clearable(job.status)?;

        let now = self.clock.now();
        let details = live_details(&mut tx, job_id).await?;
        for detail in &details {
            remove_in(&mut tx, detail, now).await?;
        }
        recompute_totals_in(&mut tx, job_id, now).await?;

        tx.commit().await?;
        info!(job_id, removed = details.len(), "Service details cleared");
        Ok(details.len())
    }
}

async fn live_details(conn: &mut SqliteConnection, job_id: i64) -> DbResult<Vec<ServiceDetail>> {
    let details = sqlx::query_as::<_, ServiceDetail>(
        "SELECT * FROM service_details WHERE service_job_id = ? AND deleted_at IS NULL ORDER BY id",
    )
    .bind(job_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(details)
}

async fn remove_in(
    conn: &mut SqliteConnection,
    detail: &ServiceDetail,
    now: DateTime<Utc>,
) -> DbResult<()> {
    soft_delete(conn, TABLE, ENTITY, detail.id, now).await?;
    if let Some(serial) = &detail.serial_number {
        release_in(conn, serial, now).await?;
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> DbError {
    ValidationError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
