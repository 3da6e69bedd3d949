//! # Reconditioning Repository
//!
//! Workshop jobs on showroom vehicles and their part / labour lines.
//!
//! ## Vehicle Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create    vehicle showroom → workshop          job pending            │
//! │  add part  stock −q if stock ≥ q, else stock_shortfall + warn         │
//! │            (first detail on a pending job starts it)                   │
//! │  complete  vehicle workshop → showroom, for_sale   actual cost stored  │
//! │  cancel    vehicle workshop → showroom             sale status kept    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};

use torque_core::reconditioning::{
    actual_cost, check_transition, ensure_accepts_details, line_total, referenced_item,
    stock_delta_for_quantity_change,
};
use torque_core::validation::{normalize_optional, validate_price_cents, validate_required};
use torque_core::{
    Clock, CompleteReconditioning, CoreError, DetailKind, Money, NewReconditioningDetail,
    NewReconditioningJob, Page, Product, ReconditioningDetail, ReconditioningStatus, Service,
    UpdateReconditioningDetail, UpdateReconditioningJob, Vehicle, VehicleOwnership,
    VehicleReconditioningJob, VehicleSaleStatus,
};

use super::product::{adjust_stock_in, try_deduct_in};
use super::vehicle::{move_vehicle_in, VehicleMove};
use super::{fetch_live, require_live, soft_delete};
use crate::error::DbResult;

const TABLE: &str = "vehicle_reconditioning_jobs";
const ENTITY: &str = "reconditioning job";
const DETAIL_TABLE: &str = "reconditioning_details";
const DETAIL_ENTITY: &str = "reconditioning detail";

/// Max length of a job title.
const MAX_TITLE_LEN: usize = 200;

/// Repository for reconditioning jobs and details.
#[derive(Debug, Clone)]
pub struct ReconditioningRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl ReconditioningRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        ReconditioningRepository { pool, clock }
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Opens a job and moves the vehicle into the workshop.
    ///
    /// ## Errors
    /// - `invalid_state` unless the vehicle is currently showroom-owned
    /// - `not_found` for a missing vehicle or technician
    pub async fn create(&self, input: NewReconditioningJob) -> DbResult<VehicleReconditioningJob> {
        let title = validate_required("title", &input.title, MAX_TITLE_LEN)?;
        validate_price_cents("estimated_cost", input.estimated_cost_cents)?;

        let mut tx = self.pool.begin().await?;
        let vehicle: Vehicle = fetch_live(&mut tx, "vehicles", "vehicle", input.vehicle_id).await?;
        if vehicle.ownership != VehicleOwnership::Showroom {
            return Err(CoreError::invalid_state(format!(
                "vehicle {} is {}-owned; only showroom vehicles can be reconditioned",
                vehicle.id, vehicle.ownership
            ))
            .into());
        }
        if let Some(technician_id) = input.technician_id {
            require_live(&mut tx, "users", "user", technician_id).await?;
        }

        let now = self.clock.now();
        move_vehicle_in(
            &mut tx,
            vehicle.id,
            VehicleMove {
                ownership: Some(VehicleOwnership::Workshop),
                ..Default::default()
            },
            now,
        )
        .await?;

        debug!(vehicle_id = vehicle.id, title = %title, "Inserting reconditioning job");

        let job = sqlx::query_as::<_, VehicleReconditioningJob>(
            r#"
            INSERT INTO vehicle_reconditioning_jobs (
                vehicle_id, title, description, estimated_cost_cents, status,
                technician_id, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(vehicle.id)
        .bind(&title)
        .bind(normalize_optional(input.description.as_deref()))
        .bind(input.estimated_cost_cents)
        .bind(input.technician_id)
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(job_id = job.id, vehicle_id = job.vehicle_id, "Reconditioning job opened");
        Ok(job)
    }

    pub async fn get(&self, id: i64) -> DbResult<VehicleReconditioningJob> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    /// Lists jobs, optionally narrowed to one vehicle and/or status, newest first.
    pub async fn list(
        &self,
        vehicle_id: Option<i64>,
        status: Option<ReconditioningStatus>,
        page: Page,
    ) -> DbResult<Vec<VehicleReconditioningJob>> {
        let jobs = sqlx::query_as::<_, VehicleReconditioningJob>(
            r#"
            SELECT * FROM vehicle_reconditioning_jobs
            WHERE deleted_at IS NULL
              AND (?1 IS NULL OR vehicle_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(vehicle_id)
        .bind(status)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    pub async fn list_by_vehicle(&self, vehicle_id: i64) -> DbResult<Vec<VehicleReconditioningJob>> {
        let jobs = sqlx::query_as::<_, VehicleReconditioningJob>(
            r#"
            SELECT * FROM vehicle_reconditioning_jobs
            WHERE vehicle_id = ? AND deleted_at IS NULL
            ORDER BY created_at, id
            "#,
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    pub async fn list_by_status(
        &self,
        status: ReconditioningStatus,
        page: Page,
    ) -> DbResult<Vec<VehicleReconditioningJob>> {
        self.list(None, Some(status), page).await
    }

    /// Patches an open job.
    pub async fn update(
        &self,
        id: i64,
        input: UpdateReconditioningJob,
    ) -> DbResult<VehicleReconditioningJob> {
        let mut tx = self.pool.begin().await?;
        let current: VehicleReconditioningJob = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        ensure_accepts_details(current.status)?;

        let title = match input.title.as_deref() {
            Some(t) => validate_required("title", t, MAX_TITLE_LEN)?,
            None => current.title,
        };
        let estimated = input.estimated_cost_cents.unwrap_or(current.estimated_cost_cents);
        validate_price_cents("estimated_cost", estimated)?;
        if let Some(technician_id) = input.technician_id {
            require_live(&mut tx, "users", "user", technician_id).await?;
        }

        debug!(id, "Updating reconditioning job");

        let job = sqlx::query_as::<_, VehicleReconditioningJob>(
            r#"
            UPDATE vehicle_reconditioning_jobs SET
                title = ?, description = ?, estimated_cost_cents = ?, technician_id = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&title)
        .bind(normalize_optional(input.description.as_deref()).or(current.description))
        .bind(estimated)
        .bind(input.technician_id.or(current.technician_id))
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    /// pending → in_progress.
    pub async fn start(&self, id: i64) -> DbResult<VehicleReconditioningJob> {
        let mut tx = self.pool.begin().await?;
        let job: VehicleReconditioningJob = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        let job = start_in(&mut tx, job, self.clock.now()).await?;
        tx.commit().await?;
        Ok(job)
    }

    /// in_progress → completed. The vehicle goes back to the showroom, for sale.
    ///
    /// The actual cost is the explicit figure when given, else the sum of
    /// the live detail totals.
    pub async fn complete(
        &self,
        id: i64,
        input: CompleteReconditioning,
    ) -> DbResult<VehicleReconditioningJob> {
        let mut tx = self.pool.begin().await?;
        let job: VehicleReconditioningJob = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        check_transition(job.status, ReconditioningStatus::Completed)?;

        let details = details_in(&mut tx, id).await?;
        let cost = actual_cost(input.actual_cost_cents.map(Money::from_cents), &details)?;

        let now = self.clock.now();
        let job = sqlx::query_as::<_, VehicleReconditioningJob>(
            r#"
            UPDATE vehicle_reconditioning_jobs SET
                status = 'completed', actual_cost_cents = ?, completion_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(cost.cents())
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        move_vehicle_in(
            &mut tx,
            job.vehicle_id,
            VehicleMove {
                ownership: Some(VehicleOwnership::Showroom),
                sale_status: Some(VehicleSaleStatus::ForSale),
                ..Default::default()
            },
            now,
        )
        .await?;

        tx.commit().await?;
        info!(job_id = id, actual_cost = %cost, "Reconditioning completed");
        Ok(job)
    }

    /// pending → cancelled. The vehicle goes back to the showroom.
    pub async fn cancel(&self, id: i64) -> DbResult<VehicleReconditioningJob> {
        let mut tx = self.pool.begin().await?;
        let job: VehicleReconditioningJob = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        check_transition(job.status, ReconditioningStatus::Cancelled)?;

        let now = self.clock.now();
        let job = set_status_in(&mut tx, id, ReconditioningStatus::Cancelled, now).await?;
        move_vehicle_in(
            &mut tx,
            job.vehicle_id,
            VehicleMove {
                ownership: Some(VehicleOwnership::Showroom),
                ..Default::default()
            },
            now,
        )
        .await?;

        tx.commit().await?;
        info!(job_id = id, "Reconditioning cancelled");
        Ok(job)
    }

    // =========================================================================
    // Details
    // =========================================================================

    /// Adds a part or labour line.
    ///
    /// Parts take stock with a single conditional update. When stock is short
    /// the line is still recorded, flagged with `stock_shortfall`, and stock
    /// is left alone.
    ///
    /// ## Errors
    /// - `invalid_state` if the job is completed or cancelled, or the
    ///   product is tracked by serial number
    /// - `invalid_input` if the ids do not match `kind`
    pub async fn add_detail(
        &self,
        job_id: i64,
        input: NewReconditioningDetail,
    ) -> DbResult<ReconditioningDetail> {
        let item_id = referenced_item(input.kind, input.product_id, input.service_id)?;

        let mut tx = self.pool.begin().await?;
        let job: VehicleReconditioningJob = fetch_live(&mut tx, TABLE, ENTITY, job_id).await?;
        ensure_accepts_details(job.status)?;

        let now = self.clock.now();
        let (default_price, item_name) = match input.kind {
            DetailKind::Part => {
                let product: Product = fetch_live(&mut tx, "products", "product", item_id).await?;
                if product.has_serial {
                    return Err(CoreError::invalid_state(format!(
                        "product {} is tracked by serial number",
                        product.id
                    ))
                    .into());
                }
                (product.cost_price_cents, product.name)
            }
            DetailKind::Service => {
                let service: Service = fetch_live(&mut tx, "services", "service", item_id).await?;
                (service.price_cents, service.name)
            }
        };
        let unit_price = Money::from_cents(input.unit_price_cents.unwrap_or(default_price));
        let total = line_total(unit_price, input.quantity)?;

        let mut stock_shortfall = false;
        if input.kind == DetailKind::Part
            && !try_deduct_in(&mut tx, item_id, input.quantity, now).await?
        {
            warn!(
                job_id,
                product_id = item_id,
                quantity = input.quantity,
                "Stock short for reconditioning part; recording without deduction"
            );
            stock_shortfall = true;
        }

        debug!(job_id, kind = ?input.kind, item_id, "Inserting reconditioning detail");

        let detail = sqlx::query_as::<_, ReconditioningDetail>(
            r#"
            INSERT INTO reconditioning_details (
                reconditioning_job_id, kind, product_id, service_id, description, quantity,
                unit_price_cents, total_price_cents, stock_shortfall, usage_at,
                created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(input.kind)
        .bind(input.product_id)
        .bind(input.service_id)
        .bind(normalize_optional(input.description.as_deref()).or(Some(item_name)))
        .bind(input.quantity)
        .bind(unit_price.cents())
        .bind(total.cents())
        .bind(stock_shortfall)
        .bind(input.usage_at.unwrap_or(now))
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if job.status == ReconditioningStatus::Pending {
            start_in(&mut tx, job, now).await?;
        }

        tx.commit().await?;
        Ok(detail)
    }

    pub async fn get_detail(&self, id: i64) -> DbResult<ReconditioningDetail> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, DETAIL_TABLE, DETAIL_ENTITY, id).await
    }

    /// Live details of a job in entry order.
    pub async fn list_details(&self, job_id: i64) -> DbResult<Vec<ReconditioningDetail>> {
        let mut conn = self.pool.acquire().await?;
        require_live(&mut conn, TABLE, ENTITY, job_id).await?;
        details_in(&mut conn, job_id).await
    }

    /// Edits a line of an open job.
    ///
    /// A larger quantity on a deducted part takes the extra units strictly
    /// (`insufficient_stock` when short); a smaller one returns them.
    pub async fn update_detail(
        &self,
        id: i64,
        input: UpdateReconditioningDetail,
    ) -> DbResult<ReconditioningDetail> {
        let mut tx = self.pool.begin().await?;
        let current: ReconditioningDetail =
            fetch_live(&mut tx, DETAIL_TABLE, DETAIL_ENTITY, id).await?;
        let job: VehicleReconditioningJob =
            fetch_live(&mut tx, TABLE, ENTITY, current.reconditioning_job_id).await?;
        ensure_accepts_details(job.status)?;

        let quantity = input.quantity.unwrap_or(current.quantity);
        let unit_price = Money::from_cents(input.unit_price_cents.unwrap_or(current.unit_price_cents));
        let total = line_total(unit_price, quantity)?;

        let now = self.clock.now();
        let delta = stock_delta_for_quantity_change(&current, quantity);
        if let Some(product_id) = current.product_id.filter(|_| delta != 0) {
            adjust_stock_in(&mut tx, product_id, -delta, now).await?;
        }

        debug!(id, quantity, "Updating reconditioning detail");

        let detail = sqlx::query_as::<_, ReconditioningDetail>(
            r#"
            UPDATE reconditioning_details SET
                description = ?, quantity = ?, unit_price_cents = ?, total_price_cents = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(normalize_optional(input.description.as_deref()).or(current.description))
        .bind(quantity)
        .bind(unit_price.cents())
        .bind(total.cents())
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(detail)
    }

    /// Removes a line from an open job, returning any stock it took.
    pub async fn delete_detail(&self, id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let detail: ReconditioningDetail =
            fetch_live(&mut tx, DETAIL_TABLE, DETAIL_ENTITY, id).await?;
        let job: VehicleReconditioningJob =
            fetch_live(&mut tx, TABLE, ENTITY, detail.reconditioning_job_id).await?;
        ensure_accepts_details(job.status)?;

        let now = self.clock.now();
        let returned = detail.deducted_quantity();
        if let Some(product_id) = detail.product_id.filter(|_| returned > 0) {
            adjust_stock_in(&mut tx, product_id, returned, now).await?;
        }

        debug!(id, returned, "Soft-deleting reconditioning detail");
        soft_delete(&mut tx, DETAIL_TABLE, DETAIL_ENTITY, id, now).await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn start_in(
    conn: &mut SqliteConnection,
    job: VehicleReconditioningJob,
    now: DateTime<Utc>,
) -> DbResult<VehicleReconditioningJob> {
    check_transition(job.status, ReconditioningStatus::InProgress)?;

    let job = sqlx::query_as::<_, VehicleReconditioningJob>(
        r#"
        UPDATE vehicle_reconditioning_jobs SET status = 'in_progress', start_at = ?, updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(job.id)
    .fetch_one(&mut *conn)
    .await?;

    info!(job_id = job.id, "Reconditioning started");
    Ok(job)
}

async fn set_status_in(
    conn: &mut SqliteConnection,
    id: i64,
    status: ReconditioningStatus,
    now: DateTime<Utc>,
) -> DbResult<VehicleReconditioningJob> {
    let job = sqlx::query_as::<_, VehicleReconditioningJob>(
        "UPDATE vehicle_reconditioning_jobs SET status = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(status)
    .bind(now)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(job)
}

async fn details_in(conn: &mut SqliteConnection, job_id: i64) -> DbResult<Vec<ReconditioningDetail>> {
    let details = sqlx::query_as::<_, ReconditioningDetail>(
        r#"
        SELECT * FROM reconditioning_details
        WHERE reconditioning_job_id = ? AND deleted_at IS NULL
        ORDER BY usage_at, id
        "#,
    )
    .bind(job_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(details)
}

/// Sum of the actual costs of a vehicle's completed reconditioning jobs.
pub(crate) async fn completed_cost_in(conn: &mut SqliteConnection, vehicle_id: i64) -> DbResult<Money> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(actual_cost_cents), 0) FROM vehicle_reconditioning_jobs
        WHERE vehicle_id = ? AND status = 'completed' AND deleted_at IS NULL
        "#,
    )
    .bind(vehicle_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Money::from_cents(total))
}
