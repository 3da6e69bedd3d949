//! # Service Job Repository
//!
//! The transactional half of the service-job engine. Legality of every
//! change is decided by `torque_core::service_job`; this module loads the
//! facts those rules need, writes the result and keeps the queue numbering
//! and history log consistent.
//!
//! ## Intake
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. outlet_sequences.service_seq += 1   (takes the write lock first,  │
//! │                                            serialising the outlet)      │
//! │   2. queue_date   = civil date of intake_at at the outlet's offset     │
//! │   3. check customer, vehicle (owned by customer), users are live       │
//! │   4. queue_number = MAX(queue_number) + 1 for (outlet, queue_date)     │
//! │   5. INSERT job (status = queued, code = SJ-<outlet>-<seq>)            │
//! │   6. history: problem description            (must succeed)            │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. load job, check_transition(from, to, ctx)                         │
//! │   2. UPDATE ... WHERE id = ? AND status = <from>                       │
//! │   3. side effect (totals / picked_up_at / complaint_at)                │
//! │   4. SAVEPOINT history append ── fails? ──► warn!, roll back savepoint │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};

use torque_core::clock::civil_date;
use torque_core::service_job::{
    check_transition, compute_totals, ensure_deletable, ensure_editable, history_note,
    plan_reorder, service_code, LineItem, QueueSlot, TransitionContext,
};
use torque_core::validation::{validate_price_cents, validate_required};
use torque_core::{
    Clock, CoreError, CustomerVehicle, NewServiceJob, Page, ServiceDetail, ServiceJob,
    ServiceJobFilter, ServiceJobStatus, StatusChange, UpdateServiceJob, ValidationError,
};

use super::history::{HistoryWriter, NewHistoryEntry, SqliteHistoryWriter};
use super::outlet::utc_offset_in;
use super::{fetch_live, require_live, soft_delete};
use crate::error::DbResult;

const TABLE: &str = "service_jobs";
const ENTITY: &str = "service job";
const MAX_DESCRIPTION_LEN: usize = 2000;

/// Repository for service jobs.
///
/// Generic over the history sink so status transitions never depend on the
/// storage shape of the log.
///
/// ## Usage
/// ```rust,ignore
/// let job = db.service_jobs().create(intake).await?;
/// let job = db
///     .service_jobs()
///     .transition(job.id, StatusChange { status: ServiceJobStatus::Working, user_id, notes: None })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ServiceJobRepository<H = SqliteHistoryWriter> {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    history: H,
}

impl ServiceJobRepository {
    /// Creates a repository writing history to `service_job_histories`.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        ServiceJobRepository {
            pool,
            clock,
            history: SqliteHistoryWriter,
        }
    }
}

impl<H: HistoryWriter> ServiceJobRepository<H> {
    /// Swaps the history sink.
    pub fn with_history_writer<W: HistoryWriter>(self, history: W) -> ServiceJobRepository<W> {
        ServiceJobRepository {
            pool: self.pool,
            clock: self.clock,
            history,
        }
    }

    // =========================================================================
    // Intake & Reads
    // =========================================================================

    /// Intakes a vehicle: assigns a service code and the next queue number of
    /// the outlet's day, and records the problem description as history.
    ///
    /// ## Errors
    /// - `not_found` if the outlet, customer, vehicle or a user is missing
    /// - `invalid_input` if the vehicle does not belong to the customer
    pub async fn create(&self, input: NewServiceJob) -> DbResult<ServiceJob> {
        let problem = validate_required(
            "problem_description",
            &input.problem_description,
            MAX_DESCRIPTION_LEN,
        )?;
        let down_payment = input.down_payment_cents.unwrap_or(0);
        validate_price_cents("down_payment", down_payment)?;

        let now = self.clock.now();
        let intake_at = input.intake_at.unwrap_or(now);

        let mut tx = self.pool.begin().await?;

        let seq = next_service_seq(&mut tx, input.outlet_id).await?;
        let offset = utc_offset_in(&mut tx, input.outlet_id).await?;
        let queue_date = civil_date(intake_at, offset);

        require_live(&mut tx, "customers", "customer", input.customer_id).await?;
        let vehicle: CustomerVehicle =
            fetch_live(&mut tx, "customer_vehicles", "customer vehicle", input.vehicle_id).await?;
        if vehicle.customer_id != input.customer_id {
            return Err(ValidationError::Invalid {
                field: "vehicle_id".to_string(),
                reason: format!(
                    "vehicle {} does not belong to customer {}",
                    input.vehicle_id, input.customer_id
                ),
            }
            .into());
        }
        require_live(&mut tx, "users", "user", input.received_by).await?;
        if let Some(technician_id) = input.technician_id {
            require_live(&mut tx, "users", "user", technician_id).await?;
        }

        let queue_number: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(queue_number), 0) + 1 FROM service_jobs
            WHERE outlet_id = ? AND queue_date = ? AND deleted_at IS NULL
            "#,
        )
        .bind(input.outlet_id)
        .bind(queue_date)
        .fetch_one(&mut *tx)
        .await?;

        let code = service_code(input.outlet_id, seq);
        debug!(service_code = %code, queue_number, %queue_date, "Inserting service job");

        let job = sqlx::query_as::<_, ServiceJob>(
            r#"
            INSERT INTO service_jobs (
                service_code, queue_number, queue_date, outlet_id, customer_id, vehicle_id,
                technician_id, received_by, problem_description, status, intake_at,
                warranty_expires_on, next_service_on, down_payment_cents,
                created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&code)
        .bind(queue_number)
        .bind(queue_date)
        .bind(input.outlet_id)
        .bind(input.customer_id)
        .bind(input.vehicle_id)
        .bind(input.technician_id)
        .bind(input.received_by)
        .bind(&problem)
        .bind(ServiceJobStatus::Queued)
        .bind(intake_at)
        .bind(input.warranty_expires_on)
        .bind(input.next_service_on)
        .bind(down_payment)
        .bind(input.received_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        self.history
            .append(
                &mut tx,
                NewHistoryEntry {
                    service_job_id: job.id,
                    user_id: input.received_by,
                    status: ServiceJobStatus::Queued,
                    notes: Some(problem),
                    changed_at: now,
                },
            )
            .await?;

        tx.commit().await?;

        info!(
            job_id = job.id,
            service_code = %job.service_code,
            queue_number = job.queue_number,
            "Service job intake"
        );
        Ok(job)
    }

    pub async fn get(&self, id: i64) -> DbResult<ServiceJob> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    /// Lists jobs, newest intake first.
    pub async fn list(&self, filter: ServiceJobFilter, page: Page) -> DbResult<Vec<ServiceJob>> {
        let jobs = sqlx::query_as::<_, ServiceJob>(
            r#"
            SELECT * FROM service_jobs
            WHERE deleted_at IS NULL
              AND (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR service_code = ?2)
              AND (?3 IS NULL OR customer_id = ?3)
              AND (?4 IS NULL OR outlet_id = ?4)
            ORDER BY intake_at DESC, id DESC
            LIMIT ?5 OFFSET ?6
            "#,
        )
        .bind(filter.status)
        .bind(filter.service_code.as_deref().map(str::trim))
        .bind(filter.customer_id)
        .bind(filter.outlet_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    pub async fn list_by_customer(&self, customer_id: i64, page: Page) -> DbResult<Vec<ServiceJob>> {
        self.list(
            ServiceJobFilter {
                customer_id: Some(customer_id),
                ..Default::default()
            },
            page,
        )
        .await
    }

    /// Patches header fields of a job that has not left the workshop.
    pub async fn update(&self, id: i64, input: UpdateServiceJob) -> DbResult<ServiceJob> {
        let mut tx = self.pool.begin().await?;
        let current: ServiceJob = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        ensure_editable(current.status)?;

        if let Some(technician_id) = input.technician_id {
            require_live(&mut tx, "users", "user", technician_id).await?;
        }
        let problem = match input.problem_description.as_deref() {
            Some(p) => validate_required("problem_description", p, MAX_DESCRIPTION_LEN)?,
            None => current.problem_description,
        };
        let down_payment = input.down_payment_cents.unwrap_or(current.down_payment_cents);
        validate_price_cents("down_payment", down_payment)?;

        debug!(id, "Updating service job");

        let job = sqlx::query_as::<_, ServiceJob>(
            r#"
            UPDATE service_jobs SET
                technician_id = ?, problem_description = ?, warranty_expires_on = ?,
                next_service_on = ?, down_payment_cents = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(input.technician_id.or(current.technician_id))
        .bind(&problem)
        .bind(input.warranty_expires_on.or(current.warranty_expires_on))
        .bind(input.next_service_on.or(current.next_service_on))
        .bind(down_payment)
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    /// Soft-deletes a queued job and closes the gap it leaves in its day's
    /// queue.
    ///
    /// ## Errors
    /// - `integrity` if the job is past `queued`
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let job: ServiceJob = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        ensure_deletable(job.status)?;

        bump_queue_version(&mut tx, job.outlet_id).await?;

        let now = self.clock.now();
        soft_delete(&mut tx, TABLE, ENTITY, id, now).await?;
        sqlx::query(
            r#"
            UPDATE service_jobs SET queue_number = queue_number - 1, updated_at = ?
            WHERE outlet_id = ? AND queue_date = ? AND queue_number > ? AND deleted_at IS NULL
            "#,
        )
        .bind(now)
        .bind(job.outlet_id)
        .bind(job.queue_date)
        .bind(job.queue_number)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(job_id = id, service_code = %job.service_code, "Service job deleted");
        Ok(())
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// Jobs of the outlet still in the workshop (queued or working), in
    /// queue order.
    pub async fn queue(&self, outlet_id: i64) -> DbResult<Vec<ServiceJob>> {
        let mut conn = self.pool.acquire().await?;
        require_live(&mut conn, "outlets", "outlet", outlet_id).await?;
        queue_in(&mut conn, outlet_id, None).await
    }

    /// Like [`queue`](Self::queue), restricted to today's intakes in the
    /// outlet's local calendar.
    pub async fn today_queue(&self, outlet_id: i64) -> DbResult<Vec<ServiceJob>> {
        let mut conn = self.pool.acquire().await?;
        let offset = utc_offset_in(&mut conn, outlet_id).await?;
        let today = civil_date(self.clock.now(), offset);
        queue_in(&mut conn, outlet_id, Some(today)).await
    }

    /// Reorders one queue day of the outlet.
    ///
    /// The list must name every queued or working job of that day exactly
    /// once; they take the day's waiting numbers (1..n while nothing on that
    /// day has finished) in list order.
    ///
    /// All-or-nothing: an unknown, foreign or finished id, or a list that
    /// leaves part of the day out, rejects the whole request and no queue
    /// number changes.
    pub async fn reorder(&self, outlet_id: i64, ids: &[i64]) -> DbResult<Vec<ServiceJob>> {
        let mut tx = self.pool.begin().await?;
        bump_queue_version(&mut tx, outlet_id).await?;

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let slot: Option<SlotRow> = sqlx::query_as(
                r#"
                SELECT id, outlet_id, status, queue_date, queue_number FROM service_jobs
                WHERE id = ? AND deleted_at IS NULL
                "#,
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(slot) = slot {
                found.push(queue_slot(slot));
            }
        }

        let waiting: Vec<SlotRow> = sqlx::query_as(
            r#"
            SELECT id, outlet_id, status, queue_date, queue_number FROM service_jobs
            WHERE outlet_id = ? AND deleted_at IS NULL AND status IN ('queued', 'working')
            "#,
        )
        .bind(outlet_id)
        .fetch_all(&mut *tx)
        .await?;
        let waiting: Vec<QueueSlot> = waiting.into_iter().map(queue_slot).collect();

        let plan = plan_reorder(outlet_id, ids, &found, &waiting)?;

        debug!(outlet_id, jobs = plan.len(), "Reordering queue");

        let now = self.clock.now();
        for (id, queue_number) in &plan {
            sqlx::query("UPDATE service_jobs SET queue_number = ?, updated_at = ? WHERE id = ?")
                .bind(queue_number)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let queue = queue_in(&mut tx, outlet_id, None).await?;
        tx.commit().await?;

        info!(outlet_id, "Queue reordered");
        Ok(queue)
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Moves a job to `change.status`.
    ///
    /// ## Side Effects
    /// - `working → done` recomputes totals (a failure is logged and the
    ///   totals stay as they were)
    /// - `done → picked_up` sets `picked_up_at`
    /// - `picked_up → complaint` sets `complaint_at`
    /// - a history entry is appended; a failure is logged and discarded
    ///
    /// ## Errors
    /// - `invalid_transition` if the target is not reachable
    /// - `invalid_state` if the precondition fails (technician, warranty)
    pub async fn transition(&self, id: i64, change: StatusChange) -> DbResult<ServiceJob> {
        let mut tx = self.pool.begin().await?;
        let job: ServiceJob = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        require_live(&mut tx, "users", "user", change.user_id).await?;

        let now = self.clock.now();
        let offset = utc_offset_in(&mut tx, job.outlet_id).await?;
        let ctx = TransitionContext {
            technician_id: job.technician_id,
            warranty_expires_on: job.warranty_expires_on,
            local_today: civil_date(now, offset),
        };
        let to = change.status;
        check_transition(job.status, to, &ctx)?;

        let picked_up_at = if to == ServiceJobStatus::PickedUp {
            Some(now)
        } else {
            job.picked_up_at
        };
        let complaint_at = if to == ServiceJobStatus::Complaint {
            Some(now)
        } else {
            job.complaint_at
        };

        debug!(id, from = %job.status, to = %to, "Updating service job status");

        let updated = sqlx::query_as::<_, ServiceJob>(
            r#"
            UPDATE service_jobs SET status = ?, picked_up_at = ?, complaint_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING *
            "#,
        )
        .bind(to)
        .bind(picked_up_at)
        .bind(complaint_at)
        .bind(now)
        .bind(id)
        .bind(job.status)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            CoreError::invalid_state(format!("service job {} changed status concurrently", id))
        })?;

        let updated = if to == ServiceJobStatus::Done {
            recompute_best_effort(&mut tx, id, now).await.unwrap_or(updated)
        } else {
            updated
        };

        self.append_best_effort(
            &mut tx,
            NewHistoryEntry {
                service_job_id: id,
                user_id: change.user_id,
                status: to,
                notes: Some(history_note(change.notes.as_deref(), to)),
                changed_at: now,
            },
        )
        .await;

        tx.commit().await?;

        info!(job_id = id, from = %job.status, to = %to, "Service job status changed");
        Ok(updated)
    }

    /// Recomputes and stores the job's totals from its live details.
    pub async fn recompute_totals(&self, id: i64) -> DbResult<ServiceJob> {
        let mut tx = self.pool.begin().await?;
        let job = recompute_totals_in(&mut tx, id, self.clock.now()).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn append_best_effort(&self, conn: &mut SqliteConnection, entry: NewHistoryEntry) {
        let job_id = entry.service_job_id;
        let mut sp = match conn.begin().await {
            Ok(sp) => sp,
            Err(e) => {
                warn!(job_id, error = %e, "Could not open savepoint for history append");
                return;
            }
        };

        match self.history.append(&mut sp, entry).await {
            Ok(_) => {
                if let Err(e) = sp.commit().await {
                    warn!(job_id, error = %e, "History append failed");
                }
            }
            Err(e) => {
                warn!(job_id, error = %e, "History append failed");
                if let Err(e) = sp.rollback().await {
                    warn!(job_id, error = %e, "Savepoint rollback failed");
                }
            }
        }
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

/// Increments and returns the outlet's service sequence.
///
/// The upsert is the first write of the transaction, so it also takes the
/// database write lock before the queue is read.
async fn next_service_seq(conn: &mut SqliteConnection, outlet_id: i64) -> DbResult<i64> {
    sqlx::query_scalar(
        r#"
        INSERT INTO outlet_sequences (outlet_id, service_seq, queue_version)
        SELECT id, 1, 0 FROM outlets WHERE id = ? AND deleted_at IS NULL
        ON CONFLICT (outlet_id) DO UPDATE SET service_seq = service_seq + 1
        RETURNING service_seq
        "#,
    )
    .bind(outlet_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found("outlet", outlet_id).into())
}

/// Bumps the outlet's queue version, serialising against intake.
async fn bump_queue_version(conn: &mut SqliteConnection, outlet_id: i64) -> DbResult<i64> {
    sqlx::query_scalar(
        r#"
        INSERT INTO outlet_sequences (outlet_id, service_seq, queue_version)
        SELECT id, 0, 1 FROM outlets WHERE id = ? AND deleted_at IS NULL
        ON CONFLICT (outlet_id) DO UPDATE SET queue_version = queue_version + 1
        RETURNING queue_version
        "#,
    )
    .bind(outlet_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found("outlet", outlet_id).into())
}

type SlotRow = (i64, i64, ServiceJobStatus, NaiveDate, i64);

fn queue_slot((id, outlet_id, status, queue_date, queue_number): SlotRow) -> QueueSlot {
    QueueSlot {
        id,
        outlet_id,
        status,
        queue_date,
        queue_number,
    }
}

async fn queue_in(
    conn: &mut SqliteConnection,
    outlet_id: i64,
    queue_date: Option<NaiveDate>,
) -> DbResult<Vec<ServiceJob>> {
    let jobs = sqlx::query_as::<_, ServiceJob>(
        r#"
        SELECT * FROM service_jobs
        WHERE outlet_id = ?1 AND deleted_at IS NULL
          AND status IN ('queued', 'working')
          AND (?2 IS NULL OR queue_date = ?2)
        ORDER BY queue_date, queue_number, id
        "#,
    )
    .bind(outlet_id)
    .bind(queue_date)
    .fetch_all(&mut *conn)
    .await?;

    Ok(jobs)
}

/// Rolls the job's live details up into its stored totals.
pub(crate) async fn recompute_totals_in(
    conn: &mut SqliteConnection,
    job_id: i64,
    now: DateTime<Utc>,
) -> DbResult<ServiceJob> {
    let _: ServiceJob = fetch_live(conn, TABLE, ENTITY, job_id).await?;

    let details = sqlx::query_as::<_, ServiceDetail>(
        "SELECT * FROM service_details WHERE service_job_id = ? AND deleted_at IS NULL",
    )
    .bind(job_id)
    .fetch_all(&mut *conn)
    .await?;

    let totals = compute_totals(details.iter().map(LineItem::from));

    debug!(job_id, grand_total = %totals.grand_total, "Recomputing service job totals");

    let job = sqlx::query_as::<_, ServiceJob>(
        r#"
        UPDATE service_jobs SET
            grand_total_cents = ?, cost_total_cents = ?, technician_commission_cents = ?,
            shop_profit_cents = ?, updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(totals.grand_total.cents())
    .bind(totals.cost_total.cents())
    .bind(totals.technician_commission.cents())
    .bind(totals.shop_profit.cents())
    .bind(now)
    .bind(job_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(job)
}

/// Recomputes totals inside a savepoint; `None` (and a warning) on failure.
async fn recompute_best_effort(
    conn: &mut SqliteConnection,
    job_id: i64,
    now: DateTime<Utc>,
) -> Option<ServiceJob> {
    let mut sp = match conn.begin().await {
        Ok(sp) => sp,
        Err(e) => {
            warn!(job_id, error = %e, "Could not open savepoint for totals");
            return None;
        }
    };

    match recompute_totals_in(&mut sp, job_id, now).await {
        Ok(job) => match sp.commit().await {
            Ok(()) => Some(job),
            Err(e) => {
                warn!(job_id, error = %e, "Totals recompute failed");
                None
            }
        },
        Err(e) => {
            warn!(job_id, error = %e, "Totals recompute failed");
            if let Err(e) = sp.rollback().await {
                warn!(job_id, error = %e, "Savepoint rollback failed");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::test_support::{
        customer, customer_vehicle, fixed_now, outlet, setup, workshop, Workshop,
    };
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};
    use torque_core::{
        ErrorKind, FixedClock, ItemKind, NewOutlet, NewServiceDetail, ServiceJobHistory,
    };

    fn intake(w: &Workshop, problem: &str) -> NewServiceJob {
        NewServiceJob {
            outlet_id: w.outlet.id,
            customer_id: w.customer.id,
            vehicle_id: w.vehicle.id,
            received_by: w.clerk.id,
            problem_description: problem.to_string(),
            ..Default::default()
        }
    }

    fn to(status: ServiceJobStatus, user_id: i64) -> StatusChange {
        StatusChange {
            status,
            user_id,
            notes: None,
        }
    }

    async fn history(db: &Database, job_id: i64) -> Vec<ServiceJobHistory> {
        db.service_job_history().list_by_job(job_id).await.unwrap()
    }

    #[tokio::test]
    async fn test_intake_numbers_queue_per_outlet() {
        let (db, _) = setup().await;
        let w = workshop(&db).await;
        let jobs = db.service_jobs();

        let mut numbers = Vec::new();
        for problem in ["brakes squeal", "oil leak", "no start"] {
            numbers.push(jobs.create(intake(&w, problem)).await.unwrap().queue_number);
        }
        assert_eq!(numbers, vec![1, 2, 3]);

        let other = outlet(&db, "Second Branch").await;
        let elsewhere = jobs
            .create(NewServiceJob {
                outlet_id: other.id,
                ..intake(&w, "flat tyre")
            })
            .await
            .unwrap();
        assert_eq!(elsewhere.queue_number, 1);
        assert_eq!(elsewhere.service_code, format!("SJ-{}-000001", other.id));
    }

    #[tokio::test]
    async fn test_intake_records_history_and_code() {
        let (db, _) = setup().await;
        let w = workshop(&db).await;

        let first = db.service_jobs().create(intake(&w, "  rough idle ")).await.unwrap();
        let second = db.service_jobs().create(intake(&w, "chain noise")).await.unwrap();
        assert_eq!(first.status, ServiceJobStatus::Queued);
        assert_eq!(first.service_code, format!("SJ-{}-000001", w.outlet.id));
        assert_eq!(second.service_code, format!("SJ-{}-000002", w.outlet.id));

        let log = history(&db, first.id).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].notes.as_deref(), Some("rough idle"));
        assert_eq!(log[0].user_id, w.clerk.id);
        assert_eq!(log[0].status, ServiceJobStatus::Queued);
    }

    #[tokio::test]
    async fn test_queue_date_uses_outlet_offset() {
        let (db, clock) = setup().await;
        let w = workshop(&db).await;
        let jakarta = db
            .outlets()
            .create(NewOutlet {
                name: "Jakarta".to_string(),
                utc_offset_minutes: Some(420),
                ..Default::default()
            })
            .await
            .unwrap();

        clock.set(Utc.with_ymd_and_hms(2024, 1, 15, 20, 30, 0).unwrap());
        let job = db
            .service_jobs()
            .create(NewServiceJob {
                outlet_id: jakarta.id,
                ..intake(&w, "headlight out")
            })
            .await
            .unwrap();
        assert_eq!(job.queue_date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());

        let utc = db.service_jobs().create(intake(&w, "horn")).await.unwrap();
        assert_eq!(utc.queue_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[tokio::test]
    async fn test_intake_rejects_foreign_vehicle_and_missing_refs() {
        let (db, _) = setup().await;
        let w = workshop(&db).await;
        let stranger = customer(&db, "Stranger", "089999").await;
        let their_car = customer_vehicle(&db, stranger.id, "B 7 ZZ").await;

        let err = db
            .service_jobs()
            .create(NewServiceJob {
                vehicle_id: their_car.id,
                ..intake(&w, "x")
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = db
            .service_jobs()
            .create(NewServiceJob {
                outlet_id: 9_999,
                ..intake(&w, "x")
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = db
            .service_jobs()
            .create(NewServiceJob {
                technician_id: Some(9_999),
                ..intake(&w, "x")
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Nothing was queued by the failed attempts.
        assert!(db.service_jobs().queue(w.outlet.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_working_requires_technician() {
        let (db, _) = setup().await;
        let w = workshop(&db).await;
        let job = db.service_jobs().create(intake(&w, "misfire")).await.unwrap();

        let err = db
            .service_jobs()
            .transition(job.id, to(ServiceJobStatus::Working, w.clerk.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        db.service_jobs()
            .update(
                job.id,
                UpdateServiceJob {
                    technician_id: Some(w.technician.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let working = db
            .service_jobs()
            .transition(job.id, to(ServiceJobStatus::Working, w.clerk.id))
            .await
            .unwrap();
        assert_eq!(working.status, ServiceJobStatus::Working);
    }

    #[tokio::test]
    async fn test_full_lifecycle_side_effects() {
        let (db, clock) = setup().await;
        let w = workshop(&db).await;
        let job = db
            .service_jobs()
            .create(NewServiceJob {
                technician_id: Some(w.technician.id),
                warranty_expires_on: NaiveDate::from_ymd_opt(2024, 2, 15),
                ..intake(&w, "full service")
            })
            .await
            .unwrap();
        let jobs = db.service_jobs();

        let err = jobs
            .transition(job.id, to(ServiceJobStatus::Done, w.clerk.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        jobs.transition(job.id, to(ServiceJobStatus::Working, w.technician.id))
            .await
            .unwrap();

        // Detail inserted behind the repository's back: only the done
        // transition (or an explicit recompute) picks it up.
        let now = clock.now();
        sqlx::query(
            r#"
            INSERT INTO service_details (
                service_job_id, item_kind, item_id, quantity, unit_price_cents,
                unit_cost_cents, created_at, updated_at
            )
            VALUES (?, 'service', 1, 1, 10000, 0, ?, ?)
            "#,
        )
        .bind(job.id)
        .bind(now)
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();

        let done = jobs
            .transition(job.id, to(ServiceJobStatus::Done, w.technician.id))
            .await
            .unwrap();
        assert_eq!(done.grand_total_cents, 10_000);
        assert_eq!(done.technician_commission_cents, 1_000);

        clock.advance(Duration::hours(2));
        let picked = jobs
            .transition(
                job.id,
                StatusChange {
                    status: ServiceJobStatus::PickedUp,
                    user_id: w.clerk.id,
                    notes: Some("paid cash".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(picked.picked_up_at, Some(clock.now()));

        clock.advance(Duration::days(10));
        let complaint = jobs
            .transition(job.id, to(ServiceJobStatus::Complaint, w.clerk.id))
            .await
            .unwrap();
        assert_eq!(complaint.complaint_at, Some(clock.now()));

        let log = history(&db, job.id).await;
        let notes: Vec<_> = log.iter().map(|h| h.notes.clone().unwrap_or_default()).collect();
        assert_eq!(
            notes,
            vec![
                "full service",
                "status changed to working",
                "status changed to done",
                "paid cash",
                "status changed to complaint",
            ]
        );

        let err = jobs
            .update(
                job.id,
                UpdateServiceJob {
                    problem_description: Some("edited".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_complaint_after_warranty_rejected() {
        let (db, clock) = setup().await;
        let w = workshop(&db).await;
        let job = db
            .service_jobs()
            .create(NewServiceJob {
                technician_id: Some(w.technician.id),
                warranty_expires_on: NaiveDate::from_ymd_opt(2024, 1, 20),
                ..intake(&w, "clutch")
            })
            .await
            .unwrap();
        let jobs = db.service_jobs();
        for status in [
            ServiceJobStatus::Working,
            ServiceJobStatus::Done,
            ServiceJobStatus::PickedUp,
        ] {
            jobs.transition(job.id, to(status, w.clerk.id)).await.unwrap();
        }

        clock.advance(Duration::days(6));
        let err = jobs
            .transition(job.id, to(ServiceJobStatus::Complaint, w.clerk.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(jobs.get(job.id).await.unwrap().status, ServiceJobStatus::PickedUp);
    }

    #[tokio::test]
    async fn test_totals_from_details() {
        let (db, _) = setup().await;
        let w = workshop(&db).await;
        let job = db.service_jobs().create(intake(&w, "tune up")).await.unwrap();
        let labour = crate::test_support::service(&db, "Tune Up", 10_000).await;
        let part = crate::test_support::product(&db, "Spark Plug", 5, 3_000, 5_000).await;

        db.service_details()
            .create(
                job.id,
                NewServiceDetail {
                    item_kind: ItemKind::Service,
                    item_id: labour.id,
                    description: None,
                    serial_number: None,
                    quantity: 2,
                    unit_price_cents: 10_000,
                    unit_cost_cents: 4_000,
                    created_by: None,
                },
            )
            .await
            .unwrap();
        db.service_details()
            .create(
                job.id,
                NewServiceDetail {
                    item_kind: ItemKind::Product,
                    item_id: part.id,
                    description: None,
                    serial_number: None,
                    quantity: 1,
                    unit_price_cents: 5_000,
                    unit_cost_cents: 3_000,
                    created_by: None,
                },
            )
            .await
            .unwrap();

        let first = db.service_jobs().recompute_totals(job.id).await.unwrap();
        let second = db.service_jobs().recompute_totals(job.id).await.unwrap();
        assert_eq!(first.grand_total_cents, 25_000);
        assert_eq!(first.cost_total_cents, 11_000);
        assert_eq!(first.technician_commission_cents, 2_000);
        assert_eq!(first.shop_profit_cents, 12_000);
        assert_eq!(first.totals(), second.totals());
    }

    #[tokio::test]
    async fn test_reorder_is_all_or_nothing() {
        let (db, _) = setup().await;
        let w = workshop(&db).await;
        let jobs = db.service_jobs();
        let a = jobs.create(intake(&w, "a")).await.unwrap();
        let b = jobs.create(intake(&w, "b")).await.unwrap();
        let c = jobs.create(intake(&w, "c")).await.unwrap();

        let other = outlet(&db, "Elsewhere").await;
        let foreign = jobs
            .create(NewServiceJob {
                outlet_id: other.id,
                ..intake(&w, "d")
            })
            .await
            .unwrap();

        let err = jobs
            .reorder(w.outlet.id, &[c.id, foreign.id, a.id])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let queue = jobs.queue(w.outlet.id).await.unwrap();
        let order: Vec<_> = queue.iter().map(|j| (j.id, j.queue_number)).collect();
        assert_eq!(order, vec![(a.id, 1), (b.id, 2), (c.id, 3)]);

        let same = jobs.reorder(w.outlet.id, &[a.id, b.id, c.id]).await.unwrap();
        let order: Vec<_> = same.iter().map(|j| (j.id, j.queue_number)).collect();
        assert_eq!(order, vec![(a.id, 1), (b.id, 2), (c.id, 3)]);

        let moved = jobs.reorder(w.outlet.id, &[c.id, a.id, b.id]).await.unwrap();
        let ids: Vec<_> = moved.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_intake_never_repeats_a_number() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("queue.db")).max_connections(8))
            .await
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(fixed_now())));
        let w = workshop(&db).await;

        let mut tasks = Vec::new();
        for n in 0..16 {
            let jobs = db.service_jobs();
            let input = intake(&w, &format!("walk-in {}", n));
            tasks.push(tokio::spawn(async move { jobs.create(input).await }));
        }

        let mut numbers = Vec::new();
        let mut codes = Vec::new();
        for task in tasks {
            let job = task.await.unwrap().unwrap();
            numbers.push(job.queue_number);
            codes.push(job.service_code);
        }
        numbers.sort_unstable();
        codes.sort_unstable();
        codes.dedup();

        assert_eq!(numbers, (1..=16).collect::<Vec<i64>>());
        assert_eq!(codes.len(), 16);
        db.close().await;
    }

    #[tokio::test]
    async fn test_reorder_must_cover_the_whole_day() {
        let (db, clock) = setup().await;
        let w = workshop(&db).await;
        let jobs = db.service_jobs();
        let left_over = jobs
            .create(NewServiceJob {
                intake_at: Some(clock.now() - Duration::days(1)),
                ..intake(&w, "left over")
            })
            .await
            .unwrap();
        let a = jobs.create(intake(&w, "a")).await.unwrap();
        let b = jobs.create(intake(&w, "b")).await.unwrap();
        let c = jobs.create(intake(&w, "c")).await.unwrap();

        let partial = jobs.reorder(w.outlet.id, &[c.id]).await.unwrap_err();
        assert_eq!(partial.kind(), ErrorKind::InvalidInput);

        let mixed = jobs
            .reorder(w.outlet.id, &[left_over.id, c.id, a.id, b.id])
            .await
            .unwrap_err();
        assert_eq!(mixed.kind(), ErrorKind::InvalidInput);

        let todays: Vec<_> = jobs
            .today_queue(w.outlet.id)
            .await
            .unwrap()
            .iter()
            .map(|j| (j.id, j.queue_number))
            .collect();
        assert_eq!(todays, vec![(a.id, 1), (b.id, 2), (c.id, 3)]);

        let next = jobs.create(intake(&w, "d")).await.unwrap();
        assert_eq!(next.queue_number, 4);

        let lone = jobs.reorder(w.outlet.id, &[left_over.id]).await.unwrap();
        let numbers: Vec<_> = lone
            .iter()
            .filter(|j| j.queue_date == left_over.queue_date)
            .map(|j| j.queue_number)
            .collect();
        assert_eq!(numbers, vec![1]);
    }

    #[tokio::test]
    async fn test_delete_only_queued_and_compacts_queue() {
        let (db, _) = setup().await;
        let w = workshop(&db).await;
        let jobs = db.service_jobs();
        let a = jobs.create(intake(&w, "a")).await.unwrap();
        let b = jobs.create(intake(&w, "b")).await.unwrap();
        let c = jobs
            .create(NewServiceJob {
                technician_id: Some(w.technician.id),
                ..intake(&w, "c")
            })
            .await
            .unwrap();

        jobs.transition(c.id, to(ServiceJobStatus::Working, w.technician.id))
            .await
            .unwrap();
        let err = jobs.delete(c.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);

        jobs.delete(a.id).await.unwrap();
        assert_eq!(jobs.get(a.id).await.unwrap_err().kind(), ErrorKind::NotFound);

        let queue = jobs.queue(w.outlet.id).await.unwrap();
        let order: Vec<_> = queue.iter().map(|j| (j.id, j.queue_number)).collect();
        assert_eq!(order, vec![(b.id, 1), (c.id, 2)]);

        // The next intake continues after the compacted numbers.
        let d = jobs.create(intake(&w, "d")).await.unwrap();
        assert_eq!(d.queue_number, 3);
    }

    #[tokio::test]
    async fn test_today_queue_skips_earlier_days() {
        let (db, clock) = setup().await;
        let w = workshop(&db).await;
        let jobs = db.service_jobs();

        let yesterday = jobs
            .create(NewServiceJob {
                intake_at: Some(clock.now() - Duration::days(1)),
                ..intake(&w, "left over")
            })
            .await
            .unwrap();
        let today = jobs.create(intake(&w, "fresh")).await.unwrap();
        assert_eq!(yesterday.queue_number, 1);
        assert_eq!(today.queue_number, 1);

        let all: Vec<_> = jobs.queue(w.outlet.id).await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(all, vec![yesterday.id, today.id]);

        let todays = jobs.today_queue(w.outlet.id).await.unwrap();
        assert_eq!(todays.len(), 1);
        assert_eq!(todays[0].id, today.id);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (db, _) = setup().await;
        let w = workshop(&db).await;
        let a = db.service_jobs().create(intake(&w, "a")).await.unwrap();
        db.service_jobs().create(intake(&w, "b")).await.unwrap();

        let by_code = db
            .service_jobs()
            .list(
                ServiceJobFilter {
                    service_code: Some(a.service_code.clone()),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].id, a.id);

        let queued = db
            .service_jobs()
            .list(
                ServiceJobFilter {
                    status: Some(ServiceJobStatus::Queued),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(queued.len(), 2);

        let mine = db
            .service_jobs()
            .list_by_customer(w.customer.id, Page::new(Some(1), None))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[derive(Debug, Clone)]
    struct OfflineHistory;

    impl HistoryWriter for OfflineHistory {
        async fn append(
            &self,
            _conn: &mut SqliteConnection,
            _entry: NewHistoryEntry,
        ) -> DbResult<ServiceJobHistory> {
            Err(DbError::Internal("history store offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_transition_survives_history_failure() {
        let (db, _) = setup().await;
        let w = workshop(&db).await;
        let job = db
            .service_jobs()
            .create(NewServiceJob {
                technician_id: Some(w.technician.id),
                ..intake(&w, "wobbly wheel")
            })
            .await
            .unwrap();

        let offline = db.service_jobs().with_history_writer(OfflineHistory);
        let working = offline
            .transition(job.id, to(ServiceJobStatus::Working, w.technician.id))
            .await
            .unwrap();
        assert_eq!(working.status, ServiceJobStatus::Working);
        assert_eq!(
            db.service_jobs().get(job.id).await.unwrap().status,
            ServiceJobStatus::Working
        );
        assert_eq!(history(&db, job.id).await.len(), 1);

        // Intake history is not best effort.
        let err = offline.create(intake(&w, "second")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Downstream);
        assert_eq!(db.service_jobs().queue(w.outlet.id).await.unwrap().len(), 1);
    }
}
