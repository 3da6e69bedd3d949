//! # Installment Repository
//!
//! Installment plans of vehicle sales and their scheduled payments.
//!
//! ## Payment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sell (installment)  → plan + N payments, all pending                  │
//! │                                                                         │
//! │  overdue sweep       pending ──► late     (due date before today)      │
//! │                                                                         │
//! │  pay                 on time:  pending ──────────► paid               │
//! │                      overdue:  pending ──► late ──► paid  + late fee   │
//! │                      remaining balance −= paid amount                  │
//! │                      balance ≤ 0 → plan completed, balance clamped 0   │
//! │                                                                         │
//! │  write off           active ──► defaulted                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payment dates are UTC civil dates.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use torque_core::installment::{settle_payment, InstallmentPlan};
use torque_core::validation::normalize_optional;
use torque_core::{
    Clock, CoreError, InstallmentPayment, InstallmentStatus, Money, PayInstallment,
    PaymentStatus, VehicleInstallment,
};

use super::fetch_live;
use crate::error::{DbError, DbResult};

const TABLE: &str = "vehicle_installments";
const ENTITY: &str = "installment";
const PAYMENT_TABLE: &str = "installment_payments";
const PAYMENT_ENTITY: &str = "installment payment";

/// Repository for installment plans and payments.
#[derive(Debug, Clone)]
pub struct InstallmentRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl InstallmentRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        InstallmentRepository { pool, clock }
    }

    pub async fn get(&self, id: i64) -> DbResult<VehicleInstallment> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    /// The plan attached to a sale. Cash sales have none (`not_found`).
    pub async fn get_by_sale(&self, sale_id: i64) -> DbResult<VehicleInstallment> {
        let installment = sqlx::query_as::<_, VehicleInstallment>(
            "SELECT * FROM vehicle_installments WHERE sale_id = ? AND deleted_at IS NULL",
        )
        .bind(sale_id)
        .fetch_optional(&self.pool)
        .await?;

        installment.ok_or_else(|| DbError::not_found("installment for sale", sale_id.to_string()))
    }

    /// Scheduled payments of a plan by payment number.
    pub async fn payments(&self, installment_id: i64) -> DbResult<Vec<InstallmentPayment>> {
        let mut conn = self.pool.acquire().await?;
        let _: VehicleInstallment = fetch_live(&mut conn, TABLE, ENTITY, installment_id).await?;
        payments_in(&mut conn, installment_id).await
    }

    pub async fn get_payment(&self, id: i64) -> DbResult<InstallmentPayment> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, PAYMENT_TABLE, PAYMENT_ENTITY, id).await
    }

    /// Records a payment against its due amount.
    ///
    /// An overdue payment passes through `late` and carries the late fee of
    /// its started 30-day periods.
    ///
    /// ## Errors
    /// - `invalid_state` if the payment is already paid or skipped, or the
    ///   plan is not active
    /// - `invalid_input` if the paid amount is not positive
    pub async fn pay(&self, payment_id: i64, input: PayInstallment) -> DbResult<InstallmentPayment> {
        let mut tx = self.pool.begin().await?;
        let payment: InstallmentPayment =
            fetch_live(&mut tx, PAYMENT_TABLE, PAYMENT_ENTITY, payment_id).await?;
        let installment: VehicleInstallment =
            fetch_live(&mut tx, TABLE, ENTITY, payment.installment_id).await?;

        let now = self.clock.now();
        let settlement = settle_payment(
            installment.status,
            payment.status,
            payment.due_amount(),
            payment.due_date,
            now.date_naive(),
            Money::from_cents(input.paid_amount_cents),
            installment.remaining_balance(),
        )?;

        if settlement.was_late && payment.status == PaymentStatus::Pending {
            debug!(payment_id, "Marking payment late before settlement");
            mark_late_in(&mut tx, payment_id, now).await?;
        }

        let paid = mark_paid_in(&mut tx, payment_id, &input, settlement.late_fee, now).await?;

        let status = if settlement.installment_completed {
            InstallmentStatus::Completed
        } else {
            InstallmentStatus::Active
        };
        let moved = sqlx::query(
            r#"
            UPDATE vehicle_installments SET remaining_balance_cents = ?, status = ?, updated_at = ?
            WHERE id = ? AND status = 'active' AND remaining_balance_cents = ?
            "#,
        )
        .bind(settlement.remaining_balance.cents())
        .bind(status)
        .bind(now)
        .bind(installment.id)
        .bind(installment.remaining_balance_cents)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if moved == 0 {
            return Err(CoreError::invalid_state(format!(
                "installment {} changed while the payment was recorded",
                installment.id
            ))
            .into());
        }

        tx.commit().await?;
        info!(
            payment_id,
            installment_id = installment.id,
            late_fee = %settlement.late_fee,
            remaining = %settlement.remaining_balance,
            "Installment payment recorded"
        );
        if settlement.installment_completed {
            info!(installment_id = installment.id, "Installment completed");
        }
        Ok(paid)
    }

    /// Outstanding payments whose due date is before `today`, oldest first.
    pub async fn overdue(&self, today: NaiveDate) -> DbResult<Vec<InstallmentPayment>> {
        let payments = sqlx::query_as::<_, InstallmentPayment>(
            r#"
            SELECT * FROM installment_payments
            WHERE deleted_at IS NULL
              AND due_date < ?
              AND status IN ('pending', 'late')
            ORDER BY due_date, installment_id, payment_number
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Flips pending payments of active plans that are past due to `late`.
    /// Returns how many rows changed.
    pub async fn mark_overdue(&self, today: NaiveDate) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE installment_payments SET status = 'late', updated_at = ?1
            WHERE deleted_at IS NULL
              AND status = 'pending'
              AND due_date < ?2
              AND installment_id IN (
                  SELECT id FROM vehicle_installments
                  WHERE status = 'active' AND deleted_at IS NULL
              )
            "#,
        )
        .bind(self.clock.now())
        .bind(today)
        .execute(&self.pool)
        .await?;

        let marked = result.rows_affected();
        if marked > 0 {
            info!(marked, %today, "Overdue installment payments marked late");
        }
        Ok(marked)
    }

    /// Administrative write-off: active → defaulted.
    pub async fn write_off(&self, id: i64) -> DbResult<VehicleInstallment> {
        let mut tx = self.pool.begin().await?;
        let current: VehicleInstallment = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        if current.status != InstallmentStatus::Active {
            return Err(CoreError::InvalidTransition {
                entity: "installment",
                from: current.status.to_string(),
                to: InstallmentStatus::Defaulted.to_string(),
            }
            .into());
        }

        let installment = sqlx::query_as::<_, VehicleInstallment>(
            r#"
            UPDATE vehicle_installments SET status = 'defaulted', updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(installment_id = id, remaining = installment.remaining_balance_cents, "Installment written off");
        Ok(installment)
    }
}

/// `pending → late`; a payment settled in the meantime is `invalid_state`.
async fn mark_late_in(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> DbResult<()> {
    let moved = sqlx::query(
        r#"
        UPDATE installment_payments SET status = 'late', updated_at = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if moved == 0 {
        return Err(already_settled(id));
    }
    Ok(())
}

/// Settles an outstanding (pending or late) payment.
async fn mark_paid_in(
    conn: &mut SqliteConnection,
    id: i64,
    input: &PayInstallment,
    late_fee: Money,
    now: DateTime<Utc>,
) -> DbResult<InstallmentPayment> {
    sqlx::query_as::<_, InstallmentPayment>(
        r#"
        UPDATE installment_payments SET
            status = 'paid', paid_at = ?, paid_amount_cents = ?, late_fee_cents = ?,
            payment_method = ?, reference = ?, notes = ?, updated_at = ?
        WHERE id = ? AND status IN ('pending', 'late') AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(now)
    .bind(input.paid_amount_cents)
    .bind(late_fee.cents())
    .bind(input.payment_method)
    .bind(normalize_optional(input.reference.as_deref()))
    .bind(normalize_optional(input.notes.as_deref()))
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| already_settled(id))
}

fn already_settled(id: i64) -> DbError {
    CoreError::invalid_state(format!("installment payment {} is already settled", id)).into()
}

pub(crate) async fn payments_in(
    conn: &mut SqliteConnection,
    installment_id: i64,
) -> DbResult<Vec<InstallmentPayment>> {
    let payments = sqlx::query_as::<_, InstallmentPayment>(
        r#"
        SELECT * FROM installment_payments
        WHERE installment_id = ? AND deleted_at IS NULL
        ORDER BY payment_number
        "#,
    )
    .bind(installment_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(payments)
}

/// Persists a computed plan and its schedule for `sale_id`.
pub(crate) async fn insert_plan_in(
    conn: &mut SqliteConnection,
    sale_id: i64,
    plan: &InstallmentPlan,
    created_by: Option<i64>,
    now: DateTime<Utc>,
) -> DbResult<(VehicleInstallment, Vec<InstallmentPayment>)> {
    debug!(sale_id, count = plan.count, financed = %plan.financed_amount, "Inserting installment plan");

    let installment = sqlx::query_as::<_, VehicleInstallment>(
        r#"
        INSERT INTO vehicle_installments (
            sale_id, total_amount_cents, down_payment_cents, financed_amount_cents,
            installment_amount_cents, installment_count, interest_rate_bps, start_date, end_date,
            status, remaining_balance_cents, created_by, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(sale_id)
    .bind(plan.total_amount.cents())
    .bind(plan.down_payment.cents())
    .bind(plan.financed_amount.cents())
    .bind(plan.installment_amount.cents())
    .bind(plan.count)
    .bind(plan.interest_rate.map(|r| r.bps() as i64))
    .bind(plan.start_date)
    .bind(plan.end_date)
    .bind(plan.financed_amount.cents())
    .bind(created_by)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    let mut payments = Vec::with_capacity(plan.schedule.len());
    for scheduled in &plan.schedule {
        let payment = sqlx::query_as::<_, InstallmentPayment>(
            r#"
            INSERT INTO installment_payments (
                installment_id, payment_number, due_date, due_amount_cents, status,
                created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(installment.id)
        .bind(scheduled.payment_number)
        .bind(scheduled.due_date)
        .bind(scheduled.amount.cents())
        .bind(created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        payments.push(payment);
    }

    Ok((installment, payments))
}
