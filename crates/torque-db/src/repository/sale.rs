//! # Vehicle Sale Repository
//!
//! Database operations for showroom vehicle sales.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale (one transaction)                            │
//! │                                                                         │
//! │  1. CHECK                                                              │
//! │     └── terms valid, vehicle showroom + for_sale, buyer live           │
//! │                                                                         │
//! │  2. RECORD                                                             │
//! │     └── profit = price − purchase − Σ completed reconditioning costs   │
//! │     └── INSERT sale { status: successful }                             │
//! │                                                                         │
//! │  3. HAND OVER                                                          │
//! │     └── vehicle → customer-owned, sold, selling price = sale price     │
//! │                                                                         │
//! │  4. FINANCE (installment only)                                         │
//! │     └── plan + N pending payments                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure rolls back all four steps.

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

use torque_core::installment::{plan_installments, realised_profit, validate_sale_terms};
use torque_core::validation::normalize_optional;
use torque_core::{
    Clock, CoreError, Money, NewVehicleSale, Page, SaleKind, SaleReceipt, UpdateVehicleSale,
    Vehicle, VehicleOwnership, VehicleSale, VehicleSaleStatus,
};

use super::installment::insert_plan_in;
use super::reconditioning::completed_cost_in;
use super::vehicle::{move_vehicle_in, VehicleMove};
use super::{fetch_live, require_live};
use crate::error::DbResult;

const TABLE: &str = "vehicle_sales_transactions";
const ENTITY: &str = "sale";

/// Repository for vehicle sales.
#[derive(Debug, Clone)]
pub struct VehicleSaleRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl VehicleSaleRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        VehicleSaleRepository { pool, clock }
    }

    /// Sells a showroom vehicle.
    ///
    /// ## Errors
    /// - `invalid_input` for bad price, down payment or installment terms
    /// - `invalid_state` unless the vehicle is showroom-owned and for sale
    /// - `not_found` for a missing vehicle, buyer or sales person
    pub async fn sell(&self, input: NewVehicleSale) -> DbResult<SaleReceipt> {
        let sale_price = Money::from_cents(input.sale_price_cents);
        let down_payment = input.down_payment_cents.map(Money::from_cents);
        validate_sale_terms(input.kind, sale_price, down_payment, input.installment.as_ref())?;

        let mut tx = self.pool.begin().await?;
        let vehicle: Vehicle = fetch_live(&mut tx, "vehicles", "vehicle", input.vehicle_id).await?;
        if vehicle.ownership != VehicleOwnership::Showroom
            || vehicle.sale_status != VehicleSaleStatus::ForSale
        {
            return Err(CoreError::invalid_state(format!(
                "vehicle {} is not for sale ({}, {})",
                vehicle.id, vehicle.ownership, vehicle.sale_status
            ))
            .into());
        }
        require_live(&mut tx, "customers", "customer", input.customer_id).await?;
        if let Some(sales_person_id) = input.sales_person_id {
            require_live(&mut tx, "users", "user", sales_person_id).await?;
        }

        let reconditioning = completed_cost_in(&mut tx, vehicle.id).await?;
        let profit = realised_profit(sale_price, vehicle.purchase_price(), [reconditioning]);

        debug!(vehicle_id = vehicle.id, kind = ?input.kind, price = %sale_price, "Inserting sale");

        let now = self.clock.now();
        let sale = sqlx::query_as::<_, VehicleSale>(
            r#"
            INSERT INTO vehicle_sales_transactions (
                vehicle_id, customer_id, sale_price_cents, down_payment_cents, sale_at, kind,
                payment_method, status, sales_person_id, profit_cents, notes,
                created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 'successful', ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(vehicle.id)
        .bind(input.customer_id)
        .bind(sale_price.cents())
        .bind(input.down_payment_cents)
        .bind(now)
        .bind(input.kind)
        .bind(input.payment_method)
        .bind(input.sales_person_id)
        .bind(profit.cents())
        .bind(normalize_optional(input.notes.as_deref()))
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        move_vehicle_in(
            &mut tx,
            vehicle.id,
            VehicleMove {
                ownership: Some(VehicleOwnership::Customer),
                sale_status: Some(VehicleSaleStatus::Sold),
                customer_id: Some(input.customer_id),
                selling_price_cents: Some(sale_price.cents()),
            },
            now,
        )
        .await?;

        let (installment, payments) = match (input.kind, input.installment.as_ref(), down_payment) {
            (SaleKind::Installment, Some(terms), Some(dp)) => {
                let plan = plan_installments(sale_price, dp, terms)?;
                let (installment, payments) =
                    insert_plan_in(&mut tx, sale.id, &plan, input.created_by, now).await?;
                (Some(installment), payments)
            }
            _ => (None, Vec::new()),
        };

        tx.commit().await?;
        info!(
            sale_id = sale.id,
            vehicle_id = vehicle.id,
            customer_id = input.customer_id,
            profit = %profit,
            payments = payments.len(),
            "Vehicle sold"
        );

        Ok(SaleReceipt {
            sale,
            installment,
            payments,
        })
    }

    pub async fn get(&self, id: i64) -> DbResult<VehicleSale> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    /// All sales, newest first.
    pub async fn list(&self, page: Page) -> DbResult<Vec<VehicleSale>> {
        let sales = sqlx::query_as::<_, VehicleSale>(
            r#"
            SELECT * FROM vehicle_sales_transactions
            WHERE deleted_at IS NULL
            ORDER BY sale_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    pub async fn list_by_customer(&self, customer_id: i64) -> DbResult<Vec<VehicleSale>> {
        let sales = sqlx::query_as::<_, VehicleSale>(
            r#"
            SELECT * FROM vehicle_sales_transactions
            WHERE customer_id = ? AND deleted_at IS NULL
            ORDER BY sale_at DESC, id DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    pub async fn list_by_vehicle(&self, vehicle_id: i64) -> DbResult<Vec<VehicleSale>> {
        let sales = sqlx::query_as::<_, VehicleSale>(
            r#"
            SELECT * FROM vehicle_sales_transactions
            WHERE vehicle_id = ? AND deleted_at IS NULL
            ORDER BY sale_at DESC, id DESC
            "#,
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Corrects the payment method, sales person or notes of a sale.
    pub async fn update(&self, id: i64, input: UpdateVehicleSale) -> DbResult<VehicleSale> {
        let mut tx = self.pool.begin().await?;
        let current: VehicleSale = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        if let Some(sales_person_id) = input.sales_person_id {
            require_live(&mut tx, "users", "user", sales_person_id).await?;
        }

        debug!(id, "Updating sale");

        let sale = sqlx::query_as::<_, VehicleSale>(
            r#"
            UPDATE vehicle_sales_transactions SET
                payment_method = ?, sales_person_id = ?, notes = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(input.payment_method.unwrap_or(current.payment_method))
        .bind(input.sales_person_id.or(current.sales_person_id))
        .bind(normalize_optional(input.notes.as_deref()).or(current.notes))
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(sale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer, setup, showroom_vehicle};
    use crate::Database;
    use chrono::NaiveDate;
    use torque_core::{
        CompleteReconditioning, ErrorKind, InstallmentTerms, NewReconditioningJob, PaymentMethod,
        PaymentStatus, SaleTransactionStatus, UpdateVehicle,
    };

    async fn list_for_sale(db: &Database, vehicle_id: i64) {
        db.vehicles()
            .update(
                vehicle_id,
                UpdateVehicle {
                    sale_status: Some(VehicleSaleStatus::ForSale),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    fn cash_sale(vehicle_id: i64, customer_id: i64, price: i64) -> NewVehicleSale {
        NewVehicleSale {
            vehicle_id,
            customer_id,
            sale_price_cents: price,
            kind: SaleKind::Cash,
            payment_method: PaymentMethod::Cash,
            down_payment_cents: None,
            sales_person_id: None,
            installment: None,
            notes: None,
            created_by: None,
        }
    }

    async fn recondition(db: &Database, vehicle_id: i64, cost: i64) {
        let job = db
            .reconditioning()
            .create(NewReconditioningJob {
                vehicle_id,
                title: "Refurbish".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        db.reconditioning().start(job.id).await.unwrap();
        db.reconditioning()
            .complete(
                job.id,
                CompleteReconditioning {
                    actual_cost_cents: Some(cost),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_profit_subtracts_reconditioning() {
        let (db, _) = setup().await;
        let v = showroom_vehicle(&db, "P 1", 50_000_00).await;
        recondition(&db, v.id, 3_000_00).await;
        recondition(&db, v.id, 1_500_00).await;
        let buyer = customer(&db, "Buyer", "0812").await;

        let receipt = db.sales().sell(cash_sale(v.id, buyer.id, 60_000_00)).await.unwrap();
        assert_eq!(receipt.sale.profit_cents, 5_500_00);
        assert_eq!(receipt.sale.status, SaleTransactionStatus::Successful);
        assert!(receipt.installment.is_none());
        assert!(receipt.payments.is_empty());

        let v = db.vehicles().get(v.id).await.unwrap();
        assert_eq!(v.ownership, VehicleOwnership::Customer);
        assert_eq!(v.sale_status, VehicleSaleStatus::Sold);
        assert_eq!(v.customer_id, Some(buyer.id));
        assert_eq!(v.selling_price_cents, 60_000_00);

        // Sold vehicles cannot be sold again.
        let err = db.sales().sell(cash_sale(v.id, buyer.id, 60_000_00)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_installment_schedule() {
        let (db, _) = setup().await;
        let v = showroom_vehicle(&db, "P 2", 9_000_00).await;
        list_for_sale(&db, v.id).await;
        let buyer = customer(&db, "Buyer", "0813").await;

        let receipt = db
            .sales()
            .sell(NewVehicleSale {
                kind: SaleKind::Installment,
                down_payment_cents: Some(2_000_00),
                installment: Some(InstallmentTerms {
                    count: 4,
                    interest_rate_bps: None,
                    start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                }),
                ..cash_sale(v.id, buyer.id, 12_000_00)
            })
            .await
            .unwrap();

        let plan = receipt.installment.unwrap();
        assert_eq!(plan.remaining_balance_cents, 10_000_00);
        assert_eq!(plan.installment_amount_cents, 2_500_00);
        assert_eq!(plan.end_date, NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());

        let due: Vec<_> = receipt.payments.iter().map(|p| p.due_date.to_string()).collect();
        assert_eq!(due, ["2024-02-15", "2024-03-15", "2024-04-15", "2024-05-15"]);
        assert!(receipt
            .payments
            .iter()
            .all(|p| p.due_amount_cents == 2_500_00 && p.status == PaymentStatus::Pending));
        assert_eq!(
            receipt.payments.iter().map(|p| p.payment_number).collect::<Vec<_>>(),
            [1, 2, 3, 4]
        );

        assert_eq!(db.installments().get_by_sale(receipt.sale.id).await.unwrap().id, plan.id);
    }

    #[tokio::test]
    async fn test_rejected_sale_changes_nothing() {
        let (db, _) = setup().await;
        let v = showroom_vehicle(&db, "P 3", 9_000_00).await;
        let buyer = customer(&db, "Buyer", "0814").await;

        // Not listed for sale yet.
        let err = db.sales().sell(cash_sale(v.id, buyer.id, 10_000_00)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        list_for_sale(&db, v.id).await;

        // Down payment must be below the price.
        let err = db
            .sales()
            .sell(NewVehicleSale {
                kind: SaleKind::Installment,
                down_payment_cents: Some(10_000_00),
                installment: Some(InstallmentTerms {
                    count: 12,
                    interest_rate_bps: Some(500),
                    start_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                }),
                ..cash_sale(v.id, buyer.id, 10_000_00)
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = db.sales().sell(cash_sale(v.id, 999, 10_000_00)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let v = db.vehicles().get(v.id).await.unwrap();
        assert_eq!(v.sale_status, VehicleSaleStatus::ForSale);
        assert!(db.sales().list_by_vehicle(v.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_lists() {
        let (db, _) = setup().await;
        let v = showroom_vehicle(&db, "P 4", 9_000_00).await;
        list_for_sale(&db, v.id).await;
        let buyer = customer(&db, "Buyer", "0815").await;
        let receipt = db.sales().sell(cash_sale(v.id, buyer.id, 10_000_00)).await.unwrap();

        let sale = db
            .sales()
            .update(
                receipt.sale.id,
                UpdateVehicleSale {
                    payment_method: Some(PaymentMethod::Card),
                    notes: Some("paid at counter".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(sale.payment_method, PaymentMethod::Card);
        assert_eq!(sale.profit_cents, 1_000_00);

        assert_eq!(db.sales().list_by_customer(buyer.id).await.unwrap().len(), 1);
        assert_eq!(db.sales().list(Page::default()).await.unwrap().len(), 1);
        assert_eq!(
            db.installments().get_by_sale(sale.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
