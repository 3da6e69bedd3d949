//! # Cash Flow Repository
//!
//! Manual inflow / outflow book, optionally per outlet.

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

use torque_core::validation::{normalize_optional, validate_name};
use torque_core::{
    CashFlow, CashFlowFilter, CashFlowSummary, Clock, NewCashFlow, Page, UpdateCashFlow,
    ValidationError,
};

use super::{fetch_live, require_live, soft_delete};
use crate::error::DbResult;

const TABLE: &str = "cash_flows";
const ENTITY: &str = "cash flow";

/// Repository for cash flow entries.
#[derive(Debug, Clone)]
pub struct CashFlowRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl CashFlowRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        CashFlowRepository { pool, clock }
    }

    /// Records an entry. The flow date defaults to today (UTC).
    pub async fn record(&self, input: NewCashFlow) -> DbResult<CashFlow> {
        let source = validate_name("source", &input.source)?;
        validate_flow_amount(input.amount_cents)?;

        let mut tx = self.pool.begin().await?;
        require_live(&mut tx, "users", "user", input.user_id).await?;
        if let Some(outlet_id) = input.outlet_id {
            require_live(&mut tx, "outlets", "outlet", outlet_id).await?;
        }

        debug!(flow_type = ?input.flow_type, amount = input.amount_cents, "Inserting cash flow");

        let now = self.clock.now();
        let flow = sqlx::query_as::<_, CashFlow>(
            r#"
            INSERT INTO cash_flows (
                outlet_id, flow_type, source, amount_cents, flow_date, user_id, description,
                created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(input.outlet_id)
        .bind(input.flow_type)
        .bind(&source)
        .bind(input.amount_cents)
        .bind(input.flow_date.unwrap_or_else(|| self.clock.today()))
        .bind(input.user_id)
        .bind(normalize_optional(input.description.as_deref()))
        .bind(input.user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(flow)
    }

    pub async fn get(&self, id: i64) -> DbResult<CashFlow> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    /// Entries by outlet and inclusive date range, newest first.
    pub async fn list(&self, filter: &CashFlowFilter, page: Page) -> DbResult<Vec<CashFlow>> {
        let flows = sqlx::query_as::<_, CashFlow>(
            r#"
            SELECT * FROM cash_flows
            WHERE deleted_at IS NULL
              AND (?1 IS NULL OR outlet_id = ?1)
              AND (?2 IS NULL OR flow_date >= ?2)
              AND (?3 IS NULL OR flow_date <= ?3)
            ORDER BY flow_date DESC, id DESC
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(filter.outlet_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(flows)
    }

    /// Inflow and outflow totals over the same filter as [`Self::list`].
    pub async fn summary(&self, filter: &CashFlowFilter) -> DbResult<CashFlowSummary> {
        let (inflow_cents, outflow_cents): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN flow_type = 'inflow' THEN amount_cents END), 0),
                COALESCE(SUM(CASE WHEN flow_type = 'outflow' THEN amount_cents END), 0)
            FROM cash_flows
            WHERE deleted_at IS NULL
              AND (?1 IS NULL OR outlet_id = ?1)
              AND (?2 IS NULL OR flow_date >= ?2)
              AND (?3 IS NULL OR flow_date <= ?3)
            "#,
        )
        .bind(filter.outlet_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(CashFlowSummary {
            inflow_cents,
            outflow_cents,
            net_cents: inflow_cents - outflow_cents,
        })
    }

    pub async fn update(&self, id: i64, input: UpdateCashFlow) -> DbResult<CashFlow> {
        let mut tx = self.pool.begin().await?;
        let current: CashFlow = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        let source = match input.source.as_deref() {
            Some(s) => validate_name("source", s)?,
            None => current.source,
        };
        let amount = input.amount_cents.unwrap_or(current.amount_cents);
        validate_flow_amount(amount)?;

        debug!(id, "Updating cash flow");

        let flow = sqlx::query_as::<_, CashFlow>(
            r#"
            UPDATE cash_flows SET
                source = ?, amount_cents = ?, flow_date = ?, description = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&source)
        .bind(amount)
        .bind(input.flow_date.unwrap_or(current.flow_date))
        .bind(normalize_optional(input.description.as_deref()).or(current.description))
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(flow)
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        debug!(id, "Soft-deleting cash flow");
        soft_delete(&mut conn, TABLE, ENTITY, id, self.clock.now()).await
    }
}

fn validate_flow_amount(cents: i64) -> Result<(), ValidationError> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{outlet, setup, user};
    use chrono::NaiveDate;
    use torque_core::{CashFlowType, ErrorKind, UserRole};

    fn entry(user_id: i64, outlet_id: Option<i64>, flow_type: CashFlowType, cents: i64) -> NewCashFlow {
        NewCashFlow {
            outlet_id,
            flow_type,
            source: "counter".to_string(),
            amount_cents: cents,
            flow_date: None,
            user_id,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_record_defaults_and_validation() {
        let (db, _) = setup().await;
        let cashier = user(&db, "cash@torque.test", UserRole::Cashier).await;

        let flow = db
            .cash_flows()
            .record(entry(cashier.id, None, CashFlowType::Inflow, 100_00))
            .await
            .unwrap();
        assert_eq!(flow.flow_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());

        let err = db
            .cash_flows()
            .record(entry(cashier.id, None, CashFlowType::Inflow, 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = db
            .cash_flows()
            .record(entry(cashier.id, Some(42), CashFlowType::Inflow, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_summary_by_outlet_and_range() {
        let (db, _) = setup().await;
        let cashier = user(&db, "cash@torque.test", UserRole::Cashier).await;
        let north = outlet(&db, "North").await;
        let south = outlet(&db, "South").await;

        let book = db.cash_flows();
        book.record(entry(cashier.id, Some(north.id), CashFlowType::Inflow, 500_00))
            .await
            .unwrap();
        book.record(entry(cashier.id, Some(north.id), CashFlowType::Outflow, 120_00))
            .await
            .unwrap();
        book.record(entry(cashier.id, Some(south.id), CashFlowType::Inflow, 70_00))
            .await
            .unwrap();
        let old = book
            .record(NewCashFlow {
                flow_date: NaiveDate::from_ymd_opt(2023, 12, 31),
                ..entry(cashier.id, Some(north.id), CashFlowType::Inflow, 1_000_00)
            })
            .await
            .unwrap();

        let filter = CashFlowFilter {
            outlet_id: Some(north.id),
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: None,
        };
        let summary = book.summary(&filter).await.unwrap();
        assert_eq!(summary.inflow_cents, 500_00);
        assert_eq!(summary.outflow_cents, 120_00);
        assert_eq!(summary.net_cents, 380_00);
        assert_eq!(book.list(&filter, Page::default()).await.unwrap().len(), 2);

        book.delete(old.id).await.unwrap();
        let all = book.summary(&CashFlowFilter::default()).await.unwrap();
        assert_eq!(all.inflow_cents, 570_00);
    }

    #[tokio::test]
    async fn test_update() {
        let (db, _) = setup().await;
        let cashier = user(&db, "cash@torque.test", UserRole::Cashier).await;
        let flow = db
            .cash_flows()
            .record(entry(cashier.id, None, CashFlowType::Outflow, 10_00))
            .await
            .unwrap();

        let flow = db
            .cash_flows()
            .update(
                flow.id,
                UpdateCashFlow {
                    amount_cents: Some(12_50),
                    description: Some("bolts".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(flow.amount_cents, 12_50);
        assert_eq!(flow.source, "counter");
        assert_eq!(flow.description.as_deref(), Some("bolts"));
    }
}
