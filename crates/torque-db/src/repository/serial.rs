//! # Serial Number Repository
//!
//! Per-unit tracking for serialised products. Each status change that moves
//! a unit in or out of `available` moves the product's stock in the same
//! transaction, so `stock == count(available serials)` always holds.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use torque_core::validation::validate_code;
use torque_core::{
    Clock, CoreError, ErrorKind, NewSerialNumber, Product, ProductSerialNumber, SerialStatus,
    ValidationError,
};

use super::product::adjust_stock_in;
use super::{ensure_unique, fetch_deleted, fetch_live, soft_delete, undelete};
use crate::error::DbResult;

const TABLE: &str = "product_serial_numbers";
const ENTITY: &str = "serial number";

/// Repository for product serial numbers.
#[derive(Debug, Clone)]
pub struct SerialNumberRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SerialNumberRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        SerialNumberRepository { pool, clock }
    }

    /// Registers a new unit as `available` and adds it to stock.
    ///
    /// ## Errors
    /// - `invalid_state` if the product is not serialised
    /// - `conflict` if the serial is already registered
    pub async fn create(
        &self,
        product_id: i64,
        input: NewSerialNumber,
    ) -> DbResult<ProductSerialNumber> {
        let serial = validate_code("serial_number", &input.serial_number)?;

        let mut tx = self.pool.begin().await?;
        let product: Product = fetch_live(&mut tx, "products", "product", product_id).await?;
        if !product.has_serial {
            return Err(CoreError::invalid_state(format!(
                "product {} does not track serial numbers",
                product_id
            ))
            .into());
        }
        ensure_unique(&mut tx, TABLE, "serial_number", ENTITY, &serial, None).await?;

        debug!(product_id, serial = %serial, "Registering serial number");

        let now = self.clock.now();
        let row = sqlx::query_as::<_, ProductSerialNumber>(
            r#"
            INSERT INTO product_serial_numbers (
                product_id, serial_number, status, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(&serial)
        .bind(SerialStatus::Available)
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        adjust_stock_in(&mut tx, product_id, 1, now).await?;

        tx.commit().await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> DbResult<ProductSerialNumber> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    pub async fn get_by_serial(&self, serial: &str) -> DbResult<ProductSerialNumber> {
        let serial = validate_code("serial_number", serial)?;
        let mut conn = self.pool.acquire().await?;
        find_by_serial(&mut conn, &serial).await
    }

    /// Units of one product, optionally only those in `status`.
    pub async fn list_by_product(
        &self,
        product_id: i64,
        status: Option<SerialStatus>,
    ) -> DbResult<Vec<ProductSerialNumber>> {
        let rows = sqlx::query_as::<_, ProductSerialNumber>(
            r#"
            SELECT * FROM product_serial_numbers
            WHERE product_id = ?1 AND deleted_at IS NULL
              AND (?2 IS NULL OR status = ?2)
            ORDER BY serial_number
            "#,
        )
        .bind(product_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Moves a unit out of `available` (to consumed or damaged).
    ///
    /// ## Errors
    /// - `invalid_transition` for any other move; use [`restore`](Self::restore)
    ///   to bring a unit back
    pub async fn transition(&self, id: i64, next: SerialStatus) -> DbResult<ProductSerialNumber> {
        let mut tx = self.pool.begin().await?;
        let current: ProductSerialNumber = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        let now = self.clock.now();
        let updated = move_serial_in(&mut tx, &current, next, now).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Returns a consumed or damaged unit to `available`.
    pub async fn restore(&self, id: i64) -> DbResult<ProductSerialNumber> {
        let mut tx = self.pool.begin().await?;
        let current: ProductSerialNumber = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        if current.status == SerialStatus::Available {
            return Err(CoreError::invalid_state(format!(
                "serial {} is already available",
                current.serial_number
            ))
            .into());
        }

        let now = self.clock.now();
        let restored = set_status_in(&mut tx, id, SerialStatus::Available, now).await?;
        adjust_stock_in(&mut tx, current.product_id, 1, now).await?;

        tx.commit().await?;
        info!(serial = %current.serial_number, "Serial number restored to stock");
        Ok(restored)
    }

    /// Soft-deletes a unit. An available unit leaves stock with it.
    ///
    /// ## Errors
    /// - `integrity` while a live service detail still names the unit
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let current: ProductSerialNumber = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        let lines: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM service_details
            WHERE item_kind = 'product' AND item_id = ? AND serial_number = ?
              AND deleted_at IS NULL
            "#,
        )
        .bind(current.product_id)
        .bind(&current.serial_number)
        .fetch_one(&mut *tx)
        .await?;
        if lines > 0 {
            return Err(CoreError::Integrity(format!(
                "serial {} is used by {} service detail(s)",
                current.serial_number, lines
            ))
            .into());
        }

        let now = self.clock.now();
        soft_delete(&mut tx, TABLE, ENTITY, id, now).await?;
        if current.status.is_in_stock() {
            adjust_stock_in(&mut tx, current.product_id, -1, now).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Brings back a soft-deleted unit; an available unit re-enters stock.
    pub async fn undelete(&self, id: i64) -> DbResult<ProductSerialNumber> {
        let mut tx = self.pool.begin().await?;
        let deleted: ProductSerialNumber = fetch_deleted(&mut tx, TABLE, ENTITY, id).await?;

        ensure_unique(&mut tx, TABLE, "serial_number", ENTITY, &deleted.serial_number, Some(id))
            .await?;
        let now = self.clock.now();
        undelete(&mut tx, TABLE, id, now).await?;
        if deleted.status.is_in_stock() {
            adjust_stock_in(&mut tx, deleted.product_id, 1, now).await?;
        }
        let row: ProductSerialNumber = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        tx.commit().await?;
        Ok(row)
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

async fn find_by_serial(
    conn: &mut SqliteConnection,
    serial: &str,
) -> DbResult<ProductSerialNumber> {
    sqlx::query_as::<_, ProductSerialNumber>(
        "SELECT * FROM product_serial_numbers WHERE serial_number = ? AND deleted_at IS NULL",
    )
    .bind(serial)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found(ENTITY, serial).into())
}

async fn set_status_in(
    conn: &mut SqliteConnection,
    id: i64,
    status: SerialStatus,
    now: DateTime<Utc>,
) -> DbResult<ProductSerialNumber> {
    let row = sqlx::query_as::<_, ProductSerialNumber>(
        "UPDATE product_serial_numbers SET status = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(status)
    .bind(now)
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

async fn move_serial_in(
    conn: &mut SqliteConnection,
    current: &ProductSerialNumber,
    next: SerialStatus,
    now: DateTime<Utc>,
) -> DbResult<ProductSerialNumber> {
    if !current.status.can_transition_to(next) {
        return Err(CoreError::InvalidTransition {
            entity: "serial number",
            from: current.status.to_string(),
            to: next.to_string(),
        }
        .into());
    }

    debug!(serial = %current.serial_number, from = %current.status, to = %next, "Moving serial");

    let updated = set_status_in(conn, current.id, next, now).await?;
    if current.status.is_in_stock() && !next.is_in_stock() {
        adjust_stock_in(conn, current.product_id, -1, now).await?;
    }
    Ok(updated)
}

/// Marks a serial of `product_id` as consumed by a job line.
///
/// ## Errors
/// - `not_found` if the serial is unknown
/// - `invalid_input` if it belongs to another product
/// - `invalid_state` if it is not available
pub(crate) async fn consume_in(
    conn: &mut SqliteConnection,
    product_id: i64,
    serial: &str,
    now: DateTime<Utc>,
) -> DbResult<ProductSerialNumber> {
    let serial = validate_code("serial_number", serial)?;
    let current = find_by_serial(conn, &serial).await?;

    if current.product_id != product_id {
        return Err(ValidationError::Invalid {
            field: "serial_number".to_string(),
            reason: format!("serial {} belongs to another product", serial),
        }
        .into());
    }
    if current.status != SerialStatus::Available {
        return Err(CoreError::invalid_state(format!(
            "serial {} is {}",
            serial, current.status
        ))
        .into());
    }

    move_serial_in(conn, &current, SerialStatus::Consumed, now).await
}

/// Puts a consumed serial back into stock when the line that used it goes.
///
/// A serial that is gone or no longer `consumed` (restored or damaged
/// since) is left alone.
pub(crate) async fn release_in(
    conn: &mut SqliteConnection,
    serial: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let current = match find_by_serial(conn, serial).await {
        Ok(current) => current,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(serial = %serial, "Released serial no longer exists");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if current.status != SerialStatus::Consumed {
        return Ok(());
    }

    debug!(serial = %serial, "Releasing consumed serial");
    set_status_in(conn, current.id, SerialStatus::Available, now).await?;
    adjust_stock_in(conn, current.product_id, 1, now).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{product, setup};
    use crate::Database;
    use torque_core::{ErrorKind, NewProduct};

    async fn serialised(db: &Database) -> Product {
        db.products()
            .create(NewProduct {
                name: "Battery GS Astra".to_string(),
                has_serial: true,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    fn serial(s: &str) -> NewSerialNumber {
        NewSerialNumber {
            serial_number: s.to_string(),
            created_by: None,
        }
    }

    #[tokio::test]
    async fn test_stock_follows_available_serials() {
        let (db, _) = setup().await;
        let battery = serialised(&db).await;
        let serials = db.serial_numbers();

        let a = serials.create(battery.id, serial("BAT-001")).await.unwrap();
        serials.create(battery.id, serial("BAT-002")).await.unwrap();
        assert_eq!(db.products().get(battery.id).await.unwrap().stock, 2);

        let damaged = serials.transition(a.id, SerialStatus::Damaged).await.unwrap();
        assert_eq!(damaged.status, SerialStatus::Damaged);
        assert_eq!(db.products().get(battery.id).await.unwrap().stock, 1);

        let err = serials
            .transition(a.id, SerialStatus::Consumed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        serials.restore(a.id).await.unwrap();
        assert_eq!(db.products().get(battery.id).await.unwrap().stock, 2);

        let available = serials
            .list_by_product(battery.id, Some(SerialStatus::Available))
            .await
            .unwrap();
        assert_eq!(available.len(), 2);
    }

    #[tokio::test]
    async fn test_serial_requires_serialised_product_and_is_unique() {
        let (db, _) = setup().await;
        let plain = product(&db, "Oil", 5, 0, 0).await;
        let err = db
            .serial_numbers()
            .create(plain.id, serial("X-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let battery = serialised(&db).await;
        db.serial_numbers().create(battery.id, serial("X-1")).await.unwrap();
        let err = db
            .serial_numbers()
            .create(battery.id, serial("X-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_consume_checks_owner_and_status() {
        let (db, clock) = setup().await;
        let battery = serialised(&db).await;
        let other = serialised(&db).await;
        db.serial_numbers().create(battery.id, serial("BAT-9")).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let err = consume_in(&mut conn, other.id, "BAT-9", clock.now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let used = consume_in(&mut conn, battery.id, "BAT-9", clock.now())
            .await
            .unwrap();
        assert_eq!(used.status, SerialStatus::Consumed);

        let err = consume_in(&mut conn, battery.id, "BAT-9", clock.now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        drop(conn);

        assert_eq!(db.products().get(battery.id).await.unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_delete_available_serial_leaves_stock() {
        let (db, _) = setup().await;
        let battery = serialised(&db).await;
        let s = db.serial_numbers().create(battery.id, serial("D-1")).await.unwrap();

        db.serial_numbers().delete(s.id).await.unwrap();
        assert_eq!(db.products().get(battery.id).await.unwrap().stock, 0);
        assert_eq!(
            db.serial_numbers().get_by_serial("D-1").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        db.serial_numbers().undelete(s.id).await.unwrap();
        assert_eq!(db.products().get(battery.id).await.unwrap().stock, 1);
    }
}
