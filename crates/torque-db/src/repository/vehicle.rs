//! # Showroom Vehicle Repository
//!
//! Vehicles the workshop buys, reconditions and resells. Ownership is never
//! patched directly: it moves only through reconditioning and sales, via
//! [`move_vehicle_in`].
//!
//! ```text
//!   ownership / sale_status pairs are checked on every write:
//!     customer  → sold | not_for_sale
//!     showroom  → not_for_sale | for_sale | reserved
//!     workshop  → not_for_sale | for_sale | reserved
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use torque_core::validation::{
    normalize_optional, validate_identity_number, validate_name, validate_price_cents,
    validate_search_query, validate_year,
};
use torque_core::{
    Clock, CoreError, NewVehicle, Page, UpdateVehicle, ValidationError, Vehicle,
    VehicleOwnership, VehicleSaleStatus,
};

use super::{ensure_unique, fetch_live, like_pattern, require_live, soft_delete};
use crate::error::DbResult;

const TABLE: &str = "vehicles";
const ENTITY: &str = "vehicle";

/// Repository for showroom vehicles.
#[derive(Debug, Clone)]
pub struct VehicleRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl VehicleRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        VehicleRepository { pool, clock }
    }

    /// Registers a vehicle.
    ///
    /// ## Errors
    /// - `invalid_input` for `workshop` ownership (only reconditioning sets
    ///   it) or an ownership / sale status pair that is not allowed
    /// - `conflict` if plate, chassis or engine collide with a live vehicle
    pub async fn create(&self, input: NewVehicle) -> DbResult<Vehicle> {
        let plate = validate_identity_number("plate_number", &input.plate_number)?;
        let chassis = validate_identity_number("chassis_number", &input.chassis_number)?;
        let engine = validate_identity_number("engine_number", &input.engine_number)?;
        let brand = validate_name("brand", &input.brand)?;
        let model = validate_name("model", &input.model)?;
        if let Some(year) = input.year {
            validate_year(year)?;
        }
        validate_price_cents("purchase_price", input.purchase_price_cents)?;
        validate_price_cents("selling_price", input.selling_price_cents)?;

        let ownership = input.ownership.unwrap_or(VehicleOwnership::Showroom);
        if ownership == VehicleOwnership::Workshop {
            return Err(ValidationError::NotAllowed {
                field: "ownership".to_string(),
                allowed: vec!["customer".to_string(), "showroom".to_string()],
            }
            .into());
        }
        let sale_status = input.sale_status.unwrap_or(VehicleSaleStatus::NotForSale);
        check_pair(ownership, sale_status)?;
        if ownership == VehicleOwnership::Customer && input.customer_id.is_none() {
            return Err(ValidationError::Required {
                field: "customer_id".to_string(),
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        if let Some(customer_id) = input.customer_id {
            require_live(&mut tx, "customers", "customer", customer_id).await?;
        }
        ensure_identity_free(&mut tx, &plate, &chassis, &engine, None).await?;

        debug!(plate = %plate, %ownership, "Inserting showroom vehicle");

        let now = self.clock.now();
        let vehicle = sqlx::query_as::<_, Vehicle>(
            r#"
            INSERT INTO vehicles (
                customer_id, plate_number, chassis_number, engine_number, brand, model,
                vehicle_type, year, color, ownership, condition, sale_status,
                purchase_price_cents, selling_price_cents, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(input.customer_id)
        .bind(&plate)
        .bind(&chassis)
        .bind(&engine)
        .bind(&brand)
        .bind(&model)
        .bind(normalize_optional(input.vehicle_type.as_deref()))
        .bind(input.year)
        .bind(normalize_optional(input.color.as_deref()))
        .bind(ownership)
        .bind(input.condition)
        .bind(sale_status)
        .bind(input.purchase_price_cents)
        .bind(input.selling_price_cents)
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(vehicle)
    }

    pub async fn get(&self, id: i64) -> DbResult<Vehicle> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    /// Lists vehicles by ownership and sale status, newest first.
    pub async fn list(
        &self,
        ownership: Option<VehicleOwnership>,
        sale_status: Option<VehicleSaleStatus>,
        page: Page,
    ) -> DbResult<Vec<Vehicle>> {
        let vehicles = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT * FROM vehicles
            WHERE deleted_at IS NULL
              AND (?1 IS NULL OR ownership = ?1)
              AND (?2 IS NULL OR sale_status = ?2)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(ownership)
        .bind(sale_status)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(vehicles)
    }

    /// Substring search over plate, brand, model and type, newest first.
    pub async fn search(&self, query: &str, page: Page) -> DbResult<Vec<Vehicle>> {
        let query = validate_search_query(query)?;
        let pattern = like_pattern(&query);

        let vehicles = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT * FROM vehicles
            WHERE deleted_at IS NULL
              AND (plate_number LIKE ?1 ESCAPE '\' OR brand LIKE ?1 ESCAPE '\'
                   OR model LIKE ?1 ESCAPE '\' OR COALESCE(vehicle_type, '') LIKE ?1 ESCAPE '\')
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(&pattern)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(vehicles)
    }

    /// Patches descriptive fields, prices and the sale status.
    ///
    /// `sold` cannot be set here; it is reached by selling the vehicle.
    pub async fn update(&self, id: i64, input: UpdateVehicle) -> DbResult<Vehicle> {
        let mut tx = self.pool.begin().await?;
        let current: Vehicle = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        let plate = match input.plate_number.as_deref() {
            Some(p) => validate_identity_number("plate_number", p)?,
            None => current.plate_number,
        };
        let chassis = match input.chassis_number.as_deref() {
            Some(c) => validate_identity_number("chassis_number", c)?,
            None => current.chassis_number,
        };
        let engine = match input.engine_number.as_deref() {
            Some(e) => validate_identity_number("engine_number", e)?,
            None => current.engine_number,
        };
        let brand = match input.brand.as_deref() {
            Some(b) => validate_name("brand", b)?,
            None => current.brand,
        };
        let model = match input.model.as_deref() {
            Some(m) => validate_name("model", m)?,
            None => current.model,
        };
        if let Some(year) = input.year {
            validate_year(year)?;
        }
        let purchase = input.purchase_price_cents.unwrap_or(current.purchase_price_cents);
        let selling = input.selling_price_cents.unwrap_or(current.selling_price_cents);
        validate_price_cents("purchase_price", purchase)?;
        validate_price_cents("selling_price", selling)?;

        let sale_status = match input.sale_status {
            Some(VehicleSaleStatus::Sold) if current.sale_status != VehicleSaleStatus::Sold => {
                return Err(CoreError::invalid_state(
                    "a vehicle becomes sold only through a sale",
                )
                .into());
            }
            Some(status) => {
                check_pair(current.ownership, status)?;
                status
            }
            None => current.sale_status,
        };

        ensure_identity_free(&mut tx, &plate, &chassis, &engine, Some(id)).await?;

        debug!(id, "Updating showroom vehicle");

        let vehicle = sqlx::query_as::<_, Vehicle>(
            r#"
            UPDATE vehicles SET
                plate_number = ?, chassis_number = ?, engine_number = ?, brand = ?, model = ?,
                vehicle_type = ?, year = ?, color = ?, condition = ?, sale_status = ?,
                purchase_price_cents = ?, selling_price_cents = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&plate)
        .bind(&chassis)
        .bind(&engine)
        .bind(&brand)
        .bind(&model)
        .bind(normalize_optional(input.vehicle_type.as_deref()).or(current.vehicle_type))
        .bind(input.year.or(current.year))
        .bind(normalize_optional(input.color.as_deref()).or(current.color))
        .bind(input.condition.unwrap_or(current.condition))
        .bind(sale_status)
        .bind(purchase)
        .bind(selling)
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(vehicle)
    }

    /// Soft-deletes a vehicle that is not in the workshop.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let vehicle: Vehicle = fetch_live(&mut tx, TABLE, ENTITY, id).await?;
        if vehicle.ownership == VehicleOwnership::Workshop {
            return Err(CoreError::Integrity(format!(
                "vehicle {} is being reconditioned",
                id
            ))
            .into());
        }

        debug!(id, "Soft-deleting showroom vehicle");
        soft_delete(&mut tx, TABLE, ENTITY, id, self.clock.now()).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn check_pair(ownership: VehicleOwnership, sale_status: VehicleSaleStatus) -> DbResult<()> {
    if !ownership.allows(sale_status) {
        return Err(ValidationError::Invalid {
            field: "sale_status".to_string(),
            reason: format!("{} is not allowed for a {} vehicle", sale_status, ownership),
        }
        .into());
    }
    Ok(())
}

async fn ensure_identity_free(
    conn: &mut SqliteConnection,
    plate: &str,
    chassis: &str,
    engine: &str,
    exclude_id: Option<i64>,
) -> DbResult<()> {
    ensure_unique(conn, TABLE, "plate_number", ENTITY, plate, exclude_id).await?;
    ensure_unique(conn, TABLE, "chassis_number", ENTITY, chassis, exclude_id).await?;
    ensure_unique(conn, TABLE, "engine_number", ENTITY, engine, exclude_id).await
}

/// Where a vehicle moves to. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VehicleMove {
    pub ownership: Option<VehicleOwnership>,
    pub sale_status: Option<VehicleSaleStatus>,
    pub customer_id: Option<i64>,
    pub selling_price_cents: Option<i64>,
}

/// Moves a vehicle between owners inside the caller's transaction.
pub(crate) async fn move_vehicle_in(
    conn: &mut SqliteConnection,
    vehicle_id: i64,
    to: VehicleMove,
    now: DateTime<Utc>,
) -> DbResult<Vehicle> {
    let current: Vehicle = fetch_live(conn, TABLE, ENTITY, vehicle_id).await?;
    let ownership = to.ownership.unwrap_or(current.ownership);
    let sale_status = to.sale_status.unwrap_or(current.sale_status);
    if !ownership.allows(sale_status) {
        return Err(CoreError::invalid_state(format!(
            "vehicle {} cannot be {} while {}",
            vehicle_id, ownership, sale_status
        ))
        .into());
    }

    let vehicle = sqlx::query_as::<_, Vehicle>(
        r#"
        UPDATE vehicles SET
            ownership = ?, sale_status = ?, customer_id = ?, selling_price_cents = ?,
            updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(ownership)
    .bind(sale_status)
    .bind(to.customer_id.or(current.customer_id))
    .bind(to.selling_price_cents.unwrap_or(current.selling_price_cents))
    .bind(now)
    .bind(vehicle_id)
    .fetch_one(&mut *conn)
    .await?;

    info!(vehicle_id, %ownership, %sale_status, "Vehicle moved");
    Ok(vehicle)
}
