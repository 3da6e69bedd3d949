//! # Customer Vehicle Repository
//!
//! Vehicles brought in for service. Plate, chassis and engine numbers are
//! three independent natural keys, each unique among live vehicles.

use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use torque_core::validation::{
    normalize_optional, validate_identity_number, validate_name, validate_search_query,
    validate_year,
};
use torque_core::{
    Clock, CoreError, CustomerVehicle, NewCustomerVehicle, Page, UpdateCustomerVehicle,
};

use super::{
    ensure_unique, fetch_deleted, fetch_live, like_pattern, require_live, soft_delete, undelete,
};
use crate::error::DbResult;

const TABLE: &str = "customer_vehicles";
const ENTITY: &str = "customer vehicle";

/// Repository for customer-owned vehicles.
#[derive(Debug, Clone)]
pub struct CustomerVehicleRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl CustomerVehicleRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        CustomerVehicleRepository { pool, clock }
    }

    /// Registers a vehicle for a live customer.
    ///
    /// ## Errors
    /// - `not_found` if the customer is missing
    /// - `conflict` if plate, chassis or engine collide with a live vehicle
    pub async fn create(&self, input: NewCustomerVehicle) -> DbResult<CustomerVehicle> {
        let plate = validate_identity_number("plate_number", &input.plate_number)?;
        let chassis = validate_identity_number("chassis_number", &input.chassis_number)?;
        let engine = validate_identity_number("engine_number", &input.engine_number)?;
        let brand = validate_name("brand", &input.brand)?;
        let model = validate_name("model", &input.model)?;
        if let Some(year) = input.year {
            validate_year(year)?;
        }

        let mut tx = self.pool.begin().await?;
        require_live(&mut tx, "customers", "customer", input.customer_id).await?;
        ensure_identity_free(&mut tx, &plate, &chassis, &engine, None).await?;

        debug!(plate = %plate, customer_id = input.customer_id, "Inserting customer vehicle");

        let now = self.clock.now();
        let vehicle = sqlx::query_as::<_, CustomerVehicle>(
            r#"
            INSERT INTO customer_vehicles (
                customer_id, plate_number, chassis_number, engine_number, brand, model,
                vehicle_type, year, color, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
        .bind(input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(vehicle)
    }

    pub async fn get(&self, id: i64) -> DbResult<CustomerVehicle> {
        let mut conn = self.pool.acquire().await?;
        fetch_live(&mut conn, TABLE, ENTITY, id).await
    }

    pub async fn get_by_plate(&self, plate: &str) -> DbResult<CustomerVehicle> {
        self.get_by_identity("plate_number", plate).await
    }

    pub async fn get_by_chassis(&self, chassis: &str) -> DbResult<CustomerVehicle> {
        self.get_by_identity("chassis_number", chassis).await
    }

    pub async fn get_by_engine(&self, engine: &str) -> DbResult<CustomerVehicle> {
        self.get_by_identity("engine_number", engine).await
    }

    async fn get_by_identity(&self, column: &'static str, value: &str) -> DbResult<CustomerVehicle> {
        let value = validate_identity_number(column, value)?;
        let sql = format!(
            "SELECT * FROM customer_vehicles WHERE {} = ? AND deleted_at IS NULL",
            column
        );

        sqlx::query_as::<_, CustomerVehicle>(&sql)
            .bind(&value)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY, value).into())
    }

    pub async fn list_by_customer(&self, customer_id: i64) -> DbResult<Vec<CustomerVehicle>> {
        let vehicles = sqlx::query_as::<_, CustomerVehicle>(
            r#"
            SELECT * FROM customer_vehicles
            WHERE customer_id = ? AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(vehicles)
    }

    /// Case-insensitive substring search over plate, brand, model and type,
    /// newest first.
    pub async fn search(&self, query: &str, page: Page) -> DbResult<Vec<CustomerVehicle>> {
        let query = validate_search_query(query)?;
        let pattern = like_pattern(&query);

        let vehicles = sqlx::query_as::<_, CustomerVehicle>(
            r#"
            SELECT * FROM customer_vehicles
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

    /// Updates a vehicle; changed identity numbers are checked excluding itself.
    pub async fn update(&self, id: i64, input: UpdateCustomerVehicle) -> DbResult<CustomerVehicle> {
        let mut tx = self.pool.begin().await?;
        let current: CustomerVehicle = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

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
        let customer_id = input.customer_id.unwrap_or(current.customer_id);
        if customer_id != current.customer_id {
            require_live(&mut tx, "customers", "customer", customer_id).await?;
        }

        ensure_identity_free(&mut tx, &plate, &chassis, &engine, Some(id)).await?;

        debug!(id, "Updating customer vehicle");

        let vehicle = sqlx::query_as::<_, CustomerVehicle>(
            r#"
            UPDATE customer_vehicles SET
                customer_id = ?, plate_number = ?, chassis_number = ?, engine_number = ?,
                brand = ?, model = ?, vehicle_type = ?, year = ?, color = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(customer_id)
        .bind(&plate)
        .bind(&chassis)
        .bind(&engine)
        .bind(&brand)
        .bind(&model)
        .bind(normalize_optional(input.vehicle_type.as_deref()).or(current.vehicle_type))
        .bind(input.year.or(current.year))
        .bind(normalize_optional(input.color.as_deref()).or(current.color))
        .bind(self.clock.now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(vehicle)
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id, "Soft-deleting customer vehicle");
        let mut conn = self.pool.acquire().await?;
        soft_delete(&mut conn, TABLE, ENTITY, id, self.clock.now()).await
    }

    /// Administrative restore; identity numbers must still be free.
    pub async fn restore(&self, id: i64) -> DbResult<CustomerVehicle> {
        let mut tx = self.pool.begin().await?;
        let deleted: CustomerVehicle = fetch_deleted(&mut tx, TABLE, ENTITY, id).await?;

        ensure_identity_free(
            &mut tx,
            &deleted.plate_number,
            &deleted.chassis_number,
            &deleted.engine_number,
            Some(id),
        )
        .await?;
        undelete(&mut tx, TABLE, id, self.clock.now()).await?;
        let restored: CustomerVehicle = fetch_live(&mut tx, TABLE, ENTITY, id).await?;

        tx.commit().await?;
        info!(vehicle_id = id, "Customer vehicle restored");
        Ok(restored)
    }
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
    ensure_unique(conn, TABLE, "engine_number", ENTITY, engine, exclude_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer, customer_vehicle, setup};
    use torque_core::ErrorKind;

    fn input(customer_id: i64, plate: &str, chassis: &str, engine: &str) -> NewCustomerVehicle {
        NewCustomerVehicle {
            customer_id,
            plate_number: plate.to_string(),
            chassis_number: chassis.to_string(),
            engine_number: engine.to_string(),
            brand: "Suzuki".to_string(),
            model: "Ertiga".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_each_identity_number_is_unique() {
        let (db, _) = setup().await;
        let owner = customer(&db, "Owner", "100").await;
        db.customer_vehicles()
            .create(input(owner.id, "B 1 AA", "CH1", "EN1"))
            .await
            .unwrap();

        for (plate, chassis, engine) in [
            ("b 1 aa", "CH2", "EN2"),
            ("B 2 AA", "ch1", "EN2"),
            ("B 2 AA", "CH2", "en1"),
        ] {
            let err = db
                .customer_vehicles()
                .create(input(owner.id, plate, chassis, engine))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Conflict, "{} {} {}", plate, chassis, engine);
        }
    }

    #[tokio::test]
    async fn test_unknown_customer_not_found() {
        let (db, _) = setup().await;
        let err = db
            .customer_vehicles()
            .create(input(404, "B 3 AA", "CH3", "EN3"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_lookup_search_and_transfer() {
        let (db, _) = setup().await;
        let first = customer(&db, "First", "200").await;
        let second = customer(&db, "Second", "300").await;
        let car = customer_vehicle(&db, first.id, "D 9 ZZ").await;

        assert_eq!(db.customer_vehicles().get_by_plate("d 9 zz").await.unwrap().id, car.id);
        assert_eq!(
            db.customer_vehicles().get_by_chassis("CH-D 9 ZZ").await.unwrap().id,
            car.id
        );

        let hits = db.customer_vehicles().search("vari", Page::default()).await.unwrap();
        assert_eq!(hits.len(), 1);

        let moved = db
            .customer_vehicles()
            .update(
                car.id,
                UpdateCustomerVehicle {
                    customer_id: Some(second.id),
                    color: Some("Red".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.customer_id, second.id);
        assert_eq!(moved.plate_number, "D 9 ZZ");
        assert!(db
            .customer_vehicles()
            .list_by_customer(first.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_deleted_vehicle_frees_identity_and_restore_rechecks() {
        let (db, _) = setup().await;
        let owner = customer(&db, "Owner", "400").await;
        let old = customer_vehicle(&db, owner.id, "F 1 AB").await;
        db.customer_vehicles().delete(old.id).await.unwrap();

        customer_vehicle(&db, owner.id, "F 1 AB").await;
        let err = db.customer_vehicles().restore(old.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
