//! Shared fixtures for repository tests.
//!
//! Every test gets its own in-memory database with migrations applied and a
//! [`FixedClock`] pinned to 2024-01-15 09:00 UTC.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use torque_core::{
    Customer, CustomerVehicle, FixedClock, NewCustomer, NewCustomerVehicle, NewOutlet, NewProduct,
    NewService, NewVehicle, Outlet, Product, Service, User, UserRole, Vehicle, VehicleCondition,
    VehicleOwnership, VehicleSaleStatus,
};

use crate::{Database, DbConfig};

pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
}

pub(crate) async fn setup() -> (Database, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(fixed_now()));
    let db = Database::new(DbConfig::in_memory())
        .await
        .unwrap()
        .with_clock(clock.clone());
    (db, clock)
}

pub(crate) async fn outlet(db: &Database, name: &str) -> Outlet {
    db.outlets()
        .create(NewOutlet {
            name: name.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

/// Inserts a user directly, skipping password hashing to keep tests fast.
pub(crate) async fn user(db: &Database, email: &str, role: UserRole) -> User {
    let now = fixed_now();
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, 'not-a-hash', ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(email.split('@').next().unwrap_or(email))
    .bind(email)
    .bind(role)
    .bind(now)
    .bind(now)
    .fetch_one(db.pool())
    .await
    .unwrap()
}

pub(crate) async fn customer(db: &Database, name: &str, phone: &str) -> Customer {
    db.customers()
        .create(NewCustomer {
            name: name.to_string(),
            phone: phone.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub(crate) async fn customer_vehicle(db: &Database, customer_id: i64, plate: &str) -> CustomerVehicle {
    db.customer_vehicles()
        .create(NewCustomerVehicle {
            customer_id,
            plate_number: plate.to_string(),
            chassis_number: format!("CH-{}", plate),
            engine_number: format!("EN-{}", plate),
            brand: "Honda".to_string(),
            model: "Vario".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub(crate) async fn product(db: &Database, name: &str, stock: i64, cost_cents: i64, price_cents: i64) -> Product {
    db.products()
        .create(NewProduct {
            name: name.to_string(),
            cost_price_cents: cost_cents,
            selling_price_cents: price_cents,
            stock: Some(stock),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub(crate) async fn service(db: &Database, name: &str, price_cents: i64) -> Service {
    db.services()
        .create(NewService {
            name: name.to_string(),
            price_cents,
            ..Default::default()
        })
        .await
        .unwrap()
}

/// A showroom vehicle that is not yet for sale.
pub(crate) async fn showroom_vehicle(db: &Database, plate: &str, purchase_cents: i64) -> Vehicle {
    db.vehicles()
        .create(NewVehicle {
            customer_id: None,
            plate_number: plate.to_string(),
            chassis_number: format!("SCH-{}", plate),
            engine_number: format!("SEN-{}", plate),
            brand: "Yamaha".to_string(),
            model: "NMAX".to_string(),
            vehicle_type: None,
            year: Some(2021),
            color: None,
            ownership: Some(VehicleOwnership::Showroom),
            condition: VehicleCondition::Good,
            sale_status: Some(VehicleSaleStatus::NotForSale),
            purchase_price_cents: purchase_cents,
            selling_price_cents: 0,
            created_by: None,
        })
        .await
        .unwrap()
}

/// Everything an intake needs: an outlet, a front-desk user, a technician
/// and a customer with one vehicle.
pub(crate) struct Workshop {
    pub outlet: Outlet,
    pub clerk: User,
    pub technician: User,
    pub customer: Customer,
    pub vehicle: CustomerVehicle,
}

pub(crate) async fn workshop(db: &Database) -> Workshop {
    let outlet = outlet(db, "Main Street").await;
    let clerk = user(db, "clerk@torque.test", UserRole::Cashier).await;
    let technician = user(db, "tech@torque.test", UserRole::Technician).await;
    let customer = customer(db, "Budi", "081200000001").await;
    let vehicle = customer_vehicle(db, customer.id, "D 1234 AB").await;

    Workshop {
        outlet,
        clerk,
        technician,
        customer,
        vehicle,
    }
}
