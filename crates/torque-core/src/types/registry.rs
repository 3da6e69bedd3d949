//! Identity & ownership registry: outlets, staff users, customers and the
//! vehicles customers bring into the workshop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Outlet
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OutletStatus {
    Active,
    Inactive,
}

impl Default for OutletStatus {
    fn default() -> Self {
        OutletStatus::Active
    }
}

/// A workshop branch. Queues, service codes and civil dates are per outlet.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Outlet {
    pub id: i64,
    pub name: String,
    pub branch_type: Option<String>,
    pub city: Option<String>,
    pub contact: Option<String>,
    pub status: OutletStatus,
    /// Offset from UTC used to derive the outlet-local civil date.
    pub utc_offset_minutes: i32,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Outlet {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == OutletStatus::Active
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewOutlet {
    pub name: String,
    pub branch_type: Option<String>,
    pub city: Option<String>,
    pub contact: Option<String>,
    pub status: Option<OutletStatus>,
    pub utc_offset_minutes: Option<i32>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateOutlet {
    pub name: Option<String>,
    pub branch_type: Option<String>,
    pub city: Option<String>,
    pub contact: Option<String>,
    pub status: Option<OutletStatus>,
    pub utc_offset_minutes: Option<i32>,
}

// =============================================================================
// User
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    Cashier,
    Technician,
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::Cashier
    }
}

/// A staff account.
///
/// The password hash never leaves the process: it is skipped by serde and
/// therefore absent from both the JSON payloads and the TypeScript bindings.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Stored lower-cased.
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: UserRole,
    pub outlet_id: Option<i64>,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<UserRole>,
    pub outlet_id: Option<i64>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub outlet_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
}

// =============================================================================
// Customer
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    /// Unique among live customers.
    pub phone: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateCustomer {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
}

// =============================================================================
// Customer Vehicle
// =============================================================================

/// A vehicle owned by a customer and brought in for service.
///
/// Plate, chassis and engine numbers are three independent uniqueness
/// constraints among live rows.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CustomerVehicle {
    pub id: i64,
    pub customer_id: i64,
    pub plate_number: String,
    pub chassis_number: String,
    pub engine_number: String,
    pub brand: String,
    pub model: String,
    pub vehicle_type: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCustomerVehicle {
    pub customer_id: i64,
    pub plate_number: String,
    pub chassis_number: String,
    pub engine_number: String,
    pub brand: String,
    pub model: String,
    pub vehicle_type: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateCustomerVehicle {
    pub customer_id: Option<i64>,
    pub plate_number: Option<String>,
    pub chassis_number: Option<String>,
    pub engine_number: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub vehicle_type: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
}
