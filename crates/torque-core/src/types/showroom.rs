//! Showroom types: vehicles the workshop buys, reconditions and resells.
//!
//! ## Ownership / Sale Status
//! ```text
//! ┌────────────┬───────────────────────────────────────────────┐
//! │ ownership  │ allowed sale_status                           │
//! ├────────────┼───────────────────────────────────────────────┤
//! │ customer   │ sold, not_for_sale                            │
//! │ showroom   │ not_for_sale, for_sale, reserved              │
//! │ workshop   │ not_for_sale, for_sale, reserved              │
//! └────────────┴───────────────────────────────────────────────┘
//!
//!  showroom ──(reconditioning created)──► workshop
//!  workshop ──(completed)──► showroom + for_sale
//!  workshop ──(cancelled)──► showroom
//!  showroom ──(sold)──► customer + sold
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Vehicle Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VehicleOwnership {
    Customer,
    Showroom,
    Workshop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VehicleCondition {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VehicleSaleStatus {
    NotForSale,
    ForSale,
    Sold,
    Reserved,
}

impl VehicleOwnership {
    pub const fn as_str(&self) -> &'static str {
        match self {
            VehicleOwnership::Customer => "customer",
            VehicleOwnership::Showroom => "showroom",
            VehicleOwnership::Workshop => "workshop",
        }
    }

    /// Whether `sale_status` may be paired with this ownership.
    pub fn allows(&self, sale_status: VehicleSaleStatus) -> bool {
        match self {
            VehicleOwnership::Customer => matches!(
                sale_status,
                VehicleSaleStatus::Sold | VehicleSaleStatus::NotForSale
            ),
            VehicleOwnership::Showroom | VehicleOwnership::Workshop => {
                sale_status != VehicleSaleStatus::Sold
            }
        }
    }
}

impl fmt::Display for VehicleOwnership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VehicleSaleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            VehicleSaleStatus::NotForSale => "not_for_sale",
            VehicleSaleStatus::ForSale => "for_sale",
            VehicleSaleStatus::Sold => "sold",
            VehicleSaleStatus::Reserved => "reserved",
        }
    }
}

impl fmt::Display for VehicleSaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Vehicle
// =============================================================================

/// A showroom vehicle. Same identity numbers as a customer vehicle, plus
/// ownership, condition, sale status and prices.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Vehicle {
    pub id: i64,
    /// Owning customer once sold (or when taken in from a customer).
    pub customer_id: Option<i64>,
    pub plate_number: String,
    pub chassis_number: String,
    pub engine_number: String,
    pub brand: String,
    pub model: String,
    pub vehicle_type: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub ownership: VehicleOwnership,
    pub condition: VehicleCondition,
    pub sale_status: VehicleSaleStatus,
    pub purchase_price_cents: i64,
    pub selling_price_cents: i64,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Vehicle {
    #[inline]
    pub fn purchase_price(&self) -> Money {
        Money::from_cents(self.purchase_price_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewVehicle {
    pub customer_id: Option<i64>,
    pub plate_number: String,
    pub chassis_number: String,
    pub engine_number: String,
    pub brand: String,
    pub model: String,
    pub vehicle_type: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    /// `customer` or `showroom`; `workshop` is reached only through reconditioning.
    pub ownership: Option<VehicleOwnership>,
    pub condition: VehicleCondition,
    pub sale_status: Option<VehicleSaleStatus>,
    pub purchase_price_cents: i64,
    #[serde(default)]
    pub selling_price_cents: i64,
    pub created_by: Option<i64>,
}

/// Ownership is not patchable: it only moves through reconditioning and sales.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateVehicle {
    pub plate_number: Option<String>,
    pub chassis_number: Option<String>,
    pub engine_number: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub vehicle_type: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub condition: Option<VehicleCondition>,
    pub sale_status: Option<VehicleSaleStatus>,
    pub purchase_price_cents: Option<i64>,
    pub selling_price_cents: Option<i64>,
}

// =============================================================================
// Reconditioning
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReconditioningStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ReconditioningStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReconditioningStatus::Pending => "pending",
            ReconditioningStatus::InProgress => "in_progress",
            ReconditioningStatus::Completed => "completed",
            ReconditioningStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled jobs are closed to detail edits.
    #[inline]
    pub fn accepts_details(&self) -> bool {
        matches!(
            self,
            ReconditioningStatus::Pending | ReconditioningStatus::InProgress
        )
    }
}

impl fmt::Display for ReconditioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct VehicleReconditioningJob {
    pub id: i64,
    pub vehicle_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub estimated_cost_cents: i64,
    /// Set on completion.
    pub actual_cost_cents: Option<i64>,
    pub status: ReconditioningStatus,
    pub technician_id: Option<i64>,
    #[ts(as = "Option<String>")]
    pub start_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completion_at: Option<DateTime<Utc>>,
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
pub struct NewReconditioningJob {
    pub vehicle_id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_cost_cents: i64,
    pub technician_id: Option<i64>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateReconditioningJob {
    pub title: Option<String>,
    pub description: Option<String>,
    pub estimated_cost_cents: Option<i64>,
    pub technician_id: Option<i64>,
}

/// Body of `POST /reconditioning-jobs/{id}/complete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompleteReconditioning {
    /// Overrides the sum of detail totals when given.
    pub actual_cost_cents: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    Part,
    Service,
}

/// A part or labour line on a reconditioning job.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReconditioningDetail {
    pub id: i64,
    pub reconditioning_job_id: i64,
    pub kind: DetailKind,
    pub product_id: Option<i64>,
    pub service_id: Option<i64>,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    /// Stock was short when the part was added and was left untouched.
    pub stock_shortfall: bool,
    #[ts(as = "String")]
    pub usage_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ReconditioningDetail {
    /// Quantity that was actually taken out of stock for this line.
    #[inline]
    pub fn deducted_quantity(&self) -> i64 {
        if self.kind == DetailKind::Part && !self.stock_shortfall {
            self.quantity
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewReconditioningDetail {
    pub kind: DetailKind,
    pub product_id: Option<i64>,
    pub service_id: Option<i64>,
    pub description: Option<String>,
    pub quantity: i64,
    /// Defaults to the product cost price or the catalog service price.
    pub unit_price_cents: Option<i64>,
    #[ts(as = "Option<String>")]
    pub usage_at: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateReconditioningDetail {
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price_cents: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_pairs() {
        assert!(VehicleOwnership::Customer.allows(VehicleSaleStatus::Sold));
        assert!(!VehicleOwnership::Customer.allows(VehicleSaleStatus::ForSale));
        assert!(VehicleOwnership::Showroom.allows(VehicleSaleStatus::ForSale));
        assert!(!VehicleOwnership::Showroom.allows(VehicleSaleStatus::Sold));
        assert!(!VehicleOwnership::Workshop.allows(VehicleSaleStatus::Sold));
    }

    #[test]
    fn test_reconditioning_accepts_details() {
        assert!(ReconditioningStatus::Pending.accepts_details());
        assert!(ReconditioningStatus::InProgress.accepts_details());
        assert!(!ReconditioningStatus::Completed.accepts_details());
        assert!(!ReconditioningStatus::Cancelled.accepts_details());
    }
}
