//! Service job types: the repair job, its line items and its history log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Status
// =============================================================================

/// Lifecycle of a service job.
///
/// ```text
/// queued ──► working ──► done ──► picked_up ──► complaint
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ServiceJobStatus {
    Queued,
    Working,
    Done,
    PickedUp,
    Complaint,
}

impl ServiceJobStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceJobStatus::Queued => "queued",
            ServiceJobStatus::Working => "working",
            ServiceJobStatus::Done => "done",
            ServiceJobStatus::PickedUp => "picked_up",
            ServiceJobStatus::Complaint => "complaint",
        }
    }

    /// Jobs that left the workshop; their line items are frozen.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceJobStatus::PickedUp | ServiceJobStatus::Complaint)
    }

    /// Jobs that still occupy a slot in the outlet queue.
    #[inline]
    pub fn is_in_queue(&self) -> bool {
        matches!(self, ServiceJobStatus::Queued | ServiceJobStatus::Working)
    }
}

impl Default for ServiceJobStatus {
    fn default() -> Self {
        ServiceJobStatus::Queued
    }
}

impl fmt::Display for ServiceJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Service Job
// =============================================================================

/// A vehicle-repair job from intake to pickup.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceJob {
    pub id: i64,
    /// `SJ-<outlet>-<seq>`, globally unique.
    pub service_code: String,
    /// Position in the outlet queue for `queue_date`, starting at 1.
    pub queue_number: i64,
    /// Outlet-local civil date of intake.
    #[ts(as = "String")]
    pub queue_date: NaiveDate,
    pub outlet_id: i64,
    pub customer_id: i64,
    pub vehicle_id: i64,
    pub technician_id: Option<i64>,
    pub received_by: i64,
    pub problem_description: String,
    pub status: ServiceJobStatus,
    #[ts(as = "String")]
    pub intake_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub complaint_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub warranty_expires_on: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub next_service_on: Option<NaiveDate>,
    pub down_payment_cents: i64,
    pub grand_total_cents: i64,
    pub cost_total_cents: i64,
    pub technician_commission_cents: i64,
    pub shop_profit_cents: i64,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ServiceJob {
    /// Stored totals as a [`ServiceTotals`].
    pub fn totals(&self) -> ServiceTotals {
        ServiceTotals {
            grand_total: Money::from_cents(self.grand_total_cents),
            cost_total: Money::from_cents(self.cost_total_cents),
            technician_commission: Money::from_cents(self.technician_commission_cents),
            shop_profit: Money::from_cents(self.shop_profit_cents),
        }
    }
}

/// Intake payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewServiceJob {
    pub outlet_id: i64,
    pub customer_id: i64,
    pub vehicle_id: i64,
    pub received_by: i64,
    pub problem_description: String,
    /// Defaults to now.
    #[ts(as = "Option<String>")]
    pub intake_at: Option<DateTime<Utc>>,
    pub down_payment_cents: Option<i64>,
    pub technician_id: Option<i64>,
    #[ts(as = "Option<String>")]
    pub warranty_expires_on: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub next_service_on: Option<NaiveDate>,
}

/// Patch for a job that has not left the workshop yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateServiceJob {
    pub technician_id: Option<i64>,
    pub problem_description: Option<String>,
    #[ts(as = "Option<String>")]
    pub warranty_expires_on: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub next_service_on: Option<NaiveDate>,
    pub down_payment_cents: Option<i64>,
}

/// Body of `POST /service-jobs/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatusChange {
    pub status: ServiceJobStatus,
    pub user_id: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceJobFilter {
    pub status: Option<ServiceJobStatus>,
    pub service_code: Option<String>,
    pub customer_id: Option<i64>,
    pub outlet_id: Option<i64>,
}

// =============================================================================
// Totals
// =============================================================================

/// Financial roll-up of a job's line items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceTotals {
    #[serde(rename = "grand_total_cents")]
    pub grand_total: Money,
    #[serde(rename = "cost_total_cents")]
    pub cost_total: Money,
    #[serde(rename = "technician_commission_cents")]
    pub technician_commission: Money,
    #[serde(rename = "shop_profit_cents")]
    pub shop_profit: Money,
}

// =============================================================================
// Service Detail
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Service,
    Product,
}

/// A line item on a service job.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceDetail {
    pub id: i64,
    pub service_job_id: i64,
    pub item_kind: ItemKind,
    /// Product id or catalog service id, depending on `item_kind`.
    pub item_id: i64,
    pub description: Option<String>,
    pub serial_number: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ServiceDetail {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewServiceDetail {
    pub item_kind: ItemKind,
    pub item_id: i64,
    pub description: Option<String>,
    pub serial_number: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub unit_cost_cents: i64,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateServiceDetail {
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price_cents: Option<i64>,
    pub unit_cost_cents: Option<i64>,
}

// =============================================================================
// History
// =============================================================================

/// Append-only log row. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceJobHistory {
    pub id: i64,
    pub service_job_id: i64,
    pub user_id: i64,
    /// Job status after the change.
    pub status: ServiceJobStatus,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags() {
        assert!(ServiceJobStatus::Queued.is_in_queue());
        assert!(ServiceJobStatus::Working.is_in_queue());
        assert!(!ServiceJobStatus::Done.is_in_queue());

        assert!(ServiceJobStatus::PickedUp.is_terminal());
        assert!(ServiceJobStatus::Complaint.is_terminal());
        assert!(!ServiceJobStatus::Done.is_terminal());
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        for status in [
            ServiceJobStatus::Queued,
            ServiceJobStatus::Working,
            ServiceJobStatus::Done,
            ServiceJobStatus::PickedUp,
            ServiceJobStatus::Complaint,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
