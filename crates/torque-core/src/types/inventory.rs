//! Inventory ledger types: products with their stock counter, per-unit
//! serial numbers, and the service catalog.
//!
//! ## Serialised Stock
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  has_serial = false          stock is a plain counter                  │
//! │                              mutated by signed deltas                  │
//! │                                                                         │
//! │  has_serial = true           stock == count(serials WHERE available)   │
//! │                              mutated only through serial rows:         │
//! │                                                                         │
//! │      create serial ─────────► available      (stock +1)                │
//! │                                 │                                       │
//! │                  ┌──────────────┼──────────────┐                       │
//! │                  ▼                             ▼                        │
//! │              consumed                      damaged    (stock −1)       │
//! │                  │                             │                        │
//! │                  └──────── restore ────────────┘  → available (+1)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// What a product is held for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ProductUsage {
    Sale,
    InternalUse,
    Damaged,
}

impl Default for ProductUsage {
    fn default() -> Self {
        ProductUsage::Sale
    }
}

/// A stocked part or consumable.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// Unique among live products when set.
    pub sku: Option<String>,
    /// Unique among live products when set.
    pub barcode: Option<String>,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub cost_price_cents: i64,
    pub selling_price_cents: i64,
    /// Never negative.
    pub stock: i64,
    pub has_serial: bool,
    pub is_active: bool,
    pub usage: ProductUsage,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    #[inline]
    pub fn cost_price(&self) -> Money {
        Money::from_cents(self.cost_price_cents)
    }

    #[inline]
    pub fn selling_price(&self) -> Money {
        Money::from_cents(self.selling_price_cents)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub cost_price_cents: i64,
    pub selling_price_cents: i64,
    /// Opening stock. Must be zero (or absent) for serialised products.
    pub stock: Option<i64>,
    #[serde(default)]
    pub has_serial: bool,
    pub is_active: Option<bool>,
    pub usage: Option<ProductUsage>,
    pub created_by: Option<i64>,
}

/// Metadata patch. Stock is changed through `update_stock` only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub cost_price_cents: Option<i64>,
    pub selling_price_cents: Option<i64>,
    pub is_active: Option<bool>,
    pub usage: Option<ProductUsage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductFilter {
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub usage: Option<ProductUsage>,
}

// =============================================================================
// Serial Numbers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SerialStatus {
    Available,
    Consumed,
    Damaged,
}

impl SerialStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SerialStatus::Available => "available",
            SerialStatus::Consumed => "consumed",
            SerialStatus::Damaged => "damaged",
        }
    }

    /// Serials only move forward; going back to `available` is a restore.
    pub fn can_transition_to(&self, next: SerialStatus) -> bool {
        matches!(
            (self, next),
            (SerialStatus::Available, SerialStatus::Consumed)
                | (SerialStatus::Available, SerialStatus::Damaged)
        )
    }

    /// Whether the unit counts toward the product's stock.
    #[inline]
    pub fn is_in_stock(&self) -> bool {
        *self == SerialStatus::Available
    }
}

impl fmt::Display for SerialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductSerialNumber {
    pub id: i64,
    pub product_id: i64,
    /// Globally unique among live rows.
    pub serial_number: String,
    pub status: SerialStatus,
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
pub struct NewSerialNumber {
    pub serial_number: String,
    pub created_by: Option<i64>,
}

// =============================================================================
// Service Catalog
// =============================================================================

/// A billable labour item (oil change, tune-up, ...).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub price_cents: i64,
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
pub struct NewService {
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub price_cents: i64,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateService {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub price_cents: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_transitions() {
        assert!(SerialStatus::Available.can_transition_to(SerialStatus::Consumed));
        assert!(SerialStatus::Available.can_transition_to(SerialStatus::Damaged));
        assert!(!SerialStatus::Consumed.can_transition_to(SerialStatus::Available));
        assert!(!SerialStatus::Damaged.can_transition_to(SerialStatus::Consumed));
        assert!(!SerialStatus::Available.can_transition_to(SerialStatus::Available));
    }

    #[test]
    fn test_usage_serde() {
        assert_eq!(
            serde_json::to_string(&ProductUsage::InternalUse).unwrap(),
            "\"internal_use\""
        );
    }
}
