//! # Domain Types
//!
//! Core domain types used throughout Torque POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  registry            inventory             service                     │
//! │  ─────────────       ─────────────         ─────────────               │
//! │  Outlet              Product               ServiceJob                  │
//! │  User                ProductSerialNumber   ServiceDetail               │
//! │  Customer            Service (catalog)     ServiceJobHistory           │
//! │  CustomerVehicle                                                        │
//! │                                                                         │
//! │  showroom                        sales                                 │
//! │  ─────────────                   ─────────────                         │
//! │  Vehicle                         VehicleSale                           │
//! │  VehicleReconditioningJob        VehicleInstallment                    │
//! │  ReconditioningDetail            InstallmentPayment                    │
//! │                                  CashFlow                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conventions
//! - Ids are dense SQLite rowids (`i64`)
//! - Money fields are integer cents and end in `_cents`
//! - Every entity carries `created_at`, `updated_at`, `created_by`, `deleted_at`
//! - `New*` structs are create payloads, `Update*` structs are partial patches
//!   where `None` leaves the column untouched

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

pub mod inventory;
pub mod registry;
pub mod sales;
pub mod service;
pub mod showroom;

pub use inventory::*;
pub use registry::*;
pub use sales::*;
pub use service::*;
pub use showroom::*;

// =============================================================================
// Rate
// =============================================================================

/// Percentage represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1000 bps = 10% (technician commission)
/// 250 bps = 2.5% (a typical installment interest rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a whole percentage.
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        Rate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Normalised `limit`/`offset` pair for list and search queries.
///
/// ```text
///   limit:  None → 10,   < 1 → 1,   > 100 → 100
///   offset: None → 0,    < 0 → 0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Page {
            limit: limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate() {
        assert_eq!(Rate::from_percent(10).bps(), 1000);
        assert!(Rate::default().is_zero());
    }

    #[test]
    fn test_page_clamping() {
        assert_eq!(Page::default(), Page { limit: 10, offset: 0 });
        assert_eq!(Page::new(Some(0), Some(-5)), Page { limit: 1, offset: 0 });
        assert_eq!(Page::new(Some(5000), Some(20)), Page { limit: 100, offset: 20 });
    }
}
