//! # torque-core: Pure Business Logic for Torque POS
//!
//! This crate is the **heart** of the Torque workshop POS. It contains the
//! business rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Torque POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    torque-api (axum)                            │   │
//! │  │    JSON envelope, routes, error → status mapping                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    torque-db (Database Layer)                   │   │
//! │  │    repositories, transactions, migrations                       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls into                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ torque-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌──────────────┐  ┌─────────┐ │   │
//! │  │   │   types   │  │   money    │  │ service_job  │  │ install │ │   │
//! │  │   │  entities │  │   Money    │  │ transitions  │  │  -ment  │ │   │
//! │  │   │  payloads │  │   Rate     │  │ totals/queue │  │ schedule│ │   │
//! │  │   └───────────┘  └────────────┘  └──────────────┘  └─────────┘ │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌──────────────┐              │   │
//! │  │   │   clock   │  │ validation │  │reconditioning│              │   │
//! │  │   └───────────┘  └────────────┘  └──────────────┘              │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities and request payloads
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`clock`] - Injected time source and civil-date helpers
//! - [`error`] - Domain error types and the client-facing [`ErrorKind`]
//! - [`validation`] - Field rules and normalisation
//! - [`service_job`] - Service-job state machine, totals, queue planning
//! - [`reconditioning`] - Reconditioning state machine and detail rules
//! - [`installment`] - Installment schedule, late fees, realised profit
//!
//! ## Example Usage
//!
//! ```rust
//! use torque_core::money::Money;
//! use torque_core::service_job::{compute_totals, LineItem};
//! use torque_core::types::ItemKind;
//!
//! let totals = compute_totals([
//!     LineItem::new(ItemKind::Service, 2, Money::from_cents(10_000), Money::from_cents(4_000)),
//!     LineItem::new(ItemKind::Product, 1, Money::from_cents(5_000), Money::from_cents(3_000)),
//! ]);
//!
//! assert_eq!(totals.grand_total.cents(), 25_000);
//! assert_eq!(totals.technician_commission.cents(), 2_000);
//! assert_eq!(totals.shop_profit.cents(), 12_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod installment;
pub mod money;
pub mod reconditioning;
pub mod service_job;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use torque_core::Money` instead of
// `use torque_core::money::Money`

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Technician commission on service (labour) lines: 10%.
pub const COMMISSION_RATE_BPS: u32 = 1_000;

/// Late fee per started 30-day period: 1% of the due amount.
pub const LATE_FEE_BPS_PER_PERIOD: u32 = 100;

/// Length of one late-fee period in days.
pub const LATE_FEE_PERIOD_DAYS: i64 = 30;

/// Longest installment plan, in monthly payments.
pub const MAX_INSTALLMENTS: i64 = 60;

/// Largest quantity accepted on a single line item.
///
/// ## Business Reason
/// Catches typos (10000 instead of 10) before they touch the stock counter.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Page size used when a list request gives no `limit`.
pub const DEFAULT_PAGE_LIMIT: i64 = 10;

/// Upper clamp for `limit`.
pub const MAX_PAGE_LIMIT: i64 = 100;
