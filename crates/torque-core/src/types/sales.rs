//! Vehicle sales, installment plans and the cash-flow book.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleKind {
    Cash,
    Installment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    EWallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleTransactionStatus {
    Successful,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Active,
    Completed,
    Defaulted,
}

impl InstallmentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Active => "active",
            InstallmentStatus::Completed => "completed",
            InstallmentStatus::Defaulted => "defaulted",
        }
    }
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one scheduled payment.
///
/// ```text
/// pending ──(overdue sweep / late payment)──► late ──► paid
///    └──────────────(on-time payment)─────────────────► paid
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Late,
    Skipped,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Late => "late",
            PaymentStatus::Skipped => "skipped",
        }
    }

    /// Still owed by the buyer.
    #[inline]
    pub fn is_outstanding(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Late)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sale Transaction
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct VehicleSale {
    pub id: i64,
    pub vehicle_id: i64,
    pub customer_id: i64,
    pub sale_price_cents: i64,
    pub down_payment_cents: Option<i64>,
    #[ts(as = "String")]
    pub sale_at: DateTime<Utc>,
    pub kind: SaleKind,
    pub payment_method: PaymentMethod,
    pub status: SaleTransactionStatus,
    pub sales_person_id: Option<i64>,
    /// Sale price − purchase price − reconditioning actual costs.
    pub profit_cents: i64,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Financing terms of an installment sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InstallmentTerms {
    /// Number of monthly payments, 1..=60.
    pub count: i64,
    /// Flat interest on the financed amount.
    pub interest_rate_bps: Option<u32>,
    #[ts(as = "String")]
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewVehicleSale {
    pub vehicle_id: i64,
    pub customer_id: i64,
    pub sale_price_cents: i64,
    pub kind: SaleKind,
    pub payment_method: PaymentMethod,
    pub down_payment_cents: Option<i64>,
    pub sales_person_id: Option<i64>,
    pub installment: Option<InstallmentTerms>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

/// The only mutable bits of a recorded sale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateVehicleSale {
    pub payment_method: Option<PaymentMethod>,
    pub sales_person_id: Option<i64>,
    pub notes: Option<String>,
}

/// A sale together with its plan, as returned by the sell operation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleReceipt {
    pub sale: VehicleSale,
    pub installment: Option<VehicleInstallment>,
    pub payments: Vec<InstallmentPayment>,
}

// =============================================================================
// Installment
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct VehicleInstallment {
    pub id: i64,
    pub sale_id: i64,
    /// Sale price.
    pub total_amount_cents: i64,
    pub down_payment_cents: i64,
    /// (total − down payment) with interest applied.
    pub financed_amount_cents: i64,
    pub installment_amount_cents: i64,
    pub installment_count: i64,
    pub interest_rate_bps: Option<i64>,
    #[ts(as = "String")]
    pub start_date: NaiveDate,
    #[ts(as = "String")]
    pub end_date: NaiveDate,
    pub status: InstallmentStatus,
    pub remaining_balance_cents: i64,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VehicleInstallment {
    #[inline]
    pub fn remaining_balance(&self) -> Money {
        Money::from_cents(self.remaining_balance_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InstallmentPayment {
    pub id: i64,
    pub installment_id: i64,
    pub payment_number: i64,
    #[ts(as = "String")]
    pub due_date: NaiveDate,
    pub due_amount_cents: i64,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_amount_cents: Option<i64>,
    pub late_fee_cents: Option<i64>,
    pub payment_method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub status: PaymentStatus,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl InstallmentPayment {
    #[inline]
    pub fn due_amount(&self) -> Money {
        Money::from_cents(self.due_amount_cents)
    }
}

/// Body of `POST /installment-payments/{id}/pay`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PayInstallment {
    pub paid_amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

// =============================================================================
// Cash Flow
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CashFlowType {
    Inflow,
    Outflow,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashFlow {
    pub id: i64,
    pub outlet_id: Option<i64>,
    pub flow_type: CashFlowType,
    /// Free-form label, e.g. `vehicle_sale`, `parts_purchase`.
    pub source: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub flow_date: NaiveDate,
    pub user_id: i64,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCashFlow {
    pub outlet_id: Option<i64>,
    pub flow_type: CashFlowType,
    pub source: String,
    pub amount_cents: i64,
    /// Defaults to today (UTC).
    #[ts(as = "Option<String>")]
    pub flow_date: Option<NaiveDate>,
    pub user_id: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateCashFlow {
    pub source: Option<String>,
    pub amount_cents: Option<i64>,
    #[ts(as = "Option<String>")]
    pub flow_date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashFlowFilter {
    pub outlet_id: Option<i64>,
    #[ts(as = "Option<String>")]
    pub from: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashFlowSummary {
    pub inflow_cents: i64,
    pub outflow_cents: i64,
    pub net_cents: i64,
}
