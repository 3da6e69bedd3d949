//! # Installment Math
//!
//! Schedule generation, late fees, payment settlement and realised profit for
//! vehicle sales.
//!
//! ## Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sale 12000.00, down payment 2000.00, N = 4, no interest               │
//! │                                                                         │
//! │  financed  = (12000.00 − 2000.00) × (1 + r)      = 10000.00            │
//! │  per share = financed / N  (half-to-even)        =  2500.00            │
//! │  last      = financed − per share × (N − 1)      =  2500.00            │
//! │                                                                         │
//! │  start 2024-01-15 → due 02-15, 03-15, 04-15, 05-15                     │
//! │  start 2024-01-31 → due 02-29, 03-31, 04-30, ...  (month-end clamp)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Late Fee
//! ```text
//!   D = days(paid_on − due_date)      (only when D > 0)
//!   M = ⌊D / 30⌋ + 1                  (started 30-day periods)
//!   fee = due_amount × M × 1%         (half-to-even)
//! ```

use chrono::{Months, NaiveDate};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{InstallmentStatus, InstallmentTerms, PaymentStatus, Rate, SaleKind};
use crate::validation::{validate_installment_count, validate_interest_rate_bps};
use crate::{LATE_FEE_BPS_PER_PERIOD, LATE_FEE_PERIOD_DAYS};

// =============================================================================
// Sale Validation
// =============================================================================

/// Checks price, down payment and terms of a sale before anything is written.
///
/// ## Rules
/// - sale price > 0
/// - installment: down payment and terms required, 0 < down payment < price,
///   1 ≤ N ≤ 60, interest ≤ 100%
/// - cash: no terms, down payment (if any) within 0..=price
pub fn validate_sale_terms(
    kind: SaleKind,
    sale_price: Money,
    down_payment: Option<Money>,
    terms: Option<&InstallmentTerms>,
) -> CoreResult<()> {
    if !sale_price.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "sale_price".to_string(),
        }
        .into());
    }

    match kind {
        SaleKind::Installment => {
            let dp = down_payment.ok_or_else(|| ValidationError::Required {
                field: "down_payment".to_string(),
            })?;
            if !dp.is_positive() || dp >= sale_price {
                return Err(ValidationError::Invalid {
                    field: "down_payment".to_string(),
                    reason: "must be greater than zero and less than the sale price".to_string(),
                }
                .into());
            }

            let terms = terms.ok_or_else(|| ValidationError::Required {
                field: "installment".to_string(),
            })?;
            validate_installment_count(terms.count)?;
            if let Some(bps) = terms.interest_rate_bps {
                validate_interest_rate_bps(bps)?;
            }
        }
        SaleKind::Cash => {
            if terms.is_some() {
                return Err(ValidationError::Invalid {
                    field: "installment".to_string(),
                    reason: "only installment sales carry installment terms".to_string(),
                }
                .into());
            }
            if let Some(dp) = down_payment {
                if dp.is_negative() || dp > sale_price {
                    return Err(ValidationError::Invalid {
                        field: "down_payment".to_string(),
                        reason: "must be between zero and the sale price".to_string(),
                    }
                    .into());
                }
            }
        }
    }

    Ok(())
}

// =============================================================================
// Schedule
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPayment {
    pub payment_number: i64,
    pub due_date: NaiveDate,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallmentPlan {
    pub total_amount: Money,
    pub down_payment: Money,
    pub financed_amount: Money,
    pub installment_amount: Money,
    pub count: i64,
    pub interest_rate: Option<Rate>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub schedule: Vec<ScheduledPayment>,
}

/// `date + months` with month-end clamping (Jan 31 + 1 month = Feb 28/29).
pub fn add_months(date: NaiveDate, months: i64) -> CoreResult<NaiveDate> {
    u32::try_from(months)
        .ok()
        .and_then(|m| date.checked_add_months(Months::new(m)))
        .ok_or_else(|| {
            ValidationError::Invalid {
                field: "installment.start_date".to_string(),
                reason: "schedule runs past the supported calendar".to_string(),
            }
            .into()
        })
}

/// Builds the installment plan and its N payment rows.
///
/// Every share is the half-to-even rounded `financed / N`, except the last
/// one which absorbs the rounding drift so the shares add up to exactly the
/// financed amount.
pub fn plan_installments(
    sale_price: Money,
    down_payment: Money,
    terms: &InstallmentTerms,
) -> CoreResult<InstallmentPlan> {
    validate_sale_terms(SaleKind::Installment, sale_price, Some(down_payment), Some(terms))?;

    let principal = sale_price - down_payment;
    let interest_rate = terms
        .interest_rate_bps
        .filter(|bps| *bps > 0)
        .map(Rate::from_bps);
    let financed_amount = match interest_rate {
        Some(rate) => principal.scale(10_000 + rate.bps() as i64, 10_000),
        None => principal,
    };

    let n = terms.count;
    let installment_amount = financed_amount.divide_even(n);
    let last_amount = financed_amount - installment_amount * (n - 1);

    let mut schedule = Vec::with_capacity(n as usize);
    for k in 1..=n {
        schedule.push(ScheduledPayment {
            payment_number: k,
            due_date: add_months(terms.start_date, k)?,
            amount: if k == n { last_amount } else { installment_amount },
        });
    }

    Ok(InstallmentPlan {
        total_amount: sale_price,
        down_payment,
        financed_amount,
        installment_amount,
        count: n,
        interest_rate,
        start_date: terms.start_date,
        end_date: add_months(terms.start_date, n)?,
        schedule,
    })
}

// =============================================================================
// Late Fees & Payments
// =============================================================================

/// Late fee for a payment due on `due_date` and paid on `paid_on`.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use torque_core::installment::late_fee;
/// use torque_core::money::Money;
///
/// let due = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
/// let paid = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(); // 65 days late
/// assert_eq!(late_fee(Money::from_cents(50_000), due, paid).cents(), 1_500);
/// ```
pub fn late_fee(due_amount: Money, due_date: NaiveDate, paid_on: NaiveDate) -> Money {
    let days_late = (paid_on - due_date).num_days();
    if days_late <= 0 {
        return Money::zero();
    }

    let periods = days_late / LATE_FEE_PERIOD_DAYS + 1;
    due_amount.scale(periods * LATE_FEE_BPS_PER_PERIOD as i64, 10_000)
}

/// An outstanding payment whose due date has passed.
#[inline]
pub fn is_overdue(due_date: NaiveDate, status: PaymentStatus, today: NaiveDate) -> bool {
    due_date < today && status.is_outstanding()
}

/// Everything that changes when a payment is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// The payment was overdue (it passes through `late` before `paid`).
    pub was_late: bool,
    pub late_fee: Money,
    pub remaining_balance: Money,
    pub installment_completed: bool,
}

/// Applies a payment to its installment.
///
/// ## Errors
/// - `invalid_state` if the plan is not active or the payment is not outstanding
/// - `invalid_input` if the paid amount is not positive
#[allow(clippy::too_many_arguments)]
pub fn settle_payment(
    installment_status: InstallmentStatus,
    payment_status: PaymentStatus,
    due_amount: Money,
    due_date: NaiveDate,
    paid_on: NaiveDate,
    paid_amount: Money,
    remaining_balance: Money,
) -> CoreResult<Settlement> {
    if installment_status != InstallmentStatus::Active {
        return Err(CoreError::invalid_state(format!(
            "installment is {} and accepts no payments",
            installment_status
        )));
    }

    if !payment_status.is_outstanding() {
        return Err(CoreError::invalid_state(format!(
            "payment is already {}",
            payment_status
        )));
    }

    if !paid_amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "paid_amount".to_string(),
        }
        .into());
    }

    let was_late = paid_on > due_date;
    let fee = late_fee(due_amount, due_date, paid_on);
    let remaining = remaining_balance - paid_amount;
    let installment_completed = !remaining.is_positive();

    Ok(Settlement {
        was_late,
        late_fee: fee,
        remaining_balance: remaining.clamp_non_negative(),
        installment_completed,
    })
}

// =============================================================================
// Profit
// =============================================================================

/// Sale price minus purchase price minus every recorded reconditioning cost.
pub fn realised_profit<I>(sale_price: Money, purchase_price: Money, reconditioning_costs: I) -> Money
where
    I: IntoIterator<Item = Money>,
{
    let reconditioning: Money = reconditioning_costs.into_iter().sum();
    sale_price - purchase_price - reconditioning
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn terms(count: i64, bps: Option<u32>, start: NaiveDate) -> InstallmentTerms {
        InstallmentTerms {
            count,
            interest_rate_bps: bps,
            start_date: start,
        }
    }

    #[test]
    fn test_even_schedule() {
        let plan = plan_installments(
            Money::from_cents(1_200_000),
            Money::from_cents(200_000),
            &terms(4, None, date(2024, 1, 15)),
        )
        .unwrap();

        assert_eq!(plan.financed_amount.cents(), 1_000_000);
        assert_eq!(plan.installment_amount.cents(), 250_000);
        assert_eq!(plan.end_date, date(2024, 5, 15));

        let due: Vec<_> = plan.schedule.iter().map(|p| p.due_date).collect();
        assert_eq!(
            due,
            vec![date(2024, 2, 15), date(2024, 3, 15), date(2024, 4, 15), date(2024, 5, 15)]
        );
        assert!(plan.schedule.iter().all(|p| p.amount.cents() == 250_000));
        assert_eq!(
            plan.schedule.iter().map(|p| p.payment_number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_last_payment_absorbs_drift() {
        let plan = plan_installments(
            Money::from_cents(1_100_000),
            Money::from_cents(100_000),
            &terms(3, None, date(2024, 1, 1)),
        )
        .unwrap();

        let amounts: Vec<i64> = plan.schedule.iter().map(|p| p.amount.cents()).collect();
        assert_eq!(amounts, vec![333_333, 333_333, 333_334]);
        let total: Money = plan.schedule.iter().map(|p| p.amount).sum();
        assert_eq!(total, plan.financed_amount);
    }

    #[test]
    fn test_interest_applied_to_financed_amount() {
        // 10000.00 at 2.5% = 10250.00 over 4 = 2562.50
        let plan = plan_installments(
            Money::from_cents(1_200_000),
            Money::from_cents(200_000),
            &terms(4, Some(250), date(2024, 1, 15)),
        )
        .unwrap();
        assert_eq!(plan.financed_amount.cents(), 1_025_000);
        assert_eq!(plan.installment_amount.cents(), 256_250);
        assert_eq!(plan.interest_rate, Some(Rate::from_bps(250)));
    }

    #[test]
    fn test_month_end_clamping() {
        let plan = plan_installments(
            Money::from_cents(400_000),
            Money::from_cents(100_000),
            &terms(3, None, date(2024, 1, 31)),
        )
        .unwrap();
        let due: Vec<_> = plan.schedule.iter().map(|p| p.due_date).collect();
        assert_eq!(due, vec![date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]);
    }

    #[test]
    fn test_sale_term_validation() {
        let price = Money::from_cents(1_000_000);
        let t = terms(12, None, date(2024, 1, 1));

        assert!(validate_sale_terms(SaleKind::Cash, price, None, None).is_ok());
        assert!(validate_sale_terms(SaleKind::Cash, price, None, Some(&t)).is_err());
        assert!(validate_sale_terms(SaleKind::Cash, Money::zero(), None, None).is_err());

        let dp = Some(Money::from_cents(100_000));
        assert!(validate_sale_terms(SaleKind::Installment, price, dp, Some(&t)).is_ok());
        assert!(validate_sale_terms(SaleKind::Installment, price, None, Some(&t)).is_err());
        assert!(validate_sale_terms(SaleKind::Installment, price, dp, None).is_err());
        assert!(validate_sale_terms(SaleKind::Installment, price, Some(price), Some(&t)).is_err());
        assert!(validate_sale_terms(SaleKind::Installment, price, Some(Money::zero()), Some(&t)).is_err());

        let too_long = terms(61, None, date(2024, 1, 1));
        assert!(validate_sale_terms(SaleKind::Installment, price, dp, Some(&too_long)).is_err());
    }

    #[test]
    fn test_late_fee() {
        let due = date(2024, 1, 15);
        let amount = Money::from_cents(50_000);

        assert_eq!(late_fee(amount, due, date(2024, 1, 15)), Money::zero());
        assert_eq!(late_fee(amount, due, date(2024, 1, 10)), Money::zero());
        assert_eq!(late_fee(amount, due, date(2024, 1, 16)).cents(), 500); // M = 1
        assert_eq!(late_fee(amount, due, date(2024, 2, 14)).cents(), 1_000); // 30 days, M = 2
        assert_eq!(late_fee(amount, due, date(2024, 3, 20)).cents(), 1_500); // 65 days, M = 3
    }

    #[test]
    fn test_overdue() {
        let today = date(2024, 3, 1);
        assert!(is_overdue(date(2024, 2, 15), PaymentStatus::Pending, today));
        assert!(is_overdue(date(2024, 2, 15), PaymentStatus::Late, today));
        assert!(!is_overdue(date(2024, 2, 15), PaymentStatus::Paid, today));
        assert!(!is_overdue(date(2024, 3, 1), PaymentStatus::Pending, today));
    }

    #[test]
    fn test_settle_on_time_and_late() {
        let due = date(2024, 1, 15);
        let on_time = settle_payment(
            InstallmentStatus::Active,
            PaymentStatus::Pending,
            Money::from_cents(50_000),
            due,
            date(2024, 1, 14),
            Money::from_cents(50_000),
            Money::from_cents(200_000),
        )
        .unwrap();
        assert!(!on_time.was_late);
        assert_eq!(on_time.late_fee, Money::zero());
        assert_eq!(on_time.remaining_balance.cents(), 150_000);
        assert!(!on_time.installment_completed);

        let late = settle_payment(
            InstallmentStatus::Active,
            PaymentStatus::Pending,
            Money::from_cents(50_000),
            due,
            date(2024, 3, 20),
            Money::from_cents(51_500),
            Money::from_cents(50_000),
        )
        .unwrap();
        assert!(late.was_late);
        assert_eq!(late.late_fee.cents(), 1_500);
        assert_eq!(late.remaining_balance, Money::zero());
        assert!(late.installment_completed);
    }

    #[test]
    fn test_settle_rejections() {
        let due = date(2024, 1, 15);
        let settle = |inst, pay, amount| {
            settle_payment(inst, pay, Money::from_cents(50_000), due, due, amount, Money::from_cents(50_000))
        };

        assert_eq!(
            settle(InstallmentStatus::Active, PaymentStatus::Paid, Money::from_cents(1))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            settle(InstallmentStatus::Defaulted, PaymentStatus::Pending, Money::from_cents(1))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            settle(InstallmentStatus::Active, PaymentStatus::Pending, Money::zero())
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_realised_profit() {
        let profit = realised_profit(
            Money::from_cents(6_000_000),
            Money::from_cents(5_000_000),
            [Money::from_cents(300_000), Money::from_cents(150_000)],
        );
        assert_eq!(profit.cents(), 550_000);

        assert_eq!(
            realised_profit(Money::from_cents(100), Money::from_cents(150), []).cents(),
            -50
        );
    }
}
