//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  In a workshop:                                                         │
//! │    10000.00 financed over 3 instalments = 3333.33 × 3 = 9999.99         │
//! │    → 0.01 vanished from the books                                       │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    All amounts are i64 cents, every division rounds half-to-even and   │
//! │    the caller decides where the remainder goes (last instalment).      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use torque_core::money::Money;
//!
//! let labour = Money::from_cents(10_000); // 100.00
//! let line = labour * 2;                  // 200.00
//! assert_eq!(line.to_string(), "200.00");
//!
//! // Parsing keeps exactly two fractional digits
//! let price: Money = "12000.00".parse().unwrap();
//! assert_eq!(price.cents(), 1_200_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::Rate;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for profit/loss and balances
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support; serialized as integer cents
///
/// ## Where Money is Used
/// ```text
/// ServiceDetail.unit_price × quantity ──► ServiceTotals.grand_total
///                                    └──► technician commission (10%)
///
/// Sale price − down payment ──► financed amount ──► instalment amounts
///                                                └─► late fees
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use torque_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // Represents 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Note
    /// For negative amounts, only the major unit should be negative.
    /// `from_major_minor(-5, 50)` = -5.50, not -4.50
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (cents) portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies money by a quantity.
    ///
    /// Cents × integer quantity is exact, no rounding involved.
    ///
    /// ## Example
    /// ```rust
    /// use torque_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Applies a rate (in basis points) using Bankers Rounding.
    ///
    /// ## Bankers Rounding Explained
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  BANKERS ROUNDING (Round Half to Even)                              │
    /// │                                                                     │
    /// │  Standard rounding always rounds 0.5 UP, causing systematic bias:  │
    /// │    0.5 → 1, 1.5 → 2, 2.5 → 3, 3.5 → 4 (always up = +bias)         │
    /// │                                                                     │
    /// │  Bankers Rounding rounds 0.5 to nearest EVEN number:               │
    /// │    0.5 → 0, 1.5 → 2, 2.5 → 2, 3.5 → 4 (alternates = no bias)      │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use torque_core::money::Money;
    /// use torque_core::types::Rate;
    ///
    /// // 10% commission on 200.00
    /// let commission = Money::from_cents(20_000).apply_rate(Rate::from_bps(1000));
    /// assert_eq!(commission.cents(), 2_000);
    ///
    /// // 0.125 → 0.12 (tie goes to the even cent)
    /// assert_eq!(Money::from_cents(125).apply_rate(Rate::from_bps(1000)).cents(), 12);
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        self.scale(rate.bps() as i64, 10_000)
    }

    /// Multiplies by `numerator / denominator`, rounding half to even.
    ///
    /// i128 intermediate prevents overflow on large amounts.
    pub fn scale(&self, numerator: i64, denominator: i64) -> Money {
        debug_assert!(denominator > 0, "denominator must be positive");
        let product = self.0 as i128 * numerator as i128;
        Money(div_round_half_even(product, denominator as i128) as i64)
    }

    /// Splits the amount into `parts` equal shares, rounding half to even.
    ///
    /// The rounding drift is NOT redistributed here; callers that need the
    /// shares to add back up (instalments) put the remainder on the last share.
    pub fn divide_even(&self, parts: i64) -> Money {
        self.scale(1, parts)
    }

    /// Clamps negative values to zero.
    #[inline]
    pub fn clamp_non_negative(&self) -> Money {
        if self.0 < 0 {
            Money::zero()
        } else {
            *self
        }
    }
}

/// Integer division rounding to nearest, ties to even.
///
/// `denominator` must be positive. Uses floor division so negative
/// numerators round the same way as positive ones.
pub(crate) fn div_round_half_even(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator.div_euclid(denominator);
    let remainder = numerator.rem_euclid(denominator);
    let twice = remainder * 2;

    if twice > denominator || (twice == denominator && quotient % 2 != 0) {
        quotient + 1
    } else {
        quotient
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display renders a plain two-decimal amount, e.g. `12000.00` or `-5.50`.
///
/// There is no currency symbol: the workshop runs in a single currency.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

/// Parses `"1234"`, `"1234.5"` or `"1234.56"` (optionally signed).
///
/// More than two fractional digits is rejected rather than rounded.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected digits before the decimal point"));
        }
        if fraction.len() > 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("at most two fractional digits are allowed"));
        }

        let major: i64 = whole.parse().map_err(|_| invalid("amount is too large"))?;
        let minor: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid("bad fraction"))? * 10,
            _ => fraction.parse::<i64>().map_err(|_| invalid("bad fraction"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by i64 (for quantity calculations).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
