//! # Validation Module
//!
//! Input validation utilities for Torque POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP edge (torque-api)                                       │
//! │  ├── Type validation (JSON deserialization, path ids)                  │
//! │  └── Malformed input → 400 before any storage call                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Repository (torque-db)                                       │
//! │  ├── THIS MODULE: field rules, normalisation                           │
//! │  └── Live-row uniqueness pre-checks (phone, plate, sku, ...)           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock >= 0), NOT NULL                                      │
//! │  ├── Partial UNIQUE indexes WHERE deleted_at IS NULL                   │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validators that normalise (trim, lower-case, upper-case) return the value
//! that must be stored.

use crate::error::ValidationError;
use crate::{MAX_INSTALLMENTS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted free-text name.
const MAX_NAME_LEN: usize = 200;

/// Longest accepted identifier-like value (plate, chassis, serial, sku).
const MAX_CODE_LEN: usize = 50;

// =============================================================================
// String Validators
// =============================================================================

/// Trims and checks a required text field.
///
/// ## Example
/// ```rust
/// use torque_core::validation::validate_required;
///
/// assert_eq!(validate_required("name", "  Bengkel Jaya ", 200).unwrap(), "Bengkel Jaya");
/// assert!(validate_required("name", "   ", 200).is_err());
/// ```
pub fn validate_required(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Validates a display name (outlet, customer, product, service, user).
pub fn validate_name(field: &str, value: &str) -> ValidationResult<String> {
    validate_required(field, value, MAX_NAME_LEN)
}

/// Trims an optional text field; blank becomes `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validates a phone number.
///
/// ## Rules
/// - Must not be empty
/// - Digits plus `+`, `-`, spaces and parentheses
/// - At most 30 characters
pub fn validate_phone(phone: &str) -> ValidationResult<String> {
    let phone = validate_required("phone", phone, 30)?;

    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must contain only digits, spaces, '+', '-', '(' and ')'".to_string(),
        });
    }

    if !phone.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must contain at least one digit".to_string(),
        });
    }

    Ok(phone)
}

/// Validates and lower-cases an email address.
///
/// The check is deliberately permissive: one `@`, a non-empty local part and
/// a dotted domain without whitespace.
///
/// ## Example
/// ```rust
/// use torque_core::validation::validate_email;
///
/// assert_eq!(validate_email(" Ana@Torque.ID ").unwrap(), "ana@torque.id");
/// assert!(validate_email("ana@localhost").is_err());
/// assert!(validate_email("no-at-sign").is_err());
/// ```
pub fn validate_email(email: &str) -> ValidationResult<String> {
    let email = validate_required("email", email, 254)?.to_lowercase();

    let invalid = || ValidationError::InvalidFormat {
        field: "email".to_string(),
        reason: "must look like name@example.com".to_string(),
    };

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }

    Ok(email)
}

/// Validates a new password. Only length is enforced.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < 8 {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: 8,
        });
    }

    if password.len() > 128 {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: 128,
        });
    }

    Ok(())
}

/// Validates and upper-cases a vehicle identity number (plate, chassis, engine).
///
/// ## Example
/// ```rust
/// use torque_core::validation::validate_identity_number;
///
/// assert_eq!(validate_identity_number("plate_number", " b 1234 cd ").unwrap(), "B 1234 CD");
/// ```
pub fn validate_identity_number(field: &str, value: &str) -> ValidationResult<String> {
    Ok(validate_required(field, value, MAX_CODE_LEN)?.to_uppercase())
}

/// Validates a SKU, barcode or serial number.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only letters, numbers, hyphens, underscores, dots and slashes
pub fn validate_code(field: &str, value: &str) -> ValidationResult<String> {
    let value = validate_required(field, value, MAX_CODE_LEN)?;

    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, '-', '_', '.' and '/'".to_string(),
        });
    }

    Ok(value)
}

/// Validates a search query.
///
/// ## Rules
/// - Can be empty (returns the first page unfiltered)
/// - Maximum 100 characters
///
/// ## Returns
/// The trimmed query string.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line-item quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price or cost in cents. Zero is allowed (free labour, warranty parts).
///
/// ## Example
/// ```rust
/// use torque_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents("unit_price", 10_000).is_ok());
/// assert!(validate_price_cents("unit_price", 0).is_ok());
/// assert!(validate_price_cents("unit_price", -100).is_err());
/// ```
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates an amount that must be strictly positive (payments, cash flows).
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates an outlet UTC offset (UTC−12:00 through UTC+14:00).
pub fn validate_utc_offset(minutes: i32) -> ValidationResult<()> {
    if !(-720..=840).contains(&minutes) {
        return Err(ValidationError::OutOfRange {
            field: "utc_offset_minutes".to_string(),
            min: -720,
            max: 840,
        });
    }

    Ok(())
}

/// Validates a model year.
pub fn validate_year(year: i32) -> ValidationResult<()> {
    if !(1900..=2100).contains(&year) {
        return Err(ValidationError::OutOfRange {
            field: "year".to_string(),
            min: 1900,
            max: 2100,
        });
    }

    Ok(())
}

/// Validates the number of installments.
pub fn validate_installment_count(count: i64) -> ValidationResult<()> {
    if !(1..=MAX_INSTALLMENTS).contains(&count) {
        return Err(ValidationError::OutOfRange {
            field: "installment.count".to_string(),
            min: 1,
            max: MAX_INSTALLMENTS,
        });
    }

    Ok(())
}

/// Validates an interest rate in basis points.
///
/// ## Rules
/// - Must be between 0 and 10000 (0% to 100%)
pub fn validate_interest_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "installment.interest_rate_bps".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates a list of ids: non-empty and free of duplicates.
pub fn validate_id_list(field: &str, ids: &[i64]) -> ValidationResult<()> {
    if ids.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(*id) {
            return Err(ValidationError::Invalid {
                field: field.to_string(),
                reason: format!("id {} appears more than once", id),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required() {
        assert_eq!(validate_name("name", " Jaya Motor ").unwrap(), "Jaya Motor");
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", &"A".repeat(300)).is_err());
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_optional(Some("  Jl. Sudirman ")), Some("Jl. Sudirman".into()));
        assert_eq!(normalize_optional(Some("   ")), None);
        assert_eq!(normalize_optional(None), None);
    }

    #[test]
    fn test_validate_phone() {
        assert_eq!(validate_phone(" +62 812-3456 ").unwrap(), "+62 812-3456");
        assert!(validate_phone("").is_err());
        assert!(validate_phone("call me").is_err());
        assert!(validate_phone("+-").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("Budi@Example.com").unwrap(), "budi@example.com");
        assert!(validate_email("budi@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("budi@@example.com").is_err());
        assert!(validate_email("bu di@example.com").is_err());
        assert!(validate_email("budi@example..com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("s3cret-pass").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_identity_and_codes() {
        assert_eq!(validate_identity_number("plate_number", "b 1 xy").unwrap(), "B 1 XY");
        assert!(validate_identity_number("engine_number", " ").is_err());

        assert!(validate_code("sku", "OIL-10W40").is_ok());
        assert!(validate_code("sku", "has space").is_err());
        assert!(validate_code("sku", &"A".repeat(60)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_price_cents("price", 0).is_ok());
        assert!(validate_price_cents("price", -1).is_err());
        assert!(validate_amount_cents("amount", 1).is_ok());
        assert!(validate_amount_cents("amount", 0).is_err());
    }

    #[test]
    fn test_validate_ranges() {
        assert!(validate_utc_offset(420).is_ok());
        assert!(validate_utc_offset(-720).is_ok());
        assert!(validate_utc_offset(900).is_err());

        assert!(validate_installment_count(1).is_ok());
        assert!(validate_installment_count(60).is_ok());
        assert!(validate_installment_count(0).is_err());
        assert!(validate_installment_count(61).is_err());

        assert!(validate_interest_rate_bps(250).is_ok());
        assert!(validate_interest_rate_bps(10_001).is_err());

        assert!(validate_year(2019).is_ok());
        assert!(validate_year(1800).is_err());
    }

    #[test]
    fn test_validate_id_list() {
        assert!(validate_id_list("ids", &[3, 1, 2]).is_ok());
        assert!(validate_id_list("ids", &[]).is_err());
        assert!(validate_id_list("ids", &[1, 2, 1]).is_err());
    }
}
