//! # Error Types
//!
//! Domain-specific error types for torque-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  torque-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - The client-facing taxonomy both map into       │
//! │                                                                         │
//! │  torque-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  HTTP errors (apps/torque-api)                                         │
//! │  └── ApiError         - What clients see (envelope + status code)      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Client       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Kind → HTTP Status
//! ```text
//!   not_found           404     conflict / integrity   409
//!   invalid_input       400     insufficient_stock     409
//!   invalid_state       400     downstream             500
//!   invalid_transition  400
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Kind
// =============================================================================

/// Classification every error in the workspace collapses into.
///
/// The HTTP edge only looks at the kind to choose a status code, so the
/// repositories and the pure logic never need to know about HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced entity does not exist (or is soft-deleted).
    NotFound,
    /// A uniqueness constraint would be violated.
    Conflict,
    /// A referential invariant would be broken.
    Integrity,
    /// Malformed body, unparseable id, missing required field.
    InvalidInput,
    /// A precondition was not met.
    InvalidState,
    /// The requested target status is not reachable from the current one.
    InvalidTransition,
    /// Stock would go negative on a strict operation.
    InsufficientStock,
    /// Storage or network failure.
    Downstream,
}

impl ErrorKind {
    /// Machine-readable code placed in the `error` field of the envelope.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Integrity => "INTEGRITY",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorKind::Downstream => "DOWNSTREAM",
        }
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// Every variant carries enough context (entity, id, status) to build the
/// message the client sees.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity cannot be found.
    ///
    /// ## When This Occurs
    /// - The id doesn't exist in the database
    /// - The row was soft-deleted
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A live row already holds a unique value.
    ///
    /// ## When This Occurs
    /// - Creating a customer with a phone another live customer uses
    /// - Updating a vehicle plate to one that is already registered
    /// - Restoring a row whose unique value was taken while it was deleted
    #[error("{entity} with {field} '{value}' already exists")]
    Conflict {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    /// Operation would leave a referential invariant broken.
    ///
    /// ## When This Occurs
    /// - Deleting a customer that still owns live vehicles
    /// - Deleting a service job that already left the queue
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// A precondition of the operation is not met.
    ///
    /// ## When This Occurs
    /// - `queued → working` without a technician
    /// - Selling a vehicle that is not for sale
    /// - Paying an installment that is already paid
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Target status is not reachable from the current status.
    ///
    /// ## User Workflow
    /// ```text
    /// Job is `queued`
    ///      │
    ///      ▼
    /// POST /service-jobs/7/status {"status": "done"}
    ///      │
    ///      ▼
    /// InvalidTransition { entity: "service job", from: "queued", to: "done" }
    /// ```
    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Insufficient stock to complete a strict stock mutation.
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        available: i64,
        requested: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`CoreError::Conflict`].
    pub fn conflict(entity: &'static str, field: &'static str, value: impl ToString) -> Self {
        CoreError::Conflict {
            entity,
            field,
            value: value.to_string(),
        }
    }

    /// Shorthand for [`CoreError::InvalidState`].
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        CoreError::InvalidState(reason.into())
    }

    /// Classifies the error for the HTTP edge.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Conflict { .. } => ErrorKind::Conflict,
            CoreError::Integrity(_) => ErrorKind::Integrity,
            CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CoreError::Validation(_) => ErrorKind::InvalidInput,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid email, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Value is rejected for a reason specific to the field.
    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: 4,
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product 4: available 3, requested 5"
        );

        let err = CoreError::conflict("customer", "phone", "0812");
        assert_eq!(err.to_string(), "customer with phone '0812' already exists");

        let err = CoreError::InvalidTransition {
            entity: "service job",
            from: "queued".into(),
            to: "done".into(),
        };
        assert_eq!(err.to_string(), "Cannot move service job from queued to done");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(CoreError::not_found("outlet", 1).kind(), ErrorKind::NotFound);
        assert_eq!(CoreError::invalid_state("x").kind(), ErrorKind::InvalidState);
        assert_eq!(
            CoreError::Integrity("customer has vehicles".into()).kind(),
            ErrorKind::Integrity
        );

        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(ErrorKind::NotFound.code(), "NOT_FOUND");
        assert_eq!(ErrorKind::InsufficientStock.code(), "INSUFFICIENT_STOCK");
        assert_eq!(
            serde_json::to_string(&ErrorKind::InvalidTransition).unwrap(),
            "\"invalid_transition\""
        );
    }
}
