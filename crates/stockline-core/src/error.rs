//! # Error Types
//!
//! Domain-specific error types for stockline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockline-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule outcomes                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockline-db errors (separate crate)                                  │
//! │  └── DbError          - Storage failures, wraps CoreError              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product, location, amounts)
//! 3. Errors are enum variants, never String
//! 4. Business outcomes (not enough stock) are not faults

use thiserror::Error;

use crate::stock::Location;
use crate::types::TransactionStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the stock engines.
///
/// Every variant is a rejected request, not a system fault: the caller can
/// show it to the user as-is.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A product, location, association or transaction does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Not enough stock at a location to cover a decrement.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 6)
    ///      │
    ///      ▼
    /// Merchant stock: available=5
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: "P", requested: 6, available: 5 }
    ///      │
    ///      ▼
    /// Nothing persisted, caller shows "Only 5 left"
    /// ```
    #[error(
        "Insufficient stock for product {product_id} at {location}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: String,
        location: Location,
        requested: i64,
        available: i64,
    },

    /// A checkout line names a product the merchant does not carry.
    #[error("Product {product_id} is not available at merchant {merchant_id}")]
    ProductNotAvailable {
        product_id: String,
        merchant_id: String,
    },

    /// A transaction status change the state machine forbids.
    #[error("Transaction {transaction_id} cannot move from {from} to {to}")]
    InvalidTransition {
        transaction_id: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any stock row is read or written.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

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

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Same value appears twice where it must be unique.
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },

    /// Transfer source and destination are the same location.
    #[error("Source and destination are the same location: {location}")]
    SameLocation { location: Location },

    /// Arithmetic on the input would overflow.
    #[error("{field} is too large to compute")]
    Overflow { field: String },
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
    fn test_insufficient_stock_message_names_product_and_amounts() {
        let err = CoreError::InsufficientStock {
            product_id: "P-1".to_string(),
            location: Location::merchant("M-1"),
            requested: 6,
            available: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product P-1 at merchant:M-1: requested 6, available 5"
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::InvalidTransition {
            transaction_id: "T-1".to_string(),
            from: TransactionStatus::Paid,
            to: TransactionStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Transaction T-1 cannot move from paid to cancelled"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::SameLocation {
            location: Location::merchant("A"),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(
            core_err,
            CoreError::Validation(ValidationError::SameLocation { .. })
        ));
    }
}
