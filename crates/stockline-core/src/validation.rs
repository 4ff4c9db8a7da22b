//! # Validation Module
//!
//! Input validation for stock operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request layer (external)                                     │
//! │  └── Schema checks, auth                                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Positive bounded amounts                                          │
//! │  ├── Non-empty ids and actor                                           │
//! │  └── Checkout shape (lines, duplicates, tax)                           │
//! │           │  nothing below runs if this fails                          │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  ├── UNIQUE (product, location)                                        │
//! │  └── Foreign keys, append-only ledger triggers                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockline_core::validation::{validate_amount, validate_id};
//!
//! validate_amount(30).unwrap();
//! assert!(validate_amount(0).is_err());
//! assert!(validate_id("product_id", "  ").is_err());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::stock::{Location, MutationRequest};
use crate::types::{CheckoutRequest, TransferRequest};
use crate::{MAX_CHECKOUT_LINES, MAX_ITEM_QUANTITY, MAX_MUTATION_AMOUNT, MAX_NOTE_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Scalar Validators
// =============================================================================

/// Validates that an identifier is present.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates a UUID string format.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    validate_id(field, id)?;

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates the actor performing an operation.
pub fn validate_actor(actor: &str) -> ValidationResult<()> {
    validate_id("actor", actor)
}

/// Validates a stock amount.
///
/// ## Rules
/// - Must be positive (> 0); direction carries the sign
/// - Must not exceed MAX_MUTATION_AMOUNT
pub fn validate_amount(amount: i64) -> ValidationResult<()> {
    if amount <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    if amount > MAX_MUTATION_AMOUNT {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 1,
            max: MAX_MUTATION_AMOUNT,
        });
    }

    Ok(())
}

/// Validates a checkout line quantity.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "qty".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "qty".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an optional ledger note.
pub fn validate_note(note: Option<&str>) -> ValidationResult<()> {
    match note {
        Some(n) if n.chars().count() > MAX_NOTE_LENGTH => Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: MAX_NOTE_LENGTH,
        }),
        _ => Ok(()),
    }
}

/// Validates a price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    Ok(())
}

/// Validates a display name.
pub fn validate_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

fn validate_location(location: &Location) -> ValidationResult<()> {
    validate_id("location_id", location.id())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates a recorder request before any stock is touched.
pub fn validate_mutation_request(req: &MutationRequest) -> ValidationResult<()> {
    validate_id("product_id", &req.product_id)?;
    validate_location(&req.location)?;
    validate_amount(req.amount)?;
    validate_note(req.note.as_deref())?;
    validate_actor(&req.actor)?;
    Ok(())
}

/// Validates a transfer between two locations.
///
/// Source and destination must differ: moving stock onto itself is
/// rejected, not treated as a no-op.
pub fn validate_transfer(
    req: &TransferRequest,
    source: &Location,
    destination: &Location,
) -> ValidationResult<()> {
    validate_id("product_id", &req.product_id)?;
    validate_location(source)?;
    validate_location(destination)?;

    if source == destination {
        return Err(ValidationError::SameLocation {
            location: source.clone(),
        });
    }

    validate_amount(req.amount)?;
    validate_note(req.note.as_deref())?;
    validate_actor(&req.actor)?;
    Ok(())
}

/// Validates the shape of a checkout.
///
/// ## Rules
/// - At least one line, at most MAX_CHECKOUT_LINES
/// - Each product appears once
/// - Each qty within 1..=MAX_ITEM_QUANTITY
/// - Tax total, when given, is not negative
pub fn validate_checkout(req: &CheckoutRequest) -> ValidationResult<()> {
    validate_id("merchant_id", &req.merchant_id)?;
    validate_actor(&req.actor)?;

    if req.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if req.lines.len() > MAX_CHECKOUT_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_CHECKOUT_LINES as i64,
        });
    }

    let mut seen = HashSet::with_capacity(req.lines.len());
    for line in &req.lines {
        validate_id("product_id", &line.product_id)?;
        validate_quantity(line.qty)?;

        if !seen.insert(line.product_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "product_id".to_string(),
                value: line.product_id.clone(),
            });
        }
    }

    if let Some(tax) = req.tax_total_cents {
        if tax < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "tax_total".to_string(),
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
    use crate::types::LineItemRequest;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(MAX_MUTATION_AMOUNT).is_ok());

        assert!(validate_amount(0).is_err());
        assert!(validate_amount(-5).is_err());
        assert!(validate_amount(MAX_MUTATION_AMOUNT + 1).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_note() {
        assert!(validate_note(None).is_ok());
        assert!(validate_note(Some("restock")).is_ok());
        assert!(validate_note(Some(&"x".repeat(MAX_NOTE_LENGTH + 1))).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
    }

    #[test]
    fn test_same_location_transfer_rejected() {
        let req = TransferRequest::new("P", 5, "ops");
        let a = Location::merchant("A");

        let err = validate_transfer(&req, &a, &a).unwrap_err();
        assert!(matches!(err, ValidationError::SameLocation { .. }));

        assert!(validate_transfer(&req, &a, &Location::merchant("B")).is_ok());
        // same id, different kind is a different location
        assert!(validate_transfer(&req, &a, &Location::warehouse("A")).is_ok());
    }

    #[test]
    fn test_mutation_request_needs_actor() {
        let req = MutationRequest::inbound("P", Location::warehouse("W"), 10, "  ");
        assert!(matches!(
            validate_mutation_request(&req),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_validate_checkout() {
        let ok = CheckoutRequest::new(
            "M",
            vec![LineItemRequest::new("P1", 1), LineItemRequest::new("P2", 3)],
            "cashier",
        );
        assert!(validate_checkout(&ok).is_ok());

        let empty = CheckoutRequest::new("M", vec![], "cashier");
        assert!(validate_checkout(&empty).is_err());

        let dup = CheckoutRequest::new(
            "M",
            vec![LineItemRequest::new("P1", 1), LineItemRequest::new("P1", 2)],
            "cashier",
        );
        assert!(matches!(
            validate_checkout(&dup),
            Err(ValidationError::Duplicate { .. })
        ));

        let mut negative_tax = ok.clone();
        negative_tax.tax_total_cents = Some(-1);
        assert!(validate_checkout(&negative_tax).is_err());

        let zero_qty = CheckoutRequest::new("M", vec![LineItemRequest::new("P1", 0)], "c");
        assert!(validate_checkout(&zero_qty).is_err());
    }
}
