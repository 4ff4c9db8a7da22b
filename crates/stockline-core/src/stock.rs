//! # Stock Types
//!
//! Where stock lives and how it moves.
//!
//! ## Snapshot + Ledger
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  stock_levels (snapshot)              stock_mutations (ledger)         │
//! │  ───────────────────────              ────────────────────────          │
//! │  (P, warehouse, W) = 70     ◄──────   out  30  → 70   Transfer(t1)     │
//! │  (P, merchant,  M) = 30     ◄──────   in   30  → 30   Transfer(t1)     │
//! │                                                                         │
//! │  quantity == Σ in − Σ out   for every (product, location)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Location
// =============================================================================

/// Discriminant of a [`Location`], stored in the `location_kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Warehouse,
    Merchant,
}

impl LocationKind {
    /// Column value for this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LocationKind::Warehouse => "warehouse",
            LocationKind::Merchant => "merchant",
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A place that holds stock: a central warehouse or a merchant store.
///
/// Each location keeps an independent counter per product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Location {
    Warehouse(String),
    Merchant(String),
}

impl Location {
    /// Shorthand for `Location::Warehouse(id)`.
    pub fn warehouse(id: impl Into<String>) -> Self {
        Location::Warehouse(id.into())
    }

    /// Shorthand for `Location::Merchant(id)`.
    pub fn merchant(id: impl Into<String>) -> Self {
        Location::Merchant(id.into())
    }

    /// Rebuilds a location from its stored columns.
    pub fn from_parts(kind: LocationKind, id: impl Into<String>) -> Self {
        match kind {
            LocationKind::Warehouse => Location::Warehouse(id.into()),
            LocationKind::Merchant => Location::Merchant(id.into()),
        }
    }

    pub fn kind(&self) -> LocationKind {
        match self {
            Location::Warehouse(_) => LocationKind::Warehouse,
            Location::Merchant(_) => LocationKind::Merchant,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Location::Warehouse(id) | Location::Merchant(id) => id,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

// =============================================================================
// Direction
// =============================================================================

/// Whether a ledger row adds stock to or removes stock from a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Signed effect of `amount` on the location's quantity.
    #[inline]
    pub const fn signed(&self, amount: i64) -> i64 {
        match self {
            Direction::In => amount,
            Direction::Out => -amount,
        }
    }

    /// The direction that undoes this one.
    #[inline]
    pub const fn reversed(&self) -> Direction {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => f.write_str("in"),
            Direction::Out => f.write_str("out"),
        }
    }
}

// =============================================================================
// Mutation Reference
// =============================================================================

/// The logical cause of a ledger row.
///
/// Stored as `(reference_kind, reference_id)`; both legs of a transfer carry
/// the same `Transfer(transfer_id)`, every line of a sale carries the same
/// `Transaction(id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MutationReference {
    None,
    Transaction(String),
    ManualAdjustment(String),
    Transfer(String),
}

impl MutationReference {
    /// Value of the `reference_kind` column.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            MutationReference::None => None,
            MutationReference::Transaction(_) => Some("transaction"),
            MutationReference::ManualAdjustment(_) => Some("manual_adjustment"),
            MutationReference::Transfer(_) => Some("transfer"),
        }
    }

    /// Value of the `reference_id` column.
    pub fn id(&self) -> Option<&str> {
        match self {
            MutationReference::None => None,
            MutationReference::Transaction(id)
            | MutationReference::ManualAdjustment(id)
            | MutationReference::Transfer(id) => Some(id),
        }
    }

    /// Rebuilds a reference from its stored columns.
    pub fn from_parts(kind: Option<&str>, id: Option<String>) -> Result<Self, ValidationError> {
        match (kind, id) {
            (None, None) => Ok(MutationReference::None),
            (Some("transaction"), Some(id)) => Ok(MutationReference::Transaction(id)),
            (Some("manual_adjustment"), Some(id)) => Ok(MutationReference::ManualAdjustment(id)),
            (Some("transfer"), Some(id)) => Ok(MutationReference::Transfer(id)),
            (kind, id) => Err(ValidationError::InvalidFormat {
                field: "reference".to_string(),
                reason: format!("unknown reference {:?}/{:?}", kind, id),
            }),
        }
    }
}

impl Default for MutationReference {
    fn default() -> Self {
        MutationReference::None
    }
}

// =============================================================================
// Stock Level
// =============================================================================

/// Current quantity of one product at one location (the snapshot row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLevel {
    pub product_id: String,
    pub location: Location,
    /// Never negative.
    pub quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Stock Mutation
// =============================================================================

/// One immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockMutation {
    pub id: String,
    pub product_id: String,
    pub location: Option<Location>,
    pub direction: Direction,
    /// Always > 0; the sign lives in `direction`.
    pub amount: i64,
    /// Location quantity right after this row was applied.
    pub resulting_quantity: i64,
    pub reference: MutationReference,
    pub note: Option<String>,
    pub actor: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockMutation {
    /// Signed effect of this row on its location.
    #[inline]
    pub fn signed_amount(&self) -> i64 {
        self.direction.signed(self.amount)
    }
}

/// Input to the mutation recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MutationRequest {
    pub product_id: String,
    pub location: Location,
    pub direction: Direction,
    pub amount: i64,
    pub reference: MutationReference,
    pub note: Option<String>,
    pub actor: String,
}

impl MutationRequest {
    /// A request removing `amount` units from `location`.
    pub fn outbound(
        product_id: impl Into<String>,
        location: Location,
        amount: i64,
        actor: impl Into<String>,
    ) -> Self {
        MutationRequest {
            product_id: product_id.into(),
            location,
            direction: Direction::Out,
            amount,
            reference: MutationReference::None,
            note: None,
            actor: actor.into(),
        }
    }

    /// A request adding `amount` units to `location`.
    pub fn inbound(
        product_id: impl Into<String>,
        location: Location,
        amount: i64,
        actor: impl Into<String>,
    ) -> Self {
        MutationRequest {
            direction: Direction::In,
            ..MutationRequest::outbound(product_id, location, amount, actor)
        }
    }

    pub fn with_reference(mut self, reference: MutationReference) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parts_round_trip() {
        let loc = Location::warehouse("W-1");
        assert_eq!(loc.kind(), LocationKind::Warehouse);
        assert_eq!(Location::from_parts(loc.kind(), loc.id()), loc);
        assert_eq!(loc.to_string(), "warehouse:W-1");
    }

    #[test]
    fn test_location_serializes_as_tagged_union() {
        let json = serde_json::to_string(&Location::merchant("M-7")).unwrap();
        assert_eq!(json, r#"{"kind":"merchant","id":"M-7"}"#);
    }

    #[test]
    fn test_direction_signs() {
        assert_eq!(Direction::In.signed(5), 5);
        assert_eq!(Direction::Out.signed(5), -5);
        assert_eq!(Direction::Out.reversed(), Direction::In);
    }

    #[test]
    fn test_reference_columns() {
        let r = MutationReference::Transfer("t-1".to_string());
        assert_eq!(r.kind(), Some("transfer"));
        assert_eq!(r.id(), Some("t-1"));

        let back = MutationReference::from_parts(r.kind(), r.id().map(String::from)).unwrap();
        assert_eq!(back, r);

        assert_eq!(
            MutationReference::from_parts(None, None).unwrap(),
            MutationReference::None
        );
        assert!(MutationReference::from_parts(Some("invoice"), Some("x".into())).is_err());
        assert!(MutationReference::from_parts(Some("transfer"), None).is_err());
    }

    #[test]
    fn test_mutation_request_builders() {
        let req = MutationRequest::inbound("P", Location::merchant("M"), 3, "alice")
            .with_reference(MutationReference::Transaction("T".into()))
            .with_note("cancellation");
        assert_eq!(req.direction, Direction::In);
        assert_eq!(req.amount, 3);
        assert_eq!(req.note.as_deref(), Some("cancellation"));
    }
}
