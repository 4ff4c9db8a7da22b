//! # stockline-core: Pure Domain Logic for Stockline
//!
//! This crate holds the vocabulary of the stock ledger: where stock lives,
//! how it moves, what a sale looks like, and which inputs are acceptable.
//! It performs no I/O; `stockline-db` persists everything defined here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Request layer (HTTP, auth, UI)                     │   │
//! │  │     assign / return / transfer / checkout / cancel / reports    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockline-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   stock   │  │   types   │  │   money   │  │ validation│  │   │
//! │  │   │ Location  │  │Transaction│  │   Money   │  │   rules   │  │   │
//! │  │   │ Mutation  │  │  Status   │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockline-db (Database Layer)                   │   │
//! │  │       unit of work, stock store, ledger, transfer, checkout     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`stock`] - Locations, stock levels, ledger mutations and references
//! - [`types`] - Catalog registries and sale transactions
//! - [`report`] - Ledger filters and rollup results
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules
//!
//! ## Example Usage
//!
//! ```rust
//! use stockline_core::{Location, TransactionStatus};
//!
//! let shop = Location::merchant("m-1");
//! assert_eq!(shop.id(), "m-1");
//!
//! assert!(TransactionStatus::Pending.can_transition_to(TransactionStatus::Paid));
//! assert!(!TransactionStatus::Cancelled.can_transition_to(TransactionStatus::Paid));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod report;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use report::*;
pub use stock::*;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest amount a single ledger row may move.
///
/// Guards against fat-finger adjustments (typing 1000000 instead of 100).
pub const MAX_MUTATION_AMOUNT: i64 = 1_000_000;

/// Maximum quantity of a single line in a checkout.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum number of lines in a single checkout.
pub const MAX_CHECKOUT_LINES: usize = 100;

/// Maximum length of a free-text ledger note.
pub const MAX_NOTE_LENGTH: usize = 500;

/// Ledger note written on each sale decrement.
pub const NOTE_SALE: &str = "sale";

/// Ledger note written on each cancellation credit.
pub const NOTE_CANCELLATION: &str = "cancellation";

/// Ledger note written when a failed sale is restocked.
pub const NOTE_FAILURE_REVERSAL: &str = "failure reversal";
