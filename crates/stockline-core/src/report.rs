//! # Report Types
//!
//! Read-only rollups over the ledger and snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::stock::{Location, StockLevel};

/// Narrows a history or summary query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerFilter {
    pub location: Option<Location>,
    /// Inclusive lower bound on `created_at`.
    #[ts(as = "Option<String>")]
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    #[ts(as = "Option<String>")]
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl LedgerFilter {
    pub fn at(location: Location) -> Self {
        LedgerFilter {
            location: Some(location),
            ..LedgerFilter::default()
        }
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Snapshot quantities of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CurrentStock {
    pub product_id: String,
    /// Sum over `levels`.
    pub total: i64,
    pub levels: Vec<StockLevel>,
}

/// Ledger totals of one product over a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockSummary {
    pub product_id: String,
    pub location: Option<Location>,
    pub total_in: i64,
    pub total_out: i64,
    pub net_change: i64,
    pub mutation_count: i64,
    /// Snapshot quantity now (at the filtered location, or across all).
    pub current_quantity: i64,
}

/// Snapshot vs ledger for one (product, location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Reconciliation {
    pub product_id: String,
    pub location: Location,
    pub snapshot: i64,
    pub ledger_balance: i64,
    pub consistent: bool,
}

impl Reconciliation {
    pub fn new(product_id: String, location: Location, snapshot: i64, ledger_balance: i64) -> Self {
        Reconciliation {
            product_id,
            location,
            snapshot,
            ledger_balance,
            consistent: snapshot == ledger_balance,
        }
    }

    /// Snapshot minus ledger; zero when consistent.
    pub fn drift(&self) -> i64 {
        self.snapshot - self.ledger_balance
    }
}
