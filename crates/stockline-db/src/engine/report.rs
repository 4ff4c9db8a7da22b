//! # Report Aggregator
//!
//! Read-only rollups over the snapshot and the ledger. Nothing here opens a
//! unit of work or writes a row.
//!
//! `reconcile` and `find_drift` check the central invariant:
//!
//! ```text
//! stock_levels.quantity  ==  Σ in − Σ out   for every (product, location)
//! ```

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::DbResult;
use crate::pool::Database;
use stockline_core::{
    CurrentStock, LedgerFilter, Location, LocationKind, Reconciliation, StockMutation, StockSummary,
};

/// Read accessors for stock reports.
#[derive(Debug, Clone)]
pub struct ReportAggregator {
    db: Database,
}

impl ReportAggregator {
    /// Creates a new ReportAggregator.
    pub fn new(db: Database) -> Self {
        ReportAggregator { db }
    }

    /// Snapshot quantities for a product, everywhere or at one location.
    pub async fn current_stock(
        &self,
        product_id: &str,
        location: Option<&Location>,
    ) -> DbResult<CurrentStock> {
        let levels = self.db.stock().levels(product_id, location).await?;
        let total = levels.iter().map(|level| level.quantity).sum();

        Ok(CurrentStock {
            product_id: product_id.to_string(),
            total,
            levels,
        })
    }

    /// Ledger rows for a product, oldest first.
    pub async fn history(
        &self,
        product_id: &str,
        filter: &LedgerFilter,
    ) -> DbResult<Vec<StockMutation>> {
        self.db.ledger().history(product_id, filter).await
    }

    /// In/out totals over the filtered ledger slice, plus the quantity on
    /// hand now. `limit` does not apply.
    pub async fn summary(&self, product_id: &str, filter: &LedgerFilter) -> DbResult<StockSummary> {
        let totals = self.db.ledger().totals(product_id, filter).await?;
        let current = self
            .current_stock(product_id, filter.location.as_ref())
            .await?;

        Ok(StockSummary {
            product_id: product_id.to_string(),
            location: filter.location.clone(),
            total_in: totals.total_in,
            total_out: totals.total_out,
            net_change: totals.total_in - totals.total_out,
            mutation_count: totals.mutation_count,
            current_quantity: current.total,
        })
    }

    /// Compares one snapshot row with its ledger balance.
    pub async fn reconcile(&self, product_id: &str, location: &Location) -> DbResult<Reconciliation> {
        let snapshot = self.db.stock().get(product_id, location).await?;
        let ledger_balance = self.db.ledger().balance(product_id, location).await?;

        let report = Reconciliation::new(
            product_id.to_string(),
            location.clone(),
            snapshot,
            ledger_balance,
        );
        if !report.consistent {
            warn!(
                product_id = %product_id,
                location = %location,
                snapshot,
                ledger_balance,
                "Stock snapshot drifted from ledger"
            );
        }
        Ok(report)
    }

    /// Every (product, location) whose snapshot disagrees with the ledger.
    ///
    /// Covers snapshot rows without ledger rows and ledger balances without
    /// a snapshot row. An empty result means the store is consistent.
    pub async fn find_drift(&self) -> DbResult<Vec<Reconciliation>> {
        let mut pairs: BTreeMap<(String, LocationKind, String), (i64, i64)> = BTreeMap::new();

        for level in self.db.stock().all_levels().await? {
            let key = (
                level.product_id,
                level.location.kind(),
                level.location.id().to_string(),
            );
            pairs.entry(key).or_default().0 = level.quantity;
        }

        for balance in self.db.ledger().balances().await? {
            let key = (
                balance.product_id,
                balance.location.kind(),
                balance.location.id().to_string(),
            );
            pairs.entry(key).or_default().1 = balance.balance;
        }

        let checked = pairs.len();
        let drift: Vec<Reconciliation> = pairs
            .into_iter()
            .map(|((product_id, kind, id), (snapshot, ledger))| {
                Reconciliation::new(product_id, Location::from_parts(kind, id), snapshot, ledger)
            })
            .filter(|r| !r.consistent)
            .collect();

        if drift.is_empty() {
            debug!(checked, "Stock snapshot matches ledger");
        } else {
            warn!(checked, drifted = drift.len(), "Stock snapshot drifted from ledger");
        }
        Ok(drift)
    }
}
