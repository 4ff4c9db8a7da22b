//! # Stock Engines
//!
//! Business operations composed from the repositories.
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐
//! │  TransferEngine  │   │  CheckoutEngine  │
//! └────────┬─────────┘   └────────┬─────────┘
//!          │  record_within()     │
//!          ▼                      ▼
//! ┌─────────────────────────────────────────┐    ┌──────────────────┐
//! │          StockMutationRecorder          │    │ ReportAggregator │
//! │  stock_levels write + ledger append     │    │    (read only)   │
//! └─────────────────────────────────────────┘    └──────────────────┘
//! ```
//!
//! Every engine operation comes in two forms:
//!
//! - `*_within(&mut UnitOfWork, ..)` composes into a caller-owned unit
//! - the plain form opens its own unit, bounds it by `DbConfig::unit_timeout`,
//!   and commits

pub mod checkout;
pub mod recorder;
pub mod report;
pub mod transfer;

use std::future::Future;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::unit_of_work::UnitOfWork;

/// Runs `work` under the unit time budget, then commits the unit it returns.
///
/// The commit happens outside the budget so an expiring timer can never
/// leave the outcome of a commit unknown.
pub(crate) async fn run_unit<T, F>(db: &Database, operation: &'static str, work: F) -> DbResult<T>
where
    F: Future<Output = DbResult<(UnitOfWork, T)>>,
{
    let result = match db.bounded(work).await {
        Ok((uow, value)) => uow.commit().await.map(|()| value),
        Err(err) => Err(err),
    };

    if let Err(err) = &result {
        log_failure(operation, err);
    }
    result
}

/// Business rejections are expected traffic; only faults are warnings.
pub(crate) fn log_failure(operation: &'static str, err: &DbError) {
    if err.is_fault() {
        warn!(operation, error = %err, retryable = err.is_retryable(), "Stock operation failed");
    } else {
        debug!(operation, error = %err, "Stock operation rejected");
    }
}
