//! # Unit of Work
//!
//! An explicit atomic unit: every stock-mutating step runs inside one, and
//! the caller decides where it commits.
//!
//! ```text
//! let mut uow = db.begin().await?;
//!         │
//!         ├── recorder.record_within(&mut uow, out@W)   ┐
//!         ├── recorder.record_within(&mut uow, in@M)    │ one SQLite transaction
//!         │                                              ┘
//!         ├── uow.commit().await?      → both rows visible
//!         └── drop(uow) / rollback()   → nothing visible
//! ```
//!
//! Dropping a unit without committing rolls it back, so an early `?` return
//! or a timeout can never leave half a transfer behind.
//!
//! ## Locking
//! Units open with `BEGIN IMMEDIATE`: the writer lock is taken before the
//! first read. A second unit waits (up to the busy timeout) and then reads
//! the stock the first one committed, so a losing sale sees
//! `InsufficientStock` rather than a stale-snapshot conflict.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

/// One atomic, isolated group of reads and writes.
#[derive(Debug)]
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    id: String,
}

impl UnitOfWork {
    pub(crate) async fn begin(pool: &SqlitePool) -> DbResult<Self> {
        let tx = pool.begin_with("BEGIN IMMEDIATE").await?;
        let id = Uuid::new_v4().to_string();
        debug!(unit = %id, "Unit of work started");
        Ok(UnitOfWork { tx, id })
    }

    /// Correlation id for logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Makes every write in this unit visible at once.
    ///
    /// Contention at commit time surfaces as `DbError::ConcurrencyConflict`.
    pub async fn commit(self) -> DbResult<()> {
        let id = self.id;
        self.tx.commit().await?;
        debug!(unit = %id, "Unit of work committed");
        Ok(())
    }

    /// Discards every write in this unit.
    pub async fn rollback(self) -> DbResult<()> {
        let id = self.id;
        self.tx.rollback().await?;
        debug!(unit = %id, "Unit of work rolled back");
        Ok(())
    }

    /// The connection all statements of this unit run on.
    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}
