//! # Location Stock Store
//!
//! Current quantity per (product, location). This table is the snapshot the
//! ledger is reconciled against; only the mutation recorder writes to it.
//!
//! ## Atomic Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  compare_and_decrement(P, M, 4)                                        │
//! │                                                                         │
//! │  UPDATE stock_levels                                                   │
//! │     SET quantity = quantity - 4                                        │
//! │   WHERE (P, M) AND quantity >= 4      ← check and write in one step    │
//! │  RETURNING quantity                                                    │
//! │       │                                                                 │
//! │       ├── row returned   → Ok(new quantity)                            │
//! │       └── no row         → look again:                                 │
//! │              ├── no (P, M) row → NotFound (never associated)           │
//! │              └── row exists    → InsufficientStock { available }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no read-then-write window: two concurrent decrements of the same
//! row are linearized by SQLite, and the loser sees the winner's result.

use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::catalog::location_not_found;
use crate::unit_of_work::UnitOfWork;
use stockline_core::{CoreError, Location, LocationKind, StockLevel};

#[derive(Debug, sqlx::FromRow)]
struct StockLevelRow {
    product_id: String,
    location_kind: LocationKind,
    location_id: String,
    quantity: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StockLevelRow> for StockLevel {
    fn from(row: StockLevelRow) -> Self {
        StockLevel {
            product_id: row.product_id,
            location: Location::from_parts(row.location_kind, row.location_id),
            quantity: row.quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const LEVEL_COLUMNS: &str =
    "product_id, location_kind, location_id, quantity, created_at, updated_at";

/// Repository for current stock levels.
#[derive(Debug, Clone)]
pub struct LocationStockStore {
    pool: SqlitePool,
}

impl LocationStockStore {
    /// Creates a new LocationStockStore.
    pub fn new(pool: SqlitePool) -> Self {
        LocationStockStore { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current quantity; 0 when the product was never associated with the
    /// location.
    pub async fn get(&self, product_id: &str, location: &Location) -> DbResult<i64> {
        Ok(self
            .level(product_id, location)
            .await?
            .map_or(0, |level| level.quantity))
    }

    /// The association row, if any.
    pub async fn level(&self, product_id: &str, location: &Location) -> DbResult<Option<StockLevel>> {
        fetch_level(&self.pool, product_id, location).await
    }

    /// Same as [`level`](Self::level), inside a unit of work.
    pub async fn level_within(
        &self,
        uow: &mut UnitOfWork,
        product_id: &str,
        location: &Location,
    ) -> DbResult<Option<StockLevel>> {
        fetch_level(uow.conn(), product_id, location).await
    }

    /// Every level held for a product, optionally narrowed to one location.
    pub async fn levels(
        &self,
        product_id: &str,
        location: Option<&Location>,
    ) -> DbResult<Vec<StockLevel>> {
        let rows: Vec<StockLevelRow> = match location {
            Some(loc) => {
                sqlx::query_as(&format!(
                    "SELECT {LEVEL_COLUMNS} FROM stock_levels \
                     WHERE product_id = ?1 AND location_kind = ?2 AND location_id = ?3"
                ))
                .bind(product_id)
                .bind(loc.kind())
                .bind(loc.id())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {LEVEL_COLUMNS} FROM stock_levels \
                     WHERE product_id = ?1 ORDER BY location_kind, location_id"
                ))
                .bind(product_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(StockLevel::from).collect())
    }

    /// Every level in the store.
    pub async fn all_levels(&self) -> DbResult<Vec<StockLevel>> {
        let rows: Vec<StockLevelRow> = sqlx::query_as(&format!(
            "SELECT {LEVEL_COLUMNS} FROM stock_levels \
             ORDER BY product_id, location_kind, location_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StockLevel::from).collect())
    }

    // =========================================================================
    // Writes (unit-scoped only)
    // =========================================================================

    /// Creates the (product, location) association with quantity 0.
    ///
    /// Idempotent. Product and location must both exist.
    pub async fn attach_within(
        &self,
        uow: &mut UnitOfWork,
        product_id: &str,
        location: &Location,
    ) -> DbResult<StockLevel> {
        let product: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_one(uow.conn())
            .await?;
        if product == 0 {
            return Err(DbError::not_found("Product", product_id));
        }

        let location_sql = match location {
            Location::Warehouse(_) => "SELECT COUNT(*) FROM warehouses WHERE id = ?1",
            Location::Merchant(_) => "SELECT COUNT(*) FROM merchants WHERE id = ?1",
        };
        let registered: i64 = sqlx::query_scalar(location_sql)
            .bind(location.id())
            .fetch_one(uow.conn())
            .await?;
        if registered == 0 {
            return Err(location_not_found(location));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, location_kind, location_id, quantity, created_at, updated_at)
            VALUES (?1, ?2, ?3, 0, ?4, ?4)
            ON CONFLICT (product_id, location_kind, location_id) DO NOTHING
            "#,
        )
        .bind(product_id)
        .bind(location.kind())
        .bind(location.id())
        .bind(now)
        .execute(uow.conn())
        .await?;

        debug!(product_id = %product_id, location = %location, "Stock association attached");

        fetch_level(uow.conn(), product_id, location)
            .await?
            .ok_or_else(|| DbError::Internal("attached stock level vanished".to_string()))
    }

    /// Self-committing [`attach_within`](Self::attach_within).
    pub async fn attach(&self, product_id: &str, location: &Location) -> DbResult<StockLevel> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let level = self.attach_within(&mut uow, product_id, location).await?;
        uow.commit().await?;
        Ok(level)
    }

    /// Subtracts `amount` only if at least `amount` is on hand.
    ///
    /// Returns the quantity after the decrement.
    pub async fn compare_and_decrement(
        &self,
        uow: &mut UnitOfWork,
        product_id: &str,
        location: &Location,
        amount: i64,
    ) -> DbResult<i64> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE stock_levels
               SET quantity = quantity - ?4,
                   updated_at = ?5
             WHERE product_id = ?1
               AND location_kind = ?2
               AND location_id = ?3
               AND quantity >= ?4
            RETURNING quantity
            "#,
        )
        .bind(product_id)
        .bind(location.kind())
        .bind(location.id())
        .bind(amount)
        .bind(Utc::now())
        .fetch_optional(uow.conn())
        .await?;

        if let Some(quantity) = updated {
            return Ok(quantity);
        }

        // Nothing matched: tell "never associated" apart from "not enough".
        match fetch_level(uow.conn(), product_id, location).await? {
            None => Err(DbError::not_found(
                "Stock level",
                format!("{product_id}@{location}"),
            )),
            Some(level) => Err(CoreError::InsufficientStock {
                product_id: product_id.to_string(),
                location: location.clone(),
                requested: amount,
                available: level.quantity,
            }
            .into()),
        }
    }

    /// Adds `amount`, creating the association if absent.
    ///
    /// Returns the quantity after the increment.
    pub async fn increment(
        &self,
        uow: &mut UnitOfWork,
        product_id: &str,
        location: &Location,
        amount: i64,
    ) -> DbResult<i64> {
        let now = Utc::now();
        let quantity: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_levels (product_id, location_kind, location_id, quantity, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT (product_id, location_kind, location_id) DO UPDATE SET
                quantity = quantity + excluded.quantity,
                updated_at = excluded.updated_at
            RETURNING quantity
            "#,
        )
        .bind(product_id)
        .bind(location.kind())
        .bind(location.id())
        .bind(amount)
        .bind(now)
        .fetch_one(uow.conn())
        .await?;

        Ok(quantity)
    }
}

async fn fetch_level<'e>(
    exec: impl SqliteExecutor<'e>,
    product_id: &str,
    location: &Location,
) -> DbResult<Option<StockLevel>> {
    let row: Option<StockLevelRow> = sqlx::query_as(&format!(
        "SELECT {LEVEL_COLUMNS} FROM stock_levels \
         WHERE product_id = ?1 AND location_kind = ?2 AND location_id = ?3"
    ))
    .bind(product_id)
    .bind(location.kind())
    .bind(location.id())
    .fetch_optional(exec)
    .await?;

    Ok(row.map(StockLevel::from))
}
