//! # Stock Ledger
//!
//! Append-only log of every stock change. Rows are inserted inside the unit
//! of work that changed the snapshot and are never updated or deleted; the
//! schema enforces this with triggers.
//!
//! ## Row Layout
//! ```text
//! seq │ id │ product │ location_kind/id │ dir │ amount │ resulting │ reference_kind/id │ note │ actor
//! ────┼────┼─────────┼──────────────────┼─────┼────────┼───────────┼───────────────────┼──────┼──────
//!  17 │ …  │ P-1     │ warehouse / W-1  │ out │   30   │    70     │ transfer / 9f…    │      │ ops
//!  18 │ …  │ P-1     │ merchant  / M-1  │ in  │   30   │    30     │ transfer / 9f…    │      │ ops
//! ```
//!
//! `seq` is the total order used by every read.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::unit_of_work::UnitOfWork;
use stockline_core::{
    Direction, LedgerFilter, Location, LocationKind, MutationReference, MutationRequest,
    StockMutation,
};

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct MutationRow {
    id: String,
    product_id: String,
    location_kind: Option<LocationKind>,
    location_id: Option<String>,
    direction: Direction,
    amount: i64,
    resulting_quantity: i64,
    reference_kind: Option<String>,
    reference_id: Option<String>,
    note: Option<String>,
    actor: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MutationRow> for StockMutation {
    type Error = DbError;

    fn try_from(row: MutationRow) -> Result<Self, Self::Error> {
        let location = match (row.location_kind, row.location_id) {
            (Some(kind), Some(id)) => Some(Location::from_parts(kind, id)),
            (None, None) => None,
            _ => {
                return Err(DbError::Internal(format!(
                    "mutation {} has half a location",
                    row.id
                )))
            }
        };

        let reference = MutationReference::from_parts(row.reference_kind.as_deref(), row.reference_id)
            .map_err(|e| DbError::Internal(format!("mutation {}: {}", row.id, e)))?;

        Ok(StockMutation {
            id: row.id,
            product_id: row.product_id,
            location,
            direction: row.direction,
            amount: row.amount,
            resulting_quantity: row.resulting_quantity,
            reference,
            note: row.note,
            actor: row.actor,
            created_at: row.created_at,
        })
    }
}

const MUTATION_COLUMNS: &str = "id, product_id, location_kind, location_id, direction, amount, \
     resulting_quantity, reference_kind, reference_id, note, actor, created_at";

fn into_mutations(rows: Vec<MutationRow>) -> DbResult<Vec<StockMutation>> {
    rows.into_iter().map(StockMutation::try_from).collect()
}

/// Sum of in/out amounts over a ledger slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct LedgerTotals {
    pub total_in: i64,
    pub total_out: i64,
    pub mutation_count: i64,
}

/// Ledger balance of one (product, location).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerBalance {
    pub product_id: String,
    pub location: Location,
    pub balance: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct BalanceRow {
    product_id: String,
    location_kind: LocationKind,
    location_id: String,
    balance: i64,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the append-only stock ledger.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    /// Creates a new StockLedger.
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// Appends one row for a mutation already applied to the snapshot.
    ///
    /// Only callable inside a unit of work, next to the snapshot write it
    /// describes.
    pub async fn append(
        &self,
        uow: &mut UnitOfWork,
        request: &MutationRequest,
        resulting_quantity: i64,
    ) -> DbResult<StockMutation> {
        let mutation = StockMutation {
            id: Uuid::new_v4().to_string(),
            product_id: request.product_id.clone(),
            location: Some(request.location.clone()),
            direction: request.direction,
            amount: request.amount,
            resulting_quantity,
            reference: request.reference.clone(),
            note: request.note.clone(),
            actor: request.actor.clone(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO stock_mutations (
                id, product_id, location_kind, location_id,
                direction, amount, resulting_quantity,
                reference_kind, reference_id, note, actor, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12
            )
            "#,
        )
        .bind(&mutation.id)
        .bind(&mutation.product_id)
        .bind(request.location.kind())
        .bind(request.location.id())
        .bind(mutation.direction)
        .bind(mutation.amount)
        .bind(mutation.resulting_quantity)
        .bind(mutation.reference.kind())
        .bind(mutation.reference.id())
        .bind(&mutation.note)
        .bind(&mutation.actor)
        .bind(mutation.created_at)
        .execute(uow.conn())
        .await?;

        debug!(
            id = %mutation.id,
            product_id = %mutation.product_id,
            location = %request.location,
            direction = %mutation.direction,
            amount = mutation.amount,
            resulting_quantity,
            "Ledger row appended"
        );

        Ok(mutation)
    }

    /// Gets one ledger row by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<StockMutation>> {
        let row: Option<MutationRow> = sqlx::query_as(&format!(
            "SELECT {MUTATION_COLUMNS} FROM stock_mutations WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StockMutation::try_from).transpose()
    }

    /// Every row carrying `reference`, in ledger order.
    pub async fn by_reference(&self, reference: &MutationReference) -> DbResult<Vec<StockMutation>> {
        fetch_by_reference(&self.pool, reference).await
    }

    /// Same as [`by_reference`](Self::by_reference), inside a unit of work.
    pub async fn by_reference_within(
        &self,
        uow: &mut UnitOfWork,
        reference: &MutationReference,
    ) -> DbResult<Vec<StockMutation>> {
        fetch_by_reference(uow.conn(), reference).await
    }

    /// Rows for a product, filtered, in ledger order.
    ///
    /// ## Filters
    /// - `location`: one location only
    /// - `from` / `to`: inclusive `created_at` bounds
    /// - `limit`: first N rows
    pub async fn history(
        &self,
        product_id: &str,
        filter: &LedgerFilter,
    ) -> DbResult<Vec<StockMutation>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {MUTATION_COLUMNS} FROM stock_mutations"));
        push_filter(&mut qb, product_id, filter);
        qb.push(" ORDER BY seq");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<MutationRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        into_mutations(rows)
    }

    /// In/out totals for a product over the filtered slice (limit ignored).
    pub async fn totals(&self, product_id: &str, filter: &LedgerFilter) -> DbResult<LedgerTotals> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT
                COALESCE(SUM(CASE WHEN direction = 'in' THEN amount ELSE 0 END), 0) AS total_in,
                COALESCE(SUM(CASE WHEN direction = 'out' THEN amount ELSE 0 END), 0) AS total_out,
                COUNT(*) AS mutation_count
            FROM stock_mutations"#,
        );
        push_filter(&mut qb, product_id, filter);

        let totals: LedgerTotals = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(totals)
    }

    /// Σin − Σout for one (product, location).
    pub async fn balance(&self, product_id: &str, location: &Location) -> DbResult<i64> {
        let totals = self.totals(product_id, &LedgerFilter::at(location.clone())).await?;
        Ok(totals.total_in - totals.total_out)
    }

    /// Σin − Σout for every (product, location) the ledger mentions.
    pub async fn balances(&self) -> DbResult<Vec<LedgerBalance>> {
        let rows: Vec<BalanceRow> = sqlx::query_as(
            r#"
            SELECT
                product_id,
                location_kind,
                location_id,
                SUM(CASE WHEN direction = 'in' THEN amount ELSE -amount END) AS balance
            FROM stock_mutations
            WHERE location_kind IS NOT NULL
            GROUP BY product_id, location_kind, location_id
            ORDER BY product_id, location_kind, location_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LedgerBalance {
                product_id: row.product_id,
                location: Location::from_parts(row.location_kind, row.location_id),
                balance: row.balance,
            })
            .collect())
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, product_id: &str, filter: &LedgerFilter) {
    qb.push(" WHERE product_id = ").push_bind(product_id.to_string());

    if let Some(location) = &filter.location {
        qb.push(" AND location_kind = ").push_bind(location.kind());
        qb.push(" AND location_id = ").push_bind(location.id().to_string());
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

async fn fetch_by_reference<'e>(
    exec: impl SqliteExecutor<'e>,
    reference: &MutationReference,
) -> DbResult<Vec<StockMutation>> {
    let rows: Vec<MutationRow> = match (reference.kind(), reference.id()) {
        (Some(kind), Some(id)) => {
            sqlx::query_as(&format!(
                "SELECT {MUTATION_COLUMNS} FROM stock_mutations \
                 WHERE reference_kind = ?1 AND reference_id = ?2 ORDER BY seq"
            ))
            .bind(kind)
            .bind(id)
            .fetch_all(exec)
            .await?
        }
        _ => {
            sqlx::query_as(&format!(
                "SELECT {MUTATION_COLUMNS} FROM stock_mutations \
                 WHERE reference_kind IS NULL ORDER BY seq"
            ))
            .fetch_all(exec)
            .await?
        }
    };

    into_mutations(rows)
}
