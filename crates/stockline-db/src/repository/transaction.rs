//! # Transaction Repository
//!
//! Sale transactions and their lines.
//!
//! ## Status Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every status write is conditional on the row still being PENDING:     │
//! │                                                                         │
//! │    UPDATE transactions SET status = 'cancelled', ...                   │
//! │     WHERE id = ?1 AND status = 'pending'                               │
//! │                                                                         │
//! │  rows_affected == 1  → this unit owns the transition                   │
//! │  rows_affected == 0  → someone else got there first (or no such row);  │
//! │                        the engine reloads and decides what to report    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Product name and unit price are copied to each line at sale time, so the
//! sale history survives later catalog changes.

use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::unit_of_work::UnitOfWork;
use stockline_core::{CustomerInfo, PaymentInfo, Transaction, TransactionLine, TransactionStatus};

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    invoice_code: String,
    merchant_id: String,
    status: TransactionStatus,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    sub_total_cents: i64,
    tax_total_cents: i64,
    grand_total_cents: i64,
    payment_method: Option<String>,
    payment_reference: Option<String>,
    payment_metadata: Option<String>,
    failure_reason: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DbError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let metadata: BTreeMap<String, String> = match row.payment_metadata.as_deref() {
            Some(json) => serde_json::from_str(json)?,
            None => BTreeMap::new(),
        };

        let payment = if row.payment_method.is_none()
            && row.payment_reference.is_none()
            && metadata.is_empty()
        {
            None
        } else {
            Some(PaymentInfo {
                method: row.payment_method,
                reference: row.payment_reference,
                metadata,
            })
        };

        Ok(Transaction {
            id: row.id,
            invoice_code: row.invoice_code,
            merchant_id: row.merchant_id,
            status: row.status,
            customer: CustomerInfo {
                name: row.customer_name,
                phone: row.customer_phone,
                email: row.customer_email,
            },
            sub_total_cents: row.sub_total_cents,
            tax_total_cents: row.tax_total_cents,
            grand_total_cents: row.grand_total_cents,
            payment,
            failure_reason: row.failure_reason,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            paid_at: row.paid_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

const TRANSACTION_COLUMNS: &str = "id, invoice_code, merchant_id, status, \
     customer_name, customer_phone, customer_email, \
     sub_total_cents, tax_total_cents, grand_total_cents, \
     payment_method, payment_reference, payment_metadata, failure_reason, \
     created_by, created_at, updated_at, paid_at, cancelled_at";

const LINE_COLUMNS: &str =
    "id, transaction_id, product_id, name_snapshot, qty, unit_price_cents, line_total_cents";

/// Repository for sale transactions.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Inserts a transaction header.
    pub async fn insert(&self, uow: &mut UnitOfWork, tx: &Transaction) -> DbResult<()> {
        debug!(id = %tx.id, invoice_code = %tx.invoice_code, "Inserting transaction");

        let payment = tx.payment.clone().unwrap_or_default();
        let metadata = encode_metadata(&payment.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, invoice_code, merchant_id, status,
                customer_name, customer_phone, customer_email,
                sub_total_cents, tax_total_cents, grand_total_cents,
                payment_method, payment_reference, payment_metadata, failure_reason,
                created_by, created_at, updated_at, paid_at, cancelled_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7,
                ?8, ?9, ?10,
                ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19
            )
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.invoice_code)
        .bind(&tx.merchant_id)
        .bind(tx.status)
        .bind(&tx.customer.name)
        .bind(&tx.customer.phone)
        .bind(&tx.customer.email)
        .bind(tx.sub_total_cents)
        .bind(tx.tax_total_cents)
        .bind(tx.grand_total_cents)
        .bind(payment.method)
        .bind(payment.reference)
        .bind(metadata)
        .bind(&tx.failure_reason)
        .bind(&tx.created_by)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .bind(tx.paid_at)
        .bind(tx.cancelled_at)
        .execute(uow.conn())
        .await?;

        Ok(())
    }

    /// Inserts a line; `position` keeps request order.
    pub async fn insert_line(
        &self,
        uow: &mut UnitOfWork,
        line: &TransactionLine,
        position: usize,
    ) -> DbResult<()> {
        debug!(
            transaction_id = %line.transaction_id,
            product_id = %line.product_id,
            qty = line.qty,
            "Inserting transaction line"
        );

        sqlx::query(
            r#"
            INSERT INTO transaction_lines (
                id, transaction_id, product_id, name_snapshot,
                qty, unit_price_cents, line_total_cents, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&line.id)
        .bind(&line.transaction_id)
        .bind(&line.product_id)
        .bind(&line.name_snapshot)
        .bind(line.qty)
        .bind(line.unit_price_cents)
        .bind(line.line_total_cents)
        .bind(position as i64)
        .execute(uow.conn())
        .await?;

        Ok(())
    }

    /// Gets a transaction by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Transaction>> {
        fetch_transaction(&self.pool, id).await
    }

    /// Same as [`get`](Self::get), inside a unit of work.
    pub async fn get_within(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Option<Transaction>> {
        fetch_transaction(uow.conn(), id).await
    }

    /// Lines of a transaction in request order.
    pub async fn lines(&self, transaction_id: &str) -> DbResult<Vec<TransactionLine>> {
        fetch_lines(&self.pool, transaction_id).await
    }

    /// Same as [`lines`](Self::lines), inside a unit of work.
    pub async fn lines_within(
        &self,
        uow: &mut UnitOfWork,
        transaction_id: &str,
    ) -> DbResult<Vec<TransactionLine>> {
        fetch_lines(uow.conn(), transaction_id).await
    }

    /// PENDING → PAID. Returns false if the row was not PENDING.
    pub async fn mark_paid(
        &self,
        uow: &mut UnitOfWork,
        id: &str,
        payment: Option<&PaymentInfo>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let payment = payment.cloned().unwrap_or_default();
        let metadata = encode_metadata(&payment.metadata)?;

        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                status = 'paid',
                payment_method = ?2,
                payment_reference = ?3,
                payment_metadata = ?4,
                paid_at = ?5,
                updated_at = ?5
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(payment.method)
        .bind(payment.reference)
        .bind(metadata)
        .bind(now)
        .execute(uow.conn())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// PENDING → FAILED. Returns false if the row was not PENDING.
    pub async fn mark_failed(
        &self,
        uow: &mut UnitOfWork,
        id: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                status = 'failed',
                failure_reason = ?2,
                updated_at = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(now)
        .execute(uow.conn())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// PENDING → CANCELLED. Returns false if the row was not PENDING.
    pub async fn mark_cancelled(
        &self,
        uow: &mut UnitOfWork,
        id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                status = 'cancelled',
                cancelled_at = ?2,
                updated_at = ?2
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(uow.conn())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn encode_metadata(metadata: &BTreeMap<String, String>) -> DbResult<Option<String>> {
    if metadata.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(metadata)?))
    }
}

async fn fetch_transaction<'e>(
    exec: impl SqliteExecutor<'e>,
    id: &str,
) -> DbResult<Option<Transaction>> {
    let row: Option<TransactionRow> = sqlx::query_as(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(exec)
    .await?;

    row.map(Transaction::try_from).transpose()
}

async fn fetch_lines<'e>(
    exec: impl SqliteExecutor<'e>,
    transaction_id: &str,
) -> DbResult<Vec<TransactionLine>> {
    let lines: Vec<TransactionLine> = sqlx::query_as(&format!(
        "SELECT {LINE_COLUMNS} FROM transaction_lines WHERE transaction_id = ?1 ORDER BY position"
    ))
    .bind(transaction_id)
    .fetch_all(exec)
    .await?;

    Ok(lines)
}
