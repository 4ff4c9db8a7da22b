//! # Checkout Engine
//!
//! Sells merchant stock and drives the sale status machine.
//!
//! ## Checkout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    create(request) - one unit of work                   │
//! │                                                                         │
//! │  0. validate shape       lines, qty, duplicates, tax, actor            │
//! │  1. merchant exists?     no  → NotFound                                │
//! │  2. per line:                                                          │
//! │     product exists?      no  → NotFound                                │
//! │     attached to M?       no  → ProductNotAvailable                     │
//! │     on hand >= qty?      no  → InsufficientStock (first shortfall)     │
//! │  3. price                unit price from catalog, checked arithmetic   │
//! │  4. persist              Transaction(PENDING) + lines (snapshots)      │
//! │  5. per line:            out @ M, reference Transaction, note "sale"   │
//! │                          a lost race here still aborts everything      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status Machine
//! ```text
//!              ┌──► PAID        paid_at, payment metadata
//!   PENDING ───┼──► FAILED      failure_reason (+ restock if policy says so)
//!              └──► CANCELLED   every sale row credited back once
//!
//!   terminal ──► anything       InvalidTransition
//!   CANCELLED ─► CANCELLED      no-op
//! ```

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::run_unit;
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::unit_of_work::UnitOfWork;
use stockline_core::validation::{validate_actor, validate_checkout, validate_note};
use stockline_core::{
    CheckoutReceipt, CheckoutRequest, CoreError, Direction, Location, Money, MutationReference,
    MutationRequest, PaymentInfo, Product, Transaction, TransactionLine, TransactionStatus,
    ValidationError, NOTE_CANCELLATION, NOTE_FAILURE_REVERSAL, NOTE_SALE,
};

/// Sale checkout and status transitions.
#[derive(Debug, Clone)]
pub struct CheckoutEngine {
    db: Database,
}

impl CheckoutEngine {
    /// Creates a new CheckoutEngine.
    pub fn new(db: Database) -> Self {
        CheckoutEngine { db }
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Creates a PENDING sale and decrements merchant stock, inside the
    /// caller's unit.
    ///
    /// All or nothing: on any error the caller must drop the unit, and no
    /// transaction, line or ledger row survives.
    pub async fn create_within(
        &self,
        uow: &mut UnitOfWork,
        request: &CheckoutRequest,
    ) -> DbResult<CheckoutReceipt> {
        validate_checkout(request)?;

        let merchant = Location::merchant(request.merchant_id.as_str());
        if !self.db.locations().exists_within(uow, &merchant).await? {
            return Err(DbError::not_found("Merchant", request.merchant_id.as_str()));
        }

        // Resolve each requested product and its stock at this merchant.
        let products = self.db.products();
        let stock = self.db.stock();
        let mut resolved: Vec<(Product, i64)> = Vec::with_capacity(request.lines.len());

        for line in &request.lines {
            let product = products
                .get_within(uow, &line.product_id)
                .await?
                .ok_or_else(|| DbError::not_found("Product", line.product_id.as_str()))?;

            let level = stock
                .level_within(uow, &line.product_id, &merchant)
                .await?
                .ok_or_else(|| CoreError::ProductNotAvailable {
                    product_id: line.product_id.clone(),
                    merchant_id: request.merchant_id.clone(),
                })?;

            if level.quantity < line.qty {
                return Err(CoreError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    location: merchant.clone(),
                    requested: line.qty,
                    available: level.quantity,
                }
                .into());
            }

            resolved.push((product, line.qty));
        }

        // Price at today's catalog price.
        let now = Utc::now();
        let transaction_id = Uuid::new_v4().to_string();
        let mut lines = Vec::with_capacity(resolved.len());
        let mut sub_total = Money::zero();

        for (product, qty) in &resolved {
            let line_total = product
                .price()
                .checked_mul_qty(*qty)
                .ok_or_else(|| overflow("line_total"))?;
            sub_total = sub_total
                .checked_add(line_total)
                .ok_or_else(|| overflow("sub_total"))?;

            lines.push(TransactionLine {
                id: Uuid::new_v4().to_string(),
                transaction_id: transaction_id.clone(),
                product_id: product.id.clone(),
                name_snapshot: product.name.clone(),
                qty: *qty,
                unit_price_cents: product.price_cents,
                line_total_cents: line_total.cents(),
            });
        }

        let tax_total = Money::from_cents(request.tax_total_cents.unwrap_or(0));
        let grand_total = sub_total
            .checked_add(tax_total)
            .ok_or_else(|| overflow("grand_total"))?;

        let transaction = Transaction {
            id: transaction_id.clone(),
            invoice_code: generate_invoice_code(&self.db.checkout_policy().invoice_prefix),
            merchant_id: request.merchant_id.clone(),
            status: TransactionStatus::Pending,
            customer: request.customer.clone(),
            sub_total_cents: sub_total.cents(),
            tax_total_cents: tax_total.cents(),
            grand_total_cents: grand_total.cents(),
            payment: None,
            failure_reason: None,
            created_by: request.actor.clone(),
            created_at: now,
            updated_at: now,
            paid_at: None,
            cancelled_at: None,
        };

        let transactions = self.db.transactions();
        transactions.insert(uow, &transaction).await?;
        for (position, line) in lines.iter().enumerate() {
            transactions.insert_line(uow, line, position).await?;
        }

        // Decrement. Stock may have moved since the check above.
        let recorder = self.db.recorder();
        let reference = MutationReference::Transaction(transaction_id.clone());
        let mut mutations = Vec::with_capacity(lines.len());

        for line in &lines {
            let sale = MutationRequest::outbound(
                line.product_id.as_str(),
                merchant.clone(),
                line.qty,
                request.actor.as_str(),
            )
            .with_reference(reference.clone())
            .with_note(NOTE_SALE);
            mutations.push(recorder.record_within(uow, &sale).await?);
        }

        debug!(
            transaction_id = %transaction.id,
            merchant_id = %transaction.merchant_id,
            lines = lines.len(),
            grand_total = %transaction.grand_total(),
            unit = %uow.id(),
            "Checkout recorded"
        );

        Ok(CheckoutReceipt {
            transaction,
            lines,
            mutations,
        })
    }

    /// Self-committing [`create_within`](Self::create_within).
    pub async fn create(&self, request: &CheckoutRequest) -> DbResult<CheckoutReceipt> {
        let receipt = run_unit(&self.db, "checkout", async {
            let mut uow = self.db.begin().await?;
            let receipt = self.create_within(&mut uow, request).await?;
            Ok::<_, DbError>((uow, receipt))
        })
        .await?;

        info!(
            transaction_id = %receipt.transaction.id,
            invoice_code = %receipt.transaction.invoice_code,
            merchant_id = %receipt.transaction.merchant_id,
            grand_total = %receipt.transaction.grand_total(),
            "Checkout completed"
        );
        Ok(receipt)
    }

    // =========================================================================
    // Status transitions (unit-scoped)
    // =========================================================================

    /// PENDING → PAID.
    pub async fn mark_paid_within(
        &self,
        uow: &mut UnitOfWork,
        transaction_id: &str,
        payment: Option<&PaymentInfo>,
        actor: &str,
    ) -> DbResult<Transaction> {
        validate_actor(actor)?;

        let now = Utc::now();
        if !self
            .db
            .transactions()
            .mark_paid(uow, transaction_id, payment, now)
            .await?
        {
            return Err(self
                .rejected_transition(uow, transaction_id, TransactionStatus::Paid)
                .await);
        }

        debug!(transaction_id = %transaction_id, actor = %actor, "Transaction marked paid");
        self.reload(uow, transaction_id).await
    }

    /// PENDING → FAILED, restocking when the policy says so.
    pub async fn mark_failed_within(
        &self,
        uow: &mut UnitOfWork,
        transaction_id: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> DbResult<Transaction> {
        validate_actor(actor)?;
        validate_note(reason)?;

        let now = Utc::now();
        if !self
            .db
            .transactions()
            .mark_failed(uow, transaction_id, reason, now)
            .await?
        {
            return Err(self
                .rejected_transition(uow, transaction_id, TransactionStatus::Failed)
                .await);
        }

        if self.db.checkout_policy().restock_on_failure {
            self.reverse_sale(uow, transaction_id, NOTE_FAILURE_REVERSAL, actor)
                .await?;
        }

        debug!(transaction_id = %transaction_id, actor = %actor, "Transaction marked failed");
        self.reload(uow, transaction_id).await
    }

    /// PENDING → CANCELLED, crediting every sold unit back.
    ///
    /// Cancelling a CANCELLED transaction returns it unchanged.
    pub async fn cancel_within(
        &self,
        uow: &mut UnitOfWork,
        transaction_id: &str,
        actor: &str,
    ) -> DbResult<Transaction> {
        validate_actor(actor)?;

        let now = Utc::now();
        if self
            .db
            .transactions()
            .mark_cancelled(uow, transaction_id, now)
            .await?
        {
            self.reverse_sale(uow, transaction_id, NOTE_CANCELLATION, actor)
                .await?;
            debug!(transaction_id = %transaction_id, actor = %actor, "Transaction cancelled");
            return self.reload(uow, transaction_id).await;
        }

        let current = self.reload(uow, transaction_id).await?;
        if current.status == TransactionStatus::Cancelled {
            debug!(transaction_id = %transaction_id, "Transaction already cancelled");
            return Ok(current);
        }

        Err(CoreError::InvalidTransition {
            transaction_id: transaction_id.to_string(),
            from: current.status,
            to: TransactionStatus::Cancelled,
        }
        .into())
    }

    /// Moves a transaction to `target`.
    ///
    /// `payment` is only used for PAID. PENDING is never a valid target.
    pub async fn update_status_within(
        &self,
        uow: &mut UnitOfWork,
        transaction_id: &str,
        target: TransactionStatus,
        payment: Option<&PaymentInfo>,
        actor: &str,
    ) -> DbResult<Transaction> {
        match target {
            TransactionStatus::Paid => {
                self.mark_paid_within(uow, transaction_id, payment, actor)
                    .await
            }
            TransactionStatus::Failed => {
                self.mark_failed_within(uow, transaction_id, None, actor)
                    .await
            }
            TransactionStatus::Cancelled => self.cancel_within(uow, transaction_id, actor).await,
            TransactionStatus::Pending => Err(self
                .rejected_transition(uow, transaction_id, TransactionStatus::Pending)
                .await),
        }
    }

    // =========================================================================
    // Status transitions (self-committing)
    // =========================================================================

    /// Self-committing [`mark_paid_within`](Self::mark_paid_within).
    pub async fn mark_paid(
        &self,
        transaction_id: &str,
        payment: Option<&PaymentInfo>,
        actor: &str,
    ) -> DbResult<Transaction> {
        let tx = run_unit(&self.db, "mark_paid", async {
            let mut uow = self.db.begin().await?;
            let tx = self
                .mark_paid_within(&mut uow, transaction_id, payment, actor)
                .await?;
            Ok::<_, DbError>((uow, tx))
        })
        .await?;

        log_status(&tx);
        Ok(tx)
    }

    /// Self-committing [`mark_failed_within`](Self::mark_failed_within).
    pub async fn mark_failed(
        &self,
        transaction_id: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> DbResult<Transaction> {
        let tx = run_unit(&self.db, "mark_failed", async {
            let mut uow = self.db.begin().await?;
            let tx = self
                .mark_failed_within(&mut uow, transaction_id, reason, actor)
                .await?;
            Ok::<_, DbError>((uow, tx))
        })
        .await?;

        log_status(&tx);
        Ok(tx)
    }

    /// Self-committing [`cancel_within`](Self::cancel_within).
    pub async fn cancel(&self, transaction_id: &str, actor: &str) -> DbResult<Transaction> {
        let tx = run_unit(&self.db, "cancel", async {
            let mut uow = self.db.begin().await?;
            let tx = self.cancel_within(&mut uow, transaction_id, actor).await?;
            Ok::<_, DbError>((uow, tx))
        })
        .await?;

        log_status(&tx);
        Ok(tx)
    }

    /// Self-committing [`update_status_within`](Self::update_status_within).
    pub async fn update_status(
        &self,
        transaction_id: &str,
        target: TransactionStatus,
        payment: Option<&PaymentInfo>,
        actor: &str,
    ) -> DbResult<Transaction> {
        let tx = run_unit(&self.db, "update_status", async {
            let mut uow = self.db.begin().await?;
            let tx = self
                .update_status_within(&mut uow, transaction_id, target, payment, actor)
                .await?;
            Ok::<_, DbError>((uow, tx))
        })
        .await?;

        log_status(&tx);
        Ok(tx)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// A sale by ID.
    pub async fn transaction(&self, transaction_id: &str) -> DbResult<Transaction> {
        self.db
            .transactions()
            .get(transaction_id)
            .await?
            .ok_or_else(|| DbError::not_found("Transaction", transaction_id))
    }

    /// The captured lines of a sale, in request order.
    pub async fn lines(&self, transaction_id: &str) -> DbResult<Vec<TransactionLine>> {
        self.db.transactions().lines(transaction_id).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn reload(&self, uow: &mut UnitOfWork, transaction_id: &str) -> DbResult<Transaction> {
        self.db
            .transactions()
            .get_within(uow, transaction_id)
            .await?
            .ok_or_else(|| DbError::not_found("Transaction", transaction_id))
    }

    /// Explains why a conditional status write matched nothing.
    async fn rejected_transition(
        &self,
        uow: &mut UnitOfWork,
        transaction_id: &str,
        to: TransactionStatus,
    ) -> DbError {
        match self.reload(uow, transaction_id).await {
            Ok(current) => CoreError::InvalidTransition {
                transaction_id: transaction_id.to_string(),
                from: current.status,
                to,
            }
            .into(),
            Err(err) => err,
        }
    }

    /// Credits back every sale row of the transaction.
    ///
    /// Runs only after this unit won the conditional status write, so a
    /// sale is reversed at most once.
    async fn reverse_sale(
        &self,
        uow: &mut UnitOfWork,
        transaction_id: &str,
        note: &str,
        actor: &str,
    ) -> DbResult<()> {
        let reference = MutationReference::Transaction(transaction_id.to_string());
        let sold = self
            .db
            .ledger()
            .by_reference_within(uow, &reference)
            .await?;

        let recorder = self.db.recorder();
        for row in sold
            .iter()
            .filter(|row| row.direction == Direction::Out && row.note.as_deref() == Some(NOTE_SALE))
        {
            let Some(location) = row.location.clone() else {
                continue;
            };
            let credit = MutationRequest::inbound(row.product_id.as_str(), location, row.amount, actor)
                .with_reference(reference.clone())
                .with_note(note);
            recorder.record_within(uow, &credit).await?;
        }

        Ok(())
    }
}

fn overflow(field: &str) -> DbError {
    ValidationError::Overflow {
        field: field.to_string(),
    }
    .into()
}

fn log_status(tx: &Transaction) {
    info!(
        transaction_id = %tx.id,
        invoice_code = %tx.invoice_code,
        status = %tx.status,
        "Transaction status changed"
    );
}

/// Generates an invoice code.
///
/// ## Format
/// `{PREFIX}-{YYYYMMDD}-{XXXXXXXX}`
/// - PREFIX: configured prefix (default `INV`)
/// - YYYYMMDD: UTC date
/// - XXXXXXXX: 8 uppercase hex chars of a random UUID
///
/// ## Example
/// `INV-20261017-3FA85F64`
fn generate_invoice_code(prefix: &str) -> String {
    let date_part = Utc::now().format("%Y%m%d");
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, date_part, random[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{CheckoutPolicy, DbConfig};
    use stockline_core::{CustomerInfo, LineItemRequest};

    async fn setup(config: DbConfig) -> (Database, String) {
        let db = Database::new(config).await.unwrap();
        let product = db.products().create("Cola", 250, None).await.unwrap();
        db.locations().insert_merchant("M-1", "Downtown").await.unwrap();
        db.recorder()
            .adjust(&product.id, &Location::merchant("M-1"), Direction::In, 10, "ops", None)
            .await
            .unwrap();
        (db, product.id)
    }

    #[test]
    fn test_invoice_code_format() {
        let code = generate_invoice_code("INV");
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_totals_and_snapshots() {
        let (db, product) = setup(DbConfig::in_memory()).await;

        let request = CheckoutRequest::new("M-1", vec![LineItemRequest::new(&product, 3)], "cashier")
            .with_customer(CustomerInfo {
                name: Some("Ana".into()),
                ..CustomerInfo::default()
            })
            .with_tax_total(Money::from_cents(75));
        let receipt = db.checkout().create(&request).await.unwrap();

        let tx = &receipt.transaction;
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.sub_total_cents, 750);
        assert_eq!(tx.tax_total_cents, 75);
        assert_eq!(tx.grand_total_cents, 825);
        assert!(tx.invoice_code.starts_with("INV-"));

        let stored = db.checkout().transaction(&tx.id).await.unwrap();
        assert_eq!(stored.customer.name.as_deref(), Some("Ana"));
        let lines = db.checkout().lines(&tx.id).await.unwrap();
        assert_eq!(lines[0].name_snapshot, "Cola");
        assert_eq!(lines[0].unit_price_cents, 250);
        assert_eq!(receipt.mutations[0].note.as_deref(), Some(NOTE_SALE));
    }

    #[tokio::test]
    async fn test_unassociated_product_is_not_available() {
        let (db, product) = setup(DbConfig::in_memory()).await;
        let other = db.products().create("Water", 100, None).await.unwrap();

        let request = CheckoutRequest::new(
            "M-1",
            vec![LineItemRequest::new(&product, 1), LineItemRequest::new(&other.id, 1)],
            "cashier",
        );
        let err = db.checkout().create(&request).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ProductNotAvailable { .. })));
        assert_eq!(db.stock().get(&product, &Location::merchant("M-1")).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_mark_paid_stores_payment() {
        let (db, product) = setup(DbConfig::in_memory()).await;
        let receipt = db
            .checkout()
            .create(&CheckoutRequest::new("M-1", vec![LineItemRequest::new(&product, 1)], "cashier"))
            .await
            .unwrap();

        let mut payment = PaymentInfo {
            method: Some("card".into()),
            reference: Some("AUTH-1".into()),
            ..PaymentInfo::default()
        };
        payment.metadata.insert("terminal".into(), "T-9".into());

        let paid = db
            .checkout()
            .mark_paid(&receipt.transaction.id, Some(&payment), "cashier")
            .await
            .unwrap();
        assert_eq!(paid.status, TransactionStatus::Paid);
        assert!(paid.paid_at.is_some());
        assert_eq!(paid.payment, Some(payment));

        // paid sales keep their stock effect
        assert_eq!(db.stock().get(&product, &Location::merchant("M-1")).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_failed_without_restock_policy_keeps_stock() {
        let (db, product) = setup(DbConfig::in_memory()).await;
        let receipt = db
            .checkout()
            .create(&CheckoutRequest::new("M-1", vec![LineItemRequest::new(&product, 4)], "cashier"))
            .await
            .unwrap();

        let failed = db
            .checkout()
            .mark_failed(&receipt.transaction.id, Some("card declined"), "cashier")
            .await
            .unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
        assert_eq!(db.stock().get(&product, &Location::merchant("M-1")).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_failed_with_restock_policy_credits_back() {
        let config = DbConfig::in_memory().checkout_policy(CheckoutPolicy {
            restock_on_failure: true,
            ..CheckoutPolicy::default()
        });
        let (db, product) = setup(config).await;
        let receipt = db
            .checkout()
            .create(&CheckoutRequest::new("M-1", vec![LineItemRequest::new(&product, 4)], "cashier"))
            .await
            .unwrap();

        db.checkout()
            .mark_failed(&receipt.transaction.id, None, "cashier")
            .await
            .unwrap();
        assert_eq!(db.stock().get(&product, &Location::merchant("M-1")).await.unwrap(), 10);

        let rows = db
            .ledger()
            .by_reference(&MutationReference::Transaction(receipt.transaction.id.clone()))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].note.as_deref(), Some(NOTE_FAILURE_REVERSAL));
    }

    #[tokio::test]
    async fn test_pending_is_never_a_target() {
        let (db, product) = setup(DbConfig::in_memory()).await;
        let receipt = db
            .checkout()
            .create(&CheckoutRequest::new("M-1", vec![LineItemRequest::new(&product, 1)], "cashier"))
            .await
            .unwrap();

        let err = db
            .checkout()
            .update_status(&receipt.transaction.id, TransactionStatus::Pending, None, "cashier")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidTransition {
                from: TransactionStatus::Pending,
                to: TransactionStatus::Pending,
                ..
            })
        ));

        let err = db
            .checkout()
            .update_status("missing", TransactionStatus::Paid, None, "cashier")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::NotFound { .. })));
    }
}
