//! End-to-end stock scenarios against an in-memory database.

use std::time::Duration;

use stockline_core::{
    CheckoutRequest, CoreError, Direction, LedgerFilter, LineItemRequest, Location,
    MutationReference, MutationRequest, TransactionStatus, TransferRequest, ValidationError,
    NOTE_CANCELLATION, NOTE_SALE,
};
use stockline_db::{Database, DbConfig, DbError};

// =============================================================================
// Fixtures
// =============================================================================

struct Network {
    db: Database,
    product: String,
}

const W: &str = "W-1";
const M: &str = "M-1";
const M2: &str = "M-2";

async fn network() -> Network {
    network_with(DbConfig::in_memory()).await
}

async fn network_with(config: DbConfig) -> Network {
    let db = Database::new(config).await.unwrap();
    let product = db.products().create("Cola 330ml", 199, None).await.unwrap();
    db.locations().insert_warehouse(W, "Central").await.unwrap();
    db.locations().insert_merchant(M, "Downtown").await.unwrap();
    db.locations().insert_merchant(M2, "Harbour").await.unwrap();
    Network { db, product: product.id }
}

async fn stock_in(net: &Network, location: &Location, amount: i64) {
    net.db
        .recorder()
        .adjust(&net.product, location, Direction::In, amount, "ops", None)
        .await
        .unwrap();
}

async fn qty(net: &Network, location: &Location) -> i64 {
    net.db.stock().get(&net.product, location).await.unwrap()
}

async fn ledger_rows(net: &Network) -> usize {
    net.db
        .ledger()
        .history(&net.product, &LedgerFilter::default())
        .await
        .unwrap()
        .len()
}

async fn assert_no_drift(db: &Database) {
    let drift = db.reports().find_drift().await.unwrap();
    assert!(drift.is_empty(), "drift: {drift:?}");
}

// =============================================================================
// Transfers
// =============================================================================

#[tokio::test]
async fn assign_to_merchant_moves_stock_with_paired_rows() {
    let net = network().await;
    let w = Location::warehouse(W);
    let m = Location::merchant(M);
    stock_in(&net, &w, 100).await;

    let receipt = net
        .db
        .transfers()
        .assign_to_merchant(W, M, &TransferRequest::new(&net.product, 30, "ops"))
        .await
        .unwrap();

    assert_eq!(qty(&net, &w).await, 70);
    assert_eq!(qty(&net, &m).await, 30);

    let legs = net.db.transfers().transfer_legs(&receipt.transfer_id).await.unwrap();
    assert_eq!(legs.len(), 2);

    let out = &legs[0];
    assert_eq!(out.direction, Direction::Out);
    assert_eq!(out.location, Some(w));
    assert_eq!(out.amount, 30);
    assert_eq!(out.resulting_quantity, 70);

    let inbound = &legs[1];
    assert_eq!(inbound.direction, Direction::In);
    assert_eq!(inbound.location, Some(m));
    assert_eq!(inbound.amount, 30);

    let reference = MutationReference::Transfer(receipt.transfer_id.clone());
    assert!(legs.iter().all(|leg| leg.reference == reference));
    assert_no_drift(&net.db).await;
}

#[tokio::test]
async fn transfer_to_same_merchant_is_a_validation_error() {
    let net = network().await;
    stock_in(&net, &Location::merchant(M), 10).await;

    let err = net
        .db
        .transfers()
        .transfer_between_merchants(M, M, &TransferRequest::new(&net.product, 5, "ops"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DbError::Core(CoreError::Validation(ValidationError::SameLocation { .. }))
    ));
    assert_eq!(qty(&net, &Location::merchant(M)).await, 10);
    assert_eq!(ledger_rows(&net).await, 1);
}

#[tokio::test]
async fn missing_association_is_not_found_not_insufficient() {
    let net = network().await;

    let err = net
        .db
        .transfers()
        .transfer_between_merchants(M, M2, &TransferRequest::new(&net.product, 1, "ops"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Core(CoreError::NotFound { .. })));

    // attached with zero is a shortage, not a missing association
    net.db.stock().attach(&net.product, &Location::merchant(M)).await.unwrap();
    let err = net
        .db
        .transfers()
        .transfer_between_merchants(M, M2, &TransferRequest::new(&net.product, 1, "ops"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Core(CoreError::InsufficientStock { requested: 1, available: 0, .. })
    ));
    assert_eq!(ledger_rows(&net).await, 0);
}

#[tokio::test]
async fn failed_transfer_leaves_both_sides_untouched() {
    let net = network().await;
    let w = Location::warehouse(W);
    stock_in(&net, &w, 5).await;

    let err = net
        .db
        .transfers()
        .assign_to_merchant(W, M, &TransferRequest::new(&net.product, 6, "ops"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Core(CoreError::InsufficientStock { .. })));

    assert_eq!(qty(&net, &w).await, 5);
    assert!(net
        .db
        .stock()
        .level(&net.product, &Location::merchant(M))
        .await
        .unwrap()
        .is_none());
    assert_eq!(ledger_rows(&net).await, 1);
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn checkout_beyond_stock_persists_nothing() {
    let net = network().await;
    let m = Location::merchant(M);
    stock_in(&net, &m, 5).await;

    let request = CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 6)], "cashier");
    let err = net.db.checkout().create(&request).await.unwrap_err();

    match err {
        DbError::Core(CoreError::InsufficientStock {
            requested,
            available,
            ..
        }) => {
            assert_eq!(requested, 6);
            assert_eq!(available, 5);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(net.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(qty(&net, &m).await, 5);
}

#[tokio::test]
async fn checkout_then_cancel_restores_stock() {
    let net = network().await;
    let m = Location::merchant(M);
    stock_in(&net, &m, 10).await;

    let receipt = net
        .db
        .checkout()
        .create(&CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 4)], "cashier"))
        .await
        .unwrap();

    let tx = &receipt.transaction;
    assert_eq!(qty(&net, &m).await, 6);
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.sub_total_cents, 4 * 199);
    assert_eq!(tx.grand_total_cents, tx.sub_total_cents);
    assert_eq!(receipt.lines.len(), 1);
    assert_eq!(receipt.mutations.len(), 1);

    let cancelled = net.db.checkout().cancel(&tx.id, "manager").await.unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(qty(&net, &m).await, 10);

    let rows = net
        .db
        .ledger()
        .by_reference(&MutationReference::Transaction(tx.id.clone()))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].note.as_deref(), Some(NOTE_SALE));
    assert_eq!(rows[1].note.as_deref(), Some(NOTE_CANCELLATION));
    assert_eq!(rows[1].direction, Direction::In);
    assert_no_drift(&net.db).await;
}

#[tokio::test]
async fn cancelling_twice_credits_once() {
    let net = network().await;
    let m = Location::merchant(M);
    stock_in(&net, &m, 10).await;

    let receipt = net
        .db
        .checkout()
        .create(&CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 4)], "cashier"))
        .await
        .unwrap();
    let id = receipt.transaction.id;

    net.db.checkout().cancel(&id, "manager").await.unwrap();
    let again = net.db.checkout().cancel(&id, "manager").await.unwrap();

    assert_eq!(again.status, TransactionStatus::Cancelled);
    assert_eq!(qty(&net, &m).await, 10);
    assert_eq!(ledger_rows(&net).await, 3);
}

#[tokio::test]
async fn three_line_checkout_fails_atomically_on_last_line() {
    let net = network().await;
    let m = Location::merchant(M);

    let second = net.db.products().create("Chips", 279, None).await.unwrap();
    let third = net.db.products().create("Chocolate", 249, None).await.unwrap();

    stock_in(&net, &m, 10).await;
    for (product, amount) in [(&second.id, 10), (&third.id, 2)] {
        net.db
            .recorder()
            .adjust(product, &m, Direction::In, amount, "ops", None)
            .await
            .unwrap();
    }

    let request = CheckoutRequest::new(
        M,
        vec![
            LineItemRequest::new(&net.product, 1),
            LineItemRequest::new(&second.id, 1),
            LineItemRequest::new(&third.id, 3),
        ],
        "cashier",
    );
    let err = net.db.checkout().create(&request).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Core(CoreError::InsufficientStock { ref product_id, .. }) if *product_id == third.id
    ));

    assert_eq!(qty(&net, &m).await, 10);
    assert_eq!(net.db.stock().get(&second.id, &m).await.unwrap(), 10);
    assert_eq!(net.db.stock().get(&third.id, &m).await.unwrap(), 2);

    let sales: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stock_mutations WHERE reference_kind = 'transaction'",
    )
    .fetch_one(net.db.pool())
    .await
    .unwrap();
    assert_eq!(sales, 0);
}

#[tokio::test]
async fn concurrent_sales_never_oversell() {
    let net = network().await;
    let m = Location::merchant(M);
    stock_in(&net, &m, 10).await;

    let a = CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 7)], "till-1");
    let b = CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 6)], "till-2");

    let checkout = net.db.checkout();
    let (ra, rb) = tokio::join!(checkout.create(&a), checkout.create(&b));

    let (winner_qty, loser) = match (ra, rb) {
        (Ok(_), Err(e)) => (7, e),
        (Err(e), Ok(_)) => (6, e),
        (ra, rb) => panic!("expected exactly one winner: {:?} / {:?}", ra.is_ok(), rb.is_ok()),
    };

    assert!(matches!(loser, DbError::Core(CoreError::InsufficientStock { .. })));
    assert_eq!(qty(&net, &m).await, 10 - winner_qty);
    assert_no_drift(&net.db).await;
}

// =============================================================================
// Concurrency on a file-backed pool
// =============================================================================

const RACE_ROUNDS: usize = 10;

async fn file_network(dir: &tempfile::TempDir) -> Network {
    let config = DbConfig::new(dir.path().join("stockline.db")).max_connections(4);
    network_with(config).await
}

fn expect_insufficient(err: DbError, requested_qty: i64, available_qty: i64) {
    match err {
        DbError::Core(CoreError::InsufficientStock { requested, available, .. }) => {
            assert_eq!(requested, requested_qty);
            assert_eq!(available, available_qty);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_sales_on_shared_pool_have_one_winner() {
    for _ in 0..RACE_ROUNDS {
        let dir = tempfile::tempdir().unwrap();
        let net = file_network(&dir).await;
        let m = Location::merchant(M);
        stock_in(&net, &m, 10).await;

        let a = CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 7)], "till-1");
        let b = CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 6)], "till-2");
        let (db_a, db_b) = (net.db.clone(), net.db.clone());
        let ta = tokio::spawn(async move { db_a.checkout().create(&a).await });
        let tb = tokio::spawn(async move { db_b.checkout().create(&b).await });
        let (ra, rb) = (ta.await.unwrap(), tb.await.unwrap());

        let winner_qty = match (ra, rb) {
            (Ok(_), Err(e)) => {
                expect_insufficient(e, 6, 3);
                7
            }
            (Err(e), Ok(_)) => {
                expect_insufficient(e, 7, 4);
                6
            }
            (ra, rb) => panic!("expected exactly one winner: {ra:?} / {rb:?}"),
        };

        assert_eq!(qty(&net, &m).await, 10 - winner_qty);
        assert_no_drift(&net.db).await;
        net.db.close().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_transfer_and_sale_on_shared_pool_have_one_winner() {
    for _ in 0..RACE_ROUNDS {
        let dir = tempfile::tempdir().unwrap();
        let net = file_network(&dir).await;
        let m = Location::merchant(M);
        let m2 = Location::merchant(M2);
        stock_in(&net, &m, 10).await;

        let transfer = TransferRequest::new(&net.product, 7, "ops");
        let sale = CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 6)], "till-1");
        let (db_t, db_s) = (net.db.clone(), net.db.clone());
        let tt = tokio::spawn(async move {
            db_t.transfers().transfer_between_merchants(M, M2, &transfer).await
        });
        let ts = tokio::spawn(async move { db_s.checkout().create(&sale).await });
        let (rt, rs) = (tt.await.unwrap(), ts.await.unwrap());

        match (rt, rs) {
            (Ok(_), Err(e)) => {
                expect_insufficient(e, 6, 3);
                assert_eq!(qty(&net, &m).await, 3);
                assert_eq!(qty(&net, &m2).await, 7);
            }
            (Err(e), Ok(_)) => {
                expect_insufficient(e, 7, 4);
                assert_eq!(qty(&net, &m).await, 4);
                assert!(net.db.stock().level(&net.product, &m2).await.unwrap().is_none());
            }
            (rt, rs) => panic!("expected exactly one winner: {rt:?} / {rs:?}"),
        }

        assert_no_drift(&net.db).await;
        net.db.close().await;
    }
}

#[tokio::test]
async fn captured_price_survives_catalog_change() {
    let net = network().await;
    stock_in(&net, &Location::merchant(M), 10).await;

    let receipt = net
        .db
        .checkout()
        .create(&CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 2)], "cashier"))
        .await
        .unwrap();

    net.db.products().set_price(&net.product, 999).await.unwrap();

    let lines = net.db.checkout().lines(&receipt.transaction.id).await.unwrap();
    assert_eq!(lines[0].unit_price_cents, 199);
    assert_eq!(lines[0].line_total_cents, 398);

    let tx = net.db.checkout().transaction(&receipt.transaction.id).await.unwrap();
    assert_eq!(tx.sub_total_cents, 398);
}

#[tokio::test]
async fn terminal_states_reject_cancellation() {
    let net = network().await;
    let m = Location::merchant(M);
    stock_in(&net, &m, 10).await;

    let checkout = net.db.checkout();
    let paid = checkout
        .create(&CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 1)], "cashier"))
        .await
        .unwrap();
    checkout.mark_paid(&paid.transaction.id, None, "cashier").await.unwrap();

    let err = checkout.cancel(&paid.transaction.id, "manager").await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Core(CoreError::InvalidTransition {
            from: TransactionStatus::Paid,
            to: TransactionStatus::Cancelled,
            ..
        })
    ));

    let failed = checkout
        .create(&CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 1)], "cashier"))
        .await
        .unwrap();
    checkout
        .update_status(&failed.transaction.id, TransactionStatus::Failed, None, "cashier")
        .await
        .unwrap();
    let err = checkout
        .update_status(&failed.transaction.id, TransactionStatus::Cancelled, None, "manager")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Core(CoreError::InvalidTransition { .. })));

    // neither rejection touched stock
    assert_eq!(qty(&net, &m).await, 8);
}

// =============================================================================
// Units of work
// =============================================================================

#[tokio::test]
async fn caller_owned_unit_composes_and_rolls_back() {
    let net = network().await;
    let w = Location::warehouse(W);
    stock_in(&net, &w, 50).await;

    let mut uow = net.db.begin().await.unwrap();
    net.db
        .transfers()
        .assign_to_merchant_within(&mut uow, W, M, &TransferRequest::new(&net.product, 20, "ops"))
        .await
        .unwrap();
    net.db
        .recorder()
        .record_within(&mut uow, &MutationRequest::outbound(&net.product, w.clone(), 5, "ops"))
        .await
        .unwrap();
    uow.rollback().await.unwrap();

    assert_eq!(qty(&net, &w).await, 50);
    assert_eq!(qty(&net, &Location::merchant(M)).await, 0);
    assert_eq!(ledger_rows(&net).await, 1);
}

#[tokio::test]
async fn timed_out_unit_leaves_no_trace() {
    let net = network_with(DbConfig::in_memory().unit_timeout(Duration::from_millis(50))).await;
    let w = Location::warehouse(W);
    stock_in(&net, &w, 50).await;

    let db = net.db.clone();
    let product = net.product.clone();
    let result: Result<(), DbError> = net
        .db
        .bounded(async move {
            let mut uow = db.begin().await?;
            db.recorder()
                .record_within(&mut uow, &MutationRequest::outbound(&product, Location::warehouse(W), 10, "ops"))
                .await?;
            tokio::time::sleep(Duration::from_millis(500)).await;
            uow.commit().await
        })
        .await;

    assert!(matches!(result, Err(DbError::Timeout { .. })));
    assert_eq!(qty(&net, &w).await, 50);
    assert_eq!(ledger_rows(&net).await, 1);
}

#[tokio::test]
async fn ledger_matches_snapshot_after_mixed_traffic() {
    let net = network().await;
    let w = Location::warehouse(W);
    stock_in(&net, &w, 200).await;

    let transfers = net.db.transfers();
    transfers
        .assign_to_merchant(W, M, &TransferRequest::new(&net.product, 60, "ops"))
        .await
        .unwrap();
    transfers
        .assign_to_merchant(W, M2, &TransferRequest::new(&net.product, 40, "ops"))
        .await
        .unwrap();
    transfers
        .transfer_between_merchants(M, M2, &TransferRequest::new(&net.product, 15, "ops"))
        .await
        .unwrap();
    transfers
        .return_to_warehouse(M2, W, &TransferRequest::new(&net.product, 5, "ops"))
        .await
        .unwrap();

    let sale = net
        .db
        .checkout()
        .create(&CheckoutRequest::new(M, vec![LineItemRequest::new(&net.product, 9)], "cashier"))
        .await
        .unwrap();
    net.db.checkout().cancel(&sale.transaction.id, "manager").await.unwrap();
    net.db
        .checkout()
        .create(&CheckoutRequest::new(M2, vec![LineItemRequest::new(&net.product, 3)], "cashier"))
        .await
        .unwrap();

    assert_eq!(qty(&net, &w).await, 105);
    assert_eq!(qty(&net, &Location::merchant(M)).await, 45);
    assert_eq!(qty(&net, &Location::merchant(M2)).await, 47);

    for location in [w, Location::merchant(M), Location::merchant(M2)] {
        let r = net.db.reports().reconcile(&net.product, &location).await.unwrap();
        assert!(r.consistent, "{location}: {r:?}");
        assert!(r.snapshot >= 0);
    }
    assert_no_drift(&net.db).await;

    let total = net.db.reports().current_stock(&net.product, None).await.unwrap();
    assert_eq!(total.total, 200 - 3);
}
