//! # Transfer Engine
//!
//! Moves stock between locations. Every move is exactly two recorder calls
//! in one unit of work.
//!
//! ## Transfer Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  assign_to_merchant(P, W, M, 30)                                       │
//! │                                                                         │
//! │  1. validate        amount > 0, W != M, actor, note                    │
//! │  2. existence       product P, location W, location M                  │
//! │  3. association     (P, W) attached?        no → NotFound              │
//! │  4. out @ W  30     compare_and_decrement   short → InsufficientStock  │
//! │  5. in  @ M  30     increment                                          │
//! │                                                                         │
//! │  Both ledger rows carry reference Transfer(transfer_id).               │
//! │  Any failure drops the unit: W and M are untouched.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::run_unit;
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::catalog::location_not_found;
use crate::unit_of_work::UnitOfWork;
use stockline_core::validation::{validate_transfer, validate_uuid};
use stockline_core::{
    Location, MutationReference, MutationRequest, StockMutation, TransferReceipt, TransferRequest,
};

/// Orchestrates multi-location stock moves.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    db: Database,
}

impl TransferEngine {
    /// Creates a new TransferEngine.
    pub fn new(db: Database) -> Self {
        TransferEngine { db }
    }

    // =========================================================================
    // Unit-scoped
    // =========================================================================

    /// Warehouse → merchant, inside the caller's unit.
    pub async fn assign_to_merchant_within(
        &self,
        uow: &mut UnitOfWork,
        warehouse_id: &str,
        merchant_id: &str,
        request: &TransferRequest,
    ) -> DbResult<TransferReceipt> {
        self.move_within(
            uow,
            Location::warehouse(warehouse_id),
            Location::merchant(merchant_id),
            request,
        )
        .await
    }

    /// Merchant → warehouse, inside the caller's unit.
    pub async fn return_to_warehouse_within(
        &self,
        uow: &mut UnitOfWork,
        merchant_id: &str,
        warehouse_id: &str,
        request: &TransferRequest,
    ) -> DbResult<TransferReceipt> {
        self.move_within(
            uow,
            Location::merchant(merchant_id),
            Location::warehouse(warehouse_id),
            request,
        )
        .await
    }

    /// Merchant → merchant, inside the caller's unit.
    ///
    /// Source and destination must differ.
    pub async fn transfer_between_merchants_within(
        &self,
        uow: &mut UnitOfWork,
        source_merchant_id: &str,
        destination_merchant_id: &str,
        request: &TransferRequest,
    ) -> DbResult<TransferReceipt> {
        self.move_within(
            uow,
            Location::merchant(source_merchant_id),
            Location::merchant(destination_merchant_id),
            request,
        )
        .await
    }

    // =========================================================================
    // Self-committing
    // =========================================================================

    /// Warehouse → merchant in its own unit.
    pub async fn assign_to_merchant(
        &self,
        warehouse_id: &str,
        merchant_id: &str,
        request: &TransferRequest,
    ) -> DbResult<TransferReceipt> {
        let receipt = run_unit(&self.db, "assign_to_merchant", async {
            let mut uow = self.db.begin().await?;
            let receipt = self
                .assign_to_merchant_within(&mut uow, warehouse_id, merchant_id, request)
                .await?;
            Ok::<_, DbError>((uow, receipt))
        })
        .await?;

        log_completed(&receipt);
        Ok(receipt)
    }

    /// Merchant → warehouse in its own unit.
    pub async fn return_to_warehouse(
        &self,
        merchant_id: &str,
        warehouse_id: &str,
        request: &TransferRequest,
    ) -> DbResult<TransferReceipt> {
        let receipt = run_unit(&self.db, "return_to_warehouse", async {
            let mut uow = self.db.begin().await?;
            let receipt = self
                .return_to_warehouse_within(&mut uow, merchant_id, warehouse_id, request)
                .await?;
            Ok::<_, DbError>((uow, receipt))
        })
        .await?;

        log_completed(&receipt);
        Ok(receipt)
    }

    /// Merchant → merchant in its own unit.
    pub async fn transfer_between_merchants(
        &self,
        source_merchant_id: &str,
        destination_merchant_id: &str,
        request: &TransferRequest,
    ) -> DbResult<TransferReceipt> {
        let receipt = run_unit(&self.db, "transfer_between_merchants", async {
            let mut uow = self.db.begin().await?;
            let receipt = self
                .transfer_between_merchants_within(
                    &mut uow,
                    source_merchant_id,
                    destination_merchant_id,
                    request,
                )
                .await?;
            Ok::<_, DbError>((uow, receipt))
        })
        .await?;

        log_completed(&receipt);
        Ok(receipt)
    }

    /// Both ledger rows of a transfer, outbound first.
    pub async fn transfer_legs(&self, transfer_id: &str) -> DbResult<Vec<StockMutation>> {
        validate_uuid("transfer_id", transfer_id)?;

        self.db
            .ledger()
            .by_reference(&MutationReference::Transfer(transfer_id.to_string()))
            .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn move_within(
        &self,
        uow: &mut UnitOfWork,
        source: Location,
        destination: Location,
        request: &TransferRequest,
    ) -> DbResult<TransferReceipt> {
        validate_transfer(request, &source, &destination)?;

        let product_id = request.product_id.as_str();

        if self.db.products().get_within(uow, product_id).await?.is_none() {
            return Err(DbError::not_found("Product", product_id));
        }

        let locations = self.db.locations();
        for location in [&source, &destination] {
            if !locations.exists_within(uow, location).await? {
                return Err(location_not_found(location));
            }
        }

        if self
            .db
            .stock()
            .level_within(uow, product_id, &source)
            .await?
            .is_none()
        {
            return Err(DbError::not_found(
                "Stock level",
                format!("{product_id}@{source}"),
            ));
        }

        let transfer_id = Uuid::new_v4().to_string();
        let reference = MutationReference::Transfer(transfer_id.clone());

        let mut outbound = MutationRequest::outbound(
            product_id,
            source.clone(),
            request.amount,
            request.actor.as_str(),
        )
        .with_reference(reference.clone());
        let mut inbound = MutationRequest::inbound(
            product_id,
            destination.clone(),
            request.amount,
            request.actor.as_str(),
        )
        .with_reference(reference);
        outbound.note = request.note.clone();
        inbound.note = request.note.clone();

        let recorder = self.db.recorder();
        let out_row = recorder.record_within(uow, &outbound).await?;
        let in_row = recorder.record_within(uow, &inbound).await?;

        debug!(
            transfer_id = %transfer_id,
            product_id = %product_id,
            source = %source,
            destination = %destination,
            amount = request.amount,
            unit = %uow.id(),
            "Transfer legs recorded"
        );

        Ok(TransferReceipt {
            transfer_id,
            product_id: product_id.to_string(),
            source,
            destination,
            amount: request.amount,
            outbound: out_row,
            inbound: in_row,
        })
    }
}

fn log_completed(receipt: &TransferReceipt) {
    info!(
        transfer_id = %receipt.transfer_id,
        product_id = %receipt.product_id,
        source = %receipt.source,
        destination = %receipt.destination,
        amount = receipt.amount,
        "Stock transferred"
    );
}
