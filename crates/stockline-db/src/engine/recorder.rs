//! # Stock Mutation Recorder
//!
//! The only writer of `stock_levels`. Each call changes one snapshot row and
//! appends the ledger row describing it, in the same unit of work.
//!
//! ```text
//! record_within(uow, request)
//!     │
//!     ├── validate request            (nothing touched on failure)
//!     ├── location registered?        no → NotFound
//!     ├── Out → compare_and_decrement ─┐
//!     │   In  → increment             ─┴─► resulting quantity
//!     └── ledger.append(request, resulting quantity)
//! ```

use tracing::debug;

use crate::engine::run_unit;
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::catalog::location_not_found;
use crate::unit_of_work::UnitOfWork;
use stockline_core::validation::validate_mutation_request;
use stockline_core::{Direction, Location, MutationReference, MutationRequest, StockMutation};

/// Applies single stock mutations.
#[derive(Debug, Clone)]
pub struct StockMutationRecorder {
    db: Database,
}

impl StockMutationRecorder {
    /// Creates a new StockMutationRecorder.
    pub fn new(db: Database) -> Self {
        StockMutationRecorder { db }
    }

    /// Applies `request` inside the caller's unit.
    ///
    /// ## Errors
    /// - `Validation` - amount, note or actor rejected; nothing touched
    /// - `NotFound` - unregistered location, or outbound from a location the
    ///   product was never attached to
    /// - `InsufficientStock` - outbound larger than the quantity on hand
    pub async fn record_within(
        &self,
        uow: &mut UnitOfWork,
        request: &MutationRequest,
    ) -> DbResult<StockMutation> {
        validate_mutation_request(request)?;

        if !self.db.locations().exists_within(uow, &request.location).await? {
            return Err(location_not_found(&request.location));
        }

        let stock = self.db.stock();
        let resulting_quantity = match request.direction {
            Direction::Out => {
                stock
                    .compare_and_decrement(uow, &request.product_id, &request.location, request.amount)
                    .await?
            }
            Direction::In => {
                stock
                    .increment(uow, &request.product_id, &request.location, request.amount)
                    .await?
            }
        };

        self.db.ledger().append(uow, request, resulting_quantity).await
    }

    /// Applies `request` in its own unit and commits it.
    pub async fn record(&self, request: &MutationRequest) -> DbResult<StockMutation> {
        run_unit(&self.db, "record", async {
            let mut uow = self.db.begin().await?;
            let mutation = self.record_within(&mut uow, request).await?;
            Ok::<_, DbError>((uow, mutation))
        })
        .await
    }

    /// Manual stock correction: goods receipt, count, write-off.
    ///
    /// The ledger row references the acting user. Product and location must
    /// both be registered; the location is checked by `record_within`.
    #[allow(clippy::too_many_arguments)]
    pub async fn adjust_within(
        &self,
        uow: &mut UnitOfWork,
        product_id: &str,
        location: &Location,
        direction: Direction,
        amount: i64,
        actor: &str,
        note: Option<&str>,
    ) -> DbResult<StockMutation> {
        let request = MutationRequest {
            product_id: product_id.to_string(),
            location: location.clone(),
            direction,
            amount,
            reference: MutationReference::ManualAdjustment(actor.to_string()),
            note: note.map(String::from),
            actor: actor.to_string(),
        };
        validate_mutation_request(&request)?;

        if self.db.products().get_within(uow, product_id).await?.is_none() {
            return Err(DbError::not_found("Product", product_id));
        }

        let mutation = self.record_within(uow, &request).await?;
        debug!(
            product_id = %product_id,
            location = %location,
            direction = %direction,
            amount,
            actor = %actor,
            "Manual adjustment recorded"
        );
        Ok(mutation)
    }

    /// Self-committing [`adjust_within`](Self::adjust_within).
    pub async fn adjust(
        &self,
        product_id: &str,
        location: &Location,
        direction: Direction,
        amount: i64,
        actor: &str,
        note: Option<&str>,
    ) -> DbResult<StockMutation> {
        run_unit(&self.db, "adjust", async {
            let mut uow = self.db.begin().await?;
            let mutation = self
                .adjust_within(&mut uow, product_id, location, direction, amount, actor, note)
                .await?;
            Ok::<_, DbError>((uow, mutation))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use stockline_core::{CoreError, ValidationError};

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().create("Cola", 199, None).await.unwrap();
        db.locations().insert_warehouse("W-1", "Central").await.unwrap();
        (db, product.id)
    }

    #[tokio::test]
    async fn test_record_captures_resulting_quantity() {
        let (db, product) = setup().await;
        let w = Location::warehouse("W-1");

        let first = db
            .recorder()
            .record(&MutationRequest::inbound(&product, w.clone(), 10, "ops"))
            .await
            .unwrap();
        assert_eq!(first.resulting_quantity, 10);

        let second = db
            .recorder()
            .record(&MutationRequest::outbound(&product, w.clone(), 4, "ops").with_note("damaged"))
            .await
            .unwrap();
        assert_eq!(second.resulting_quantity, 6);
        assert_eq!(second.note.as_deref(), Some("damaged"));
        assert_eq!(db.stock().get(&product, &w).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_invalid_amount_touches_nothing() {
        let (db, product) = setup().await;
        let w = Location::warehouse("W-1");

        let err = db
            .recorder()
            .record(&MutationRequest::inbound(&product, w.clone(), 0, "ops"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
        assert!(db.stock().level(&product, &w).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_outbound_appends_no_row() {
        let (db, product) = setup().await;
        let w = Location::warehouse("W-1");
        db.recorder()
            .adjust(&product, &w, Direction::In, 3, "ops", Some("receipt"))
            .await
            .unwrap();

        let err = db
            .recorder()
            .record(&MutationRequest::outbound(&product, w.clone(), 4, "ops"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientStock { .. })));

        let rows = db
            .ledger()
            .history(&product, &stockline_core::LedgerFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reference, MutationReference::ManualAdjustment("ops".into()));
    }

    #[tokio::test]
    async fn test_adjust_requires_registered_location() {
        let (db, product) = setup().await;
        let err = db
            .recorder()
            .adjust(&product, &Location::merchant("M-404"), Direction::In, 1, "ops", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_record_rejects_unregistered_location() {
        let (db, product) = setup().await;
        let ghost = Location::merchant("M-404");

        let err = db
            .recorder()
            .record(&MutationRequest::inbound(&product, ghost.clone(), 5, "ops"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::NotFound { .. })));
        assert!(db.stock().level(&product, &ghost).await.unwrap().is_none());
        assert!(db.stock().all_levels().await.unwrap().is_empty());
    }
}
