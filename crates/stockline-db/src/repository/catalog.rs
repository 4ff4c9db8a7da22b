//! # Catalog Repositories
//!
//! Products, warehouses and merchants. These registries exist so the engines
//! can check existence and read the current unit price; they never touch
//! stock.

use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::unit_of_work::UnitOfWork;
use stockline_core::validation::{validate_id, validate_name, validate_price_cents};
use stockline_core::{Location, Merchant, Product, Warehouse};

// =============================================================================
// Products
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let product = db.products().create("Cola 330ml", 199, None).await?;
/// db.products().set_price(&product.id, 249).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product with a generated ID.
    pub async fn create(
        &self,
        name: &str,
        price_cents: i64,
        category_id: Option<&str>,
    ) -> DbResult<Product> {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            price_cents,
            category_id: category_id.map(String::from),
            created_at: now,
            updated_at: now,
        };
        self.insert(&product).await
    }

    /// Inserts a product as given.
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        validate_id("product_id", &product.id)?;
        validate_name(&product.name)?;
        validate_price_cents(product.price_cents)?;

        debug!(id = %product.id, price_cents = product.price_cents, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, category_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(&product.category_id)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &product.id),
            other => other,
        })?;

        Ok(product.clone())
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        fetch_product(&self.pool, id).await
    }

    /// Same as [`get_by_id`](Self::get_by_id), inside a unit of work.
    pub async fn get_within(&self, uow: &mut UnitOfWork, id: &str) -> DbResult<Option<Product>> {
        fetch_product(uow.conn(), id).await
    }

    /// Changes the current price.
    ///
    /// Sale lines keep the price captured when they were written.
    pub async fn set_price(&self, id: &str, price_cents: i64) -> DbResult<()> {
        validate_price_cents(price_cents)?;

        let result = sqlx::query(
            "UPDATE products SET price_cents = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(price_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        debug!(id = %id, price_cents, "Product price changed");
        Ok(())
    }

    /// Checks whether a product exists.
    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        Ok(self.get_by_id(id).await?.is_some())
    }
}

async fn fetch_product<'e>(exec: impl SqliteExecutor<'e>, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, price_cents, category_id, created_at, updated_at
        FROM products
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;

    Ok(product)
}

// =============================================================================
// Locations
// =============================================================================

/// Repository for the warehouse and merchant registries.
#[derive(Debug, Clone)]
pub struct LocationRepository {
    pool: SqlitePool,
}

impl LocationRepository {
    /// Creates a new LocationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LocationRepository { pool }
    }

    /// Registers a warehouse.
    pub async fn insert_warehouse(&self, id: &str, name: &str) -> DbResult<Warehouse> {
        validate_id("warehouse_id", id)?;
        validate_name(name)?;

        let warehouse = Warehouse {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        debug!(id = %id, "Inserting warehouse");

        sqlx::query("INSERT INTO warehouses (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&warehouse.id)
            .bind(&warehouse.name)
            .bind(warehouse.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => DbError::duplicate(field, id),
                other => other,
            })?;

        Ok(warehouse)
    }

    /// Registers a merchant store.
    pub async fn insert_merchant(&self, id: &str, name: &str) -> DbResult<Merchant> {
        validate_id("merchant_id", id)?;
        validate_name(name)?;

        let merchant = Merchant {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        debug!(id = %id, "Inserting merchant");

        sqlx::query("INSERT INTO merchants (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&merchant.id)
            .bind(&merchant.name)
            .bind(merchant.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => DbError::duplicate(field, id),
                other => other,
            })?;

        Ok(merchant)
    }

    /// Gets a warehouse by its ID.
    pub async fn get_warehouse(&self, id: &str) -> DbResult<Option<Warehouse>> {
        let warehouse = sqlx::query_as::<_, Warehouse>(
            "SELECT id, name, created_at FROM warehouses WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(warehouse)
    }

    /// Gets a merchant by its ID.
    pub async fn get_merchant(&self, id: &str) -> DbResult<Option<Merchant>> {
        let merchant = sqlx::query_as::<_, Merchant>(
            "SELECT id, name, created_at FROM merchants WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(merchant)
    }

    /// Checks whether a location is registered.
    pub async fn exists(&self, location: &Location) -> DbResult<bool> {
        location_exists(&self.pool, location).await
    }

    /// Same as [`exists`](Self::exists), inside a unit of work.
    pub async fn exists_within(&self, uow: &mut UnitOfWork, location: &Location) -> DbResult<bool> {
        location_exists(uow.conn(), location).await
    }

    /// Fails with `NotFound` unless the location is registered.
    pub async fn require_within(&self, uow: &mut UnitOfWork, location: &Location) -> DbResult<()> {
        if self.exists_within(uow, location).await? {
            Ok(())
        } else {
            Err(location_not_found(location))
        }
    }
}

pub(crate) fn location_not_found(location: &Location) -> DbError {
    match location {
        Location::Warehouse(id) => DbError::not_found("Warehouse", id.as_str()),
        Location::Merchant(id) => DbError::not_found("Merchant", id.as_str()),
    }
}

async fn location_exists<'e>(exec: impl SqliteExecutor<'e>, location: &Location) -> DbResult<bool> {
    let sql = match location {
        Location::Warehouse(_) => "SELECT COUNT(*) FROM warehouses WHERE id = ?1",
        Location::Merchant(_) => "SELECT COUNT(*) FROM merchants WHERE id = ?1",
    };

    let count: i64 = sqlx::query_scalar(sql)
        .bind(location.id())
        .fetch_one(exec)
        .await?;

    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use crate::error::DbError;
    use stockline_core::{CoreError, Location};

    #[tokio::test]
    async fn test_product_price_change() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().create("Cola", 199, None).await.unwrap();

        db.products().set_price(&product.id, 249).await.unwrap();
        let fetched = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(fetched.price_cents, 249);

        let err = db.products().set_price("missing", 1).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_location_registry() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.locations().insert_warehouse("W-1", "Central").await.unwrap();
        db.locations().insert_merchant("M-1", "Downtown").await.unwrap();

        assert!(db.locations().exists(&Location::warehouse("W-1")).await.unwrap());
        assert!(db.locations().exists(&Location::merchant("M-1")).await.unwrap());
        // same id under the other kind is a different location
        assert!(!db.locations().exists(&Location::merchant("W-1")).await.unwrap());

        let dup = db.locations().insert_merchant("M-1", "Again").await.unwrap_err();
        assert!(matches!(dup, DbError::UniqueViolation { .. }));
    }
}
