//! # Product Repository
//!
//! Catalog boundary: the Line-Item Ledger snapshots unit prices from here.
//! The catalog itself is an external collaborator; this repository carries
//! only the lookups the engine needs plus inserts for provisioning/tests.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use comanda_core::Product;

/// Repository for product lookups.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets an active product by ID.
    ///
    /// Inactive (soft-deleted) products are invisible here: they can no
    /// longer be added to tabs, though historical line items keep their
    /// snapshots.
    pub async fn get_active(&self, id: &str) -> DbResult<Product> {
        let product: Option<Product> = sqlx::query_as(
            r#"
            SELECT id, name, price_cents, is_active, created_at
            FROM products
            WHERE id = ? AND is_active = 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        product.ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Lists all active products, ordered by name.
    pub async fn list_active(&self) -> DbResult<Vec<Product>> {
        let products: Vec<Product> = sqlx::query_as(
            r#"
            SELECT id, name, price_cents, is_active, created_at
            FROM products
            WHERE is_active = 1
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a product (provisioning/seeding).
    pub async fn insert(&self, name: &str, price_cents: i64) -> DbResult<Product> {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            price_cents,
            is_active: true,
            created_at: Utc::now(),
        };

        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, is_active, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let product = repo.insert("Chopp 300ml", 650).await.unwrap();
        let fetched = repo.get_active(&product.id).await.unwrap();

        assert_eq!(fetched.name, "Chopp 300ml");
        assert_eq!(fetched.price_cents, 650);
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.products().get_active("nope").await.unwrap_err();
        assert!(matches!(err, crate::DbError::NotFound { .. }));
    }
}
