//! # Product Repository
//!
//! Products are read-only to the engine. The one write is the lock-version
//! bump that opens every checkout:
//!
//! ```text
//! UPDATE products SET lock_version = lock_version + 1 WHERE id = ?
//!   └── first statement of the transaction, so SQLite takes the write lock
//!       here and concurrent checkouts queue behind it until commit
//! ```

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use till_core::Product;

const PRODUCT_COLUMNS: &str = r#"
    id, sku, name, selling_price_cents, purchase_price_cents,
    category_id, subcategory_id, default_location_id,
    created_at, updated_at
"#;

/// Repository for product database operations.
pub struct ProductRepository;

impl ProductRepository {
    /// Takes the pessimistic lock on a product row.
    ///
    /// Returns `false` when the product does not exist.
    pub async fn lock(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE products SET lock_version = lock_version + 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        debug!(product_id = %id, locked = result.rows_affected() == 1, "Product lock");
        Ok(result.rows_affected() == 1)
    }

    /// Gets a product by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(product)
    }

    /// Inserts a product. Used by the seed binary and tests; catalogue
    /// maintenance is not part of the engine.
    pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, selling_price_cents, purchase_price_cents,
                category_id, subcategory_id, default_location_id,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.selling_price_cents)
        .bind(product.purchase_price_cents)
        .bind(&product.category_id)
        .bind(&product.subcategory_id)
        .bind(&product.default_location_id)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, 1099).await;

        let mut conn = db.acquire().await.unwrap();
        let loaded = ProductRepository::get_by_id(&mut conn, &product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.sku, product.sku);
        assert_eq!(loaded.selling_price_cents, 1099);
        assert_eq!(loaded.subcategory_id.as_deref(), Some("pantry"));
    }

    #[tokio::test]
    async fn test_lock_reports_missing_rows() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, 500).await;

        let mut tx = db.begin().await.unwrap();
        assert!(ProductRepository::lock(&mut tx, &product.id).await.unwrap());
        assert!(!ProductRepository::lock(&mut tx, "missing").await.unwrap());
        tx.commit().await.unwrap();
    }
}
