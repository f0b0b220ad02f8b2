//! # Batch Repository
//!
//! Stock batches per product and location. Quantities are written as
//! absolute values computed from a depletion plan, inside the transaction
//! that holds the product lock.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use till_core::Batch;

const BATCH_COLUMNS: &str = r#"
    id, product_id, location_id, quantity, expiry_date, reference,
    created_at, updated_at
"#;

pub struct BatchRepository;

impl BatchRepository {
    /// All batches of a product at a location, exhausted ones included.
    ///
    /// Rows come back in FEFO/FIFO order; callers that depend on the order
    /// still sort with `till_core::allocation`.
    pub async fn for_location(
        conn: &mut SqliteConnection,
        product_id: &str,
        location_id: &str,
    ) -> DbResult<Vec<Batch>> {
        let sql = format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM batches
            WHERE product_id = ?1 AND location_id = ?2
            ORDER BY expiry_date IS NULL, expiry_date, created_at, id
            "#
        );
        let batches = sqlx::query_as::<_, Batch>(&sql)
            .bind(product_id)
            .bind(location_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(batches)
    }

    /// Gets a batch by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Batch>> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?1");
        let batch = sqlx::query_as::<_, Batch>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(batch)
    }

    /// Sum of quantities of a product at a location.
    pub async fn total_quantity(
        conn: &mut SqliteConnection,
        product_id: &str,
        location_id: &str,
    ) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM batches WHERE product_id = ?1 AND location_id = ?2",
        )
        .bind(product_id)
        .bind(location_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(total)
    }

    /// Sets a batch's quantity.
    pub async fn set_quantity(
        conn: &mut SqliteConnection,
        id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(batch_id = %id, quantity, "Updating batch quantity");

        let result = sqlx::query("UPDATE batches SET quantity = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(quantity)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Batch", id));
        }
        Ok(())
    }

    /// Adds units to an existing batch.
    pub async fn add_quantity(
        conn: &mut SqliteConnection,
        id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(batch_id = %id, quantity, "Adding to batch");

        let result = sqlx::query(
            "UPDATE batches SET quantity = quantity + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Batch", id));
        }
        Ok(())
    }

    /// Inserts a batch.
    pub async fn insert(conn: &mut SqliteConnection, batch: &Batch) -> DbResult<()> {
        debug!(
            id = %batch.id,
            product_id = %batch.product_id,
            quantity = batch.quantity,
            "Inserting batch"
        );

        sqlx::query(
            r#"
            INSERT INTO batches (
                id, product_id, location_id, quantity, expiry_date, reference,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.product_id)
        .bind(&batch.location_id)
        .bind(batch.quantity)
        .bind(batch.expiry_date)
        .bind(&batch.reference)
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
