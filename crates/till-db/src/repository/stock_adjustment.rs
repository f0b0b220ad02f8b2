//! # Stock Adjustment Repository
//!
//! Append-only stock ledger. Rows are never updated or deleted.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use till_core::StockAdjustment;

pub struct StockAdjustmentRepository;

impl StockAdjustmentRepository {
    pub async fn insert(conn: &mut SqliteConnection, adjustment: &StockAdjustment) -> DbResult<()> {
        debug!(
            product_id = %adjustment.product_id,
            kind = ?adjustment.adjustment_type,
            quantity = adjustment.quantity,
            previous = adjustment.previous_quantity,
            new = adjustment.new_quantity,
            "Recording stock adjustment"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_adjustments (
                id, product_id, location_id, adjustment_type, reason, quantity,
                previous_quantity, new_quantity, reference_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&adjustment.id)
        .bind(&adjustment.product_id)
        .bind(&adjustment.location_id)
        .bind(adjustment.adjustment_type)
        .bind(adjustment.reason)
        .bind(adjustment.quantity)
        .bind(adjustment.previous_quantity)
        .bind(adjustment.new_quantity)
        .bind(&adjustment.reference_id)
        .bind(adjustment.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Ledger entries of a product, oldest first.
    pub async fn list_for_product(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Vec<StockAdjustment>> {
        let rows = sqlx::query_as::<_, StockAdjustment>(
            r#"
            SELECT id, product_id, location_id, adjustment_type, reason, quantity,
                   previous_quantity, new_quantity, reference_id, created_at
            FROM stock_adjustments
            WHERE product_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}
