//! # Return Repository
//!
//! Return requests and their items.
//!
//! The PENDING → APPROVED/REJECTED transition is a single conditional
//! update, so two concurrent `process_return` calls cannot both win:
//!
//! ```text
//! UPDATE returns SET status = 'APPROVED' ... WHERE id = ? AND status = 'PENDING'
//!   rows_affected = 1  → this caller owns the transition
//!   rows_affected = 0  → already processed (or missing)
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use till_core::{ProductReturn, ReturnItem, ReturnStatus};

const RETURN_COLUMNS: &str =
    "id, order_id, customer_id, status, refund_amount_cents, created_at, processed_at";

const ITEM_COLUMNS: &str = r#"
    id, return_id, order_item_id, product_id, quantity, condition, reason,
    refund_cents, restocked, created_at
"#;

pub struct ReturnRepository;

impl ReturnRepository {
    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<ProductReturn>> {
        let sql = format!("SELECT {RETURN_COLUMNS} FROM returns WHERE id = ?1");
        let ret = sqlx::query_as::<_, ProductReturn>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(ret)
    }

    pub async fn items(conn: &mut SqliteConnection, return_id: &str) -> DbResult<Vec<ReturnItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM return_items WHERE return_id = ?1 ORDER BY rowid");
        let items = sqlx::query_as::<_, ReturnItem>(&sql)
            .bind(return_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(items)
    }

    pub async fn list_for_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<ProductReturn>> {
        let sql = format!("SELECT {RETURN_COLUMNS} FROM returns WHERE order_id = ?1 ORDER BY rowid");
        let returns = sqlx::query_as::<_, ProductReturn>(&sql)
            .bind(order_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(returns)
    }

    pub async fn insert(conn: &mut SqliteConnection, ret: &ProductReturn) -> DbResult<()> {
        debug!(id = %ret.id, order_id = %ret.order_id, "Inserting return");

        sqlx::query(
            r#"
            INSERT INTO returns (
                id, order_id, customer_id, status, refund_amount_cents,
                created_at, processed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&ret.id)
        .bind(&ret.order_id)
        .bind(&ret.customer_id)
        .bind(ret.status)
        .bind(ret.refund_amount_cents)
        .bind(ret.created_at)
        .bind(ret.processed_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(conn: &mut SqliteConnection, item: &ReturnItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO return_items (
                id, return_id, order_item_id, product_id, quantity, condition,
                reason, refund_cents, restocked, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.return_id)
        .bind(&item.order_item_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.condition)
        .bind(&item.reason)
        .bind(item.refund_cents)
        .bind(item.restocked)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves a PENDING return to `to`. Returns `false` if the return was not
    /// PENDING (or does not exist).
    pub async fn finish_pending(
        conn: &mut SqliteConnection,
        id: &str,
        to: ReturnStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE returns
            SET status = ?2, processed_at = ?3
            WHERE id = ?1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        debug!(return_id = %id, status = to.as_str(), won = result.rows_affected() == 1, "Return transition");
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_restocked(conn: &mut SqliteConnection, item_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE return_items SET restocked = 1 WHERE id = ?1")
            .bind(item_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
