//! # Payment Ledger Repository
//!
//! One row per committed sale (COMPLETED) and per approved refund
//! (REFUNDED). Rows are never updated.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use till_core::PaymentTransaction;

pub struct TransactionRepository;

impl TransactionRepository {
    pub async fn insert(conn: &mut SqliteConnection, txn: &PaymentTransaction) -> DbResult<()> {
        debug!(
            id = %txn.id,
            order_id = %txn.order_id,
            status = ?txn.status,
            amount_cents = txn.amount_cents,
            "Recording payment transaction"
        );

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, order_id, return_id, status, payment_method,
                amount_cents, gateway_reference, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&txn.id)
        .bind(&txn.order_id)
        .bind(&txn.return_id)
        .bind(txn.status)
        .bind(txn.payment_method)
        .bind(txn.amount_cents)
        .bind(&txn.gateway_reference)
        .bind(txn.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Ledger rows of an order, oldest first.
    pub async fn list_for_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<PaymentTransaction>> {
        let rows = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT id, order_id, return_id, status, payment_method,
                   amount_cents, gateway_reference, created_at
            FROM transactions
            WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }
}
