//! # Order Repository
//!
//! Orders and order items.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout ──► COMPLETED                                                 │
//! │                  │  approved return covering some units                 │
//! │                  ▼                                                      │
//! │            PARTIALLY_RETURNED                                           │
//! │                  │  every item fully returned                           │
//! │                  ▼                                                      │
//! │              RETURNED                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Product name and prices are snapshotted on the item, so an order reads the
//! same after the catalogue changes.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use till_core::{Order, OrderItem, OrderStatus};

const ORDER_COLUMNS: &str = r#"
    id, order_number, customer_id, payment_method, status,
    subtotal_cents, promotion_discount_cents, points_discount_cents,
    points_redeemed, points_earned, tax_cents, total_cents,
    created_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, order_id, product_id, name_snapshot, quantity,
    base_price_cents, unit_price_cents, discount_cents, total_price_cents,
    promotion_id, returned_qty, is_returned, created_at
"#;

pub struct OrderRepository;

impl OrderRepository {
    /// Gets an order by ID.
    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(order)
    }

    /// Gets an order by its human-readable number.
    pub async fn get_by_number(conn: &mut SqliteConnection, order_number: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = ?1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_number)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(order)
    }

    /// Takes the write lock on an order row. Returns `false` if it does not
    /// exist.
    pub async fn lock(conn: &mut SqliteConnection, order_number: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query("UPDATE orders SET updated_at = ?2 WHERE order_number = ?1")
            .bind(order_number)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Items of an order in insertion order.
    pub async fn items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ?1 ORDER BY rowid");
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(items)
    }

    pub async fn get_item(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<OrderItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE id = ?1");
        let item = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(item)
    }

    pub async fn insert(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, order_number = %order.order_number, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, customer_id, payment_method, status,
                subtotal_cents, promotion_discount_cents, points_discount_cents,
                points_redeemed, points_earned, tax_cents, total_cents,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11, ?12,
                ?13, ?14
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.customer_id)
        .bind(order.payment_method)
        .bind(order.status)
        .bind(order.subtotal_cents)
        .bind(order.promotion_discount_cents)
        .bind(order.points_discount_cents)
        .bind(order.points_redeemed)
        .bind(order.points_earned)
        .bind(order.tax_cents)
        .bind(order.total_cents)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
        debug!(order_id = %item.order_id, product_id = %item.product_id, "Inserting order item");

        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, product_id, name_snapshot, quantity,
                base_price_cents, unit_price_cents, discount_cents, total_price_cents,
                promotion_id, returned_qty, is_returned, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.base_price_cents)
        .bind(item.unit_price_cents)
        .bind(item.discount_cents)
        .bind(item.total_price_cents)
        .bind(&item.promotion_id)
        .bind(item.returned_qty)
        .bind(item.is_returned)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Adds returned units to an item, refusing to go past its quantity.
    ///
    /// Returns `false` when the guard rejected the update.
    pub async fn add_returned(conn: &mut SqliteConnection, item_id: &str, quantity: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE order_items
            SET returned_qty = returned_qty + ?2, is_returned = 1
            WHERE id = ?1 AND returned_qty + ?2 <= quantity
            "#,
        )
        .bind(item_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn set_status(
        conn: &mut SqliteConnection,
        order_id: &str,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(order_id = %order_id, ?status, "Updating order status");

        sqlx::query("UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(order_id)
            .bind(status)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::Database;
    use till_core::{PaymentMethod, Product};
    use uuid::Uuid;

    /// Inserts an order with one line of `quantity` units of `product`.
    pub(crate) async fn order_with_line(db: &Database, product: &Product, quantity: i64) -> (Order, OrderItem) {
        let now = Utc::now();
        let total = product.selling_price_cents * quantity;
        let order = Order {
            id: Uuid::new_v4().to_string(),
            order_number: format!("ORD-TEST-{}", &Uuid::new_v4().to_string()[..8]),
            customer_id: Some("cust-1".to_string()),
            payment_method: PaymentMethod::Cash,
            status: OrderStatus::Completed,
            subtotal_cents: total,
            promotion_discount_cents: 0,
            points_discount_cents: 0,
            points_redeemed: 0,
            points_earned: 0,
            tax_cents: 0,
            total_cents: total,
            created_at: now,
            updated_at: now,
        };
        let item = OrderItem {
            id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            product_id: product.id.clone(),
            name_snapshot: product.name.clone(),
            quantity,
            base_price_cents: product.selling_price_cents,
            unit_price_cents: product.selling_price_cents,
            discount_cents: 0,
            total_price_cents: total,
            promotion_id: None,
            returned_qty: 0,
            is_returned: false,
            created_at: now,
        };
        let mut conn = db.acquire().await.unwrap();
        OrderRepository::insert(&mut conn, &order).await.unwrap();
        OrderRepository::insert_item(&mut conn, &item).await.unwrap();
        (order, item)
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, 250).await;
        let (order, item) = order_with_line(&db, &product, 2).await;

        let mut conn = db.acquire().await.unwrap();
        let loaded = OrderRepository::get_by_number(&mut conn, &order.order_number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id, order.id);
        assert_eq!(loaded.payment_method, PaymentMethod::Cash);

        let items = OrderRepository::items(&mut conn, &order.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, item.id);
        assert_eq!(items[0].total_price_cents, 500);
        assert!(!items[0].is_returned);
    }

    #[tokio::test]
    async fn test_add_returned_is_guarded() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, 250).await;
        let (_, item) = order_with_line(&db, &product, 2).await;

        let mut conn = db.acquire().await.unwrap();
        assert!(OrderRepository::add_returned(&mut conn, &item.id, 1).await.unwrap());
        assert!(!OrderRepository::add_returned(&mut conn, &item.id, 2).await.unwrap());
        assert!(OrderRepository::add_returned(&mut conn, &item.id, 1).await.unwrap());

        let loaded = OrderRepository::get_item(&mut conn, &item.id).await.unwrap().unwrap();
        assert_eq!(loaded.returned_qty, 2);
        assert!(loaded.is_returned);
    }

    #[tokio::test]
    async fn test_lock_and_status() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, 250).await;
        let (order, _) = order_with_line(&db, &product, 1).await;

        let mut conn = db.acquire().await.unwrap();
        assert!(OrderRepository::lock(&mut conn, &order.order_number, Utc::now()).await.unwrap());
        assert!(!OrderRepository::lock(&mut conn, "ORD-NONE", Utc::now()).await.unwrap());

        OrderRepository::set_status(&mut conn, &order.id, OrderStatus::Returned, Utc::now())
            .await
            .unwrap();
        let loaded = OrderRepository::get_by_id(&mut conn, &order.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Returned);
    }
}
