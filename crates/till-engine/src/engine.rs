//! # Engine
//!
//! Entry point for API layers: the three write operations plus the lookups
//! back-office screens need after them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use till_core::validation::validate_uuid;
use till_core::{LoyaltyAccount, Order, OrderItem, PaymentTransaction, ProductReturn, StockAdjustment};
use till_db::{
    BatchRepository, Database, LoyaltyRepository, Notification, NotificationRepository, OrderRepository,
    ReturnRepository, StockAdjustmentRepository, TransactionRepository,
};

use crate::checkout::{CheckoutReceipt, CheckoutRequest, SaleOrchestrator};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::notify::{ChannelHub, Notifier, PermissionEvent};
use crate::returns::{ReturnDecision, ReturnDetails, ReturnOrchestrator, ReturnOutcome, ReturnRequest};

/// An order with its lines, payment ledger rows and returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub transactions: Vec<PaymentTransaction>,
    pub returns: Vec<ProductReturn>,
}

#[derive(Clone)]
pub struct Engine {
    db: Database,
    sales: SaleOrchestrator,
    returns: ReturnOrchestrator,
    hub: Option<ChannelHub>,
}

impl Engine {
    /// Opens the database from `config` and wires the standard notifier.
    pub async fn connect(config: &EngineConfig) -> EngineResult<Self> {
        let db = Database::new(config.db_config()).await?;
        let (notifier, hub) = Notifier::standard(db.clone(), config.notify_channel_capacity);

        let mut engine = Self::new(db, notifier, config.operation_timeout);
        engine.hub = Some(hub);

        info!(
            path = %config.db_path.display(),
            timeout_ms = config.operation_timeout.as_millis() as u64,
            "Engine ready"
        );
        Ok(engine)
    }

    pub fn new(db: Database, notifier: Notifier, timeout: Duration) -> Self {
        Self {
            sales: SaleOrchestrator::new(db.clone(), notifier.clone(), timeout),
            returns: ReturnOrchestrator::new(db.clone(), notifier, timeout),
            db,
            hub: None,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Live events, when the engine was built with [`Engine::connect`].
    pub fn subscribe(&self) -> Option<broadcast::Receiver<PermissionEvent>> {
        self.hub.as_ref().map(ChannelHub::subscribe)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub async fn checkout(&self, request: CheckoutRequest) -> EngineResult<CheckoutReceipt> {
        self.sales.checkout(request).await
    }

    pub async fn request_return(&self, request: ReturnRequest) -> EngineResult<ReturnDetails> {
        self.returns.request_return(request).await
    }

    pub async fn process_return(&self, return_id: &str, decision: ReturnDecision) -> EngineResult<ReturnOutcome> {
        self.returns.process_return(return_id, decision).await
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub async fn order(&self, order_number: &str) -> EngineResult<OrderDetails> {
        let mut conn = self.db.acquire().await?;
        let order = OrderRepository::get_by_number(&mut conn, order_number)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_number))?;

        let items = OrderRepository::items(&mut conn, &order.id).await?;
        let transactions = TransactionRepository::list_for_order(&mut conn, &order.id).await?;
        let returns = ReturnRepository::list_for_order(&mut conn, &order.id).await?;

        Ok(OrderDetails {
            order,
            items,
            transactions,
            returns,
        })
    }

    pub async fn return_details(&self, return_id: &str) -> EngineResult<ReturnDetails> {
        validate_uuid("return_id", return_id)?;

        let mut conn = self.db.acquire().await?;
        let ret = ReturnRepository::get_by_id(&mut conn, return_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Return", return_id))?;
        let items = ReturnRepository::items(&mut conn, return_id).await?;

        Ok(ReturnDetails { ret, items })
    }

    /// Stock ledger of a product, oldest entry first.
    pub async fn stock_history(&self, product_id: &str) -> EngineResult<Vec<StockAdjustment>> {
        let mut conn = self.db.acquire().await?;
        Ok(StockAdjustmentRepository::list_for_product(&mut conn, product_id).await?)
    }

    pub async fn stock_level(&self, product_id: &str, location_id: &str) -> EngineResult<i64> {
        let mut conn = self.db.acquire().await?;
        Ok(BatchRepository::total_quantity(&mut conn, product_id, location_id).await?)
    }

    pub async fn loyalty_account(&self, customer_id: &str) -> EngineResult<LoyaltyAccount> {
        let mut conn = self.db.acquire().await?;
        LoyaltyRepository::get_by_customer(&mut conn, customer_id)
            .await?
            .ok_or_else(|| EngineError::not_found("LoyaltyAccount", customer_id))
    }

    /// Stored notifications for a permission, newest first.
    pub async fn notifications(&self, permission: &str, limit: u32) -> EngineResult<Vec<Notification>> {
        let mut conn = self.db.acquire().await?;
        Ok(NotificationRepository::list_for_permission(&mut conn, permission, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::CartLine;
    use crate::error::ErrorKind;
    use crate::notify::{permissions, tests::Recorder, EngineEvent};
    use crate::returns::ReturnLine;
    use crate::testkit::{self, LOCATION};
    use crate::{commit_within, with_deadline, BatchAllocator};
    use std::sync::Arc;
    use till_core::{
        CoreError, DiscountType, ItemCondition, OrderStatus, PaymentMethod, ReturnStatus, TransactionStatus,
    };

    fn cart(product_id: &str, quantity: i64, customer_id: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: customer_id.map(str::to_string),
            items: vec![CartLine {
                product_id: product_id.to_string(),
                quantity,
            }],
            payment_method: PaymentMethod::Wallet,
            points_to_redeem: 0,
        }
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_never_oversell() {
        let (db, path) = testkit::file_db(8).await;
        let product = testkit::product(&db, 500, "grocery", None).await;
        testkit::batch(&db, &product, 10).await;

        let engine = Engine::new(
            db.clone(),
            Arc::new(Recorder::default()).notifier(),
            Duration::from_secs(30),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let request = cart(&product.id, 3, None);
            handles.push(tokio::spawn(async move { engine.checkout(request).await }));
        }

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => committed += 1,
                Err(EngineError::Core(CoreError::InsufficientStock { requested: 3, .. })) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(committed, 3);
        assert_eq!(engine.stock_level(&product.id, LOCATION).await.unwrap(), 1);

        let history = engine.stock_history(&product.id).await.unwrap();
        assert_eq!(history.len(), 3);
        // Each sale starts from the previous one's result
        let mut levels: Vec<_> = history
            .iter()
            .map(|a| (a.previous_quantity, a.new_quantity))
            .collect();
        levels.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(levels, vec![(10, 7), (7, 4), (4, 1)]);

        db.close().await;
        testkit::remove_db_files(&path);
    }

    #[tokio::test]
    async fn test_most_specific_promotion_wins_at_checkout() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 1_000, "grocery", Some("pantry")).await;
        testkit::batch(&db, &product, 5).await;
        testkit::promotion(&db, "grocery half off", None, None, Some("grocery"), DiscountType::Percentage, 50, 9).await;
        testkit::promotion(&db, "pantry 1.00", None, Some("pantry"), None, DiscountType::FixedAmount, 100, 0).await;
        let winner =
            testkit::promotion(&db, "pantry 2.00", None, Some("pantry"), None, DiscountType::FixedAmount, 200, 1).await;

        let engine = Engine::new(db, Arc::new(Recorder::default()).notifier(), Duration::from_secs(5));
        let receipt = engine.checkout(cart(&product.id, 2, None)).await.unwrap();

        let line = &receipt.items[0];
        assert_eq!(line.promotion_id.as_deref(), Some(winner.id.as_str()));
        assert_eq!(line.unit_price_cents, 800);
        assert_eq!(line.discount_cents, 400);
        assert_eq!(receipt.order.total_cents, 1_600);
    }

    #[tokio::test]
    async fn test_connect_wires_hub_store_and_lookups() {
        let path = std::env::temp_dir().join(format!("till-{}.db", uuid::Uuid::new_v4()));
        let config = EngineConfig {
            db_path: path.clone(),
            ..EngineConfig::default()
        };
        let engine = Engine::connect(&config).await.unwrap();
        let mut events = engine.subscribe().unwrap();

        let product = testkit::product(engine.database(), 1_250, "grocery", None).await;
        testkit::batch(engine.database(), &product, 4).await;

        let receipt = engine
            .checkout(cart(&product.id, 2, Some("cust-7")))
            .await
            .unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(first.permission, permissions::SALES_VIEW);
        assert!(matches!(first.event, EngineEvent::SaleCompleted { total_cents: 2_500, .. }));
        let second = events.recv().await.unwrap();
        assert!(matches!(second.event, EngineEvent::StockChanged { new_quantity: 2, .. }));

        let stored = engine.notifications(permissions::SALES_VIEW, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].message.contains(&receipt.order.order_number));

        let details = engine.order(&receipt.order.order_number).await.unwrap();
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.transactions[0].status, TransactionStatus::Completed);
        assert!(details.returns.is_empty());

        let account = engine.loyalty_account("cust-7").await.unwrap();
        assert_eq!(account.points, 25);

        let pending = engine
            .request_return(ReturnRequest {
                order_number: receipt.order.order_number.clone(),
                customer_id: Some("cust-7".to_string()),
                items: vec![ReturnLine {
                    order_item_id: receipt.items[0].id.clone(),
                    quantity: 1,
                    condition: ItemCondition::Opened,
                    reason: "Box damaged in transit".to_string(),
                }],
            })
            .await
            .unwrap();
        let fetched = engine.return_details(&pending.ret.id).await.unwrap();
        assert_eq!(fetched.items.len(), 1);
        assert_eq!(fetched.items[0].condition, ItemCondition::Opened);
        assert_eq!(
            engine.order(&receipt.order.order_number).await.unwrap().returns.len(),
            1
        );

        engine.database().close().await;
        testkit::remove_db_files(&path);
    }

    #[tokio::test]
    async fn test_approved_return_is_visible_on_order_item() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 700, "grocery", None).await;
        testkit::batch(&db, &product, 5).await;
        let engine = Engine::new(db, Arc::new(Recorder::default()).notifier(), Duration::from_secs(5));

        let receipt = engine.checkout(cart(&product.id, 2, None)).await.unwrap();
        let pending = engine
            .request_return(ReturnRequest {
                order_number: receipt.order.order_number.clone(),
                customer_id: None,
                items: vec![ReturnLine {
                    order_item_id: receipt.items[0].id.clone(),
                    quantity: 1,
                    condition: ItemCondition::Good,
                    reason: "Wrong size".to_string(),
                }],
            })
            .await
            .unwrap();

        let before = engine.order(&receipt.order.order_number).await.unwrap();
        assert_eq!(before.items[0].returned_qty, 0);
        assert!(!before.items[0].is_returned);

        engine
            .process_return(&pending.ret.id, ReturnDecision::Approve)
            .await
            .unwrap();

        let details = engine.order(&receipt.order.order_number).await.unwrap();
        let item = &details.items[0];
        assert_eq!(item.quantity, 2);
        assert_eq!(item.returned_qty, 1);
        assert!(item.is_returned);
        assert_eq!(item.returnable_qty(), 1);
        assert_eq!(details.order.status, OrderStatus::PartiallyReturned);
        assert_eq!(details.returns[0].status, ReturnStatus::Approved);
        let statuses: Vec<_> = details.transactions.iter().map(|t| t.status).collect();
        assert!(statuses.contains(&TransactionStatus::Completed));
        assert!(statuses.contains(&TransactionStatus::Refunded));
        assert_eq!(engine.stock_level(&product.id, LOCATION).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_lookup_misses() {
        let db = testkit::db().await;
        let engine = Engine::new(db, Arc::new(Recorder::default()).notifier(), Duration::from_secs(5));

        assert_eq!(engine.order("ORD-NONE").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            engine.loyalty_account("nobody").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            engine
                .return_details(&uuid::Uuid::new_v4().to_string())
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert!(engine.subscribe().is_none());
    }

    #[tokio::test]
    async fn test_deadline_exceeded_is_cancelled() {
        let err = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, EngineError>(())
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(matches!(err, EngineError::DeadlineExceeded(d) if d == Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn test_stage_past_deadline_is_rolled_back() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 100, "grocery", None).await;
        testkit::batch(&db, &product, 5).await;

        let err = commit_within(Duration::from_millis(20), async {
            let mut tx = db.begin().await?;
            BatchAllocator::deplete(&mut tx, &product.id, LOCATION, 2, "held", chrono::Utc::now()).await?;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, EngineError>((tx, ()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let engine = Engine::new(db, Arc::new(Recorder::default()).notifier(), Duration::from_secs(5));
        assert_eq!(engine.stock_level(&product.id, LOCATION).await.unwrap(), 5);
        assert!(engine.stock_history(&product.id).await.unwrap().is_empty());
    }
}
