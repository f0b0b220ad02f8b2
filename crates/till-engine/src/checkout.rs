//! # Sale Orchestrator
//!
//! Turns a cart into a committed order.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         checkout(request)                               │
//! │                                                                         │
//! │  validate ── lines, quantities, ids, points                             │
//! │     │                                                                   │
//! │  BEGIN                                                                  │
//! │     ├── lock products (sorted ids)          ProductNotFound             │
//! │     ├── settings snapshot                   Configuration               │
//! │     ├── active promotions                                               │
//! │     ├── per line: price, deplete batches    InsufficientStock           │
//! │     ├── redeem points                       InsufficientPoints,         │
//! │     │                                       DiscountExceedsTotal        │
//! │     ├── net = subtotal − points discount; tax on net                    │
//! │     ├── earn points on net, recompute tier                              │
//! │     └── insert order, items, COMPLETED transaction                      │
//! │  COMMIT                                                                 │
//! │     │                                                                   │
//! │  notify (broadcast, stored notification, report caches)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error before COMMIT drops the transaction, so no batch, balance or
//! order row changes.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use till_core::pricing::PricingResolver;
use till_core::tax::TaxCalculator;
use till_core::validation::{
    validate_line_count, validate_points, validate_quantity, validate_unique_ids, validate_uuid,
};
use till_core::{
    CoreError, LoyaltyTier, Money, Order, OrderItem, OrderStatus, PaymentMethod, PaymentTransaction,
    Product, StockAdjustment, TransactionStatus, ValidationError,
};
use till_db::{
    Database, OrderRepository, ProductRepository, PromotionRepository, TransactionRepository,
};

use crate::allocator::BatchAllocator;
use crate::error::EngineResult;
use crate::ledger::LoyaltyLedger;
use crate::notify::{permissions, topics, Dispatch, EngineEvent, NewNotification, Notifier};
use crate::{commit_within, load_settings, Staged};

// =============================================================================
// Request / Receipt
// =============================================================================

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: Option<String>,
    pub items: Vec<CartLine>,
    pub payment_method: PaymentMethod,
    /// Points to redeem; 0 for none.
    #[serde(default)]
    pub points_to_redeem: i64,
}

/// Loyalty outcome of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltySummary {
    pub points_redeemed: i64,
    pub points_earned: i64,
    pub balance: i64,
    pub tier: LoyaltyTier,
}

/// Everything a committed checkout wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub transaction: PaymentTransaction,
    pub stock: Vec<StockAdjustment>,
    pub loyalty: Option<LoyaltySummary>,
}

impl CheckoutRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_line_count("items", self.items.len())?;
        for line in &self.items {
            validate_uuid("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
        }
        validate_unique_ids("product_id", self.items.iter().map(|l| l.product_id.as_str()))?;
        validate_points(self.points_to_redeem)?;

        let has_customer = match self.customer_id.as_deref() {
            Some(id) if id.trim().is_empty() => {
                return Err(ValidationError::Required {
                    field: "customer_id".to_string(),
                })
            }
            Some(_) => true,
            None => false,
        };
        if self.points_to_redeem > 0 && !has_customer {
            return Err(ValidationError::Required {
                field: "customer_id".to_string(),
            });
        }

        Ok(())
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Clone)]
pub struct SaleOrchestrator {
    db: Database,
    notifier: Notifier,
    timeout: Duration,
}

impl SaleOrchestrator {
    pub fn new(db: Database, notifier: Notifier, timeout: Duration) -> Self {
        Self { db, notifier, timeout }
    }

    /// Completes a sale atomically.
    #[instrument(skip(self, request), fields(lines = request.items.len(), customer = ?request.customer_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> EngineResult<CheckoutReceipt> {
        request.validate()?;

        let receipt = commit_within(self.timeout, self.run(&request)).await?;

        info!(
            order_number = %receipt.order.order_number,
            total = %receipt.order.total(),
            "Checkout committed"
        );
        self.notifier.publish(dispatch_for(&receipt)).await;

        Ok(receipt)
    }

    async fn run(&self, request: &CheckoutRequest) -> EngineResult<Staged<CheckoutReceipt>> {
        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();

        let mut tx = self.db.begin().await?;

        // Products are locked in sorted id order.
        let mut ids: Vec<&str> = request.items.iter().map(|l| l.product_id.as_str()).collect();
        ids.sort_unstable();
        let mut products: HashMap<&str, Product> = HashMap::with_capacity(ids.len());
        for id in ids {
            if !ProductRepository::lock(&mut tx, id).await? {
                return Err(CoreError::ProductNotFound(id.to_string()).into());
            }
            let product = ProductRepository::get_by_id(&mut tx, id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(id.to_string()))?;
            products.insert(id, product);
        }

        let settings = load_settings(&mut tx).await?;
        let promotions = PromotionRepository::list_active(&mut tx, now).await?;
        let resolver = PricingResolver::new(now);
        debug!(promotions = promotions.len(), "Pricing cart");

        let mut items = Vec::with_capacity(request.items.len());
        let mut stock = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = &products[line.product_id.as_str()];
            let priced = resolver.resolve(product, line.quantity, &promotions);

            let movement = BatchAllocator::deplete(
                &mut tx,
                &product.id,
                &product.default_location_id,
                line.quantity,
                &order_id,
                now,
            )
            .await?;
            stock.push(movement.adjustment);

            items.push(OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order_id.clone(),
                product_id: product.id.clone(),
                name_snapshot: product.name.clone(),
                quantity: line.quantity,
                base_price_cents: priced.base_price.cents(),
                unit_price_cents: priced.unit_price.cents(),
                discount_cents: priced.line_discount.cents(),
                total_price_cents: priced.line_total.cents(),
                promotion_id: priced.promotion_id,
                returned_qty: 0,
                is_returned: false,
                created_at: now,
            });
        }

        let subtotal: Money = items.iter().map(|i| Money::from_cents(i.total_price_cents)).sum();
        let promotion_discount: Money = items.iter().map(|i| Money::from_cents(i.discount_cents)).sum();

        let ledger = LoyaltyLedger::new(settings.loyalty);
        let customer_id = request.customer_id.as_deref();

        let redemption = match customer_id {
            Some(customer) if request.points_to_redeem > 0 => Some(
                ledger
                    .redeem(&mut tx, customer, request.points_to_redeem, subtotal, now)
                    .await?,
            ),
            _ => None,
        };
        let points_discount = redemption.map(|r| r.discount).unwrap_or_else(Money::zero);

        let taxed = TaxCalculator::new(settings.tax_rate).apply(subtotal - points_discount);

        let loyalty = match customer_id {
            Some(customer) => {
                let earned = ledger.earn(&mut tx, customer, taxed.net, now).await?;
                Some(LoyaltySummary {
                    points_redeemed: request.points_to_redeem,
                    points_earned: earned.points,
                    balance: earned.balance,
                    tier: earned.tier,
                })
            }
            None => None,
        };

        let order = Order {
            id: order_id.clone(),
            order_number: order_number(now),
            customer_id: request.customer_id.clone(),
            payment_method: request.payment_method,
            status: OrderStatus::Completed,
            subtotal_cents: subtotal.cents(),
            promotion_discount_cents: promotion_discount.cents(),
            points_discount_cents: points_discount.cents(),
            points_redeemed: request.points_to_redeem,
            points_earned: loyalty.map(|l| l.points_earned).unwrap_or(0),
            tax_cents: taxed.tax.cents(),
            total_cents: taxed.total.cents(),
            created_at: now,
            updated_at: now,
        };
        OrderRepository::insert(&mut tx, &order).await?;
        for item in &items {
            OrderRepository::insert_item(&mut tx, item).await?;
        }

        let transaction = PaymentTransaction {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.clone(),
            return_id: None,
            status: TransactionStatus::Completed,
            payment_method: request.payment_method,
            amount_cents: order.total_cents,
            gateway_reference: gateway_reference("TXN", now),
            created_at: now,
        };
        TransactionRepository::insert(&mut tx, &transaction).await?;

        Ok((
            tx,
            CheckoutReceipt {
                order,
                items,
                transaction,
                stock,
                loyalty,
            },
        ))
    }
}

/// `ORD-YYYYMMDD-XXXXXXXX`
pub(crate) fn order_number(now: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", now.format("%Y%m%d"), short_id())
}

/// `{prefix}-YYYYMMDDHHMMSS-XXXXXXXX`
pub(crate) fn gateway_reference(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}-{}", prefix, now.format("%Y%m%d%H%M%S"), short_id())
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

fn dispatch_for(receipt: &CheckoutReceipt) -> Dispatch {
    let order = &receipt.order;
    let mut events = vec![(
        permissions::SALES_VIEW,
        EngineEvent::SaleCompleted {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.clone(),
            total_cents: order.total_cents,
            points_earned: order.points_earned,
        },
    )];
    events.extend(
        receipt
            .stock
            .iter()
            .map(|adj| (permissions::INVENTORY_VIEW, EngineEvent::stock_changed(adj))),
    );

    let mut report_topics = vec![topics::SALES, topics::INVENTORY];
    if receipt.loyalty.is_some() {
        report_topics.push(topics::LOYALTY);
    }

    Dispatch {
        events,
        notification: Some((
            permissions::SALES_VIEW,
            NewNotification {
                title: "Sale completed".to_string(),
                message: format!("Order {} for {}", order.order_number, order.total()),
                payload: serde_json::json!({
                    "order_id": order.id,
                    "order_number": order.order_number,
                    "total_cents": order.total_cents,
                    "items": receipt.items.len(),
                }),
            },
        )),
        report_topics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorKind};
    use crate::notify::tests::Recorder;
    use crate::testkit::{self, LOCATION};
    use std::sync::Arc;
    use till_core::settings::{LOYALTY_EARNING_RATE, TAX_RATE_PERCENT};
    use till_core::DiscountType;
    use till_db::{BatchRepository, LoyaltyRepository, StockAdjustmentRepository};

    fn request(lines: &[(&str, i64)]) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: None,
            items: lines
                .iter()
                .map(|(id, qty)| CartLine {
                    product_id: id.to_string(),
                    quantity: *qty,
                })
                .collect(),
            payment_method: PaymentMethod::Card,
            points_to_redeem: 0,
        }
    }

    fn orchestrator(db: &Database) -> (SaleOrchestrator, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let sales = SaleOrchestrator::new(db.clone(), recorder.notifier(), Duration::from_secs(5));
        (sales, recorder)
    }

    async fn stock(db: &Database, product_id: &str) -> i64 {
        let mut conn = db.acquire().await.unwrap();
        BatchRepository::total_quantity(&mut conn, product_id, LOCATION)
            .await
            .unwrap()
    }

    #[test]
    fn test_request_validation() {
        let id = Uuid::new_v4().to_string();
        assert!(request(&[(&id, 1)]).validate().is_ok());
        assert!(request(&[]).validate().is_err());
        assert!(request(&[(&id, 0)]).validate().is_err());
        assert!(request(&[(&id, 1000)]).validate().is_err());
        assert!(request(&[("not-a-uuid", 1)]).validate().is_err());
        assert!(request(&[(&id, 1), (&id, 2)]).validate().is_err());

        let mut negative = request(&[(&id, 1)]);
        negative.points_to_redeem = -1;
        assert!(negative.validate().is_err());

        let mut anonymous_points = request(&[(&id, 1)]);
        anonymous_points.points_to_redeem = 10;
        assert!(matches!(
            anonymous_points.validate(),
            Err(ValidationError::Required { ref field }) if field == "customer_id"
        ));

        let too_many: Vec<String> = (0..101).map(|_| Uuid::new_v4().to_string()).collect();
        let lines: Vec<(&str, i64)> = too_many.iter().map(|id| (id.as_str(), 1)).collect();
        assert!(request(&lines).validate().is_err());
    }

    #[tokio::test]
    async fn test_promotion_points_and_tax_scenario() {
        let db = testkit::db().await;
        testkit::set_setting(&db, TAX_RATE_PERCENT, "5").await;
        let product = testkit::product(&db, 5_000, "grocery", None).await;
        testkit::batch(&db, &product, 10).await;
        testkit::promotion(&db, "ten-off", Some(product.id.as_str()), None, None, DiscountType::Percentage, 10, 0).await;
        testkit::loyalty_account(&db, "cust-1", 5_500).await;

        let (sales, recorder) = orchestrator(&db);
        let mut req = request(&[(&product.id, 2)]);
        req.customer_id = Some("cust-1".to_string());
        req.points_to_redeem = 500;

        let receipt = sales.checkout(req).await.unwrap();
        let order = &receipt.order;

        // 2 × 45.00 after 10% off
        assert_eq!(receipt.items[0].unit_price_cents, 4_500);
        assert_eq!(order.subtotal_cents, 9_000);
        assert_eq!(order.promotion_discount_cents, 1_000);
        assert_eq!(order.points_discount_cents, 500);
        assert_eq!(order.tax_cents, 425);
        assert_eq!(order.total_cents, 8_925);
        assert_eq!(order.points_earned, 85);
        assert_eq!(receipt.transaction.amount_cents, 8_925);
        assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(order.order_number.len(), "ORD-YYYYMMDD-XXXXXXXX".len());

        let loyalty = receipt.loyalty.unwrap();
        assert_eq!(loyalty.balance, 5_500 - 500 + 85);
        assert_eq!(loyalty.tier, LoyaltyTier::Gold);

        assert_eq!(stock(&db, &product.id).await, 8);
        assert_eq!(recorder.topics.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_worked_example_totals_9975() {
        let db = testkit::db().await;
        testkit::set_setting(&db, TAX_RATE_PERCENT, "5").await;
        let product = testkit::product(&db, 10_000, "grocery", None).await;
        testkit::batch(&db, &product, 1).await;
        testkit::loyalty_account(&db, "cust-1", 500).await;

        let (sales, _) = orchestrator(&db);
        let mut req = request(&[(&product.id, 1)]);
        req.customer_id = Some("cust-1".to_string());
        req.points_to_redeem = 500;

        let order = sales.checkout(req).await.unwrap().order;
        assert_eq!(order.subtotal_cents, 10_000);
        assert_eq!(order.points_discount_cents, 500);
        assert_eq!(order.tax_cents, 475);
        assert_eq!(order.total_cents, 9_975);
    }

    #[tokio::test]
    async fn test_oversell_leaves_everything_untouched() {
        let db = testkit::db().await;
        let plenty = testkit::product(&db, 100, "grocery", None).await;
        let scarce = testkit::product(&db, 100, "grocery", None).await;
        testkit::batch(&db, &plenty, 10).await;
        testkit::batch(&db, &scarce, 2).await;

        let (sales, recorder) = orchestrator(&db);
        let err = sales
            .checkout(request(&[(&plenty.id, 5), (&scarce.id, 3)]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock { ref product_id, available: 2, requested: 3 })
                if *product_id == scarce.id
        ));
        assert_eq!(stock(&db, &plenty.id).await, 10);
        assert_eq!(stock(&db, &scarce.id).await, 2);

        let mut conn = db.acquire().await.unwrap();
        assert!(StockAdjustmentRepository::list_for_product(&mut conn, &plenty.id)
            .await
            .unwrap()
            .is_empty());
        assert!(recorder.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let db = testkit::db().await;
        let (sales, _) = orchestrator(&db);
        let missing = Uuid::new_v4().to_string();

        let err = sales.checkout(request(&[(&missing, 1)])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(matches!(err, EngineError::Core(CoreError::ProductNotFound(ref id)) if *id == missing));
    }

    #[tokio::test]
    async fn test_insufficient_points_rolls_back_stock() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 1_000, "grocery", None).await;
        testkit::batch(&db, &product, 5).await;
        testkit::loyalty_account(&db, "cust-1", 100).await;

        let (sales, _) = orchestrator(&db);
        let mut req = request(&[(&product.id, 1)]);
        req.customer_id = Some("cust-1".to_string());
        req.points_to_redeem = 101;

        let err = sales.checkout(req).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::InsufficientPoints { .. })));
        assert_eq!(stock(&db, &product.id).await, 5);

        let mut conn = db.acquire().await.unwrap();
        let account = LoyaltyRepository::get_by_customer(&mut conn, "cust-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.points, 100);
    }

    #[tokio::test]
    async fn test_first_purchase_opens_account() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 2_550, "grocery", None).await;
        testkit::batch(&db, &product, 5).await;

        let (sales, _) = orchestrator(&db);
        let mut req = request(&[(&product.id, 2)]);
        req.customer_id = Some("walk-in-42".to_string());

        let receipt = sales.checkout(req).await.unwrap();
        assert_eq!(receipt.order.points_earned, 51);
        assert_eq!(receipt.loyalty.unwrap().balance, 51);
    }

    #[tokio::test]
    async fn test_anonymous_sale_earns_nothing() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 999, "grocery", None).await;
        testkit::batch(&db, &product, 5).await;

        let (sales, _) = orchestrator(&db);
        let receipt = sales.checkout(request(&[(&product.id, 1)])).await.unwrap();
        assert!(receipt.loyalty.is_none());
        assert_eq!(receipt.order.points_earned, 0);
        assert_eq!(receipt.order.total_cents, 999);
    }

    #[tokio::test]
    async fn test_missing_settings_is_configuration_error() {
        let db = testkit::db().await;
        testkit::remove_setting(&db, LOYALTY_EARNING_RATE).await;
        let product = testkit::product(&db, 100, "grocery", None).await;
        testkit::batch(&db, &product, 5).await;

        let (sales, _) = orchestrator(&db);
        let err = sales.checkout(request(&[(&product.id, 1)])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(stock(&db, &product.id).await, 5);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_checkout() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 100, "grocery", None).await;
        testkit::batch(&db, &product, 5).await;

        let recorder = Arc::new(Recorder::failing());
        let sales = SaleOrchestrator::new(db.clone(), recorder.notifier(), Duration::from_secs(5));
        let receipt = sales.checkout(request(&[(&product.id, 1)])).await.unwrap();

        assert_eq!(receipt.stock.len(), 1);
        // Sale event plus one stock event
        assert_eq!(recorder.broadcasts.lock().unwrap().len(), 2);
        assert_eq!(stock(&db, &product.id).await, 4);
    }

    #[tokio::test]
    async fn test_deadline_error_means_nothing_was_sold() {
        let (db, path) = testkit::file_db(4).await;
        let product = testkit::product(&db, 100, "grocery", None).await;
        testkit::batch(&db, &product, 200).await;
        let recorder = Arc::new(Recorder::default());

        let mut committed = 0;
        for step in 0..60u64 {
            let limit = Duration::from_micros(50 + step * 100);
            let sales = SaleOrchestrator::new(db.clone(), recorder.notifier(), limit);
            let before = stock(&db, &product.id).await;

            match sales.checkout(request(&[(&product.id, 1)])).await {
                Ok(_) => {
                    committed += 1;
                    assert_eq!(stock(&db, &product.id).await, before - 1);
                }
                Err(EngineError::DeadlineExceeded(d)) => {
                    assert_eq!(d, limit);
                    assert_eq!(stock(&db, &product.id).await, before, "sale committed after {limit:?} deadline");
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(stock(&db, &product.id).await, 200 - committed);
        let mut conn = db.acquire().await.unwrap();
        let history = StockAdjustmentRepository::list_for_product(&mut conn, &product.id)
            .await
            .unwrap();
        assert_eq!(history.len() as i64, committed);
        drop(conn);

        db.close().await;
        testkit::remove_db_files(&path);
    }
}
