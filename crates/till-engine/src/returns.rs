//! # Return Orchestrator
//!
//! Two-step returns: a customer requests, staff approve or reject.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   request_return ──► PENDING ──┬── approve ──► APPROVED                 │
//! │                                │   • returned_qty += n (guarded)        │
//! │                                │   • GOOD items back into stock         │
//! │                                │   • REFUNDED transaction               │
//! │                                │   • points clawed back, tier           │
//! │                                │   • order PARTIALLY_RETURNED/RETURNED  │
//! │                                │                                        │
//! │                                └── reject ───► REJECTED                 │
//! │                                                                         │
//! │   The PENDING → terminal move is one conditional UPDATE, so only one    │
//! │   of two concurrent process_return calls wins; the other gets           │
//! │   AlreadyProcessed.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use till_core::validation::{
    validate_line_count, validate_order_number, validate_quantity, validate_reason, validate_unique_ids,
    validate_uuid,
};
use till_core::{
    CoreError, ItemCondition, Money, OrderStatus, PaymentTransaction, ProductReturn, ReturnItem,
    ReturnStatus, StockAdjustment, TransactionStatus, ValidationError,
};
use till_db::{
    Database, OrderRepository, ProductRepository, ReturnRepository, TransactionRepository,
};

use crate::allocator::BatchAllocator;
use crate::checkout::gateway_reference;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{LedgerEntry, LoyaltyLedger};
use crate::notify::{permissions, topics, Dispatch, EngineEvent, NewNotification, Notifier};
use crate::{commit_within, load_settings, Staged};

// =============================================================================
// Request / Outcome
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub order_item_id: String,
    pub quantity: i64,
    pub condition: ItemCondition,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub order_number: String,
    /// Must match the order's customer; `None` for anonymous orders.
    pub customer_id: Option<String>,
    pub items: Vec<ReturnLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnDecision {
    Approve,
    Reject,
}

impl ReturnDecision {
    fn target(self) -> ReturnStatus {
        match self {
            ReturnDecision::Approve => ReturnStatus::Approved,
            ReturnDecision::Reject => ReturnStatus::Rejected,
        }
    }
}

/// A return with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnDetails {
    #[serde(rename = "return")]
    pub ret: ProductReturn,
    pub items: Vec<ReturnItem>,
}

/// Everything `process_return` wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnOutcome {
    #[serde(rename = "return")]
    pub ret: ProductReturn,
    pub items: Vec<ReturnItem>,
    /// Refund ledger row; `None` for a rejection.
    pub refund: Option<PaymentTransaction>,
    pub order_status: OrderStatus,
    pub stock: Vec<StockAdjustment>,
    pub loyalty: Option<LedgerEntry>,
}

impl ReturnRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_order_number(&self.order_number)?;
        validate_line_count("items", self.items.len())?;
        for line in &self.items {
            validate_uuid("order_item_id", &line.order_item_id)?;
            validate_quantity(line.quantity)?;
            validate_reason(&line.reason)?;
        }
        validate_unique_ids(
            "order_item_id",
            self.items.iter().map(|l| l.order_item_id.as_str()),
        )?;
        Ok(())
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Clone)]
pub struct ReturnOrchestrator {
    db: Database,
    notifier: Notifier,
    timeout: Duration,
}

impl ReturnOrchestrator {
    pub fn new(db: Database, notifier: Notifier, timeout: Duration) -> Self {
        Self { db, notifier, timeout }
    }

    /// Records a PENDING return against an order.
    #[instrument(skip(self, request), fields(order_number = %request.order_number, lines = request.items.len()))]
    pub async fn request_return(&self, request: ReturnRequest) -> EngineResult<ReturnDetails> {
        request.validate()?;

        let details = commit_within(self.timeout, self.record(&request)).await?;

        info!(
            return_id = %details.ret.id,
            refund = %details.ret.refund_amount(),
            "Return requested"
        );
        self.notifier
            .publish(Dispatch {
                events: vec![(
                    permissions::RETURNS_APPROVE,
                    EngineEvent::ReturnRequested {
                        return_id: details.ret.id.clone(),
                        order_number: request.order_number.clone(),
                        refund_cents: details.ret.refund_amount_cents,
                    },
                )],
                notification: Some((
                    permissions::RETURNS_APPROVE,
                    NewNotification {
                        title: "Return awaiting approval".to_string(),
                        message: format!(
                            "Order {} requests a refund of {}",
                            request.order_number,
                            details.ret.refund_amount()
                        ),
                        payload: serde_json::json!({
                            "return_id": details.ret.id,
                            "order_number": request.order_number,
                            "refund_cents": details.ret.refund_amount_cents,
                        }),
                    },
                )),
                report_topics: vec![topics::RETURNS],
            })
            .await;

        Ok(details)
    }

    /// Approves or rejects a PENDING return.
    #[instrument(skip(self))]
    pub async fn process_return(&self, return_id: &str, decision: ReturnDecision) -> EngineResult<ReturnOutcome> {
        validate_uuid("return_id", return_id)?;

        let outcome = commit_within(self.timeout, self.decide(return_id, decision)).await?;

        info!(
            return_id = %return_id,
            status = outcome.ret.status.as_str(),
            order_status = ?outcome.order_status,
            "Return processed"
        );
        self.notifier.publish(dispatch_for(&outcome)).await;

        Ok(outcome)
    }

    async fn record(&self, request: &ReturnRequest) -> EngineResult<Staged<ReturnDetails>> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        if !OrderRepository::lock(&mut tx, &request.order_number, now).await? {
            return Err(EngineError::not_found("Order", &request.order_number));
        }
        let order = OrderRepository::get_by_number(&mut tx, &request.order_number)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", &request.order_number))?;

        if order.customer_id != request.customer_id {
            return Err(CoreError::OrderCustomerMismatch {
                order_number: order.order_number,
            }
            .into());
        }

        let order_items: HashMap<String, _> = OrderRepository::items(&mut tx, &order.id)
            .await?
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        let return_id = Uuid::new_v4().to_string();
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let item = order_items
                .get(&line.order_item_id)
                .ok_or_else(|| EngineError::not_found("OrderItem", &line.order_item_id))?;

            if line.quantity > item.returnable_qty() {
                return Err(CoreError::ReturnQuantityExceeded {
                    order_item_id: item.id.clone(),
                    returnable: item.returnable_qty(),
                    requested: line.quantity,
                }
                .into());
            }

            items.push(ReturnItem {
                id: Uuid::new_v4().to_string(),
                return_id: return_id.clone(),
                order_item_id: item.id.clone(),
                product_id: item.product_id.clone(),
                quantity: line.quantity,
                condition: line.condition,
                reason: line.reason.trim().to_string(),
                refund_cents: item.unit_price().multiply_quantity(line.quantity).cents(),
                restocked: false,
                created_at: now,
            });
        }

        let refund: Money = items.iter().map(|i| Money::from_cents(i.refund_cents)).sum();
        let ret = ProductReturn {
            id: return_id,
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            status: ReturnStatus::Pending,
            refund_amount_cents: refund.cents(),
            created_at: now,
            processed_at: None,
        };

        ReturnRepository::insert(&mut tx, &ret).await?;
        for item in &items {
            ReturnRepository::insert_item(&mut tx, item).await?;
        }
        Ok((tx, ReturnDetails { ret, items }))
    }

    async fn decide(&self, return_id: &str, decision: ReturnDecision) -> EngineResult<Staged<ReturnOutcome>> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        if !ReturnRepository::finish_pending(&mut tx, return_id, decision.target(), now).await? {
            return match ReturnRepository::get_by_id(&mut tx, return_id).await? {
                Some(ret) => Err(CoreError::AlreadyProcessed {
                    return_id: ret.id,
                    status: ret.status.as_str().to_string(),
                }
                .into()),
                None => Err(EngineError::not_found("Return", return_id)),
            };
        }

        let ret = ReturnRepository::get_by_id(&mut tx, return_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Return", return_id))?;
        let order = OrderRepository::get_by_id(&mut tx, &ret.order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", &ret.order_id))?;
        let mut items = ReturnRepository::items(&mut tx, return_id).await?;

        if decision == ReturnDecision::Reject {
            let outcome = ReturnOutcome {
                ret,
                items,
                refund: None,
                order_status: order.status,
                stock: Vec::new(),
                loyalty: None,
            };
            return Ok((tx, outcome));
        }

        let mut stock = Vec::new();
        for item in &mut items {
            if !OrderRepository::add_returned(&mut tx, &item.order_item_id, item.quantity).await? {
                let returnable = OrderRepository::get_item(&mut tx, &item.order_item_id)
                    .await?
                    .map(|i| i.returnable_qty())
                    .unwrap_or(0);
                return Err(CoreError::ReturnQuantityExceeded {
                    order_item_id: item.order_item_id.clone(),
                    returnable,
                    requested: item.quantity,
                }
                .into());
            }

            if item.condition.is_restockable() {
                let product = ProductRepository::get_by_id(&mut tx, &item.product_id)
                    .await?
                    .ok_or_else(|| CoreError::ProductNotFound(item.product_id.clone()))?;
                let movement = BatchAllocator::replenish(
                    &mut tx,
                    &product.id,
                    &product.default_location_id,
                    item.quantity,
                    &ret.id,
                    now,
                )
                .await?;
                ReturnRepository::mark_restocked(&mut tx, &item.id).await?;
                item.restocked = true;
                stock.push(movement.adjustment);
            } else {
                debug!(item_id = %item.id, condition = ?item.condition, "Not restocking");
            }
        }

        let refund = PaymentTransaction {
            id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            return_id: Some(ret.id.clone()),
            status: TransactionStatus::Refunded,
            payment_method: order.payment_method,
            amount_cents: ret.refund_amount_cents,
            gateway_reference: gateway_reference("RFD", now),
            created_at: now,
        };
        TransactionRepository::insert(&mut tx, &refund).await?;

        let loyalty = match order.customer_id.as_deref() {
            Some(customer) => {
                let settings = load_settings(&mut tx).await?;
                LoyaltyLedger::new(settings.loyalty)
                    .claw_back(&mut tx, customer, ret.refund_amount(), now)
                    .await?
            }
            None => None,
        };

        let fully_returned = OrderRepository::items(&mut tx, &order.id)
            .await?
            .iter()
            .all(|i| i.returned_qty == i.quantity);
        let order_status = if fully_returned {
            OrderStatus::Returned
        } else {
            OrderStatus::PartiallyReturned
        };
        OrderRepository::set_status(&mut tx, &order.id, order_status, now).await?;

        Ok((
            tx,
            ReturnOutcome {
                ret,
                items,
                refund: Some(refund),
                order_status,
                stock,
                loyalty,
            },
        ))
    }
}

fn dispatch_for(outcome: &ReturnOutcome) -> Dispatch {
    let ret = &outcome.ret;
    let mut events = vec![(
        permissions::RETURNS_APPROVE,
        EngineEvent::ReturnProcessed {
            return_id: ret.id.clone(),
            order_id: ret.order_id.clone(),
            status: ret.status,
            refund_cents: ret.refund_amount_cents,
        },
    )];
    events.extend(
        outcome
            .stock
            .iter()
            .map(|adj| (permissions::INVENTORY_VIEW, EngineEvent::stock_changed(adj))),
    );

    let mut report_topics = vec![topics::RETURNS];
    if outcome.refund.is_some() {
        report_topics.extend([topics::SALES, topics::INVENTORY]);
    }
    if outcome.loyalty.is_some() {
        report_topics.push(topics::LOYALTY);
    }

    Dispatch {
        events,
        notification: Some((
            permissions::SALES_VIEW,
            NewNotification {
                title: format!("Return {}", ret.status.as_str().to_lowercase()),
                message: format!("Return {} refunding {}", ret.id, ret.refund_amount()),
                payload: serde_json::json!({
                    "return_id": ret.id,
                    "order_id": ret.order_id,
                    "status": ret.status,
                    "refund_cents": ret.refund_amount_cents,
                }),
            },
        )),
        report_topics,
    }
}
