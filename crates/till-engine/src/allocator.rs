//! # Batch Allocator
//!
//! Moves stock in and out of batches inside the caller's transaction and
//! records every movement in the stock ledger.
//!
//! ## Depletion
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  batches (qty > 0) ──► plan_depletion ──► InsufficientStock?            │
//! │                        (FEFO, then FIFO)        │                       │
//! │                                                 │ no                    │
//! │                                                 ▼                       │
//! │                         set_quantity per draw + one STOCK_OUT row       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The plan is complete before the first write, so a shortfall leaves every
//! batch as it was.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use till_core::allocation::{plan_depletion, replenish_target, total_quantity, DepletionPlan};
use till_core::{AdjustmentReason, AdjustmentType, Batch, StockAdjustment};
use till_db::{BatchRepository, StockAdjustmentRepository};

use crate::error::EngineResult;

/// Result of one stock movement.
#[derive(Debug, Clone)]
pub struct StockMovement {
    pub adjustment: StockAdjustment,
    /// Batches touched, with their new quantities.
    pub batches: Vec<(String, i64)>,
}

pub struct BatchAllocator;

impl BatchAllocator {
    /// Takes `quantity` units of a product out of its batches at a location.
    pub async fn deplete(
        conn: &mut SqliteConnection,
        product_id: &str,
        location_id: &str,
        quantity: i64,
        reference_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<StockMovement> {
        let batches = BatchRepository::for_location(conn, product_id, location_id).await?;
        let plan: DepletionPlan = plan_depletion(product_id, &batches, quantity)?;

        for draw in &plan.draws {
            BatchRepository::set_quantity(conn, &draw.batch_id, draw.remaining, now).await?;
        }

        let adjustment = StockAdjustment {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            location_id: location_id.to_string(),
            adjustment_type: AdjustmentType::StockOut,
            reason: AdjustmentReason::Sale,
            quantity,
            previous_quantity: plan.previous_total,
            new_quantity: plan.new_total,
            reference_id: reference_id.to_string(),
            created_at: now,
        };
        StockAdjustmentRepository::insert(conn, &adjustment).await?;

        debug!(
            product_id = %product_id,
            quantity,
            batches = plan.draws.len(),
            remaining = plan.new_total,
            "Stock depleted"
        );

        Ok(StockMovement {
            adjustment,
            batches: plan
                .draws
                .into_iter()
                .map(|d| (d.batch_id, d.remaining))
                .collect(),
        })
    }

    /// Puts `quantity` units back at a location.
    ///
    /// Units go into the most recently created batch; a location without
    /// batches gets a new one tagged with `reference_id`.
    pub async fn replenish(
        conn: &mut SqliteConnection,
        product_id: &str,
        location_id: &str,
        quantity: i64,
        reference_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<StockMovement> {
        let batches = BatchRepository::for_location(conn, product_id, location_id).await?;
        let previous = total_quantity(&batches);

        let (batch_id, new_batch_quantity) = match replenish_target(&batches) {
            Some(target) => {
                BatchRepository::add_quantity(conn, &target.id, quantity, now).await?;
                (target.id.clone(), target.quantity + quantity)
            }
            None => {
                let batch = Batch {
                    id: Uuid::new_v4().to_string(),
                    product_id: product_id.to_string(),
                    location_id: location_id.to_string(),
                    quantity,
                    expiry_date: None,
                    reference: Some(reference_id.to_string()),
                    created_at: now,
                    updated_at: now,
                };
                BatchRepository::insert(conn, &batch).await?;
                (batch.id, quantity)
            }
        };

        let adjustment = StockAdjustment {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            location_id: location_id.to_string(),
            adjustment_type: AdjustmentType::StockIn,
            reason: AdjustmentReason::Return,
            quantity,
            previous_quantity: previous,
            new_quantity: previous + quantity,
            reference_id: reference_id.to_string(),
            created_at: now,
        };
        StockAdjustmentRepository::insert(conn, &adjustment).await?;

        debug!(product_id = %product_id, batch_id = %batch_id, quantity, "Stock replenished");

        Ok(StockMovement {
            adjustment,
            batches: vec![(batch_id, new_batch_quantity)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{self, LOCATION};
    use chrono::{Duration, NaiveDate};
    use till_core::CoreError;
    use till_db::Database;

    use crate::error::EngineError;

    async fn quantities(db: &Database, product_id: &str) -> Vec<i64> {
        let mut conn = db.acquire().await.unwrap();
        BatchRepository::for_location(&mut conn, product_id, LOCATION)
            .await
            .unwrap()
            .iter()
            .map(|b| b.quantity)
            .collect()
    }

    #[tokio::test]
    async fn test_deplete_earliest_expiry_first() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 100, "grocery", None).await;
        let now = Utc::now();
        let late = NaiveDate::from_ymd_opt(2031, 6, 1);
        let early = NaiveDate::from_ymd_opt(2031, 1, 1);
        testkit::batch_with(&db, &product, 5, None, now - Duration::days(10)).await;
        testkit::batch_with(&db, &product, 4, late, now - Duration::days(5)).await;
        testkit::batch_with(&db, &product, 3, early, now).await;

        let mut tx = db.begin().await.unwrap();
        let movement = BatchAllocator::deplete(&mut tx, &product.id, LOCATION, 5, "order-1", now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(movement.adjustment.previous_quantity, 12);
        assert_eq!(movement.adjustment.new_quantity, 7);
        assert_eq!(movement.batches.len(), 2);
        // early (3→0), late (4→2), undated untouched
        assert_eq!(quantities(&db, &product.id).await, vec![0, 2, 5]);
    }

    #[tokio::test]
    async fn test_shortfall_touches_nothing() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 100, "grocery", None).await;
        testkit::batch(&db, &product, 2).await;

        let mut tx = db.begin().await.unwrap();
        let err = BatchAllocator::deplete(&mut tx, &product.id, LOCATION, 3, "order-1", Utc::now())
            .await
            .unwrap_err();
        drop(tx);

        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock { available: 2, requested: 3, .. })
        ));
        assert_eq!(quantities(&db, &product.id).await, vec![2]);

        let mut conn = db.acquire().await.unwrap();
        let ledger = StockAdjustmentRepository::list_for_product(&mut conn, &product.id)
            .await
            .unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_replenish_into_newest_batch() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 100, "grocery", None).await;
        let now = Utc::now();
        testkit::batch_with(&db, &product, 1, None, now - Duration::days(3)).await;
        let newest = testkit::batch_with(&db, &product, 0, None, now - Duration::days(1)).await;

        let mut tx = db.begin().await.unwrap();
        let movement = BatchAllocator::replenish(&mut tx, &product.id, LOCATION, 2, "return-1", now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(movement.batches, vec![(newest.id.clone(), 2)]);
        assert_eq!(movement.adjustment.adjustment_type, AdjustmentType::StockIn);
        assert_eq!(movement.adjustment.previous_quantity, 1);
        assert_eq!(movement.adjustment.new_quantity, 3);
    }

    #[tokio::test]
    async fn test_replenish_creates_tagged_batch() {
        let db = testkit::db().await;
        let product = testkit::product(&db, 100, "grocery", None).await;

        let mut tx = db.begin().await.unwrap();
        let movement = BatchAllocator::replenish(&mut tx, &product.id, LOCATION, 4, "return-9", Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut conn = db.acquire().await.unwrap();
        let batch = BatchRepository::get_by_id(&mut conn, &movement.batches[0].0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.quantity, 4);
        assert_eq!(batch.reference.as_deref(), Some("return-9"));
    }
}
