//! # Batch Allocation Planning
//!
//! Decides which batches a sale draws from and which batch a return goes
//! back into. Applying the plan is the engine's job.
//!
//! ## Depletion Order (FEFO then FIFO)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  batch   expiry        created      qty                                 │
//! │  B2      2026-01-10    Mar 02        4    ◄── taken first (expires)    │
//! │  B3      2026-02-01    Feb 01        5                                  │
//! │  B1      (none)        Jan 15        6    ◄── no expiry sorts last     │
//! │                                                                         │
//! │  sell 7  →  B2: 4→0, B3: 5→2, B1 untouched                              │
//! │  sell 20 →  InsufficientStock (available 15), nothing touched           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::Batch;

// =============================================================================
// Ordering
// =============================================================================

/// FEFO/FIFO comparison: expiry ascending with no-expiry last, then creation
/// time ascending, then id.
pub fn fefo_order(a: &Batch, b: &Batch) -> Ordering {
    let expiry = match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    expiry
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts batches into depletion order.
pub fn sort_fefo(batches: &mut [Batch]) {
    batches.sort_by(fefo_order);
}

/// Total quantity across batches.
pub fn total_quantity(batches: &[Batch]) -> i64 {
    batches.iter().map(|b| b.quantity.max(0)).sum()
}

// =============================================================================
// Depletion Plan
// =============================================================================

/// Quantity drawn from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDraw {
    pub batch_id: String,
    pub taken: i64,
    /// Batch quantity after the draw.
    pub remaining: i64,
}

/// A complete, validated depletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepletionPlan {
    pub draws: Vec<BatchDraw>,
    /// Aggregate quantity at the location before the sale.
    pub previous_total: i64,
    /// Aggregate quantity at the location after the sale.
    pub new_total: i64,
}

/// Plans taking `quantity` units from `batches`.
///
/// The whole plan is computed before anything is applied; if the batches
/// cannot cover the quantity the error carries the available total and no
/// plan exists.
///
/// ```rust
/// use till_core::allocation::plan_depletion;
///
/// let err = plan_depletion("prod-1", &[], 3).unwrap_err();
/// assert!(err.to_string().contains("available 0"));
/// ```
pub fn plan_depletion(product_id: &str, batches: &[Batch], quantity: i64) -> CoreResult<DepletionPlan> {
    let mut eligible: Vec<&Batch> = batches.iter().filter(|b| b.quantity > 0).collect();
    eligible.sort_by(|a, b| fefo_order(a, b));

    let available: i64 = eligible.iter().map(|b| b.quantity).sum();
    if available < quantity {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            available,
            requested: quantity,
        });
    }

    let mut outstanding = quantity;
    let mut draws = Vec::new();
    for batch in eligible {
        if outstanding == 0 {
            break;
        }
        let taken = outstanding.min(batch.quantity);
        outstanding -= taken;
        draws.push(BatchDraw {
            batch_id: batch.id.clone(),
            taken,
            remaining: batch.quantity - taken,
        });
    }

    Ok(DepletionPlan {
        draws,
        previous_total: available,
        new_total: available - quantity,
    })
}

/// Batch a return is added back into: the most recently created one.
pub fn replenish_target(batches: &[Batch]) -> Option<&Batch> {
    batches
        .iter()
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
}

// =============================================================================
// Unit Tests
// =============================================================================
