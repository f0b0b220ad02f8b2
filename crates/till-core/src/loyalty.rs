//! # Loyalty Policy
//!
//! Point arithmetic and tier rules. The balance itself is mutated by the
//! engine's ledger with guarded SQL updates; this module only decides the
//! numbers.
//!
//! ## Rates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  redemption rate   currency per point, in bps of a currency unit        │
//! │                    100 bps = $0.01/point → 500 points = 500 cents       │
//! │                                                                         │
//! │  earning rate      points per currency unit, in bps of a point          │
//! │                    10000 bps = 1 point per $1 → $95.00 = 95 points     │
//! │                                                                         │
//! │  clawback          same earning rate applied to the refund amount       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::LoyaltyTier;

/// Minor units per major currency unit.
const CENTS_PER_UNIT: i128 = 100;
const BPS: i128 = 10_000;

// =============================================================================
// Tier Thresholds
// =============================================================================

/// Minimum balances for the upper tiers. Strictly ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub silver: i64,
    pub gold: i64,
    pub platinum: i64,
}

impl TierThresholds {
    /// Tier for a balance. Pure function of the balance, so it moves both up
    /// and down.
    ///
    /// ```rust
    /// use till_core::loyalty::TierThresholds;
    /// use till_core::types::LoyaltyTier;
    ///
    /// let t = TierThresholds { silver: 1000, gold: 5000, platinum: 10000 };
    /// assert_eq!(t.tier_for(999), LoyaltyTier::Bronze);
    /// assert_eq!(t.tier_for(5000), LoyaltyTier::Gold);
    /// ```
    pub fn tier_for(&self, points: i64) -> LoyaltyTier {
        if points >= self.platinum {
            LoyaltyTier::Platinum
        } else if points >= self.gold {
            LoyaltyTier::Gold
        } else if points >= self.silver {
            LoyaltyTier::Silver
        } else {
            LoyaltyTier::Bronze
        }
    }

    pub fn is_ascending(&self) -> bool {
        0 <= self.silver && self.silver < self.gold && self.gold < self.platinum
    }
}

// =============================================================================
// Loyalty Policy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyPolicy {
    /// Value of one point, in basis points of a currency unit.
    pub redemption_rate_bps: i64,
    /// Points earned per currency unit, in basis points of a point.
    pub earning_rate_bps: i64,
    pub tiers: TierThresholds,
}

impl LoyaltyPolicy {
    /// Money value of a number of points.
    pub fn points_value(&self, points: i64) -> Money {
        let cents = points as i128 * self.redemption_rate_bps as i128 * CENTS_PER_UNIT / BPS;
        Money::from_cents(cents as i64)
    }

    /// Checks a redemption against the balance and the order subtotal and
    /// returns the discount it buys.
    ///
    /// ```rust
    /// use till_core::loyalty::{LoyaltyPolicy, TierThresholds};
    /// use till_core::money::Money;
    ///
    /// let policy = LoyaltyPolicy {
    ///     redemption_rate_bps: 100,
    ///     earning_rate_bps: 10000,
    ///     tiers: TierThresholds { silver: 1000, gold: 5000, platinum: 10000 },
    /// };
    /// let discount = policy.redemption_discount(800, 500, Money::from_cents(10000)).unwrap();
    /// assert_eq!(discount.cents(), 500);
    /// ```
    pub fn redemption_discount(&self, balance: i64, points: i64, subtotal: Money) -> CoreResult<Money> {
        if points > balance {
            return Err(CoreError::InsufficientPoints {
                available: balance,
                requested: points,
            });
        }

        let discount = self.points_value(points);
        if discount > subtotal {
            return Err(CoreError::DiscountExceedsTotal {
                discount_cents: discount.cents(),
                subtotal_cents: subtotal.cents(),
            });
        }

        Ok(discount)
    }

    /// `floor(amount × earning rate)`, with negative amounts earning nothing.
    pub fn points_for(&self, amount: Money) -> i64 {
        let cents = amount.non_negative().cents() as i128;
        (cents * self.earning_rate_bps as i128 / (CENTS_PER_UNIT * BPS)) as i64
    }

    /// Points earned on a sale's net amount.
    pub fn points_earned(&self, net: Money) -> i64 {
        self.points_for(net)
    }

    /// Points taken back for a refund.
    pub fn points_clawed_back(&self, refund: Money) -> i64 {
        self.points_for(refund)
    }

    pub fn tier_for(&self, points: i64) -> LoyaltyTier {
        self.tiers.tier_for(points)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
