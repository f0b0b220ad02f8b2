//! # Loyalty Ledger
//!
//! Applies [`LoyaltyPolicy`] to stored accounts. Every balance change is one
//! guarded `UPDATE ... RETURNING points` statement:
//!
//! | Operation    | Statement                                   |
//! |--------------|---------------------------------------------|
//! | `redeem`     | `points - n WHERE points >= n`              |
//! | `earn`       | `points + n`                                |
//! | `claw_back`  | `MAX(points - n, 0)`                        |
//!
//! The tier is recomputed from the balance the statement returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use till_core::loyalty::LoyaltyPolicy;
use till_core::{CoreError, LoyaltyAccount, LoyaltyTier, Money};
use till_db::LoyaltyRepository;

use crate::error::{EngineError, EngineResult};

/// Balance and tier after a ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Points moved by the operation (always non-negative).
    pub points: i64,
    pub balance: i64,
    pub tier: LoyaltyTier,
}

/// Points redeemed and the discount they bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub discount: Money,
    pub entry: LedgerEntry,
}

#[derive(Debug, Clone, Copy)]
pub struct LoyaltyLedger {
    policy: LoyaltyPolicy,
}

impl LoyaltyLedger {
    pub fn new(policy: LoyaltyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LoyaltyPolicy {
        &self.policy
    }

    /// Redeems `points` against an order subtotal.
    ///
    /// Fails with `NotFound` when the customer has no account,
    /// `InsufficientPoints` when the balance is short and
    /// `DiscountExceedsTotal` when the discount is larger than `subtotal`.
    pub async fn redeem(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        points: i64,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> EngineResult<Redemption> {
        let account = Self::account(conn, customer_id).await?;
        let discount = self.policy.redemption_discount(account.points, points, subtotal)?;

        let balance = LoyaltyRepository::redeem(conn, customer_id, points, now)
            .await?
            .ok_or(CoreError::InsufficientPoints {
                available: account.points,
                requested: points,
            })?;
        let tier = self.recompute_tier(conn, &account, balance, now).await?;

        debug!(customer_id = %customer_id, points, discount = %discount, balance, "Points redeemed");
        Ok(Redemption {
            discount,
            entry: LedgerEntry { points, balance, tier },
        })
    }

    /// Credits the points earned on a sale's net amount, opening an account
    /// on the customer's first purchase.
    pub async fn earn(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        net: Money,
        now: DateTime<Utc>,
    ) -> EngineResult<LedgerEntry> {
        let account = match LoyaltyRepository::get_by_customer(conn, customer_id).await? {
            Some(account) => account,
            None => LoyaltyRepository::create(conn, customer_id, now).await?,
        };

        let points = self.policy.points_earned(net);
        let balance = if points > 0 {
            LoyaltyRepository::credit(conn, customer_id, points, now).await?
        } else {
            account.points
        };
        let tier = self.recompute_tier(conn, &account, balance, now).await?;

        debug!(customer_id = %customer_id, points, balance, ?tier, "Points earned");
        Ok(LedgerEntry { points, balance, tier })
    }

    /// Takes back the points a refund had earned, stopping at zero.
    ///
    /// Returns `None` when the customer has no account.
    pub async fn claw_back(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        refund: Money,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<LedgerEntry>> {
        let Some(account) = LoyaltyRepository::get_by_customer(conn, customer_id).await? else {
            debug!(customer_id = %customer_id, "No loyalty account, skipping clawback");
            return Ok(None);
        };

        let points = self.policy.points_clawed_back(refund);
        let balance = if points > 0 {
            LoyaltyRepository::claw_back(conn, customer_id, points, now).await?
        } else {
            account.points
        };
        let tier = self.recompute_tier(conn, &account, balance, now).await?;

        debug!(customer_id = %customer_id, points, balance, ?tier, "Points clawed back");
        Ok(Some(LedgerEntry {
            points: account.points - balance,
            balance,
            tier,
        }))
    }

    /// Stores the tier for `balance` if it differs from the account's.
    pub async fn recompute_tier(
        &self,
        conn: &mut SqliteConnection,
        account: &LoyaltyAccount,
        balance: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<LoyaltyTier> {
        let tier = self.policy.tier_for(balance);
        if tier != account.tier {
            LoyaltyRepository::set_tier(conn, &account.customer_id, tier, now).await?;
            info!(
                customer_id = %account.customer_id,
                from = ?account.tier,
                to = ?tier,
                "Loyalty tier changed"
            );
        }
        Ok(tier)
    }

    async fn account(conn: &mut SqliteConnection, customer_id: &str) -> EngineResult<LoyaltyAccount> {
        LoyaltyRepository::get_by_customer(conn, customer_id)
            .await?
            .ok_or_else(|| EngineError::not_found("LoyaltyAccount", customer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;
    use till_core::loyalty::TierThresholds;

    fn ledger() -> LoyaltyLedger {
        LoyaltyLedger::new(LoyaltyPolicy {
            redemption_rate_bps: 100,
            earning_rate_bps: 10_000,
            tiers: TierThresholds {
                silver: 1000,
                gold: 5000,
                platinum: 10000,
            },
        })
    }

    #[tokio::test]
    async fn test_redeem_then_clawback_round_trip() {
        let db = testkit::db().await;
        testkit::loyalty_account(&db, "cust-1", 5200).await;
        let ledger = ledger();
        let mut tx = db.begin().await.unwrap();

        let redemption = ledger
            .redeem(&mut tx, "cust-1", 500, Money::from_cents(10_000), Utc::now())
            .await
            .unwrap();
        assert_eq!(redemption.discount.cents(), 500);
        assert_eq!(redemption.entry.balance, 4700);
        assert_eq!(redemption.entry.tier, LoyaltyTier::Silver);

        let earned = ledger
            .earn(&mut tx, "cust-1", Money::from_cents(9_500), Utc::now())
            .await
            .unwrap();
        assert_eq!(earned.points, 95);
        assert_eq!(earned.balance, 4795);

        let clawed = ledger
            .claw_back(&mut tx, "cust-1", Money::from_cents(9_500), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(clawed.points, 95);
        assert_eq!(clawed.balance, 4700);
        tx.commit().await.unwrap();

        let mut conn = db.acquire().await.unwrap();
        let account = LoyaltyRepository::get_by_customer(&mut conn, "cust-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.points, 4700);
        assert_eq!(account.tier, LoyaltyTier::Silver);
    }

    #[tokio::test]
    async fn test_redeem_rejections() {
        let db = testkit::db().await;
        testkit::loyalty_account(&db, "cust-1", 300).await;
        let ledger = ledger();
        let mut tx = db.begin().await.unwrap();

        let err = ledger
            .redeem(&mut tx, "cust-1", 301, Money::from_cents(10_000), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientPoints { available: 300, requested: 301 })
        ));

        // 300 points = 300 cents > 299 cent subtotal
        let err = ledger
            .redeem(&mut tx, "cust-1", 300, Money::from_cents(299), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::DiscountExceedsTotal { .. })));

        let err = ledger
            .redeem(&mut tx, "nobody", 1, Money::from_cents(10_000), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "LoyaltyAccount", .. }));
    }

    #[tokio::test]
    async fn test_earn_opens_account_and_clawback_floors_at_zero() {
        let db = testkit::db().await;
        let ledger = ledger();
        let mut tx = db.begin().await.unwrap();

        let earned = ledger
            .earn(&mut tx, "new-cust", Money::from_cents(1_299), Utc::now())
            .await
            .unwrap();
        assert_eq!(earned.points, 12);
        assert_eq!(earned.balance, 12);
        assert_eq!(earned.tier, LoyaltyTier::Bronze);

        let clawed = ledger
            .claw_back(&mut tx, "new-cust", Money::from_cents(5_000), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(clawed.balance, 0);
        assert_eq!(clawed.points, 12);

        assert!(ledger
            .claw_back(&mut tx, "nobody", Money::from_cents(5_000), Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_tier_moves_both_ways() {
        let db = testkit::db().await;
        testkit::loyalty_account(&db, "cust-1", 990).await;
        let ledger = ledger();
        let mut tx = db.begin().await.unwrap();

        let up = ledger
            .earn(&mut tx, "cust-1", Money::from_cents(1_000), Utc::now())
            .await
            .unwrap();
        assert_eq!(up.tier, LoyaltyTier::Silver);

        let down = ledger
            .claw_back(&mut tx, "cust-1", Money::from_cents(1_000), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(down.tier, LoyaltyTier::Bronze);
    }
}
