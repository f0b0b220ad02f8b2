//! # Loyalty Repository
//!
//! Every balance change is one guarded statement; the new balance comes
//! back through `RETURNING` so the caller can recompute the tier without a
//! second read.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  redeem     points = points - n      WHERE points >= n   (else: no row) │
//! │  credit     points = points + n                                         │
//! │  claw_back  points = MAX(points - n, 0)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use till_core::{LoyaltyAccount, LoyaltyTier};

const ACCOUNT_COLUMNS: &str = "id, customer_id, points, tier, created_at, updated_at";

pub struct LoyaltyRepository;

impl LoyaltyRepository {
    pub async fn get_by_customer(
        conn: &mut SqliteConnection,
        customer_id: &str,
    ) -> DbResult<Option<LoyaltyAccount>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM loyalty_accounts WHERE customer_id = ?1");
        let account = sqlx::query_as::<_, LoyaltyAccount>(&sql)
            .bind(customer_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(account)
    }

    /// Opens an empty Bronze account for a customer.
    pub async fn create(
        conn: &mut SqliteConnection,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<LoyaltyAccount> {
        let account = LoyaltyAccount {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            points: 0,
            tier: LoyaltyTier::Bronze,
            created_at: now,
            updated_at: now,
        };
        Self::insert(conn, &account).await?;
        debug!(customer_id = %customer_id, "Created loyalty account");
        Ok(account)
    }

    pub async fn insert(conn: &mut SqliteConnection, account: &LoyaltyAccount) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (id, customer_id, points, tier, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&account.id)
        .bind(&account.customer_id)
        .bind(account.points)
        .bind(account.tier)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Takes `points` off the balance only if the balance covers them.
    ///
    /// Returns the new balance, or `None` when the guard rejected the update
    /// (or the account does not exist).
    pub async fn redeem(
        conn: &mut SqliteConnection,
        customer_id: &str,
        points: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<i64>> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE loyalty_accounts
            SET points = points - ?2, updated_at = ?3
            WHERE customer_id = ?1 AND points >= ?2
            RETURNING points
            "#,
        )
        .bind(customer_id)
        .bind(points)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        debug!(customer_id = %customer_id, points, ?balance, "Redeem points");
        Ok(balance)
    }

    /// Adds points and returns the new balance.
    pub async fn credit(
        conn: &mut SqliteConnection,
        customer_id: &str,
        points: i64,
        now: DateTime<Utc>,
    ) -> DbResult<i64> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE loyalty_accounts
            SET points = points + ?2, updated_at = ?3
            WHERE customer_id = ?1
            RETURNING points
            "#,
        )
        .bind(customer_id)
        .bind(points)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        debug!(customer_id = %customer_id, points, ?balance, "Credit points");
        balance.ok_or_else(|| DbError::not_found("LoyaltyAccount", customer_id))
    }

    /// Deducts points, stopping at zero, and returns the new balance.
    pub async fn claw_back(
        conn: &mut SqliteConnection,
        customer_id: &str,
        points: i64,
        now: DateTime<Utc>,
    ) -> DbResult<i64> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE loyalty_accounts
            SET points = MAX(points - ?2, 0), updated_at = ?3
            WHERE customer_id = ?1
            RETURNING points
            "#,
        )
        .bind(customer_id)
        .bind(points)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        debug!(customer_id = %customer_id, points, ?balance, "Claw back points");
        balance.ok_or_else(|| DbError::not_found("LoyaltyAccount", customer_id))
    }

    pub async fn set_tier(
        conn: &mut SqliteConnection,
        customer_id: &str,
        tier: LoyaltyTier,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query("UPDATE loyalty_accounts SET tier = ?2, updated_at = ?3 WHERE customer_id = ?1")
            .bind(customer_id)
            .bind(tier)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
