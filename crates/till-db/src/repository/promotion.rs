//! # Promotion Repository
//!
//! Promotions are read with a plain snapshot read; the engine never locks
//! or writes them.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use till_core::Promotion;

pub struct PromotionRepository;

impl PromotionRepository {
    /// Promotions switched on whose window contains `at`.
    pub async fn list_active(conn: &mut SqliteConnection, at: DateTime<Utc>) -> DbResult<Vec<Promotion>> {
        // Window is checked on parsed instants, not on the TEXT columns.
        let promotions = sqlx::query_as::<_, Promotion>(
            r#"
            SELECT
                id, name, product_id, subcategory_id, category_id,
                discount_type, discount_value, starts_at, ends_at,
                priority, is_active
            FROM promotions
            WHERE is_active = 1
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        let active: Vec<Promotion> = promotions.into_iter().filter(|p| p.is_live_at(at)).collect();
        debug!(count = active.len(), "Loaded active promotions");
        Ok(active)
    }

    /// Inserts a promotion. Used by the seed binary and tests.
    pub async fn insert(conn: &mut SqliteConnection, promotion: &Promotion) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO promotions (
                id, name, product_id, subcategory_id, category_id,
                discount_type, discount_value, starts_at, ends_at,
                priority, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.name)
        .bind(&promotion.product_id)
        .bind(&promotion.subcategory_id)
        .bind(&promotion.category_id)
        .bind(promotion.discount_type)
        .bind(promotion.discount_value)
        .bind(promotion.starts_at)
        .bind(promotion.ends_at)
        .bind(promotion.priority)
        .bind(promotion.is_active)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::Duration;
    use till_core::DiscountType;

    fn promotion(id: &str, is_active: bool, starts_in_days: i64) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: id.to_string(),
            name: id.to_string(),
            product_id: None,
            subcategory_id: None,
            category_id: Some("grocery".to_string()),
            discount_type: DiscountType::Percentage,
            discount_value: 10,
            starts_at: now + Duration::days(starts_in_days),
            ends_at: now + Duration::days(starts_in_days + 7),
            priority: 0,
            is_active,
        }
    }

    #[tokio::test]
    async fn test_list_active_filters_flag_and_window() {
        let db = fixtures::db().await;
        let mut conn = db.acquire().await.unwrap();
        for p in [
            promotion("live", true, -1),
            promotion("off", false, -1),
            promotion("future", true, 3),
        ] {
            PromotionRepository::insert(&mut conn, &p).await.unwrap();
        }

        let active = PromotionRepository::list_active(&mut conn, Utc::now())
            .await
            .unwrap();
        let ids: Vec<_> = active.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["live"]);
        assert_eq!(active[0].discount_type, DiscountType::Percentage);
    }
}
