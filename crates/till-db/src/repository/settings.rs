//! # Settings Repository
//!
//! Raw key/value business settings. Typed parsing and validation happen in
//! `till_core::settings::EngineSettings`.

use std::collections::HashMap;

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;

pub struct SettingsRepository;

impl SettingsRepository {
    /// Every stored setting.
    pub async fn load_all(conn: &mut SqliteConnection) -> DbResult<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.into_iter().collect())
    }

    pub async fn get(conn: &mut SqliteConnection, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(value)
    }

    /// Inserts or replaces a setting.
    pub async fn set(conn: &mut SqliteConnection, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, value = %value, "Writing setting");

        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn remove(conn: &mut SqliteConnection, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use till_core::settings::{EngineSettings, TAX_RATE_PERCENT};

    #[tokio::test]
    async fn test_seeded_defaults_form_valid_settings() {
        let db = fixtures::db().await;
        let mut conn = db.acquire().await.unwrap();

        let raw = SettingsRepository::load_all(&mut conn).await.unwrap();
        let settings = EngineSettings::load(&raw).unwrap();
        assert!(settings.tax_rate.is_zero());
        assert_eq!(settings.loyalty.redemption_rate_bps, 100);
        assert_eq!(settings.loyalty.earning_rate_bps, 10000);
        assert_eq!(settings.loyalty.tiers.gold, 5000);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_remove() {
        let db = fixtures::db().await;
        let mut conn = db.acquire().await.unwrap();

        SettingsRepository::set(&mut conn, TAX_RATE_PERCENT, "5").await.unwrap();
        SettingsRepository::set(&mut conn, TAX_RATE_PERCENT, "7").await.unwrap();
        assert_eq!(
            SettingsRepository::get(&mut conn, TAX_RATE_PERCENT).await.unwrap().as_deref(),
            Some("7")
        );

        SettingsRepository::remove(&mut conn, TAX_RATE_PERCENT).await.unwrap();
        assert!(SettingsRepository::get(&mut conn, TAX_RATE_PERCENT).await.unwrap().is_none());
    }
}
