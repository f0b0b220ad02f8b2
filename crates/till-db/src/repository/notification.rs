//! # Notification Repository
//!
//! Persisted notifications addressed to everyone holding a permission.
//! Written after a checkout or return commits, never inside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    /// Permission whose holders see the notification, e.g. `inventory.view`.
    pub permission: String,
    pub title: String,
    pub message: String,
    /// JSON document with event details.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

pub struct NotificationRepository;

impl NotificationRepository {
    pub async fn insert(conn: &mut SqliteConnection, notification: &Notification) -> DbResult<()> {
        debug!(
            id = %notification.id,
            permission = %notification.permission,
            "Persisting notification"
        );

        sqlx::query(
            r#"
            INSERT INTO notifications (id, permission, title, message, payload, created_at, read_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.permission)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.payload)
        .bind(notification.created_at)
        .bind(notification.read_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Most recent notifications for a permission, newest first.
    pub async fn list_for_permission(
        conn: &mut SqliteConnection,
        permission: &str,
        limit: u32,
    ) -> DbResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, permission, title, message, payload, created_at, read_at
            FROM notifications
            WHERE permission = ?1
            ORDER BY rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(permission)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows)
    }

    pub async fn mark_read(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE notifications SET read_at = ?2 WHERE id = ?1 AND read_at IS NULL")
            .bind(id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
