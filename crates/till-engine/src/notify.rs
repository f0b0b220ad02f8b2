//! # Post-Commit Notifications
//!
//! Side effects run after a checkout or return has committed.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    After tx.commit()                                    │
//! │                                                                         │
//! │  Notifier::publish(Dispatch)                                            │
//! │     │                                                                   │
//! │     ├──► BroadcastHub::broadcast_to_permission      (live clients)      │
//! │     ├──► NotificationStore::create_notifications_for_permission         │
//! │     └──► ReportCache::notify_report_update          (per topic)         │
//! │                                                                         │
//! │  Each call is awaited in turn. A failure is logged with warn! and the   │
//! │  next collaborator still runs. Nothing is returned to the caller: the   │
//! │  operation already succeeded.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use till_core::{ReturnStatus, StockAdjustment};
use till_db::{Database, DbError, Notification, NotificationRepository};

// =============================================================================
// Permissions & Topics
// =============================================================================

pub mod permissions {
    pub const SALES_VIEW: &str = "sales.view";
    pub const RETURNS_APPROVE: &str = "returns.approve";
    pub const INVENTORY_VIEW: &str = "inventory.view";
}

pub mod topics {
    pub const SALES: &str = "sales";
    pub const INVENTORY: &str = "inventory";
    pub const LOYALTY: &str = "loyalty";
    pub const RETURNS: &str = "returns";
}

// =============================================================================
// Events
// =============================================================================

/// Event pushed to live clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SaleCompleted {
        order_id: String,
        order_number: String,
        customer_id: Option<String>,
        total_cents: i64,
        points_earned: i64,
    },
    ReturnRequested {
        return_id: String,
        order_number: String,
        refund_cents: i64,
    },
    ReturnProcessed {
        return_id: String,
        order_id: String,
        status: ReturnStatus,
        refund_cents: i64,
    },
    StockChanged {
        product_id: String,
        location_id: String,
        previous_quantity: i64,
        new_quantity: i64,
    },
}

impl EngineEvent {
    pub fn stock_changed(adjustment: &StockAdjustment) -> Self {
        EngineEvent::StockChanged {
            product_id: adjustment.product_id.clone(),
            location_id: adjustment.location_id.clone(),
            previous_quantity: adjustment.previous_quantity,
            new_quantity: adjustment.new_quantity,
        }
    }
}

/// Notification content before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
}

/// Everything one committed operation wants published.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// Events with the permission they are addressed to.
    pub events: Vec<(&'static str, EngineEvent)>,
    pub notification: Option<(&'static str, NewNotification)>,
    pub report_topics: Vec<&'static str>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Notification storage failed: {0}")]
    Storage(#[from] DbError),

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Pushes events to connected clients holding a permission.
#[async_trait]
pub trait BroadcastHub: Send + Sync {
    async fn broadcast_to_permission(&self, permission: &str, event: &EngineEvent) -> NotifyResult<()>;
}

/// Persists a notification for every holder of a permission.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notifications_for_permission(
        &self,
        permission: &str,
        notification: &NewNotification,
    ) -> NotifyResult<()>;
}

/// Invalidates cached reports for a topic.
#[async_trait]
pub trait ReportCache: Send + Sync {
    async fn notify_report_update(&self, topic: &str) -> NotifyResult<()>;
}

// =============================================================================
// Notifier
// =============================================================================

/// Fan-out over the three collaborators.
#[derive(Clone)]
pub struct Notifier {
    hub: Arc<dyn BroadcastHub>,
    store: Arc<dyn NotificationStore>,
    reports: Arc<dyn ReportCache>,
}

impl Notifier {
    pub fn new(
        hub: Arc<dyn BroadcastHub>,
        store: Arc<dyn NotificationStore>,
        reports: Arc<dyn ReportCache>,
    ) -> Self {
        Self { hub, store, reports }
    }

    /// Channel hub, SQLite notification store and logging report cache.
    ///
    /// The hub is returned as well so callers can subscribe to it.
    pub fn standard(db: Database, channel_capacity: usize) -> (Self, ChannelHub) {
        let hub = ChannelHub::new(channel_capacity);
        let notifier = Self::new(
            Arc::new(hub.clone()),
            Arc::new(SqliteNotificationStore::new(db)),
            Arc::new(LoggingReportCache),
        );
        (notifier, hub)
    }

    /// Runs every side effect of a dispatch. Never fails.
    pub async fn publish(&self, dispatch: Dispatch) {
        for (permission, event) in &dispatch.events {
            if let Err(e) = self.hub.broadcast_to_permission(permission, event).await {
                warn!(permission = %permission, error = %e, "Broadcast failed");
            }
        }

        if let Some((permission, notification)) = &dispatch.notification {
            if let Err(e) = self
                .store
                .create_notifications_for_permission(permission, notification)
                .await
            {
                warn!(permission = %permission, error = %e, "Storing notification failed");
            }
        }

        for topic in &dispatch.report_topics {
            if let Err(e) = self.reports.notify_report_update(topic).await {
                warn!(topic = %topic, error = %e, "Report cache invalidation failed");
            }
        }
    }
}

// =============================================================================
// Channel Hub
// =============================================================================

/// An event addressed to a permission.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionEvent {
    pub permission: String,
    pub event: EngineEvent,
}

/// In-process hub backed by a tokio broadcast channel.
///
/// Subscribers filter on [`PermissionEvent::permission`]; a slow subscriber
/// lags and loses the oldest events.
#[derive(Clone)]
pub struct ChannelHub {
    sender: broadcast::Sender<PermissionEvent>,
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PermissionEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl BroadcastHub for ChannelHub {
    async fn broadcast_to_permission(&self, permission: &str, event: &EngineEvent) -> NotifyResult<()> {
        let message = PermissionEvent {
            permission: permission.to_string(),
            event: event.clone(),
        };
        match self.sender.send(message) {
            Ok(receivers) => debug!(permission = %permission, receivers, "Event broadcast"),
            // No subscribers connected
            Err(_) => debug!(permission = %permission, "Event dropped, no subscribers"),
        }
        Ok(())
    }
}

// =============================================================================
// SQLite Notification Store
// =============================================================================

/// Stores notifications in the `notifications` table, one row per permission.
#[derive(Clone)]
pub struct SqliteNotificationStore {
    db: Database,
}

impl SqliteNotificationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn create_notifications_for_permission(
        &self,
        permission: &str,
        notification: &NewNotification,
    ) -> NotifyResult<()> {
        let row = Notification {
            id: Uuid::new_v4().to_string(),
            permission: permission.to_string(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            payload: serde_json::to_string(&notification.payload)?,
            created_at: Utc::now(),
            read_at: None,
        };

        let mut conn = self.db.acquire().await?;
        NotificationRepository::insert(&mut conn, &row).await?;
        Ok(())
    }
}

// =============================================================================
// Logging Report Cache
// =============================================================================

/// Report cache for deployments without one; records the invalidation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReportCache;

#[async_trait]
impl ReportCache for LoggingReportCache {
    async fn notify_report_update(&self, topic: &str) -> NotifyResult<()> {
        info!(topic = %topic, "Report data changed");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
