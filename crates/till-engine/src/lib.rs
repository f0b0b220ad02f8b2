//! # till-engine: Sale & Return Orchestration
//!
//! Runs checkout and returns as single database transactions and publishes
//! their effects once committed.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till Engine                                      │
//! │                                                                         │
//! │  API layer (HTTP, IPC, ...)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  till-engine (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │  Engine ──► SaleOrchestrator ───┐                               │   │
//! │  │        └──► ReturnOrchestrator ─┤                               │   │
//! │  │                                 ├──► BatchAllocator             │   │
//! │  │                                 ├──► LoyaltyLedger              │   │
//! │  │                                 └──► Notifier (after commit)    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                         │                                       │
//! │       ▼                         ▼                                       │
//! │  till-core (rules)         till-db (SQLite)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - `Engine` facade and lookups
//! - [`checkout`] - `SaleOrchestrator`
//! - [`returns`] - `ReturnOrchestrator`
//! - [`allocator`] - Batch depletion and replenishment
//! - [`ledger`] - Loyalty balance updates
//! - [`notify`] - Post-commit collaborators
//! - [`config`] - Runtime configuration from the environment
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - `EngineError` and `ErrorKind`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use till_engine::{telemetry, Engine, EngineConfig};
//!
//! telemetry::init_tracing();
//! let engine = Engine::connect(&EngineConfig::load()?).await?;
//! let receipt = engine.checkout(request).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::warn;

use till_core::EngineSettings;
use till_db::SettingsRepository;

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocator;
pub mod checkout;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod returns;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testkit;

// =============================================================================
// Re-exports
// =============================================================================

pub use allocator::BatchAllocator;
pub use checkout::{CartLine, CheckoutReceipt, CheckoutRequest, LoyaltySummary, SaleOrchestrator};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, OrderDetails};
pub use error::{EngineError, EngineResult, ErrorBody, ErrorKind};
pub use ledger::{LedgerEntry, LoyaltyLedger, Redemption};
pub use notify::{
    BroadcastHub, ChannelHub, EngineEvent, LoggingReportCache, NewNotification, NotificationStore, Notifier,
    PermissionEvent, ReportCache, SqliteNotificationStore,
};
pub use returns::{ReturnDecision, ReturnDetails, ReturnLine, ReturnOrchestrator, ReturnOutcome, ReturnRequest};

// =============================================================================
// Shared Helpers
// =============================================================================

/// Typed settings snapshot, read inside the caller's transaction.
pub(crate) async fn load_settings(conn: &mut SqliteConnection) -> EngineResult<EngineSettings> {
    let raw = SettingsRepository::load_all(conn).await?;
    Ok(EngineSettings::load(&raw)?)
}

/// An open transaction together with the result it will produce once
/// committed.
pub(crate) type Staged<T> = (Transaction<'static, Sqlite>, T);

/// Runs `stage` under a deadline and commits what it staged.
///
/// The deadline covers staging only. `DeadlineExceeded` therefore always
/// means the transaction was dropped uncommitted, and a commit that has
/// started is awaited to completion.
pub(crate) async fn commit_within<T, F>(limit: Duration, stage: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<Staged<T>>>,
{
    let (tx, value) = with_deadline(limit, stage).await?;
    tx.commit().await?;
    Ok(value)
}

/// Runs `operation` under a deadline.
///
/// On expiry the future is dropped, and with it any open transaction.
pub(crate) async fn with_deadline<T, F>(limit: Duration, operation: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(limit_ms = limit.as_millis() as u64, "Operation deadline exceeded, rolled back");
            Err(EngineError::DeadlineExceeded(limit))
        }
    }
}
