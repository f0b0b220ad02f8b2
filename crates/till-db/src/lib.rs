//! # till-db: Database Layer for the Sale & Return Engine
//!
//! SQLite storage for products, batches, promotions, loyalty accounts,
//! orders, returns and the two ledgers (stock adjustments and payments).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till Data Flow                                   │
//! │                                                                         │
//! │  SaleOrchestrator::checkout                                            │
//! │       │  db.begin() ──► Transaction<Sqlite>                            │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     till-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  fn(&mut conn)│    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ ProductRepo   │    │ 001_initial_ │  │   │
//! │  │   │ begin()       │◄───│ BatchRepo     │    │  schema.sql  │  │   │
//! │  │   │ acquire()     │    │ OrderRepo ... │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use till_db::{Database, DbConfig, ProductRepository};
//!
//! let db = Database::new(DbConfig::new("till.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! ProductRepository::lock(&mut tx, &product_id).await?;
//! // ... more repository calls on the same transaction ...
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::batch::BatchRepository;
pub use repository::loyalty::LoyaltyRepository;
pub use repository::notification::{Notification, NotificationRepository};
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;
pub use repository::promotion::PromotionRepository;
pub use repository::returns::ReturnRepository;
pub use repository::settings::SettingsRepository;
pub use repository::stock_adjustment::StockAdjustmentRepository;
pub use repository::transaction::TransactionRepository;
