//! # Repository Module
//!
//! Database repository implementations.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Transaction-Scoped Repositories                      │
//! │                                                                         │
//! │  Every repository function takes `&mut SqliteConnection`. Both a       │
//! │  `Transaction<Sqlite>` and a pooled connection deref to it, so the     │
//! │  same call works inside a checkout and in a read-only lookup:          │
//! │                                                                         │
//! │    let mut tx = db.begin().await?;                                     │
//! │    ProductRepository::lock(&mut tx, id).await?;                        │
//! │    BatchRepository::for_location(&mut tx, id, loc).await?;             │
//! │    tx.commit().await?;                                                  │
//! │                                                                         │
//! │    let mut conn = db.acquire().await?;                                 │
//! │    OrderRepository::get_by_number(&mut conn, "ORD-...").await?;        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Product lookup and row lock
//! - [`BatchRepository`](batch::BatchRepository) - Stock batches
//! - [`PromotionRepository`](promotion::PromotionRepository) - Active promotions
//! - [`LoyaltyRepository`](loyalty::LoyaltyRepository) - Guarded point updates
//! - [`OrderRepository`](order::OrderRepository) - Orders and order items
//! - [`ReturnRepository`](returns::ReturnRepository) - Returns and return items
//! - [`TransactionRepository`](transaction::TransactionRepository) - Payment ledger
//! - [`StockAdjustmentRepository`](stock_adjustment::StockAdjustmentRepository) - Stock ledger
//! - [`SettingsRepository`](settings::SettingsRepository) - Business settings
//! - [`NotificationRepository`](notification::NotificationRepository) - Persisted notifications

pub mod batch;
pub mod loyalty;
pub mod notification;
pub mod order;
pub mod product;
pub mod promotion;
pub mod returns;
pub mod settings;
pub mod stock_adjustment;
pub mod transaction;
