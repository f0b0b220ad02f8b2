//! # till-core: Pure Business Logic for the Sale & Return Engine
//!
//! Every rule that decides *what* a checkout or a return does lives here as a
//! pure function. The storage layer (`till-db`) and the orchestrators
//! (`till-engine`) only decide *when* and *inside which transaction*.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               till-engine (orchestration)                       │   │
//! │  │    SaleOrchestrator, ReturnOrchestrator, BatchAllocator         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │ pricing  │ │   tax    │ │ loyalty  │ │   allocation     │  │   │
//! │  │   │ promo    │ │ bps rate │ │ points & │ │   FEFO / FIFO    │  │   │
//! │  │   │ scoring  │ │          │ │  tiers   │ │   plans          │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    till-db (Database Layer)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (Product, Batch, Promotion, Order, ...)
//! - [`money`] - Integer minor-unit money
//! - [`pricing`] - Promotion resolution
//! - [`tax`] - Tax application
//! - [`loyalty`] - Point redemption/accrual/clawback and tiers
//! - [`allocation`] - Batch depletion planning
//! - [`settings`] - Typed business settings snapshot
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use till_core::money::Money;
//! use till_core::tax::TaxCalculator;
//! use till_core::types::TaxRate;
//!
//! let net = Money::from_cents(9500);
//! let taxed = TaxCalculator::new(TaxRate::from_bps(500)).apply(net);
//!
//! assert_eq!(taxed.total.cents(), 9975);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod error;
pub mod loyalty;
pub mod money;
pub mod pricing;
pub mod settings;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use settings::{EngineSettings, SettingsError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single checkout.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum length of a free-text return reason.
pub const MAX_REASON_LENGTH: usize = 500;
