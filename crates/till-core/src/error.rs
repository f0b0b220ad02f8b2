//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │  till-core settings                                                    │
//! │  └── SettingsError    - Missing / malformed business settings          │
//! │                                                                         │
//! │  till-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  till-engine errors                                                    │
//! │  └── EngineError      - What callers see, with an ErrorKind            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant carries the identifiers needed to explain the failure
//! (product id, requested vs available quantity, ...).

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
///
/// All of these are detected before any mutation is applied, so the
/// surrounding transaction can be dropped without partial effects.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product referenced by a cart line does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Not enough stock across the product's batches at the location.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 15)
    ///      │
    ///      ▼
    /// Plan depletion: batches hold 10
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 10, requested: 15 }
    ///      │
    ///      ▼
    /// Whole checkout rolled back, no batch touched
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Customer tried to redeem more points than the balance holds.
    #[error("Insufficient loyalty points: available {available}, requested {requested}")]
    InsufficientPoints { available: i64, requested: i64 },

    /// Points discount would be larger than the order subtotal.
    #[error("Points discount {discount_cents} exceeds order subtotal {subtotal_cents}")]
    DiscountExceedsTotal {
        discount_cents: i64,
        subtotal_cents: i64,
    },

    /// Return line asks for more units than are still returnable.
    #[error("Cannot return {requested} of order item {order_item_id}: only {returnable} returnable")]
    ReturnQuantityExceeded {
        order_item_id: String,
        returnable: i64,
        requested: i64,
    },

    /// Return already left the PENDING state.
    #[error("Return {return_id} is already {status}")]
    AlreadyProcessed { return_id: String, status: String },

    /// Order belongs to a different customer than the one requesting the return.
    #[error("Order {order_number} does not belong to the requesting customer")]
    OrderCustomerMismatch { order_number: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before a transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Same entity listed twice where only one entry is allowed.
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
