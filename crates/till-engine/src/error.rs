//! # Engine Error Type
//!
//! Single error type returned by every engine operation.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Engine                             │
//! │                                                                         │
//! │  checkout / request_return / process_return                             │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Result<T, EngineError>                                          │  │
//! │  │                                                                  │  │
//! │  │  Rule violated?   ─── CoreError ──────────┐                      │  │
//! │  │  Row missing?     ─── NotFound ───────────┤                      │  │
//! │  │  SQL failed?      ─── DbError ────────────┼──► EngineError       │  │
//! │  │  Bad settings?    ─── SettingsError ──────┤        │             │  │
//! │  │  Too slow?        ─── DeadlineExceeded ───┘        ▼             │  │
//! │  │                                              kind() → ErrorKind  │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Any error drops the open transaction, which rolls it back.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers switch on [`ErrorKind`]; [`ErrorBody`] is the serialized form
//! handed to API layers:
//! ```json
//! { "code": "CONFLICT", "message": "Insufficient stock for ...: available 2, requested 3" }
//! ```

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use till_core::{CoreError, SettingsError, ValidationError};
use till_db::DbError;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Business rule or input violation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The store failed; the transaction was rolled back.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// Business settings are missing or malformed.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// The operation did not finish before its deadline.
    #[error("Operation exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(err) => match err {
                CoreError::Validation(_) | CoreError::OrderCustomerMismatch { .. } => ErrorKind::Validation,
                CoreError::ProductNotFound(_) => ErrorKind::NotFound,
                CoreError::InsufficientStock { .. }
                | CoreError::InsufficientPoints { .. }
                | CoreError::DiscountExceedsTotal { .. }
                | CoreError::ReturnQuantityExceeded { .. }
                | CoreError::AlreadyProcessed { .. } => ErrorKind::Conflict,
            },
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Storage(DbError::NotFound { .. }) => ErrorKind::NotFound,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::Settings(_) => ErrorKind::Configuration,
            EngineError::DeadlineExceeded(_) => ErrorKind::Cancelled,
        }
    }

    /// Serializable form for API layers.
    ///
    /// Storage failures carry a generic message; the detail is logged.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            EngineError::Storage(DbError::NotFound { .. }) => self.to_string(),
            EngineError::Storage(err) => {
                tracing::error!(error = %err, "Storage failure");
                "Database operation failed".to_string()
            }
            _ => self.to_string(),
        };
        ErrorBody {
            code: self.kind(),
            message,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Storage(DbError::from(err))
    }
}

/// Error categories exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input (400)
    Validation,
    /// Missing product, order, return or account (404)
    NotFound,
    /// Business rule rejected the operation (409/422)
    Conflict,
    /// Store failure (500)
    Storage,
    /// Settings missing or invalid (500)
    Configuration,
    /// Deadline exceeded (504)
    Cancelled,
}

/// Machine-readable `code` plus human-readable `message`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorKind,
    pub message: String,
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let stock: EngineError = CoreError::InsufficientStock {
            product_id: "p".into(),
            available: 1,
            requested: 2,
        }
        .into();
        assert_eq!(stock.kind(), ErrorKind::Conflict);

        let invalid: EngineError = ValidationError::Required { field: "items".into() }.into();
        assert_eq!(invalid.kind(), ErrorKind::Validation);

        let mismatch: EngineError = CoreError::OrderCustomerMismatch {
            order_number: "ORD-1".into(),
        }
        .into();
        assert_eq!(mismatch.kind(), ErrorKind::Validation);

        assert_eq!(EngineError::not_found("Order", "ORD-1").kind(), ErrorKind::NotFound);
        assert_eq!(
            EngineError::from(DbError::not_found("Batch", "b1")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(EngineError::from(DbError::Busy).kind(), ErrorKind::Storage);
        assert_eq!(
            EngineError::from(SettingsError::Missing { key: "k".into() }).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            EngineError::DeadlineExceeded(Duration::from_secs(1)).kind(),
            ErrorKind::Cancelled
        );
    }

    #[test]
    fn test_body_serialization() {
        let err = EngineError::not_found("Return", "r-1");
        let json = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Return not found: r-1");

        let storage = EngineError::from(DbError::QueryFailed("syntax error near x".into()));
        let body = storage.to_body();
        assert_eq!(body.message, "Database operation failed");
    }
}
