//! Error taxonomy shared by every core operation.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result alias used across the core services and stores.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or out-of-range input, with field-level detail.
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: &'static str, message: String },

    /// Operation attempted on an entity outside the required state,
    /// e.g. approving an already-reviewed transaction.
    #[error("{entity} {id} is not in the required state: {detail}")]
    InvalidState {
        entity: &'static str,
        id: uuid::Uuid,
        detail: String,
    },

    /// Withdrawal or payout request exceeding the available balance.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: uuid::Uuid },

    /// Store-layer failure; the enclosing transaction has been rolled back.
    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl CoreError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn invalid_state(entity: &'static str, id: uuid::Uuid, detail: impl Into<String>) -> Self {
        Self::InvalidState {
            entity,
            id,
            detail: detail.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: uuid::Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}
