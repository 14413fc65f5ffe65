//! Engine error types.

use crate::ledger::LedgerError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by engine operations.
///
/// Every variant except [`EngineError::Store`] and [`EngineError::Ledger`] is
/// raised before anything is written, so the caller can surface it as-is.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input (bad prize table, too few participants, tied scores)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A concurrent transition won the race, or the record already moved on
    #[error("Stale {entity} {id}: {detail}")]
    StaleState {
        entity: &'static str,
        id: i64,
        detail: String,
    },

    /// Bracket corruption such as a slot collision. Never corrected automatically.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// The caller is not allowed to perform this action
    #[error("Policy violation: {0}")]
    Policy(String),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// Wallet collaborator failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn stale(entity: &'static str, id: i64, detail: impl Into<String>) -> Self {
        EngineError::StaleState {
            entity,
            id,
            detail: detail.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        EngineError::NotFound { entity, id }
    }

    /// True when the operation lost a race and retrying or reporting
    /// "already resolved" is the right response.
    pub fn is_stale(&self) -> bool {
        matches!(self, EngineError::StaleState { .. })
    }

    /// Get a client-safe error message that doesn't leak internal details
    pub fn client_message(&self) -> String {
        match self {
            EngineError::Store(_) => "Internal server error".to_string(),
            EngineError::Integrity(_) => "Bracket is in an inconsistent state".to_string(),
            EngineError::Ledger(LedgerError::InsufficientFunds { .. }) => {
                "Insufficient balance".to_string()
            }
            EngineError::Ledger(_) => "Wallet service unavailable".to_string(),
            EngineError::StaleState { entity, .. } => {
                format!("This {entity} was already updated, refresh and try again")
            }
            EngineError::NotFound { entity, .. } => format!("{entity} not found"),
            _ => self.to_string(),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
