//! Wallet collaborator port.
//!
//! The engine never moves currency itself. It asks a [`Ledger`] to debit the
//! entry fee on join and to credit prizes and refunds, always with an
//! idempotency key so a retried call is applied at most once.

use crate::tournament::{ParticipantId, TournamentId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::Mutex;

/// Ledger errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Insufficient balance
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Idempotency key already applied; the earlier call took effect
    #[error("Duplicate transaction: {0}")]
    Duplicate(String),

    /// Wallet service unreachable or failing
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// A duplicate key means the movement already happened
    pub fn is_already_applied(&self) -> bool {
        matches!(self, LedgerError::Duplicate(_))
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Wallet interface the engine calls
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Take `amount` from the user's wallet
    async fn debit(&self, user_id: UserId, amount: i64, idempotency_key: &str)
    -> LedgerResult<()>;

    /// Give `amount` to the user's wallet
    async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()>;
}

/// Key for an entry-fee debit. The nonce separates a re-join from a retry.
pub fn entry_key(tournament_id: TournamentId, user_id: UserId, nonce: &str) -> String {
    format!("entry:{tournament_id}:{user_id}:{nonce}")
}

/// Key for reversing an entry-fee debit whose join failed
pub fn entry_reversal_key(entry_key: &str) -> String {
    format!("reversal:{entry_key}")
}

/// Key for a prize credit
pub fn prize_key(tournament_id: TournamentId, participant_id: ParticipantId) -> String {
    format!("prize:{tournament_id}:{participant_id}")
}

/// Key for an entry-fee refund, on leave or cancellation
pub fn refund_key(tournament_id: TournamentId, participant_id: ParticipantId) -> String {
    format!("refund:{tournament_id}:{participant_id}")
}

#[derive(Debug, Default)]
struct MemoryLedgerState {
    balances: HashMap<UserId, i64>,
    applied: HashSet<String>,
}

/// In-process ledger for tests and local development
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryLedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a user's balance
    pub async fn fund(&self, user_id: UserId, amount: i64) {
        self.state.lock().await.balances.insert(user_id, amount);
    }

    pub async fn balance(&self, user_id: UserId) -> i64 {
        self.state
            .lock()
            .await
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    /// Whether a movement with this key was applied
    pub async fn has_applied(&self, idempotency_key: &str) -> bool {
        self.state.lock().await.applied.contains(idempotency_key)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn debit(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = self.state.lock().await;
        if state.applied.contains(idempotency_key) {
            return Err(LedgerError::Duplicate(idempotency_key.to_string()));
        }

        let available = state.balances.get(&user_id).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                available,
                required: amount,
            });
        }

        state.balances.insert(user_id, available - amount);
        state.applied.insert(idempotency_key.to_string());
        Ok(())
    }

    async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = self.state.lock().await;
        if state.applied.contains(idempotency_key) {
            return Err(LedgerError::Duplicate(idempotency_key.to_string()));
        }

        *state.balances.entry(user_id).or_insert(0) += amount;
        state.applied.insert(idempotency_key.to_string());
        Ok(())
    }
}
