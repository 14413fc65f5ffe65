//! Transactional outbox tables for the wallet and notification collaborators.
//!
//! Deployments whose wallet and notification services poll PostgreSQL can
//! hand [`PgOutbox`] to the engine as both [`Ledger`] and [`Notifier`]. Ledger
//! rows are unique per idempotency key, so a retried movement is recorded
//! once and reported back as [`LedgerError::Duplicate`]. Balance checks are
//! the consuming wallet service's job.

use crate::db::timeouts::with_default_timeout;
use crate::events::{EngineEvent, Notifier, NotifyError};
use crate::ledger::{Ledger, LedgerError, LedgerResult};
use crate::tournament::UserId;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgOutbox {
    pool: Arc<PgPool>,
}

impl PgOutbox {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn record_movement(
        &self,
        direction: &str,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let result = with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO ledger_outbox (idempotency_key, user_id, direction, amount)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (idempotency_key) DO NOTHING
                "#,
            )
            .bind(idempotency_key)
            .bind(user_id)
            .bind(direction)
            .bind(amount)
            .execute(self.pool.as_ref()),
        )
        .await
        .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Duplicate(idempotency_key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for PgOutbox {
    async fn debit(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        self.record_movement("debit", user_id, amount, idempotency_key)
            .await
    }

    async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        self.record_movement("credit", user_id, amount, idempotency_key)
            .await
    }
}

#[async_trait]
impl Notifier for PgOutbox {
    async fn notify(&self, event: &EngineEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_value(event).map_err(|e| NotifyError::Delivery(e.to_string()))?;

        with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO notification_outbox (id, tournament_id, event_type, payload)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(event.tournament_id())
            .bind(event.name())
            .bind(payload)
            .execute(self.pool.as_ref()),
        )
        .await
        .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        Ok(())
    }
}
