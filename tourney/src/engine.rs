//! Engine facade and the shared context every service runs on.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tourney::{EngineConfig, LogNotifier, MemoryLedger, MemoryStore, TournamentEngine};
//! use tourney::tournament::NewTournament;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = TournamentEngine::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryLedger::new()),
//!         Arc::new(LogNotifier),
//!         EngineConfig::default(),
//!     );
//!
//!     let cup = engine
//!         .tournaments()
//!         .create(NewTournament::single_elimination("Friday Cup", 8, 0))
//!         .await?;
//!     engine.tournaments().join(cup.id, 1, "ace").await?;
//!     Ok(())
//! }
//! ```

use crate::advancement::AdvancementEngine;
use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::events::{EngineEvent, Notifier};
use crate::ledger::Ledger;
use crate::lifecycle::MatchLifecycle;
use crate::scheduler::TimeoutScheduler;
use crate::session::{Committed, IdMap, TournamentSession};
use crate::store::{StoreError, TournamentStore};
use crate::tournament::{TournamentId, TournamentOrchestrator, payouts};
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Collaborators and configuration shared by the engine services
pub struct EngineContext {
    pub(crate) store: Arc<dyn TournamentStore>,
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) config: EngineConfig,
    /// Held for the duration of a timeout sweep
    pub(crate) sweep_lock: Mutex<()>,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn TournamentStore>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
            config,
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TournamentStore> {
        &self.store
    }

    /// Load, mutate and commit a tournament session, then dispatch its events.
    ///
    /// `op` runs against a fresh session on every attempt. A version conflict
    /// reloads and reapplies up to `max_commit_attempts` times before giving
    /// up with [`EngineError::StaleState`].
    pub(crate) async fn transact<T, F>(
        &self,
        tournament_id: TournamentId,
        op: F,
    ) -> EngineResult<(T, IdMap)>
    where
        F: FnMut(&mut TournamentSession) -> EngineResult<T>,
    {
        let (value, committed) = self.apply(tournament_id, op).await?;
        self.dispatch(&committed.events).await;
        Ok((value, committed.ids))
    }

    /// [`EngineContext::transact`] without event dispatch
    pub(crate) async fn apply<T, F>(
        &self,
        tournament_id: TournamentId,
        mut op: F,
    ) -> EngineResult<(T, Committed)>
    where
        F: FnMut(&mut TournamentSession) -> EngineResult<T>,
    {
        let max_attempts = self.config.max_commit_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut session = TournamentSession::load(self.store.as_ref(), tournament_id).await?;
            let value = op(&mut session)?;

            match session.commit(self.store.as_ref()).await {
                Ok(committed) => return Ok((value, committed)),
                Err(StoreError::VersionConflict { entity, id, .. }) if attempt < max_attempts => {
                    debug!(
                        "Version conflict on {entity} {id} (attempt {attempt}/{max_attempts}), retrying"
                    );
                }
                Err(StoreError::VersionConflict { entity, id, .. }) => {
                    warn!("Giving up on {entity} {id} after {attempt} conflicting commits");
                    return Err(EngineError::stale(
                        entity,
                        id,
                        "concurrent updates kept winning",
                    ));
                }
                Err(StoreError::Duplicate { entity, detail }) => {
                    return Err(EngineError::Policy(format!(
                        "{entity} already exists: {detail}"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Deliver committed events. Failures are logged, never returned.
    async fn dispatch(&self, events: &[EngineEvent]) {
        for event in events {
            if let Err(e) = self.notifier.notify(event).await {
                warn!("Failed to deliver {} event: {}", event.name(), e);
            }
        }

        for event in events {
            let tournament_id = match event {
                EngineEvent::TournamentCompleted { tournament_id, .. }
                | EngineEvent::TournamentCancelled { tournament_id } => *tournament_id,
                _ => continue,
            };

            // The sweep retries anything left unpaid
            if let Err(e) = payouts::disburse(self, tournament_id).await {
                warn!("Disbursement for tournament {tournament_id} deferred: {e}");
            }
        }
    }
}

/// Entry point bundling the engine services
#[derive(Clone)]
pub struct TournamentEngine {
    ctx: Arc<EngineContext>,
}

impl TournamentEngine {
    pub fn new(
        store: Arc<dyn TournamentStore>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(EngineContext::new(store, ledger, notifier, config)),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Registration, seeding, start, cancellation and payouts
    pub fn tournaments(&self) -> TournamentOrchestrator {
        TournamentOrchestrator::new(self.ctx.clone())
    }

    /// Reports, confirmations, disputes and admin actions on matches
    pub fn matches(&self) -> MatchLifecycle {
        MatchLifecycle::new(self.ctx.clone())
    }

    pub fn advancement(&self) -> AdvancementEngine {
        AdvancementEngine::new(self.ctx.clone())
    }

    pub fn scheduler(&self) -> TimeoutScheduler {
        TimeoutScheduler::new(self.ctx.clone())
    }
}
