//! # Tourney
//!
//! Tournament bracket and match lifecycle engine.
//!
//! A tournament collects participants, locks its field, and materializes a
//! bracket of matches linked by winner and loser feeds. Participants report
//! results, opponents confirm or contest them, and a background sweep
//! auto-confirms, warns and expires matches whose timers have fired. Settled
//! matches advance exactly once; the last one completes the tournament and
//! pays out the prize pool.
//!
//! ## Architecture
//!
//! Every operation loads a tournament into a session, applies synchronous
//! domain logic to it, and commits the resulting changeset with optimistic
//! version checks. Events are dispatched after the commit succeeds.
//!
//! - **Open**: registration, seeding and prize table edits
//! - **Locked**: registration closed, bracket not yet generated
//! - **Live**: matches are being played
//! - **Completed**: standings and payouts are final
//! - **Cancelled**: entry fees refunded
//!
//! ## Core Modules
//!
//! - [`tournament`]: registration, start, completion and prize distribution
//! - [`bracket`]: bracket generation for every format, and standings
//! - [`lifecycle`]: match state machine, reporting and disputes
//! - [`advancement`]: exactly-once propagation of settled matches
//! - [`scheduler`]: the timeout sweep
//! - [`store`]: persistence port with in-memory and PostgreSQL backends
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tourney::tournament::NewTournament;
//! use tourney::{EngineConfig, LogNotifier, MemoryLedger, MemoryStore, TournamentEngine};
//!
//! # async fn example() -> Result<(), tourney::EngineError> {
//! let engine = TournamentEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryLedger::new()),
//!     Arc::new(LogNotifier),
//!     EngineConfig::default(),
//! );
//! let cup = engine
//!     .tournaments()
//!     .create(NewTournament::single_elimination("Open Cup", 2, 0))
//!     .await?;
//! engine.tournaments().join(cup.id, 1, "ace").await?;
//! engine.tournaments().join(cup.id, 2, "blade").await?;
//! engine.tournaments().start(cup.id).await?;
//! # Ok(())
//! # }
//! ```

/// Propagation of settled matches through the bracket.
pub mod advancement;

/// Bracket generation, match records and standings.
pub mod bracket;

pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;

/// Match state machine, reporting, confirmation and disputes.
pub mod lifecycle;

/// Background sweep for time-based transitions.
pub mod scheduler;

/// Best-of-N series bookkeeping.
pub mod series;

pub(crate) mod session;
pub mod store;

/// Tournament registration, lifecycle and payouts.
pub mod tournament;

pub use advancement::AdvancementEngine;
pub use config::{ConfigError, EngineConfig, ExpiryPolicy};
pub use engine::{EngineContext, TournamentEngine};
pub use errors::{EngineError, EngineResult};
pub use events::{ChannelNotifier, EngineEvent, LogNotifier, Notifier, NotifyError};
pub use ledger::{Ledger, LedgerError, MemoryLedger};
pub use lifecycle::MatchLifecycle;
pub use scheduler::{SweepReport, TimeoutScheduler};
pub use store::{MemoryStore, PgOutbox, PgStore, StoreError, TournamentStore};
pub use tournament::TournamentOrchestrator;
