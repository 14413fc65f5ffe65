//! Tournament lifecycle: registration, seeding, start, completion and payouts.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tourney::tournament::{NewTournament, PrizeEntry};
//! use tourney::{EngineConfig, LogNotifier, MemoryLedger, MemoryStore, TournamentEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = TournamentEngine::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryLedger::new()),
//!         Arc::new(LogNotifier),
//!         EngineConfig::default(),
//!     );
//!     let tournaments = engine.tournaments();
//!
//!     // 4-player bracket, 10 per entry, 70/30 split
//!     let cup = tournaments
//!         .create(
//!             NewTournament::single_elimination("Sunday Cup", 4, 10)
//!                 .with_prize_table(vec![PrizeEntry::percent(1, 70), PrizeEntry::percent(2, 30)]),
//!         )
//!         .await?;
//!
//!     for (user, tag) in [(1, "ace"), (2, "blade"), (3, "comet"), (4, "dusk")] {
//!         tournaments.join(cup.id, user, tag).await?;
//!     }
//!     let live = tournaments.start(cup.id).await?;
//!     println!("Tournament {} is {}", live.id, live.status);
//!
//!     Ok(())
//! }
//! ```

pub mod manager;
pub mod models;
pub(crate) mod payouts;
pub mod prize;

pub use manager::TournamentOrchestrator;
pub use models::{
    FULL_PERCENT_BPS, NewTournament, Participant, ParticipantId, Payout, PrizeEntry, Standing,
    Tournament, TournamentFormat, TournamentId, TournamentSettings, TournamentStatus, UserId,
};
pub use prize::PrizeCalculator;
