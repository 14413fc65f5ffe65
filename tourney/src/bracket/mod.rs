//! Bracket graph: match records, generation and standings.
//!
//! Matches form an arena. Each match holds [`Feed`] pointers to the slot its
//! winner (and, in double elimination, its loser) moves into. Series games
//! live in the same arena but carry no pointers.
//!
//! ## Example
//!
//! ```no_run
//! use tourney::bracket::BracketGenerator;
//! use tourney::tournament::{TournamentFormat, TournamentSettings};
//!
//! let plan = BracketGenerator::generate(
//!     TournamentFormat::DoubleElimination,
//!     &[11, 12, 13, 14],
//!     &TournamentSettings::default(),
//! )
//! .unwrap();
//! assert_eq!(plan.len(), 6);
//! ```

pub mod generator;
pub mod models;
pub mod seeding;
pub mod standings;

pub use generator::{BracketGenerator, BracketPlan, PlanFeed, PlannedMatch, PlannedSlot};
pub use models::{
    BracketType, Feed, Match, MatchId, MatchStatus, Outcome, Resolution, Slot, SlotPosition,
};
pub use standings::compute_standings;
