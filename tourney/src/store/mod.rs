//! Persistence port.
//!
//! The engine reads a tournament aggregate and writes it back through
//! [`TournamentStore::commit`]: one atomic changeset in which every update is
//! guarded by the record's `version`. Losing a version race surfaces as
//! [`StoreError::VersionConflict`] and nothing from the changeset is applied.
//!
//! Two implementations ship with the crate: [`MemoryStore`] for tests and
//! embedding, and [`PgStore`] on PostgreSQL.

use crate::bracket::{Match, MatchId};
use crate::db::timeouts::TimeoutError;
use crate::lifecycle::{Dispute, DisputeId};
use crate::series::Series;
use crate::tournament::{NewTournament, Participant, Tournament, TournamentId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod outbox;
pub mod postgres;

pub use memory::MemoryStore;
pub use outbox::PgOutbox;
pub use postgres::PgStore;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Another writer committed first
    #[error("Version conflict on {entity} {id}: expected version {expected}")]
    VersionConflict {
        entity: &'static str,
        id: i64,
        expected: i64,
    },

    /// Unique constraint violated
    #[error("Duplicate {entity}: {detail}")]
    Duplicate { entity: &'static str, detail: String },

    /// Update of a record that does not exist
    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: i64 },

    /// Operation timed out
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row does not map onto a domain value
    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

impl From<TimeoutError> for StoreError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(duration) => StoreError::Timeout(duration),
            TimeoutError::Database(e) => StoreError::Database(e),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Record families that draw ids from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Tournament,
    Participant,
    Match,
    Series,
    Dispute,
}

impl IdKind {
    pub fn table(&self) -> &'static str {
        match self {
            IdKind::Tournament => "tournaments",
            IdKind::Participant => "tournament_participants",
            IdKind::Match => "matches",
            IdKind::Series => "match_series",
            IdKind::Dispute => "match_disputes",
        }
    }
}

/// One write in a changeset
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    /// New record; its id must be unused
    Insert(T),
    /// Replace a record whose stored version equals `record.version`
    Update(T),
    /// Remove a record whose stored version equals `record.version`
    Delete(T),
}

impl<T> Change<T> {
    pub fn record(&self) -> &T {
        match self {
            Change::Insert(record) | Change::Update(record) | Change::Delete(record) => record,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Change<U> {
        match self {
            Change::Insert(record) => Change::Insert(f(record)),
            Change::Update(record) => Change::Update(f(record)),
            Change::Delete(record) => Change::Delete(f(record)),
        }
    }
}

/// Everything one session writes, applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    pub tournaments: Vec<Change<Tournament>>,
    pub participants: Vec<Change<Participant>>,
    pub matches: Vec<Change<Match>>,
    pub series: Vec<Change<Series>>,
    pub disputes: Vec<Change<Dispute>>,
}

impl Changeset {
    pub fn len(&self) -> usize {
        self.tournaments.len()
            + self.participants.len()
            + self.matches.len()
            + self.series.len()
            + self.disputes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Records carrying an optimistic-concurrency version
pub(crate) trait Versioned {
    const ENTITY: &'static str;

    fn id(&self) -> i64;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
}

macro_rules! versioned {
    ($ty:ty, $entity:literal) => {
        impl Versioned for $ty {
            const ENTITY: &'static str = $entity;

            fn id(&self) -> i64 {
                self.id
            }

            fn version(&self) -> i64 {
                self.version
            }

            fn set_version(&mut self, version: i64) {
                self.version = version;
            }
        }
    };
}

versioned!(Tournament, "tournament");
versioned!(Participant, "participant");
versioned!(Match, "match");
versioned!(Series, "series");
versioned!(Dispute, "dispute");

/// Persistence interface used by the engine
#[async_trait]
pub trait TournamentStore: Send + Sync {
    /// Allocate `count` fresh ids for new records of `kind`
    async fn reserve_ids(&self, kind: IdKind, count: usize) -> StoreResult<Vec<i64>>;

    async fn get_tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>>;

    async fn list_participants(&self, tournament_id: TournamentId)
    -> StoreResult<Vec<Participant>>;

    async fn find_participant(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> StoreResult<Option<Participant>>;

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>>;

    /// Bracket nodes and series games of a tournament
    async fn list_matches(&self, tournament_id: TournamentId) -> StoreResult<Vec<Match>>;

    async fn list_series(&self, tournament_id: TournamentId) -> StoreResult<Vec<Series>>;

    async fn get_dispute(&self, id: DisputeId) -> StoreResult<Option<Dispute>>;

    async fn list_disputes(&self, tournament_id: TournamentId) -> StoreResult<Vec<Dispute>>;

    /// Matches with a timer at or before `now`: an auto-confirmation, an
    /// unsent warning, or a deadline on a playable match
    async fn list_due_matches(&self, now: DateTime<Utc>) -> StoreResult<Vec<Match>>;

    /// Completed tournaments with unpaid prizes and cancelled tournaments
    /// with unrefunded entry fees
    async fn list_pending_disbursements(&self) -> StoreResult<Vec<TournamentId>>;

    /// Apply a changeset atomically
    async fn commit(&self, changes: Changeset) -> StoreResult<()>;

    /// Insert a new open tournament
    async fn create_tournament(
        &self,
        new: NewTournament,
        now: DateTime<Utc>,
    ) -> StoreResult<Tournament> {
        let ids = self.reserve_ids(IdKind::Tournament, 1).await?;
        let id = ids.first().copied().ok_or_else(|| StoreError::Corrupt {
            table: IdKind::Tournament.table(),
            detail: "no id reserved".to_string(),
        })?;

        let tournament = new.into_tournament(id, now);
        self.commit(Changeset {
            tournaments: vec![Change::Insert(tournament.clone())],
            ..Changeset::default()
        })
        .await?;
        Ok(tournament)
    }
}

/// Whether a match has a timer the sweep should look at
pub(crate) fn is_due(m: &Match, now: DateTime<Utc>) -> bool {
    use crate::bracket::MatchStatus;

    match m.status {
        MatchStatus::AwaitingConfirmation => {
            m.auto_confirm_at.is_some_and(|at| at <= now)
                || (m.warning_sent_at.is_none() && m.warn_at.is_some_and(|at| at <= now))
        }
        MatchStatus::Scheduled | MatchStatus::Live => {
            !m.is_anchor()
                && m.participants().is_some()
                && m.deadline_at.is_some_and(|at| at <= now)
        }
        _ => false,
    }
}
