//! Best-of series records.

use crate::bracket::MatchId;
use crate::errors::{EngineError, EngineResult};
use crate::tournament::{ParticipantId, TournamentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Series ID type
pub type SeriesId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Active,
    Completed,
    /// A game ended with no winner; the anchor is a no contest
    Void,
}

impl SeriesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesStatus::Active => "active",
            SeriesStatus::Completed => "completed",
            SeriesStatus::Void => "void",
        }
    }
}

impl fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SeriesStatus::Active),
            "completed" => Ok(SeriesStatus::Completed),
            "void" => Ok(SeriesStatus::Void),
            other => Err(format!("unknown series status '{other}'")),
        }
    }
}

/// Win counter for one best-of bracket match (the anchor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesId,
    pub tournament_id: TournamentId,
    pub anchor_match_id: MatchId,
    pub participant1_id: ParticipantId,
    pub participant2_id: ParticipantId,
    pub best_of: u32,
    pub participant1_wins: u32,
    pub participant2_wins: u32,
    pub status: SeriesStatus,
    pub winner_id: Option<ParticipantId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Series {
    pub fn new(
        id: SeriesId,
        tournament_id: TournamentId,
        anchor_match_id: MatchId,
        participants: (ParticipantId, ParticipantId),
        best_of: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tournament_id,
            anchor_match_id,
            participant1_id: participants.0,
            participant2_id: participants.1,
            best_of,
            participant1_wins: 0,
            participant2_wins: 0,
            status: SeriesStatus::Active,
            winner_id: None,
            created_at: now,
            completed_at: None,
            version: 0,
        }
    }

    /// Wins needed to take the series: a strict majority of `best_of`
    pub fn wins_needed(&self) -> u32 {
        self.best_of / 2 + 1
    }

    pub fn games_played(&self) -> u32 {
        self.participant1_wins + self.participant2_wins
    }

    pub fn is_active(&self) -> bool {
        self.status == SeriesStatus::Active
    }

    /// Count a game win. Returns true when the series is decided by it.
    pub fn record_win(&mut self, winner: ParticipantId, now: DateTime<Utc>) -> EngineResult<bool> {
        if !self.is_active() {
            return Err(EngineError::Integrity(format!(
                "series {} is already {}",
                self.id, self.status
            )));
        }

        let wins = if winner == self.participant1_id {
            &mut self.participant1_wins
        } else if winner == self.participant2_id {
            &mut self.participant2_wins
        } else {
            return Err(EngineError::Integrity(format!(
                "participant {winner} is not part of series {}",
                self.id
            )));
        };

        *wins += 1;
        if *wins >= self.wins_needed() {
            self.status = SeriesStatus::Completed;
            self.winner_id = Some(winner);
            self.completed_at = Some(now);
            return Ok(true);
        }

        Ok(false)
    }

    /// End the series without a winner
    pub fn void(&mut self, now: DateTime<Utc>) -> EngineResult<()> {
        if !self.is_active() {
            return Err(EngineError::Integrity(format!(
                "series {} is already {}",
                self.id, self.status
            )));
        }
        self.status = SeriesStatus::Void;
        self.completed_at = Some(now);
        Ok(())
    }
}
