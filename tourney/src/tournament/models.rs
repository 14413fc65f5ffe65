//! Tournament and participant data models.

use crate::errors::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tournament ID type
pub type TournamentId = i64;

/// Participant ID type
pub type ParticipantId = i64;

/// User ID supplied by the identity collaborator
pub type UserId = i64;

/// Basis points in one hundred percent
pub const FULL_PERCENT_BPS: u32 = 10_000;

/// Tournament status. Only moves forward, except `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    /// Accepting registrations
    Open,
    /// Registration frozen, bracket not generated yet
    Locked,
    /// Bracket generated, matches in progress
    Live,
    /// Champion and payouts determined
    Completed,
    /// Cancelled before going live
    Cancelled,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Open => "open",
            TournamentStatus::Locked => "locked",
            TournamentStatus::Live => "live",
            TournamentStatus::Completed => "completed",
            TournamentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TournamentStatus::Open),
            "locked" => Ok(TournamentStatus::Locked),
            "live" => Ok(TournamentStatus::Live),
            "completed" => Ok(TournamentStatus::Completed),
            "cancelled" => Ok(TournamentStatus::Cancelled),
            other => Err(format!("unknown tournament status '{other}'")),
        }
    }
}

/// Bracket format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
    SingleElimination,
    DoubleElimination,
    RoundRobin,
}

impl TournamentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentFormat::SingleElimination => "single_elimination",
            TournamentFormat::DoubleElimination => "double_elimination",
            TournamentFormat::RoundRobin => "round_robin",
        }
    }

    pub fn is_elimination(&self) -> bool {
        !matches!(self, TournamentFormat::RoundRobin)
    }
}

impl fmt::Display for TournamentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_elimination" => Ok(TournamentFormat::SingleElimination),
            "double_elimination" => Ok(TournamentFormat::DoubleElimination),
            "round_robin" => Ok(TournamentFormat::RoundRobin),
            other => Err(format!("unknown tournament format '{other}'")),
        }
    }
}

/// One row of the prize table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeEntry {
    /// Final standing this entry pays (1-indexed)
    pub position: u32,
    /// Share of the pool in basis points (100% = 10_000)
    pub percentage_bps: u32,
}

impl PrizeEntry {
    /// Entry paying a whole-number percentage of the pool
    pub fn percent(position: u32, percent: u32) -> Self {
        Self {
            position,
            percentage_bps: percent.saturating_mul(100),
        }
    }

    /// Entry paying a share expressed in basis points
    pub fn basis_points(position: u32, percentage_bps: u32) -> Self {
        Self {
            position,
            percentage_bps,
        }
    }
}

/// Bracket options chosen at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentSettings {
    /// Games per bracket match; above 1 the match is played as a series
    pub match_best_of: u32,
    /// Games in the grand final (double elimination only)
    pub grand_final_best_of: u32,
    /// Play a second grand final when the losers-bracket champion wins the first
    pub grand_final_reset: bool,
    /// Shuffle participants before seeding
    pub shuffle_seeds: bool,
}

impl TournamentSettings {
    pub fn validate(&self) -> EngineResult<()> {
        if self.match_best_of == 0 || self.match_best_of % 2 == 0 {
            return Err(EngineError::Validation(format!(
                "match_best_of must be odd, got {}",
                self.match_best_of
            )));
        }

        if !matches!(self.grand_final_best_of, 1 | 3) {
            return Err(EngineError::Validation(format!(
                "grand_final_best_of must be 1 or 3, got {}",
                self.grand_final_best_of
            )));
        }

        Ok(())
    }
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            match_best_of: 1,
            grand_final_best_of: 1,
            grand_final_reset: false,
            shuffle_seeds: false,
        }
    }
}

/// Input for creating a tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTournament {
    pub name: String,
    pub format: TournamentFormat,
    pub total_slots: u32,
    /// Entry fee in the currency's minor unit
    pub entry_fee: i64,
    pub prize_table: Vec<PrizeEntry>,
    pub settings: TournamentSettings,
}

impl NewTournament {
    /// Single-elimination tournament with default settings
    pub fn single_elimination(name: impl Into<String>, total_slots: u32, entry_fee: i64) -> Self {
        Self {
            name: name.into(),
            format: TournamentFormat::SingleElimination,
            total_slots,
            entry_fee,
            prize_table: vec![PrizeEntry::percent(1, 70), PrizeEntry::percent(2, 30)],
            settings: TournamentSettings::default(),
        }
    }

    /// Same tournament with another format
    pub fn with_format(mut self, format: TournamentFormat) -> Self {
        self.format = format;
        self
    }

    /// Same tournament with another prize table
    pub fn with_prize_table(mut self, prize_table: Vec<PrizeEntry>) -> Self {
        self.prize_table = prize_table;
        self
    }

    /// Same tournament with other settings
    pub fn with_settings(mut self, settings: TournamentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Open tournament record with the given id
    pub fn into_tournament(self, id: TournamentId, now: DateTime<Utc>) -> Tournament {
        Tournament {
            id,
            name: self.name,
            format: self.format,
            total_slots: self.total_slots,
            current_slots: 0,
            status: TournamentStatus::Open,
            current_round: 0,
            entry_fee: self.entry_fee,
            prize_table: self.prize_table,
            settings: self.settings,
            created_at: now,
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }
}

/// Tournament record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub format: TournamentFormat,
    pub total_slots: u32,
    pub current_slots: u32,
    pub status: TournamentStatus,
    /// Owned by the orchestrator; recomputed on every settle
    pub current_round: u32,
    pub entry_fee: i64,
    pub prize_table: Vec<PrizeEntry>,
    pub settings: TournamentSettings,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Tournament {
    /// Total pool in minor units: entry fee times filled slots
    pub fn prize_pool(&self) -> i64 {
        self.entry_fee.saturating_mul(i64::from(self.current_slots))
    }

    pub fn is_full(&self) -> bool {
        self.current_slots >= self.total_slots
    }
}

/// Participant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub gamer_tag: String,
    /// Bracket seed, assigned at start unless set explicitly before
    pub seed: Option<u32>,
    pub checked_in: bool,
    pub final_standing: Option<u32>,
    pub payout_amount: Option<i64>,
    pub payout_paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
    pub version: i64,
}

impl Participant {
    /// Prize still owed to this participant
    pub fn unpaid_payout(&self) -> Option<i64> {
        match (self.payout_amount, self.payout_paid_at) {
            (Some(amount), None) if amount > 0 => Some(amount),
            _ => None,
        }
    }
}

/// Computed standing of one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub participant_id: ParticipantId,
    /// Distinct positions 1..=N
    pub position: u32,
    pub wins: u32,
    pub losses: u32,
}

/// Prize owed to one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub participant_id: ParticipantId,
    pub position: u32,
    pub amount: i64,
}
