//! Match records and the arena-style pointers between them.

use crate::series::SeriesId;
use crate::tournament::{ParticipantId, TournamentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Match ID type
pub type MatchId = i64;

/// Match status. Transitions live in [`crate::lifecycle::state_machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    Live,
    AwaitingConfirmation,
    Completed,
    Disputed,
    Forfeited,
    NoContest,
    Expired,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::AwaitingConfirmation => "awaiting_confirmation",
            MatchStatus::Completed => "completed",
            MatchStatus::Disputed => "disputed",
            MatchStatus::Forfeited => "forfeited",
            MatchStatus::NoContest => "no_contest",
            MatchStatus::Expired => "expired",
        }
    }

    /// Open for reporting
    pub fn is_open(&self) -> bool {
        matches!(self, MatchStatus::Scheduled | MatchStatus::Live)
    }

    /// Terminal and eligible for advancement
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            MatchStatus::Completed | MatchStatus::Forfeited | MatchStatus::NoContest
        )
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "live" => Ok(MatchStatus::Live),
            "awaiting_confirmation" => Ok(MatchStatus::AwaitingConfirmation),
            "completed" => Ok(MatchStatus::Completed),
            "disputed" => Ok(MatchStatus::Disputed),
            "forfeited" => Ok(MatchStatus::Forfeited),
            "no_contest" => Ok(MatchStatus::NoContest),
            "expired" => Ok(MatchStatus::Expired),
            other => Err(format!("unknown match status '{other}'")),
        }
    }
}

/// Which side of the bracket a match belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketType {
    Winners,
    Losers,
    Finals,
}

impl BracketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BracketType::Winners => "winners",
            BracketType::Losers => "losers",
            BracketType::Finals => "finals",
        }
    }
}

impl fmt::Display for BracketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BracketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "winners" => Ok(BracketType::Winners),
            "losers" => Ok(BracketType::Losers),
            "finals" => Ok(BracketType::Finals),
            other => Err(format!("unknown bracket type '{other}'")),
        }
    }
}

/// One of the two participant slots of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPosition {
    Participant1,
    Participant2,
}

impl SlotPosition {
    /// 1 or 2, as stored
    pub fn number(&self) -> i16 {
        match self {
            SlotPosition::Participant1 => 1,
            SlotPosition::Participant2 => 2,
        }
    }

    pub fn from_number(n: i16) -> Option<Self> {
        match n {
            1 => Some(SlotPosition::Participant1),
            2 => Some(SlotPosition::Participant2),
            _ => None,
        }
    }

    /// Odd bracket positions feed slot 1, even positions feed slot 2
    pub fn for_position(position: u32) -> Self {
        if position % 2 == 1 {
            SlotPosition::Participant1
        } else {
            SlotPosition::Participant2
        }
    }

    pub fn other(&self) -> Self {
        match self {
            SlotPosition::Participant1 => SlotPosition::Participant2,
            SlotPosition::Participant2 => SlotPosition::Participant1,
        }
    }
}

/// Contents of a participant slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "participant_id", rename_all = "snake_case")]
pub enum Slot {
    /// Waiting on a feeder match
    #[default]
    Pending,
    Occupied(ParticipantId),
    /// Nobody will arrive (double forfeit upstream)
    Void,
}

impl Slot {
    pub fn participant(&self) -> Option<ParticipantId> {
        match self {
            Slot::Occupied(id) => Some(*id),
            Slot::Pending | Slot::Void => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Slot::Pending)
    }

    pub(crate) fn from_outcome(participant: Option<ParticipantId>) -> Self {
        participant.map_or(Slot::Void, Slot::Occupied)
    }
}

/// Pointer from a match to the slot its winner or loser feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feed {
    pub match_id: MatchId,
    pub slot: SlotPosition,
}

/// How a match reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Reported and confirmed by the opponent
    Reported,
    AutoConfirmed,
    /// Admin forfeit
    Forfeit,
    /// Opponent slot was voided upstream
    Walkover,
    DoubleForfeit,
    /// Only one participant showed up before the deadline
    NoShow,
    AdminDecision,
    /// Anchor settled by its series
    Series,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Reported => "reported",
            Resolution::AutoConfirmed => "auto_confirmed",
            Resolution::Forfeit => "forfeit",
            Resolution::Walkover => "walkover",
            Resolution::DoubleForfeit => "double_forfeit",
            Resolution::NoShow => "no_show",
            Resolution::AdminDecision => "admin_decision",
            Resolution::Series => "series",
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reported" => Ok(Resolution::Reported),
            "auto_confirmed" => Ok(Resolution::AutoConfirmed),
            "forfeit" => Ok(Resolution::Forfeit),
            "walkover" => Ok(Resolution::Walkover),
            "double_forfeit" => Ok(Resolution::DoubleForfeit),
            "no_show" => Ok(Resolution::NoShow),
            "admin_decision" => Ok(Resolution::AdminDecision),
            "series" => Ok(Resolution::Series),
            other => Err(format!("unknown resolution '{other}'")),
        }
    }
}

/// Winner and loser of a settled match. `None` means the side was voided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub winner: Option<ParticipantId>,
    pub loser: Option<ParticipantId>,
}

/// A match record. Bracket nodes and series games share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub round_number: u32,
    pub bracket_type: BracketType,
    /// 1-based position within its round
    pub bracket_position: u32,
    pub participant1: Slot,
    pub participant2: Slot,
    pub participant1_score: Option<i32>,
    pub participant2_score: Option<i32>,
    pub status: MatchStatus,
    pub winner_id: Option<ParticipantId>,
    pub reported_by_user_id: Option<UserId>,
    pub confirmed_by_user_id: Option<UserId>,
    pub reported_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub auto_confirm_at: Option<DateTime<Utc>>,
    pub warn_at: Option<DateTime<Utc>>,
    pub warning_sent_at: Option<DateTime<Utc>>,
    pub auto_verified: bool,
    pub evidence_url: Option<String>,
    pub next_match: Option<Feed>,
    pub loser_next_match: Option<Feed>,
    pub best_of: u32,
    pub series_id: Option<SeriesId>,
    /// Set on series games only
    pub game_number: Option<u32>,
    pub ready_at: Option<DateTime<Utc>>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub live_at: Option<DateTime<Utc>>,
    pub resolution: Option<Resolution>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Admin who resolved the match; `None` with a resolution means the system did
    pub resolved_by: Option<UserId>,
    pub advanced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub version: i64,
}

impl Match {
    /// Blank bracket node with pending slots
    pub fn new(
        id: MatchId,
        tournament_id: TournamentId,
        bracket_type: BracketType,
        round_number: u32,
        bracket_position: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tournament_id,
            round_number,
            bracket_type,
            bracket_position,
            participant1: Slot::Pending,
            participant2: Slot::Pending,
            participant1_score: None,
            participant2_score: None,
            status: MatchStatus::Scheduled,
            winner_id: None,
            reported_by_user_id: None,
            confirmed_by_user_id: None,
            reported_at: None,
            confirmed_at: None,
            auto_confirm_at: None,
            warn_at: None,
            warning_sent_at: None,
            auto_verified: false,
            evidence_url: None,
            next_match: None,
            loser_next_match: None,
            best_of: 1,
            series_id: None,
            game_number: None,
            ready_at: None,
            deadline_at: None,
            live_at: None,
            resolution: None,
            resolved_at: None,
            resolved_by: None,
            advanced_at: None,
            created_at: now,
            version: 0,
        }
    }

    pub fn slot(&self, position: SlotPosition) -> Slot {
        match position {
            SlotPosition::Participant1 => self.participant1,
            SlotPosition::Participant2 => self.participant2,
        }
    }

    pub fn slot_mut(&mut self, position: SlotPosition) -> &mut Slot {
        match position {
            SlotPosition::Participant1 => &mut self.participant1,
            SlotPosition::Participant2 => &mut self.participant2,
        }
    }

    /// Both participants, once both slots are occupied
    pub fn participants(&self) -> Option<(ParticipantId, ParticipantId)> {
        Some((self.participant1.participant()?, self.participant2.participant()?))
    }

    pub fn side_of(&self, participant: ParticipantId) -> Option<SlotPosition> {
        if self.participant1 == Slot::Occupied(participant) {
            Some(SlotPosition::Participant1)
        } else if self.participant2 == Slot::Occupied(participant) {
            Some(SlotPosition::Participant2)
        } else {
            None
        }
    }

    pub fn involves(&self, participant: ParticipantId) -> bool {
        self.side_of(participant).is_some()
    }

    /// Game inside a series rather than a bracket node
    pub fn is_game(&self) -> bool {
        self.game_number.is_some()
    }

    pub fn is_bracket_node(&self) -> bool {
        self.game_number.is_none()
    }

    /// Bracket node played as a best-of series
    pub fn is_anchor(&self) -> bool {
        self.is_bracket_node() && self.best_of > 1
    }

    /// Neither winner nor loser goes anywhere
    pub fn is_terminal(&self) -> bool {
        self.next_match.is_none() && self.loser_next_match.is_none()
    }

    /// Winner and loser, if the match is settled
    pub fn outcome(&self) -> Option<Outcome> {
        if !self.status.is_settled() {
            return None;
        }

        let loser = match self.winner_id {
            Some(winner) => match self.side_of(winner)? {
                SlotPosition::Participant1 => self.participant2.participant(),
                SlotPosition::Participant2 => self.participant1.participant(),
            },
            None => None,
        };

        Some(Outcome {
            winner: self.winner_id,
            loser,
        })
    }

    /// Participant who did not win, if any
    pub fn loser_id(&self) -> Option<ParticipantId> {
        self.outcome().and_then(|o| o.loser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Match {
        let mut m = Match::new(1, 1, BracketType::Winners, 1, 1, Utc::now());
        m.participant1 = Slot::Occupied(10);
        m.participant2 = Slot::Occupied(20);
        m
    }

    #[test]
    fn test_status_strings() {
        for status in [
            MatchStatus::Scheduled,
            MatchStatus::Live,
            MatchStatus::AwaitingConfirmation,
            MatchStatus::Completed,
            MatchStatus::Disputed,
            MatchStatus::Forfeited,
            MatchStatus::NoContest,
            MatchStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<MatchStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_settled_statuses() {
        assert!(MatchStatus::Completed.is_settled());
        assert!(MatchStatus::Forfeited.is_settled());
        assert!(MatchStatus::NoContest.is_settled());
        assert!(!MatchStatus::Disputed.is_settled());
        assert!(!MatchStatus::Expired.is_settled());
        assert!(!MatchStatus::AwaitingConfirmation.is_settled());
    }

    #[test]
    fn test_slot_position_parity() {
        assert_eq!(SlotPosition::for_position(1), SlotPosition::Participant1);
        assert_eq!(SlotPosition::for_position(2), SlotPosition::Participant2);
        assert_eq!(SlotPosition::for_position(7), SlotPosition::Participant1);
        assert_eq!(SlotPosition::from_number(2), Some(SlotPosition::Participant2));
        assert_eq!(SlotPosition::from_number(3), None);
    }

    #[test]
    fn test_outcome_only_when_settled() {
        let mut m = sample();
        m.winner_id = Some(20);
        assert!(m.outcome().is_none());

        m.status = MatchStatus::Completed;
        let outcome = m.outcome().unwrap();
        assert_eq!(outcome.winner, Some(20));
        assert_eq!(outcome.loser, Some(10));
    }

    #[test]
    fn test_void_outcome() {
        let mut m = sample();
        m.status = MatchStatus::NoContest;
        let outcome = m.outcome().unwrap();
        assert_eq!(outcome.winner, None);
        assert_eq!(outcome.loser, None);
    }

    #[test]
    fn test_slot_serialization() {
        let json = serde_json::to_value(Slot::Occupied(5)).unwrap();
        assert_eq!(json["state"], "occupied");
        assert_eq!(json["participant_id"], 5);
    }
}
