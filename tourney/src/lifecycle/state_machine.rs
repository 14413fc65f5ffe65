//! Match state machine.
//!
//! Every status change of a match goes through [`Match::apply`]. A
//! (status, action) pair that is not a legal transition is reported as
//! [`EngineError::StaleState`]: from the caller's point of view the match has
//! already moved on. Policy checks (who may act, whether a deadline is due)
//! happen here too so the sweep and the API share one set of rules.

use crate::bracket::{Match, MatchStatus, Resolution, Slot, SlotPosition};
use crate::config::{EngineConfig, ExpiryPolicy};
use crate::errors::{EngineError, EngineResult};
use crate::tournament::{ParticipantId, UserId};
use chrono::{DateTime, Utc};

/// Requested transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchAction {
    MarkLive,
    Report {
        reporter: ParticipantId,
        reporter_user: UserId,
        participant1_score: i32,
        participant2_score: i32,
        evidence_url: Option<String>,
    },
    Confirm {
        confirmer: ParticipantId,
        confirmer_user: UserId,
    },
    Contest {
        contester: ParticipantId,
        contester_user: UserId,
    },
    AutoConfirm,
    Warn,
    Expire {
        policy: ExpiryPolicy,
        /// Check-in flags of participant 1 and 2
        checked_in: (bool, bool),
    },
    Forfeit {
        winner: ParticipantId,
        admin: UserId,
    },
    Reopen,
    ResolveDispute {
        winner: ParticipantId,
        scores: Option<(i32, i32)>,
        admin: UserId,
    },
    /// Opponent slot voided upstream; `None` when both were
    Walkover { winner: Option<ParticipantId> },
    SeriesDecided {
        winner: Option<ParticipantId>,
        participant1_wins: u32,
        participant2_wins: u32,
    },
}

impl MatchAction {
    pub fn name(&self) -> &'static str {
        match self {
            MatchAction::MarkLive => "mark live",
            MatchAction::Report { .. } => "report",
            MatchAction::Confirm { .. } => "confirm",
            MatchAction::Contest { .. } => "contest",
            MatchAction::AutoConfirm => "auto-confirm",
            MatchAction::Warn => "warn",
            MatchAction::Expire { .. } => "expire",
            MatchAction::Forfeit { .. } => "forfeit",
            MatchAction::Reopen => "reopen",
            MatchAction::ResolveDispute { .. } => "resolve",
            MatchAction::Walkover { .. } => "walk over",
            MatchAction::SeriesDecided { .. } => "settle series on",
        }
    }
}

/// What a successful [`Match::apply`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Live,
    AwaitingConfirmation,
    /// Reached Completed, Forfeited or NoContest; advancement should run
    Settled,
    Disputed,
    Warned,
    Expired,
    Reopened,
}

impl Match {
    /// Apply `action` at time `now`
    pub fn apply(
        &mut self,
        action: MatchAction,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> EngineResult<Transition> {
        use MatchStatus::*;

        match (self.status, action) {
            (Scheduled, MatchAction::MarkLive) => {
                self.require_playable()?;
                self.status = Live;
                self.live_at = Some(now);
                self.deadline_at = Some(now + config.live_report_window);
                Ok(Transition::Live)
            }

            (
                Scheduled | Live,
                MatchAction::Report {
                    reporter,
                    reporter_user,
                    participant1_score,
                    participant2_score,
                    evidence_url,
                },
            ) => {
                self.require_playable()?;
                self.require_participant(reporter)?;
                let winner = self.winner_from_scores(participant1_score, participant2_score)?;

                self.participant1_score = Some(participant1_score);
                self.participant2_score = Some(participant2_score);
                self.winner_id = Some(winner);
                self.reported_by_user_id = Some(reporter_user);
                self.reported_at = Some(now);
                self.evidence_url = evidence_url;
                self.auto_confirm_at = Some(now + config.grace_window);
                self.warn_at = Some(now + config.warning_offset());
                self.warning_sent_at = None;
                self.status = AwaitingConfirmation;
                Ok(Transition::AwaitingConfirmation)
            }

            (
                AwaitingConfirmation,
                MatchAction::Confirm {
                    confirmer,
                    confirmer_user,
                },
            ) => {
                self.require_participant(confirmer)?;
                if self.reported_by_user_id == Some(confirmer_user) {
                    return Err(EngineError::Policy(
                        "the reporter cannot confirm their own result".to_string(),
                    ));
                }

                self.confirmed_by_user_id = Some(confirmer_user);
                self.confirmed_at = Some(now);
                self.auto_verified = false;
                self.settle(Completed, Resolution::Reported, None, now);
                Ok(Transition::Settled)
            }

            (
                AwaitingConfirmation,
                MatchAction::Contest {
                    contester,
                    contester_user,
                },
            ) => {
                self.require_opponent_of_reporter(contester, contester_user)?;
                self.status = Disputed;
                Ok(Transition::Disputed)
            }

            (AwaitingConfirmation, MatchAction::AutoConfirm) => {
                match self.auto_confirm_at {
                    Some(due) if due <= now => {}
                    _ => {
                        return Err(EngineError::Policy(format!(
                            "match {} is not due for auto-confirmation",
                            self.id
                        )));
                    }
                }

                self.confirmed_at = Some(now);
                self.auto_verified = true;
                self.settle(Completed, Resolution::AutoConfirmed, None, now);
                Ok(Transition::Settled)
            }

            (AwaitingConfirmation, MatchAction::Warn) => {
                if self.warning_sent_at.is_some() {
                    return Err(EngineError::stale("match", self.id, "warning already sent"));
                }
                match self.warn_at {
                    Some(due) if due <= now => {}
                    _ => {
                        return Err(EngineError::Policy(format!(
                            "match {} is not due for a warning",
                            self.id
                        )));
                    }
                }

                self.warning_sent_at = Some(now);
                Ok(Transition::Warned)
            }

            (Scheduled | Live, MatchAction::Expire { policy, checked_in }) => {
                self.require_playable()?;
                match self.deadline_at {
                    Some(deadline) if deadline <= now => {}
                    _ => {
                        return Err(EngineError::Policy(format!(
                            "match {} has not reached its deadline",
                            self.id
                        )));
                    }
                }

                let present = match checked_in {
                    (true, false) => self.participant1.participant(),
                    (false, true) => self.participant2.participant(),
                    _ => None,
                };

                match (policy, present) {
                    (ExpiryPolicy::DoubleForfeit, _) => {
                        self.winner_id = None;
                        self.settle(NoContest, Resolution::DoubleForfeit, None, now);
                        Ok(Transition::Settled)
                    }
                    (ExpiryPolicy::ForfeitAbsent, Some(winner)) => {
                        self.winner_id = Some(winner);
                        self.settle(Forfeited, Resolution::NoShow, None, now);
                        Ok(Transition::Settled)
                    }
                    (ExpiryPolicy::ForfeitAbsent, None) | (ExpiryPolicy::HoldForAdmin, _) => {
                        self.status = Expired;
                        self.resolved_at = Some(now);
                        Ok(Transition::Expired)
                    }
                }
            }

            (
                Scheduled | Live | AwaitingConfirmation | Expired,
                MatchAction::Forfeit { winner, admin },
            ) => {
                if self.is_anchor() && self.series_id.is_some() {
                    return Err(EngineError::Policy(
                        "forfeit a game of the series instead of the series match".to_string(),
                    ));
                }
                self.require_playable()?;
                if !self.involves(winner) {
                    return Err(EngineError::Validation(format!(
                        "participant {winner} is not in match {}",
                        self.id
                    )));
                }

                self.winner_id = Some(winner);
                self.settle(Forfeited, Resolution::Forfeit, Some(admin), now);
                Ok(Transition::Settled)
            }

            (Expired, MatchAction::Reopen) => {
                self.status = Scheduled;
                self.live_at = None;
                self.resolved_at = None;
                self.deadline_at = Some(now + config.no_show_window);
                Ok(Transition::Reopened)
            }

            (
                Disputed,
                MatchAction::ResolveDispute {
                    winner,
                    scores,
                    admin,
                },
            ) => {
                if !self.involves(winner) {
                    return Err(EngineError::Validation(format!(
                        "participant {winner} is not in match {}",
                        self.id
                    )));
                }
                if let Some((s1, s2)) = scores {
                    if self.winner_from_scores(s1, s2)? != winner {
                        return Err(EngineError::Validation(
                            "scores do not match the chosen winner".to_string(),
                        ));
                    }
                    self.participant1_score = Some(s1);
                    self.participant2_score = Some(s2);
                }

                self.winner_id = Some(winner);
                self.auto_verified = false;
                self.settle(Completed, Resolution::AdminDecision, Some(admin), now);
                Ok(Transition::Settled)
            }

            (Scheduled, MatchAction::Walkover { winner }) => {
                match winner {
                    Some(winner) => {
                        if !self.involves(winner) {
                            return Err(EngineError::Integrity(format!(
                                "walkover winner {winner} is not in match {}",
                                self.id
                            )));
                        }
                        self.winner_id = Some(winner);
                        self.settle(Forfeited, Resolution::Walkover, None, now);
                    }
                    None => {
                        self.winner_id = None;
                        self.settle(NoContest, Resolution::DoubleForfeit, None, now);
                    }
                }
                Ok(Transition::Settled)
            }

            (
                Scheduled,
                MatchAction::SeriesDecided {
                    winner,
                    participant1_wins,
                    participant2_wins,
                },
            ) => {
                if !self.is_anchor() {
                    return Err(EngineError::Integrity(format!(
                        "match {} is not played as a series",
                        self.id
                    )));
                }

                self.participant1_score = Some(participant1_wins as i32);
                self.participant2_score = Some(participant2_wins as i32);
                self.winner_id = winner;
                match winner {
                    Some(_) => self.settle(Completed, Resolution::Series, None, now),
                    None => self.settle(NoContest, Resolution::Series, None, now),
                }
                Ok(Transition::Settled)
            }

            (status, action) => Err(EngineError::stale(
                "match",
                self.id,
                format!("cannot {} a {} match", action.name(), status),
            )),
        }
    }

    fn settle(
        &mut self,
        status: MatchStatus,
        resolution: Resolution,
        admin: Option<UserId>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.resolution = Some(resolution);
        self.resolved_by = admin;
        self.resolved_at = Some(now);
    }

    /// Both slots occupied and not played as a series
    fn require_playable(&self) -> EngineResult<()> {
        if self.is_anchor() {
            return Err(EngineError::Policy(format!(
                "match {} is played as a best-of-{} series",
                self.id, self.best_of
            )));
        }
        if !matches!(
            (self.participant1, self.participant2),
            (Slot::Occupied(_), Slot::Occupied(_))
        ) {
            return Err(EngineError::Policy(format!(
                "match {} is still waiting for its participants",
                self.id
            )));
        }
        Ok(())
    }

    fn require_participant(&self, participant: ParticipantId) -> EngineResult<SlotPosition> {
        self.side_of(participant).ok_or_else(|| {
            EngineError::Policy(format!("only participants of match {} may do that", self.id))
        })
    }

    fn require_opponent_of_reporter(
        &self,
        participant: ParticipantId,
        user: UserId,
    ) -> EngineResult<()> {
        self.require_participant(participant)?;
        if self.reported_by_user_id == Some(user) {
            return Err(EngineError::Policy(
                "the reporter cannot contest their own result".to_string(),
            ));
        }
        Ok(())
    }

    fn winner_from_scores(&self, s1: i32, s2: i32) -> EngineResult<ParticipantId> {
        if s1 < 0 || s2 < 0 {
            return Err(EngineError::Validation("scores cannot be negative".to_string()));
        }
        let side = match s1.cmp(&s2) {
            std::cmp::Ordering::Greater => SlotPosition::Participant1,
            std::cmp::Ordering::Less => SlotPosition::Participant2,
            std::cmp::Ordering::Equal => {
                return Err(EngineError::Validation(
                    "tied scores cannot be reported".to_string(),
                ));
            }
        };
        self.slot(side).participant().ok_or_else(|| {
            EngineError::Policy(format!(
                "match {} is still waiting for its participants",
                self.id
            ))
        })
    }
}
