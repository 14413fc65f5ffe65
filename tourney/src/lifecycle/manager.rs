//! Match operations for participants, admins and the timeout sweep.

use super::dispute::{Dispute, DisputeId};
use super::state_machine::{MatchAction, Transition};
use crate::advancement;
use crate::bracket::{Match, MatchId, Slot};
use crate::config::EngineConfig;
use crate::engine::EngineContext;
use crate::errors::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::session::{IdMap, TournamentSession};
use crate::tournament::{ParticipantId, TournamentId, UserId};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;

/// Match reporting, confirmation, disputes and admin actions
#[derive(Clone)]
pub struct MatchLifecycle {
    ctx: Arc<EngineContext>,
}

impl MatchLifecycle {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub async fn get_match(&self, match_id: MatchId) -> EngineResult<Match> {
        self.ctx
            .store
            .get_match(match_id)
            .await?
            .ok_or_else(|| EngineError::not_found("match", match_id))
    }

    /// Bracket nodes and series games, in bracket order
    pub async fn list_matches(&self, tournament_id: TournamentId) -> EngineResult<Vec<Match>> {
        let mut matches = self.ctx.store.list_matches(tournament_id).await?;
        matches.sort_by_key(|m| {
            (
                m.bracket_type,
                m.round_number,
                m.bracket_position,
                m.game_number,
            )
        });
        Ok(matches)
    }

    pub async fn get_dispute(&self, dispute_id: DisputeId) -> EngineResult<Dispute> {
        self.ctx
            .store
            .get_dispute(dispute_id)
            .await?
            .ok_or_else(|| EngineError::not_found("dispute", dispute_id))
    }

    pub async fn list_disputes(&self, tournament_id: TournamentId) -> EngineResult<Vec<Dispute>> {
        Ok(self.ctx.store.list_disputes(tournament_id).await?)
    }

    /// A participant signals the match is being played
    pub async fn mark_live(&self, match_id: MatchId, user_id: UserId) -> EngineResult<Match> {
        let now = Utc::now();
        let config = &self.ctx.config;

        self.act(match_id, |session| {
            let participant = participant_of(session, user_id)?;
            let m = session.match_mut(match_id)?;
            if !m.involves(participant) {
                return Err(EngineError::Policy(format!(
                    "only participants of match {match_id} may do that"
                )));
            }
            m.apply(MatchAction::MarkLive, now, config)?;
            info!("Match {match_id} is live");
            Ok(())
        })
        .await?;

        self.get_match(match_id).await
    }

    /// Report a result. The opponent confirms or contests it.
    pub async fn report(
        &self,
        match_id: MatchId,
        user_id: UserId,
        participant1_score: i32,
        participant2_score: i32,
        evidence_url: Option<String>,
    ) -> EngineResult<Match> {
        let now = Utc::now();
        let config = &self.ctx.config;

        self.act(match_id, |session| {
            let reporter = participant_of(session, user_id)?;
            let m = session.match_mut(match_id)?;
            m.apply(
                MatchAction::Report {
                    reporter,
                    reporter_user: user_id,
                    participant1_score,
                    participant2_score,
                    evidence_url: evidence_url.clone(),
                },
                now,
                config,
            )?;

            let opponent_id = match m.participant1 {
                Slot::Occupied(id) if id != reporter => id,
                _ => m.participant2.participant().unwrap_or(reporter),
            };
            let event = EngineEvent::MatchAwaitingConfirmation {
                tournament_id: m.tournament_id,
                match_id,
                reported_by: user_id,
                opponent_id,
                auto_confirm_at: m.auto_confirm_at.unwrap_or(now + config.grace_window),
            };
            session.emit(event);
            info!(
                "Match {match_id} reported {participant1_score}-{participant2_score} by user {user_id}"
            );
            Ok(())
        })
        .await?;

        self.get_match(match_id).await
    }

    /// The opponent accepts the reported result
    pub async fn confirm(&self, match_id: MatchId, user_id: UserId) -> EngineResult<Match> {
        let now = Utc::now();
        let config = &self.ctx.config;

        self.act(match_id, |session| {
            let confirmer = participant_of(session, user_id)?;
            session.match_mut(match_id)?.apply(
                MatchAction::Confirm {
                    confirmer,
                    confirmer_user: user_id,
                },
                now,
                config,
            )?;
            info!("Match {match_id} confirmed by user {user_id}");
            finish_settle(session, match_id, now, config)
        })
        .await?;

        self.get_match(match_id).await
    }

    /// The opponent rejects the reported result and opens a dispute.
    ///
    /// Only possible inside the grace window; once the result is confirmed or
    /// auto-confirmed a late contest is stale.
    pub async fn contest(
        &self,
        match_id: MatchId,
        user_id: UserId,
        reason: &str,
        evidence_url: Option<String>,
    ) -> EngineResult<Dispute> {
        let now = Utc::now();
        let config = &self.ctx.config;

        let (dispute_id, ids) = self
            .act(match_id, |session| {
                let contester = participant_of(session, user_id)?;
                if session.open_dispute_for(match_id).is_some() {
                    return Err(EngineError::Policy(format!(
                        "match {match_id} already has an open dispute"
                    )));
                }

                let m = session.get_match(match_id)?;
                let tournament_id = m.tournament_id;
                session.match_mut(match_id)?.apply(
                    MatchAction::Contest {
                        contester,
                        contester_user: user_id,
                    },
                    now,
                    config,
                )?;

                let dispute_id = session.provisional_id();
                let dispute = Dispute::open(
                    dispute_id,
                    tournament_id,
                    match_id,
                    user_id,
                    reason,
                    evidence_url.clone(),
                    now,
                )?;
                session.insert_dispute(dispute);
                session.emit(EngineEvent::MatchDisputed {
                    tournament_id,
                    match_id,
                    dispute_id,
                    raised_by: user_id,
                });
                warn!("Match {match_id} disputed by user {user_id}");
                Ok(dispute_id)
            })
            .await?;

        self.get_dispute(ids.resolve(dispute_id)).await
    }

    /// Admin forfeit with a declared winner
    pub async fn forfeit(
        &self,
        match_id: MatchId,
        winner: ParticipantId,
        admin: UserId,
    ) -> EngineResult<Match> {
        let now = Utc::now();
        let config = &self.ctx.config;

        self.act(match_id, |session| {
            session
                .match_mut(match_id)?
                .apply(MatchAction::Forfeit { winner, admin }, now, config)?;
            info!("Match {match_id} forfeited to participant {winner} by admin {admin}");
            finish_settle(session, match_id, now, config)
        })
        .await?;

        self.get_match(match_id).await
    }

    /// Give an expired match a fresh deadline
    pub async fn reopen(&self, match_id: MatchId, admin: UserId) -> EngineResult<Match> {
        let now = Utc::now();
        let config = &self.ctx.config;

        self.act(match_id, |session| {
            session
                .match_mut(match_id)?
                .apply(MatchAction::Reopen, now, config)?;
            info!("Match {match_id} reopened by admin {admin}");
            Ok(())
        })
        .await?;

        self.get_match(match_id).await
    }

    /// Mark a dispute as picked up by an admin
    pub async fn review_dispute(&self, dispute_id: DisputeId) -> EngineResult<Dispute> {
        let dispute = self.get_dispute(dispute_id).await?;

        self.ctx
            .transact(dispute.tournament_id, |session| {
                session.dispute_mut(dispute_id)?.begin_review()
            })
            .await?;

        self.get_dispute(dispute_id).await
    }

    /// Settle a disputed match with the adjudicated winner
    pub async fn resolve_dispute(
        &self,
        dispute_id: DisputeId,
        admin: UserId,
        winner: ParticipantId,
        scores: Option<(i32, i32)>,
        details: Option<String>,
    ) -> EngineResult<Match> {
        let dispute = self.get_dispute(dispute_id).await?;
        let match_id = dispute.match_id;
        let now = Utc::now();
        let config = &self.ctx.config;

        self.ctx
            .transact(dispute.tournament_id, |session| {
                if !session.dispute(dispute_id)?.is_unresolved() {
                    return Err(EngineError::stale("dispute", dispute_id, "already resolved"));
                }
                session.match_mut(match_id)?.apply(
                    MatchAction::ResolveDispute {
                        winner,
                        scores,
                        admin,
                    },
                    now,
                    config,
                )?;
                session
                    .dispute_mut(dispute_id)?
                    .resolve(admin, details.clone(), now)?;

                let tournament_id = session.tournament().id;
                session.emit(EngineEvent::DisputeResolved {
                    tournament_id,
                    match_id,
                    dispute_id,
                    winner_id: winner,
                });
                info!("Dispute {dispute_id} resolved by admin {admin} for participant {winner}");
                finish_settle(session, match_id, now, config)
            })
            .await?;

        self.get_match(match_id).await
    }

    /// Confirm a reported result whose grace window has passed
    pub async fn auto_confirm(
        &self,
        match_id: MatchId,
        now: DateTime<Utc>,
    ) -> EngineResult<Transition> {
        let config = &self.ctx.config;

        let (transition, _) = self
            .act(match_id, |session| {
                let transition =
                    session
                        .match_mut(match_id)?
                        .apply(MatchAction::AutoConfirm, now, config)?;
                info!("Match {match_id} auto-confirmed");
                finish_settle(session, match_id, now, config)?;
                Ok(transition)
            })
            .await?;

        Ok(transition)
    }

    /// Remind the opponent that the result is about to auto-confirm
    pub async fn send_warning(
        &self,
        match_id: MatchId,
        now: DateTime<Utc>,
    ) -> EngineResult<Transition> {
        let config = &self.ctx.config;

        let (transition, _) = self
            .act(match_id, |session| {
                let m = session.match_mut(match_id)?;
                let transition = m.apply(MatchAction::Warn, now, config)?;
                let event = EngineEvent::MatchWarning {
                    tournament_id: m.tournament_id,
                    match_id,
                    auto_confirm_at: m.auto_confirm_at.unwrap_or(now),
                };
                session.emit(event);
                Ok(transition)
            })
            .await?;

        Ok(transition)
    }

    /// Apply the expiry policy to a match past its deadline
    pub async fn expire(&self, match_id: MatchId, now: DateTime<Utc>) -> EngineResult<Transition> {
        let config = &self.ctx.config;

        let (transition, _) = self
            .act(match_id, |session| {
                let m = session.get_match(match_id)?;
                let checked_in = (
                    is_checked_in(session, m.participant1),
                    is_checked_in(session, m.participant2),
                );
                let tournament_id = m.tournament_id;

                let transition = session.match_mut(match_id)?.apply(
                    MatchAction::Expire {
                        policy: config.expiry_policy,
                        checked_in,
                    },
                    now,
                    config,
                )?;

                match transition {
                    Transition::Settled => {
                        info!(
                            "Match {match_id} passed its deadline, settled under {}",
                            config.expiry_policy
                        );
                        finish_settle(session, match_id, now, config)?;
                    }
                    _ => {
                        warn!("Match {match_id} expired and awaits an admin");
                        session.emit(EngineEvent::MatchExpired {
                            tournament_id,
                            match_id,
                        });
                    }
                }
                Ok(transition)
            })
            .await?;

        Ok(transition)
    }

    async fn act<T, F>(&self, match_id: MatchId, op: F) -> EngineResult<(T, IdMap)>
    where
        F: FnMut(&mut TournamentSession) -> EngineResult<T>,
    {
        let m = self.get_match(match_id).await?;
        self.ctx.transact(m.tournament_id, op).await
    }
}

fn participant_of(session: &TournamentSession, user_id: UserId) -> EngineResult<ParticipantId> {
    session
        .participant_by_user(user_id)
        .map(|p| p.id)
        .ok_or_else(|| {
            EngineError::Policy(format!(
                "user {user_id} is not in tournament {}",
                session.tournament().id
            ))
        })
}

fn is_checked_in(session: &TournamentSession, slot: Slot) -> bool {
    slot.participant()
        .and_then(|id| session.participant(id).ok())
        .is_some_and(|p| p.checked_in)
}

/// Announce a settled match and push it through the bracket
fn finish_settle(
    session: &mut TournamentSession,
    match_id: MatchId,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<()> {
    let m = session.get_match(match_id)?;
    let event = EngineEvent::MatchCompleted {
        tournament_id: m.tournament_id,
        match_id,
        winner_id: m.winner_id,
        auto_verified: m.auto_verified,
    };
    session.emit(event);
    advancement::settle(session, match_id, now, config)
}
