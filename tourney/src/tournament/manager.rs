//! Tournament orchestration: registration, seeding, start, progress and
//! completion.

use super::models::{
    NewTournament, Participant, ParticipantId, PrizeEntry, Standing, Tournament, TournamentId,
    TournamentStatus, UserId,
};
use super::payouts;
use super::prize::PrizeCalculator;
use crate::advancement;
use crate::bracket::{BracketGenerator, Feed, Match, MatchId, Slot, compute_standings};
use crate::config::EngineConfig;
use crate::engine::EngineContext;
use crate::errors::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::ledger::{entry_key, entry_reversal_key, refund_key};
use crate::session::TournamentSession;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use uuid::Uuid;

/// Tournament-level operations
#[derive(Clone)]
pub struct TournamentOrchestrator {
    ctx: Arc<EngineContext>,
}

impl TournamentOrchestrator {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Create an open tournament
    pub async fn create(&self, new: NewTournament) -> EngineResult<Tournament> {
        validate_new(&new)?;

        let tournament = self.ctx.store.create_tournament(new, Utc::now()).await?;
        info!(
            "Created {} tournament {} '{}' with {} slots",
            tournament.format, tournament.id, tournament.name, tournament.total_slots
        );
        Ok(tournament)
    }

    pub async fn get(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        self.ctx
            .store
            .get_tournament(tournament_id)
            .await?
            .ok_or_else(|| EngineError::not_found("tournament", tournament_id))
    }

    /// Participants in join order
    pub async fn participants(&self, tournament_id: TournamentId) -> EngineResult<Vec<Participant>> {
        self.get(tournament_id).await?;
        let mut participants = self.ctx.store.list_participants(tournament_id).await?;
        participants.sort_by_key(|p| (p.joined_at, p.id));
        Ok(participants)
    }

    /// Current standings. Final once the tournament is completed.
    pub async fn standings(&self, tournament_id: TournamentId) -> EngineResult<Vec<Standing>> {
        let session = TournamentSession::load(self.ctx.store.as_ref(), tournament_id).await?;
        let participants: Vec<Participant> = session.participants().cloned().collect();
        let matches: Vec<Match> = session.matches().cloned().collect();
        Ok(compute_standings(
            session.tournament().format,
            &participants,
            &matches,
        ))
    }

    /// Register a user and collect the entry fee
    pub async fn join(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
        gamer_tag: &str,
    ) -> EngineResult<Participant> {
        let gamer_tag = gamer_tag.trim();
        if gamer_tag.is_empty() {
            return Err(EngineError::Validation(
                "gamer tag cannot be empty".to_string(),
            ));
        }

        let tournament = self.get(tournament_id).await?;
        check_joinable(&tournament)?;
        if self
            .ctx
            .store
            .find_participant(tournament_id, user_id)
            .await?
            .is_some()
        {
            return Err(already_registered(user_id, tournament_id));
        }

        let fee = tournament.entry_fee;
        let key = entry_key(tournament_id, user_id, &Uuid::new_v4().to_string());
        if fee > 0 {
            match self.ctx.ledger.debit(user_id, fee, &key).await {
                Ok(()) => {}
                Err(e) if e.is_already_applied() => debug!("Entry fee {key} already collected"),
                Err(e) => return Err(e.into()),
            }
        }

        let now = Utc::now();
        let joined = self
            .ctx
            .transact(tournament_id, |session| {
                check_joinable(session.tournament())?;
                if session.participant_by_user(user_id).is_some() {
                    return Err(already_registered(user_id, tournament_id));
                }

                let id = session.provisional_id();
                session.insert_participant(Participant {
                    id,
                    tournament_id,
                    user_id,
                    gamer_tag: gamer_tag.to_string(),
                    seed: None,
                    checked_in: false,
                    final_standing: None,
                    payout_amount: None,
                    payout_paid_at: None,
                    refunded_at: None,
                    joined_at: now,
                    version: 0,
                });
                session.tournament_mut().current_slots += 1;
                Ok(())
            })
            .await;

        if let Err(e) = joined {
            if fee > 0 {
                let reversal = entry_reversal_key(&key);
                match self.ctx.ledger.credit(user_id, fee, &reversal).await {
                    Ok(()) => info!("Reversed entry fee of user {user_id} after failed join"),
                    Err(credit_err) if credit_err.is_already_applied() => {}
                    Err(credit_err) => error!(
                        "Could not reverse entry fee {key} for user {user_id}: {credit_err}"
                    ),
                }
            }
            return Err(e);
        }

        let participant = self
            .ctx
            .store
            .find_participant(tournament_id, user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("participant", user_id))?;
        info!(
            "User {user_id} joined tournament {tournament_id} as '{}'",
            participant.gamer_tag
        );
        Ok(participant)
    }

    /// Withdraw before the tournament locks and refund the entry fee
    pub async fn leave(&self, tournament_id: TournamentId, user_id: UserId) -> EngineResult<()> {
        let (left, _) = self
            .ctx
            .transact(tournament_id, |session| {
                if session.tournament().status != TournamentStatus::Open {
                    return Err(EngineError::Policy(format!(
                        "tournament {tournament_id} no longer accepts withdrawals"
                    )));
                }
                let id = session
                    .participant_by_user(user_id)
                    .map(|p| p.id)
                    .ok_or_else(|| EngineError::not_found("participant", user_id))?;
                let participant = session.remove_participant(id)?;

                let tournament = session.tournament_mut();
                tournament.current_slots = tournament.current_slots.saturating_sub(1);
                Ok((participant, tournament.entry_fee))
            })
            .await?;
        let (participant, fee) = left;

        if fee > 0 {
            let key = refund_key(tournament_id, participant.id);
            match self.ctx.ledger.credit(user_id, fee, &key).await {
                Ok(()) => {}
                Err(e) if e.is_already_applied() => {}
                Err(e) => {
                    error!("Refund {key} of {fee} to user {user_id} failed after withdrawal: {e}");
                    return Err(e.into());
                }
            }
        }

        info!("User {user_id} left tournament {tournament_id}");
        Ok(())
    }

    pub async fn check_in(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> EngineResult<Participant> {
        self.ctx
            .transact(tournament_id, |session| {
                let status = session.tournament().status;
                if !matches!(
                    status,
                    TournamentStatus::Open | TournamentStatus::Locked | TournamentStatus::Live
                ) {
                    return Err(EngineError::Policy(format!(
                        "cannot check in to a {status} tournament"
                    )));
                }
                let id = session
                    .participant_by_user(user_id)
                    .map(|p| p.id)
                    .ok_or_else(|| EngineError::not_found("participant", user_id))?;
                if !session.participant(id)?.checked_in {
                    session.participant_mut(id)?.checked_in = true;
                }
                Ok(())
            })
            .await?;

        self.ctx
            .store
            .find_participant(tournament_id, user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("participant", user_id))
    }

    /// Pin a participant to a seed before the bracket is drawn
    pub async fn set_seed(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
        seed: u32,
    ) -> EngineResult<()> {
        self.ctx
            .transact(tournament_id, |session| {
                require_before_start(session.tournament(), "seeds")?;
                if seed == 0 || seed > session.tournament().total_slots {
                    return Err(EngineError::Validation(format!(
                        "seed must be between 1 and {}",
                        session.tournament().total_slots
                    )));
                }
                if let Some(holder) = session
                    .participants()
                    .find(|p| p.seed == Some(seed) && p.id != participant_id)
                {
                    return Err(EngineError::Validation(format!(
                        "seed {seed} is already held by participant {}",
                        holder.id
                    )));
                }
                session.participant_mut(participant_id)?.seed = Some(seed);
                Ok(())
            })
            .await?;

        info!("Participant {participant_id} seeded {seed} in tournament {tournament_id}");
        Ok(())
    }

    pub async fn update_prize_table(
        &self,
        tournament_id: TournamentId,
        prize_table: Vec<PrizeEntry>,
    ) -> EngineResult<Tournament> {
        self.ctx
            .transact(tournament_id, |session| {
                require_before_start(session.tournament(), "the prize table")?;
                PrizeCalculator::validate(&prize_table, Some(session.tournament().total_slots))?;
                session.tournament_mut().prize_table = prize_table.clone();
                Ok(())
            })
            .await?;

        self.get(tournament_id).await
    }

    /// Close registration
    pub async fn lock(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        self.ctx
            .transact(tournament_id, |session| {
                let tournament = session.tournament();
                if tournament.status != TournamentStatus::Open {
                    return Err(EngineError::stale(
                        "tournament",
                        tournament_id,
                        format!("cannot lock a {} tournament", tournament.status),
                    ));
                }
                if tournament.current_slots < 2 {
                    return Err(EngineError::Validation(format!(
                        "tournament {tournament_id} needs at least 2 participants to lock"
                    )));
                }
                session.tournament_mut().status = TournamentStatus::Locked;
                Ok(())
            })
            .await?;

        info!("Tournament {tournament_id} locked");
        self.get(tournament_id).await
    }

    /// Seed the field, draw the bracket and go live
    pub async fn start(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        let now = Utc::now();
        // Fixed per call so a retried commit draws the same shuffle
        let shuffle_seed: u64 = rand::random();
        let config = &self.ctx.config;

        let (match_count, _) = self
            .ctx
            .transact(tournament_id, |session| {
                let mut rng = StdRng::seed_from_u64(shuffle_seed);
                start_session(session, now, &mut rng, config)
            })
            .await?;

        info!("Tournament {tournament_id} started with {match_count} matches");
        self.get(tournament_id).await
    }

    /// Cancel before start. Entry fees are refunded after the commit.
    pub async fn cancel(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        self.ctx
            .transact(tournament_id, |session| {
                match session.tournament().status {
                    TournamentStatus::Open | TournamentStatus::Locked => {}
                    TournamentStatus::Cancelled => {
                        return Err(EngineError::stale(
                            "tournament",
                            tournament_id,
                            "already cancelled",
                        ));
                    }
                    status => {
                        return Err(EngineError::Policy(format!(
                            "a {status} tournament cannot be cancelled"
                        )));
                    }
                }
                session.tournament_mut().status = TournamentStatus::Cancelled;
                session.emit(EngineEvent::TournamentCancelled { tournament_id });
                Ok(())
            })
            .await?;

        warn!("Tournament {tournament_id} cancelled");
        self.get(tournament_id).await
    }

    /// Pay unpaid prizes or refunds of one tournament. Returns the number
    /// of participants settled.
    pub async fn disburse(&self, tournament_id: TournamentId) -> EngineResult<usize> {
        payouts::disburse(&self.ctx, tournament_id).await
    }

    /// [`TournamentOrchestrator::disburse`] for every tournament with money outstanding
    pub async fn disburse_pending(&self) -> EngineResult<usize> {
        payouts::disburse_pending(&self.ctx).await
    }
}

fn validate_new(new: &NewTournament) -> EngineResult<()> {
    if new.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "tournament name cannot be empty".to_string(),
        ));
    }
    if new.total_slots < 2 {
        return Err(EngineError::Validation(format!(
            "a tournament needs at least 2 slots, got {}",
            new.total_slots
        )));
    }
    if new.entry_fee < 0 {
        return Err(EngineError::Validation(format!(
            "entry fee cannot be negative, got {}",
            new.entry_fee
        )));
    }
    PrizeCalculator::validate(&new.prize_table, Some(new.total_slots))?;
    new.settings.validate()
}

fn check_joinable(tournament: &Tournament) -> EngineResult<()> {
    if tournament.status != TournamentStatus::Open {
        return Err(EngineError::Policy(format!(
            "tournament {} is {} and not accepting entries",
            tournament.id, tournament.status
        )));
    }
    if tournament.is_full() {
        return Err(EngineError::Policy(format!(
            "tournament {} is full",
            tournament.id
        )));
    }
    Ok(())
}

fn already_registered(user_id: UserId, tournament_id: TournamentId) -> EngineError {
    EngineError::Policy(format!(
        "user {user_id} is already registered for tournament {tournament_id}"
    ))
}

fn require_before_start(tournament: &Tournament, what: &str) -> EngineResult<()> {
    match tournament.status {
        TournamentStatus::Open | TournamentStatus::Locked => Ok(()),
        status => Err(EngineError::Policy(format!(
            "{what} cannot change once the tournament is {status}"
        ))),
    }
}

fn start_session(
    session: &mut TournamentSession,
    now: DateTime<Utc>,
    rng: &mut StdRng,
    config: &EngineConfig,
) -> EngineResult<usize> {
    let tournament = session.tournament();
    let tournament_id = tournament.id;
    let count = tournament.current_slots;

    match tournament.status {
        TournamentStatus::Locked => {}
        TournamentStatus::Open if count >= 2 => {}
        TournamentStatus::Open => {
            return Err(EngineError::Validation(format!(
                "tournament {tournament_id} needs at least 2 participants to start"
            )));
        }
        status => {
            return Err(EngineError::stale(
                "tournament",
                tournament_id,
                format!("cannot start a {status} tournament"),
            ));
        }
    }

    let order = seed_order(session, tournament.settings.shuffle_seeds, rng);
    if order.len() < 2 {
        return Err(EngineError::Validation(format!(
            "tournament {tournament_id} needs at least 2 participants to start"
        )));
    }
    PrizeCalculator::validate(&tournament.prize_table, Some(order.len() as u32))?;

    let plan = BracketGenerator::generate(tournament.format, &order, &tournament.settings)?;

    for (i, participant_id) in order.iter().enumerate() {
        let seed = i as u32 + 1;
        if session.participant(*participant_id)?.seed != Some(seed) {
            session.participant_mut(*participant_id)?.seed = Some(seed);
        }
    }

    let ids: Vec<MatchId> = plan.matches.iter().map(|_| session.provisional_id()).collect();
    let mut ready = Vec::new();
    for (planned, id) in plan.matches.iter().zip(&ids) {
        let mut m = Match::new(
            *id,
            tournament_id,
            planned.bracket_type,
            planned.round_number,
            planned.bracket_position,
            now,
        );
        m.participant1 = planned
            .participant1
            .participant()
            .map_or(Slot::Pending, Slot::Occupied);
        m.participant2 = planned
            .participant2
            .participant()
            .map_or(Slot::Pending, Slot::Occupied);
        m.next_match = planned.next.map(|feed| Feed {
            match_id: ids[feed.index],
            slot: feed.slot,
        });
        m.loser_next_match = planned.loser_next.map(|feed| Feed {
            match_id: ids[feed.index],
            slot: feed.slot,
        });
        m.best_of = planned.best_of;

        if planned.is_ready() {
            ready.push(*id);
        }
        session.insert_match(m);
    }

    for id in ready {
        advancement::make_ready(session, id, now, config)?;
    }

    let tournament = session.tournament_mut();
    tournament.status = TournamentStatus::Live;
    tournament.current_round = 1;
    tournament.started_at = Some(now);
    session.emit(EngineEvent::TournamentStarted {
        tournament_id,
        match_count: plan.len(),
    });
    Ok(plan.len())
}

/// Participants in seed order: explicit seeds first, then join order
fn seed_order(session: &TournamentSession, shuffle: bool, rng: &mut StdRng) -> Vec<ParticipantId> {
    let mut seeded: Vec<&Participant> = session.participants().filter(|p| p.seed.is_some()).collect();
    seeded.sort_by_key(|p| (p.seed, p.id));

    let mut rest: Vec<&Participant> = session.participants().filter(|p| p.seed.is_none()).collect();
    rest.sort_by_key(|p| (p.joined_at, p.id));
    if shuffle {
        rest.shuffle(rng);
    }

    seeded.into_iter().chain(rest).map(|p| p.id).collect()
}

/// Recompute progress after a settle and complete the tournament when no
/// bracket match is left to play
pub(crate) fn after_settle(session: &mut TournamentSession, now: DateTime<Utc>) -> EngineResult<()> {
    if session.tournament().status != TournamentStatus::Live {
        return Ok(());
    }

    let next_round = session
        .matches()
        .filter(|m| m.is_bracket_node() && !m.status.is_settled())
        .map(|m| m.round_number)
        .min();

    // Always written, so two settles of the same tournament never commit side by side
    let tournament = session.tournament_mut();
    match next_round {
        Some(round) => {
            if round > tournament.current_round {
                tournament.current_round = round;
                info!("Tournament {} moved to round {round}", tournament.id);
            }
            Ok(())
        }
        None => complete(session, now),
    }
}

fn complete(session: &mut TournamentSession, now: DateTime<Utc>) -> EngineResult<()> {
    let tournament = session.tournament();
    let tournament_id = tournament.id;
    let participants: Vec<Participant> = session.participants().cloned().collect();
    let matches: Vec<Match> = session.matches().cloned().collect();

    let standings = compute_standings(tournament.format, &participants, &matches);
    let payouts =
        PrizeCalculator::distribute(tournament.prize_pool(), &tournament.prize_table, &standings)?;

    for standing in &standings {
        let amount = payouts
            .iter()
            .find(|p| p.participant_id == standing.participant_id)
            .map(|p| p.amount);
        let participant = session.participant_mut(standing.participant_id)?;
        participant.final_standing = Some(standing.position);
        participant.payout_amount = amount;
    }

    let last_round = matches.iter().map(|m| m.round_number).max().unwrap_or(1);
    let champion_id = standings.first().map(|s| s.participant_id);

    let tournament = session.tournament_mut();
    tournament.status = TournamentStatus::Completed;
    tournament.completed_at = Some(now);
    tournament.current_round = tournament.current_round.max(last_round);

    info!(
        "Tournament {tournament_id} completed, champion {:?}, {} payouts",
        champion_id,
        payouts.len()
    );
    session.emit(EngineEvent::TournamentCompleted {
        tournament_id,
        champion_id,
        payouts,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::MatchStatus;
    use crate::tournament::TournamentFormat;

    fn open_session(format: TournamentFormat, players: i64) -> TournamentSession {
        let now = Utc::now();
        let mut tournament = NewTournament::single_elimination("Manager", 8, 10)
            .with_format(format)
            .into_tournament(1, now);
        tournament.current_slots = players as u32;

        let participants = (1..=players)
            .map(|i| Participant {
                id: i,
                tournament_id: 1,
                user_id: i * 100,
                gamer_tag: format!("p{i}"),
                seed: None,
                checked_in: false,
                final_standing: None,
                payout_amount: None,
                payout_paid_at: None,
                refunded_at: None,
                joined_at: now + chrono::Duration::seconds(i),
                version: 0,
            })
            .collect();
        TournamentSession::from_records(tournament, participants, vec![], vec![], vec![])
    }

    #[test]
    fn test_seed_order_prefers_explicit_seeds() {
        let mut session = open_session(TournamentFormat::SingleElimination, 4);
        session.participant_mut(3).unwrap().seed = Some(1);
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(seed_order(&session, false, &mut rng), vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_shuffle_keeps_everyone() {
        let session = open_session(TournamentFormat::SingleElimination, 6);
        let mut rng = StdRng::seed_from_u64(42);
        let mut order = seed_order(&session, true, &mut rng);
        order.sort();
        assert_eq!(order, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_start_materializes_bracket() {
        let mut session = open_session(TournamentFormat::SingleElimination, 4);
        let config = EngineConfig::default();
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(1);

        let count = start_session(&mut session, now, &mut rng, &config).unwrap();
        assert_eq!(count, 3);
        assert_eq!(session.tournament().status, TournamentStatus::Live);
        assert_eq!(session.tournament().current_round, 1);

        let ready: Vec<_> = session.matches().filter(|m| m.ready_at.is_some()).collect();
        assert_eq!(ready.len(), 2);
        assert!(ready.iter().all(|m| m.deadline_at == Some(now + config.no_show_window)));
        assert!(session.participants().all(|p| p.seed.is_some()));
    }

    #[test]
    fn test_start_twice_is_stale() {
        let mut session = open_session(TournamentFormat::RoundRobin, 3);
        let config = EngineConfig::default();
        let mut rng = StdRng::seed_from_u64(1);

        start_session(&mut session, Utc::now(), &mut rng, &config).unwrap();
        let err = start_session(&mut session, Utc::now(), &mut rng, &config).unwrap_err();
        assert!(err.is_stale());
    }

    #[test]
    fn test_start_rejects_prize_table_beyond_field() {
        let mut session = open_session(TournamentFormat::SingleElimination, 2);
        session.tournament_mut().prize_table = vec![
            PrizeEntry::percent(1, 50),
            PrizeEntry::percent(2, 30),
            PrizeEntry::percent(3, 20),
        ];
        let mut rng = StdRng::seed_from_u64(1);

        let err = start_session(&mut session, Utc::now(), &mut rng, &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_after_settle_completes_when_nothing_left() {
        let mut session = open_session(TournamentFormat::SingleElimination, 2);
        let config = EngineConfig::default();
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(1);
        start_session(&mut session, now, &mut rng, &config).unwrap();

        let final_id = session.matches().next().unwrap().id;
        let winner = session.get_match(final_id).unwrap().participant1.participant();
        let m = session.match_mut(final_id).unwrap();
        m.status = MatchStatus::Completed;
        m.winner_id = winner;

        after_settle(&mut session, now).unwrap();
        let tournament = session.tournament();
        assert_eq!(tournament.status, TournamentStatus::Completed);
        assert_eq!(tournament.completed_at, Some(now));

        // Pool 20, 70/30
        let champion = session.participant(winner.unwrap()).unwrap();
        assert_eq!(champion.final_standing, Some(1));
        assert_eq!(champion.payout_amount, Some(14));
    }
}
