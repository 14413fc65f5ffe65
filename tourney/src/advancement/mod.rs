//! Propagation of settled matches through the bracket.
//!
//! Everything here runs inside the session of the settle that triggered it,
//! so the match transition, the downstream slot writes, series progress, the
//! round recompute and tournament completion share one commit. A settled
//! match is routed once: `advanced_at` marks it, and writing a participant
//! into a slot that already holds them is a no-op. Replaying a settle is
//! therefore harmless.

use crate::bracket::{BracketType, Feed, Match, MatchId, Slot, SlotPosition};
use crate::config::EngineConfig;
use crate::engine::EngineContext;
use crate::errors::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::lifecycle::MatchAction;
use crate::series::tracker;
use crate::session::TournamentSession;
use crate::tournament::{ParticipantId, TournamentFormat, manager};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::sync::Arc;

/// Replays advancement for settled matches
#[derive(Clone)]
pub struct AdvancementEngine {
    ctx: Arc<EngineContext>,
}

impl AdvancementEngine {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Route a settled match that has not been advanced yet.
    ///
    /// Returns `false` when the match was already advanced. Used to repair a
    /// tournament after a crash or to replay a duplicated settle.
    pub async fn advance(&self, match_id: MatchId) -> EngineResult<bool> {
        let m = self
            .ctx
            .store
            .get_match(match_id)
            .await?
            .ok_or_else(|| EngineError::not_found("match", match_id))?;
        let config = &self.ctx.config;
        let now = Utc::now();

        let (advanced, _) = self
            .ctx
            .transact(m.tournament_id, |session| {
                let m = session.get_match(match_id)?;
                if m.advanced_at.is_some() {
                    return Ok(false);
                }
                if !m.status.is_settled() {
                    return Err(EngineError::Validation(format!(
                        "match {match_id} is {} and cannot advance",
                        m.status
                    )));
                }
                settle(session, match_id, now, config)?;
                Ok(true)
            })
            .await?;

        if !advanced {
            debug!("Match {match_id} was already advanced");
        }
        Ok(advanced)
    }
}

/// Route a freshly settled match and update tournament progress
pub(crate) fn settle(
    session: &mut TournamentSession,
    match_id: MatchId,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<()> {
    route(session, match_id, now, config)?;
    manager::after_settle(session, now)
}

fn route(
    session: &mut TournamentSession,
    match_id: MatchId,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<()> {
    let m = session.get_match(match_id)?;
    if m.advanced_at.is_some() {
        debug!("Match {match_id} already advanced");
        return Ok(());
    }
    let outcome = m
        .outcome()
        .ok_or_else(|| EngineError::Validation(format!("match {match_id} is not settled")))?;

    if m.is_game() {
        if let Some(anchor_id) = tracker::record_game(session, match_id, now, config)? {
            announce(session, anchor_id)?;
            route(session, anchor_id, now, config)?;
        }
        return Ok(());
    }

    if is_reset_candidate(session, m) {
        open_reset_final(session, match_id, now)?;
    }

    let m = session.match_mut(match_id)?;
    m.advanced_at = Some(now);
    let (next, loser_next) = (m.next_match, m.loser_next_match);

    if let Some(feed) = next {
        place(session, feed, Slot::from_outcome(outcome.winner), now, config)?;
    }
    if let Some(feed) = loser_next {
        place(session, feed, Slot::from_outcome(outcome.loser), now, config)?;
    }

    match (next, loser_next) {
        (None, None) => info!("Match {match_id} settled with no further routing"),
        _ => debug!("Match {match_id} advanced"),
    }
    Ok(())
}

/// Write a participant (or a void) into a downstream slot
fn place(
    session: &mut TournamentSession,
    feed: Feed,
    value: Slot,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<()> {
    let current = session.get_match(feed.match_id)?.slot(feed.slot);
    if current == value {
        debug!(
            "Slot {} of match {} already holds {:?}",
            feed.slot.number(),
            feed.match_id,
            value
        );
        return Ok(());
    }
    if current != Slot::Pending {
        error!(
            "Slot {} of match {} holds {:?}, refusing to overwrite with {:?}",
            feed.slot.number(),
            feed.match_id,
            current,
            value
        );
        return Err(EngineError::Integrity(format!(
            "slot {} of match {} is already filled",
            feed.slot.number(),
            feed.match_id
        )));
    }

    let dest = session.match_mut(feed.match_id)?;
    *dest.slot_mut(feed.slot) = value;

    match (dest.participant1, dest.participant2) {
        (Slot::Pending, _) | (_, Slot::Pending) => Ok(()),
        (Slot::Occupied(_), Slot::Occupied(_)) => make_ready(session, feed.match_id, now, config),
        (Slot::Occupied(winner), Slot::Void) | (Slot::Void, Slot::Occupied(winner)) => {
            walk_over(session, feed.match_id, Some(winner), now, config)
        }
        (Slot::Void, Slot::Void) => walk_over(session, feed.match_id, None, now, config),
    }
}

/// Start the clock on a match whose participants are both known
pub(crate) fn make_ready(
    session: &mut TournamentSession,
    match_id: MatchId,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<()> {
    let m = session.match_mut(match_id)?;
    if m.ready_at.is_some() {
        return Ok(());
    }
    m.ready_at = Some(now);

    if m.is_anchor() {
        tracker::open(session, match_id, now, config)?;
    } else {
        m.deadline_at = Some(now + config.no_show_window);
        info!("Match {match_id} is ready");
    }
    Ok(())
}

fn walk_over(
    session: &mut TournamentSession,
    match_id: MatchId,
    winner: Option<ParticipantId>,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<()> {
    session
        .match_mut(match_id)?
        .apply(MatchAction::Walkover { winner }, now, config)?;
    match winner {
        Some(winner) => info!("Participant {winner} walks over in match {match_id}"),
        None => info!("Match {match_id} voided, both sides forfeited upstream"),
    }
    announce(session, match_id)?;
    route(session, match_id, now, config)
}

/// Emit `match.completed` for a match the system settled
fn announce(session: &mut TournamentSession, match_id: MatchId) -> EngineResult<()> {
    let m = session.get_match(match_id)?;
    let event = EngineEvent::MatchCompleted {
        tournament_id: m.tournament_id,
        match_id,
        winner_id: m.winner_id,
        auto_verified: false,
    };
    session.emit(event);
    Ok(())
}

/// First grand final won by the losers-bracket champion, with resets enabled
fn is_reset_candidate(session: &TournamentSession, m: &Match) -> bool {
    let tournament = session.tournament();
    if tournament.format != TournamentFormat::DoubleElimination
        || !tournament.settings.grand_final_reset
        || m.bracket_type != BracketType::Finals
        || !m.is_terminal()
    {
        return false;
    }

    let winner_on_losers_side = m
        .winner_id
        .and_then(|winner| m.side_of(winner))
        .is_some_and(|side| side == SlotPosition::Participant2);
    if !winner_on_losers_side {
        return false;
    }

    let first_final = session
        .matches()
        .filter(|other| other.is_bracket_node() && other.bracket_type == BracketType::Finals)
        .map(|other| other.round_number)
        .min();
    first_final == Some(m.round_number)
}

/// Insert the deciding grand final and point the first one at it
fn open_reset_final(
    session: &mut TournamentSession,
    first_final_id: MatchId,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let reset_id = session.provisional_id();
    let first = session.get_match(first_final_id)?;

    let mut reset = Match::new(
        reset_id,
        first.tournament_id,
        BracketType::Finals,
        first.round_number + 1,
        1,
        now,
    );
    reset.best_of = first.best_of;
    session.insert_match(reset);

    let first = session.match_mut(first_final_id)?;
    first.next_match = Some(Feed {
        match_id: reset_id,
        slot: SlotPosition::Participant2,
    });
    first.loser_next_match = Some(Feed {
        match_id: reset_id,
        slot: SlotPosition::Participant1,
    });

    info!("Grand final {first_final_id} won from the losers bracket, reset final scheduled");
    Ok(())
}
