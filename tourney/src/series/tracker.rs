//! Series progression inside a session.
//!
//! A best-of bracket node (the anchor) never takes reports itself. When it
//! becomes ready a [`Series`] is opened and its games are created one at a
//! time; each settled game is counted once, and the anchor settles when one
//! side reaches a majority.

use super::models::Series;
use crate::bracket::{Match, MatchId, Slot};
use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::lifecycle::MatchAction;
use crate::session::TournamentSession;
use chrono::{DateTime, Utc};
use log::{debug, info};

/// Open the series for a ready anchor and schedule game one
pub(crate) fn open(
    session: &mut TournamentSession,
    anchor_id: MatchId,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<()> {
    let anchor = session.get_match(anchor_id)?;
    if anchor.series_id.is_some() {
        return Ok(());
    }
    let participants = anchor.participants().ok_or_else(|| {
        EngineError::Integrity(format!("anchor {anchor_id} opened without both participants"))
    })?;
    let (tournament_id, best_of) = (anchor.tournament_id, anchor.best_of);

    let series_id = session.provisional_id();
    let series = Series::new(
        series_id,
        tournament_id,
        anchor_id,
        participants,
        best_of,
        now,
    );
    session.insert_series(series);
    session.match_mut(anchor_id)?.series_id = Some(series_id);

    schedule_game(session, anchor_id, 1, now, config)?;
    info!("Opened best-of-{best_of} series for match {anchor_id}");
    Ok(())
}

fn schedule_game(
    session: &mut TournamentSession,
    anchor_id: MatchId,
    game_number: u32,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<MatchId> {
    let id = session.provisional_id();
    let anchor = session.get_match(anchor_id)?;
    let (p1, p2) = anchor
        .participants()
        .ok_or_else(|| EngineError::Integrity(format!("anchor {anchor_id} lost a participant")))?;

    let mut game = Match::new(
        id,
        anchor.tournament_id,
        anchor.bracket_type,
        anchor.round_number,
        anchor.bracket_position,
        now,
    );
    game.participant1 = Slot::Occupied(p1);
    game.participant2 = Slot::Occupied(p2);
    game.series_id = anchor.series_id;
    game.game_number = Some(game_number);
    game.ready_at = Some(now);
    game.deadline_at = Some(now + config.no_show_window);

    session.insert_match(game);
    Ok(id)
}

/// Count a settled game. Returns the anchor id when the game decided the series.
pub(crate) fn record_game(
    session: &mut TournamentSession,
    game_id: MatchId,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> EngineResult<Option<MatchId>> {
    let game = session.get_match(game_id)?;
    if game.advanced_at.is_some() {
        debug!("Game {game_id} already counted");
        return Ok(None);
    }
    let outcome = game
        .outcome()
        .ok_or_else(|| EngineError::Validation(format!("game {game_id} is not settled")))?;
    let series_id = game
        .series_id
        .ok_or_else(|| EngineError::Integrity(format!("game {game_id} has no series")))?;

    session.match_mut(game_id)?.advanced_at = Some(now);

    let series = session.series_mut(series_id)?;
    let decided = match outcome.winner {
        Some(winner) => series.record_win(winner, now)?,
        None => {
            series.void(now)?;
            true
        }
    };
    let anchor_id = series.anchor_match_id;
    let (winner, p1_wins, p2_wins) = (
        series.winner_id,
        series.participant1_wins,
        series.participant2_wins,
    );

    if !decided {
        let next = session
            .matches()
            .filter(|m| m.series_id == Some(series_id) && m.is_game())
            .filter_map(|m| m.game_number)
            .max()
            .unwrap_or(0)
            + 1;
        schedule_game(session, anchor_id, next, now, config)?;
        debug!("Series {series_id} at {p1_wins}-{p2_wins}, scheduled game {next}");
        return Ok(None);
    }

    session.match_mut(anchor_id)?.apply(
        MatchAction::SeriesDecided {
            winner,
            participant1_wins: p1_wins,
            participant2_wins: p2_wins,
        },
        now,
        config,
    )?;
    info!("Series {series_id} decided {p1_wins}-{p2_wins}, anchor {anchor_id} settled");
    Ok(Some(anchor_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::{BracketType, MatchStatus};
    use crate::series::SeriesStatus;
    use crate::tournament::NewTournament;

    fn session_with_anchor(best_of: u32) -> (TournamentSession, MatchId) {
        let now = Utc::now();
        let tournament = NewTournament::single_elimination("Series", 2, 0).into_tournament(1, now);
        let mut anchor = Match::new(5, 1, BracketType::Winners, 1, 1, now);
        anchor.participant1 = Slot::Occupied(10);
        anchor.participant2 = Slot::Occupied(20);
        anchor.best_of = best_of;
        (
            TournamentSession::from_records(tournament, vec![], vec![anchor], vec![], vec![]),
            5,
        )
    }

    fn win_game(session: &mut TournamentSession, game_id: MatchId, winner: i64) {
        let game = session.match_mut(game_id).unwrap();
        game.status = MatchStatus::Completed;
        game.winner_id = Some(winner);
    }

    fn latest_game(session: &TournamentSession) -> MatchId {
        session
            .matches()
            .filter(|m| m.is_game())
            .max_by_key(|m| m.game_number)
            .unwrap()
            .id
    }

    #[test]
    fn test_best_of_three_runs_to_decider() {
        let (mut session, anchor) = session_with_anchor(3);
        let config = EngineConfig::default();
        let now = Utc::now();

        open(&mut session, anchor, now, &config).unwrap();
        let g1 = latest_game(&session);
        assert_eq!(session.get_match(g1).unwrap().game_number, Some(1));

        win_game(&mut session, g1, 10);
        assert_eq!(record_game(&mut session, g1, now, &config).unwrap(), None);
        // Counting the same game twice is a no-op
        assert_eq!(record_game(&mut session, g1, now, &config).unwrap(), None);

        let g2 = latest_game(&session);
        assert_ne!(g1, g2);
        win_game(&mut session, g2, 20);
        assert_eq!(record_game(&mut session, g2, now, &config).unwrap(), None);

        let g3 = latest_game(&session);
        assert_eq!(session.get_match(g3).unwrap().game_number, Some(3));
        win_game(&mut session, g3, 20);
        assert_eq!(record_game(&mut session, g3, now, &config).unwrap(), Some(anchor));

        let settled = session.get_match(anchor).unwrap();
        assert_eq!(settled.status, MatchStatus::Completed);
        assert_eq!(settled.winner_id, Some(20));
        assert_eq!(settled.participant1_score, Some(1));
        assert_eq!(settled.participant2_score, Some(2));
    }

    #[test]
    fn test_void_game_voids_series() {
        let (mut session, anchor) = session_with_anchor(3);
        let config = EngineConfig::default();
        let now = Utc::now();

        open(&mut session, anchor, now, &config).unwrap();
        let g1 = latest_game(&session);
        session.match_mut(g1).unwrap().status = MatchStatus::NoContest;

        assert_eq!(record_game(&mut session, g1, now, &config).unwrap(), Some(anchor));
        let series_id = session.get_match(anchor).unwrap().series_id.unwrap();
        assert_eq!(session.series(series_id).unwrap().status, SeriesStatus::Void);
        assert_eq!(
            session.get_match(anchor).unwrap().status,
            MatchStatus::NoContest
        );
    }

    #[test]
    fn test_open_is_idempotent() {
        let (mut session, anchor) = session_with_anchor(5);
        let config = EngineConfig::default();
        let now = Utc::now();

        open(&mut session, anchor, now, &config).unwrap();
        open(&mut session, anchor, now, &config).unwrap();
        assert_eq!(session.matches().filter(|m| m.is_game()).count(), 1);
    }
}
