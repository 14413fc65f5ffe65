//! Integration tests for match reporting, confirmation, disputes and admin
//! actions.

mod common;

use chrono::Duration;
use common::{Harness, event_names, harness, scores_for};
use tourney::EngineError;
use tourney::EngineEvent;
use tourney::bracket::{MatchStatus, Resolution, Slot};
use tourney::lifecycle::DisputeStatus;
use tourney::tournament::{NewTournament, Tournament, TournamentSettings, TournamentStatus};

const A: i64 = 1;
const B: i64 = 2;
const C: i64 = 3;
const D: i64 = 4;
const ADMIN: i64 = 99;

async fn four_player_cup(h: &Harness) -> Tournament {
    let cup = h
        .create_with_players(
            NewTournament::single_elimination("Lifecycle Cup", 4, 0),
            &[(A, "alpha"), (C, "charlie"), (D, "delta"), (B, "bravo")],
        )
        .await;
    h.engine.tournaments().start(cup.id).await.unwrap()
}

#[tokio::test]
async fn test_report_then_confirm_advances_winner() {
    let mut h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.match_between(cup.id, A, B).await;
    let a = h.participant(cup.id, A).await;
    let b = h.participant(cup.id, B).await;
    let (s1, s2) = scores_for(&m, a.id);

    let reported = h.engine.matches().report(m.id, A, s1, s2, None).await.unwrap();
    assert_eq!(reported.status, MatchStatus::AwaitingConfirmation);
    assert_eq!(reported.winner_id, Some(a.id));
    assert!(reported.auto_confirm_at.is_some());

    let awaiting = h
        .drain_events()
        .into_iter()
        .find(|e| e.name() == "match.awaiting_confirmation")
        .unwrap();
    match awaiting {
        EngineEvent::MatchAwaitingConfirmation {
            reported_by,
            opponent_id,
            ..
        } => {
            assert_eq!(reported_by, A);
            assert_eq!(opponent_id, b.id);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let confirmed = h.engine.matches().confirm(m.id, B).await.unwrap();
    assert_eq!(confirmed.status, MatchStatus::Completed);
    assert_eq!(confirmed.resolution, Some(Resolution::Reported));
    assert!(!confirmed.auto_verified);
    assert!(confirmed.advanced_at.is_some());

    let feed = confirmed.next_match.unwrap();
    let next = h.engine.matches().get_match(feed.match_id).await.unwrap();
    assert_eq!(next.slot(feed.slot), Slot::Occupied(a.id));
    assert_eq!(next.status, MatchStatus::Scheduled);
    assert!(next.ready_at.is_none());
}

#[tokio::test]
async fn test_report_rules() {
    let h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.match_between(cup.id, A, B).await;
    let matches = h.engine.matches();

    let stranger = matches.report(m.id, 42, 2, 0, None).await;
    assert!(matches!(stranger, Err(EngineError::Policy(_))));

    let outsider = matches.report(m.id, C, 2, 0, None).await;
    assert!(matches!(outsider, Err(EngineError::Policy(_))));

    let tied = matches.report(m.id, A, 1, 1, None).await;
    assert!(matches!(tied, Err(EngineError::Validation(_))));

    let negative = matches.report(m.id, A, -1, 0, None).await;
    assert!(matches!(negative, Err(EngineError::Validation(_))));

    matches
        .report(m.id, A, 2, 0, Some("https://clips.example/1".to_string()))
        .await
        .unwrap();
    let own = matches.confirm(m.id, A).await;
    assert!(matches!(own, Err(EngineError::Policy(_))));

    // A second report lost the race to the first
    let again = matches.report(m.id, B, 0, 2, None).await;
    assert!(again.unwrap_err().is_stale());
}

#[tokio::test]
async fn test_mark_live_sets_report_deadline() {
    let h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.match_between(cup.id, C, D).await;

    let live = h.engine.matches().mark_live(m.id, C).await.unwrap();
    assert_eq!(live.status, MatchStatus::Live);
    let live_at = live.live_at.unwrap();
    assert_eq!(
        live.deadline_at,
        Some(live_at + h.engine.context().config().live_report_window)
    );

    let outsider = h.engine.matches().mark_live(m.id, A).await;
    assert!(matches!(outsider, Err(EngineError::Policy(_))));
    assert!(h.engine.matches().mark_live(m.id, D).await.unwrap_err().is_stale());
}

#[tokio::test]
async fn test_dispute_resolution_overrides_report() {
    let mut h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.match_between(cup.id, A, B).await;
    let a = h.participant(cup.id, A).await;
    let b = h.participant(cup.id, B).await;
    let (s1, s2) = scores_for(&m, a.id);
    let matches = h.engine.matches();

    matches.report(m.id, A, s1, s2, None).await.unwrap();
    let own = matches.contest(m.id, A, "no", None).await;
    assert!(matches!(own, Err(EngineError::Policy(_))));

    let dispute = matches
        .contest(m.id, B, "score was the other way round", None)
        .await
        .unwrap();
    assert_eq!(dispute.status, DisputeStatus::Open);
    assert_eq!(dispute.match_id, m.id);
    assert_eq!(dispute.raised_by, B);
    assert!(dispute.id > 0);
    assert_eq!(
        matches.get_match(m.id).await.unwrap().status,
        MatchStatus::Disputed
    );

    let second = matches.contest(m.id, B, "again", None).await;
    assert!(matches!(second, Err(EngineError::Policy(_))));

    let reviewing = matches.review_dispute(dispute.id).await.unwrap();
    assert_eq!(reviewing.status, DisputeStatus::UnderReview);

    let resolved = matches
        .resolve_dispute(
            dispute.id,
            ADMIN,
            b.id,
            None,
            Some("video shows bravo won".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, MatchStatus::Completed);
    assert_eq!(resolved.winner_id, Some(b.id));
    assert_eq!(resolved.resolution, Some(Resolution::AdminDecision));
    assert_eq!(resolved.resolved_by, Some(ADMIN));

    let feed = resolved.next_match.unwrap();
    let next = matches.get_match(feed.match_id).await.unwrap();
    assert_eq!(next.slot(feed.slot), Slot::Occupied(b.id));

    let closed = matches.get_dispute(dispute.id).await.unwrap();
    assert_eq!(closed.status, DisputeStatus::Resolved);
    assert_eq!(closed.resolved_by, Some(ADMIN));
    assert!(closed.closed_at.is_some());

    let twice = matches
        .resolve_dispute(dispute.id, ADMIN, a.id, None, None)
        .await;
    assert!(twice.unwrap_err().is_stale());

    let names = event_names(&h.drain_events());
    let disputed = names.iter().position(|n| *n == "match.disputed").unwrap();
    let resolved_at = names.iter().position(|n| *n == "dispute.resolved").unwrap();
    assert!(disputed < resolved_at);
    assert_eq!(matches.list_disputes(cup.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_resolution_scores_must_agree_with_winner() {
    let h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.match_between(cup.id, A, B).await;
    let a = h.participant(cup.id, A).await;
    let (s1, s2) = scores_for(&m, a.id);
    let matches = h.engine.matches();

    matches.report(m.id, A, s1, s2, None).await.unwrap();
    let dispute = matches.contest(m.id, B, "wrong", None).await.unwrap();

    // Scores say A won, winner says otherwise
    let b = h.participant(cup.id, B).await;
    let mismatch = matches
        .resolve_dispute(dispute.id, ADMIN, b.id, Some((s1, s2)), None)
        .await;
    assert!(matches!(mismatch, Err(EngineError::Validation(_))));

    let c = h.participant(cup.id, C).await;
    let outsider = matches
        .resolve_dispute(dispute.id, ADMIN, c.id, None, None)
        .await;
    assert!(matches!(outsider, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn test_admin_forfeit() {
    let h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.match_between(cup.id, C, D).await;
    let d = h.participant(cup.id, D).await;

    let forfeited = h.engine.matches().forfeit(m.id, d.id, ADMIN).await.unwrap();
    assert_eq!(forfeited.status, MatchStatus::Forfeited);
    assert_eq!(forfeited.winner_id, Some(d.id));
    assert_eq!(forfeited.resolution, Some(Resolution::Forfeit));
    assert!(forfeited.advanced_at.is_some());

    let a = h.participant(cup.id, A).await;
    let wrong = h.engine.matches().forfeit(m.id, a.id, ADMIN).await;
    assert!(wrong.unwrap_err().is_stale());
}

#[tokio::test]
async fn test_contest_after_auto_confirm_is_stale() {
    let h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.match_between(cup.id, A, B).await;
    let a = h.participant(cup.id, A).await;
    let (s1, s2) = scores_for(&m, a.id);

    let reported = h.engine.matches().report(m.id, A, s1, s2, None).await.unwrap();
    let due = reported.auto_confirm_at.unwrap() + Duration::seconds(1);
    let report = h.engine.scheduler().sweep_at(due).await.unwrap();
    assert_eq!(report.auto_confirmed, 1);

    // The grace window is over; the sweep won the race
    let err = h
        .engine
        .matches()
        .contest(m.id, B, "never played", None)
        .await
        .unwrap_err();
    assert!(err.is_stale());

    let settled = h.engine.matches().get_match(m.id).await.unwrap();
    assert_eq!(settled.status, MatchStatus::Completed);
    assert!(settled.auto_verified);
    assert_eq!(settled.winner_id, Some(a.id));
    let feed = settled.next_match.unwrap();
    assert_eq!(
        h.engine.matches().get_match(feed.match_id).await.unwrap().slot(feed.slot),
        Slot::Occupied(a.id)
    );
    assert!(h.engine.matches().list_disputes(cup.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_confirmed_result_cannot_be_contested() {
    let h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.play(cup.id, A, B).await;

    let err = h
        .engine
        .matches()
        .contest(m.id, B, "changed my mind", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StaleState { .. }));
    assert_eq!(
        h.engine.matches().get_match(m.id).await.unwrap().status,
        MatchStatus::Completed
    );
}

#[tokio::test]
async fn test_advance_replay_is_noop() {
    let h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.play(cup.id, A, B).await;
    let a = h.participant(cup.id, A).await;
    let feed = m.next_match.unwrap();
    let before = h.engine.matches().get_match(feed.match_id).await.unwrap();
    assert_eq!(before.slot(feed.slot), Slot::Occupied(a.id));

    let advanced = h.engine.advancement().advance(m.id).await.unwrap();
    assert!(!advanced);

    let after = h.engine.matches().get_match(feed.match_id).await.unwrap();
    assert_eq!(after.slot(feed.slot), Slot::Occupied(a.id));
    assert_eq!(after.version, before.version);
}

#[tokio::test]
async fn test_advance_rejects_unsettled_match() {
    let h = harness();
    let cup = four_player_cup(&h).await;
    let m = h.match_between(cup.id, A, B).await;

    let err = h.engine.advancement().advance(m.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_best_of_three_series() {
    let mut h = harness();
    let cup = h
        .create_with_players(
            NewTournament::single_elimination("Series", 2, 0).with_settings(TournamentSettings {
                match_best_of: 3,
                ..TournamentSettings::default()
            }),
            &[(A, "alpha"), (B, "bravo")],
        )
        .await;
    h.engine.tournaments().start(cup.id).await.unwrap();

    let all = h.engine.matches().list_matches(cup.id).await.unwrap();
    let anchor = all.iter().find(|m| m.is_anchor()).unwrap().clone();
    assert_eq!(anchor.best_of, 3);
    assert!(anchor.series_id.is_some());

    let on_anchor = h.engine.matches().report(anchor.id, A, 1, 0, None).await;
    assert!(matches!(on_anchor, Err(EngineError::Policy(_))));

    let game_one = h.play(cup.id, A, B).await;
    assert_eq!(game_one.game_number, Some(1));
    assert_eq!(game_one.series_id, anchor.series_id);

    let game_two = h.play(cup.id, B, A).await;
    assert_eq!(game_two.game_number, Some(2));
    let game_three = h.play(cup.id, A, B).await;
    assert_eq!(game_three.game_number, Some(3));

    let settled = h.engine.matches().get_match(anchor.id).await.unwrap();
    let a = h.participant(cup.id, A).await;
    assert_eq!(settled.status, MatchStatus::Completed);
    assert_eq!(settled.resolution, Some(Resolution::Series));
    assert_eq!(settled.winner_id, Some(a.id));
    assert_eq!(
        (settled.participant1_score, settled.participant2_score),
        (Some(2), Some(1))
    );

    let games = h
        .engine
        .matches()
        .list_matches(cup.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.is_game())
        .count();
    assert_eq!(games, 3);
    assert_eq!(
        h.engine.tournaments().get(cup.id).await.unwrap().status,
        TournamentStatus::Completed
    );
    assert!(event_names(&h.drain_events()).contains(&"tournament.completed"));
}

#[tokio::test]
async fn test_series_stops_at_majority() {
    let h = harness();
    let cup = h
        .create_with_players(
            NewTournament::single_elimination("Sweep", 2, 0).with_settings(TournamentSettings {
                match_best_of: 3,
                ..TournamentSettings::default()
            }),
            &[(A, "alpha"), (B, "bravo")],
        )
        .await;
    h.engine.tournaments().start(cup.id).await.unwrap();

    h.play(cup.id, B, A).await;
    h.play(cup.id, B, A).await;

    let matches = h.engine.matches().list_matches(cup.id).await.unwrap();
    assert_eq!(matches.iter().filter(|m| m.is_game()).count(), 2);
    let anchor = matches.iter().find(|m| m.is_anchor()).unwrap();
    assert_eq!(
        anchor.winner_id,
        Some(h.participant(cup.id, B).await.id)
    );
}
