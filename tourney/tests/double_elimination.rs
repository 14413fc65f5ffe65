//! Integration tests for double-elimination brackets and the grand final reset.

mod common;

use common::{Harness, harness};
use tourney::bracket::{BracketType, MatchStatus, Slot};
use tourney::tournament::{
    NewTournament, Tournament, TournamentFormat, TournamentSettings, TournamentStatus, UserId,
};

const A: i64 = 1;
const B: i64 = 2;
const C: i64 = 3;
const D: i64 = 4;

async fn double_cup(h: &Harness, reset: bool) -> Tournament {
    let cup = h
        .create_with_players(
            NewTournament::single_elimination("Double", 4, 10)
                .with_format(TournamentFormat::DoubleElimination)
                .with_settings(TournamentSettings {
                    grand_final_reset: reset,
                    ..TournamentSettings::default()
                }),
            &[(A, "alpha"), (B, "bravo"), (C, "charlie"), (D, "delta")],
        )
        .await;
    h.engine.tournaments().start(cup.id).await.unwrap()
}

/// Seeds A=1 B=2 C=3 D=4. A wins the winners bracket, B comes back
/// through the losers bracket into the grand final.
async fn play_to_grand_final(h: &Harness, cup: &Tournament) {
    h.play(cup.id, A, D).await;
    h.play(cup.id, B, C).await;
    h.play(cup.id, A, B).await;
    h.play(cup.id, C, D).await;
    h.play(cup.id, B, C).await;
}

async fn positions(h: &Harness, cup: &Tournament) -> Vec<(u32, UserId)> {
    let participants = h.engine.tournaments().participants(cup.id).await.unwrap();
    h.engine
        .tournaments()
        .standings(cup.id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| {
            let user = participants
                .iter()
                .find(|p| p.id == s.participant_id)
                .map(|p| p.user_id)
                .unwrap();
            (s.position, user)
        })
        .collect()
}

#[tokio::test]
async fn test_bracket_shape() {
    let h = harness();
    let cup = double_cup(&h, false).await;
    let matches = h.engine.matches().list_matches(cup.id).await.unwrap();

    assert_eq!(matches.len(), 6);
    let count = |t: BracketType| matches.iter().filter(|m| m.bracket_type == t).count();
    assert_eq!(count(BracketType::Winners), 3);
    assert_eq!(count(BracketType::Losers), 2);
    assert_eq!(count(BracketType::Finals), 1);

    let ready = matches.iter().filter(|m| m.ready_at.is_some()).count();
    assert_eq!(ready, 2);
}

#[tokio::test]
async fn test_losers_drop_into_losers_bracket() {
    let h = harness();
    let cup = double_cup(&h, false).await;

    let first = h.play(cup.id, A, D).await;
    let drop = first.loser_next_match.unwrap();
    let losers_match = h.engine.matches().get_match(drop.match_id).await.unwrap();
    assert_eq!(losers_match.bracket_type, BracketType::Losers);
    assert_eq!(
        losers_match.slot(drop.slot),
        Slot::Occupied(h.participant(cup.id, D).await.id)
    );
}

#[tokio::test]
async fn test_winners_champion_takes_grand_final() {
    let h = harness();
    let cup = double_cup(&h, true).await;
    play_to_grand_final(&h, &cup).await;

    h.play(cup.id, A, B).await;

    let done = h.engine.tournaments().get(cup.id).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Completed);
    let finals = h
        .engine
        .matches()
        .list_matches(cup.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.bracket_type == BracketType::Finals)
        .count();
    assert_eq!(finals, 1);
    assert_eq!(positions(&h, &cup).await, vec![(1, A), (2, B), (3, C), (4, D)]);
}

#[tokio::test]
async fn test_grand_final_reset() {
    let h = harness();
    let cup = double_cup(&h, true).await;
    play_to_grand_final(&h, &cup).await;

    // Losers-bracket champion takes the first grand final
    h.play(cup.id, B, A).await;
    let live = h.engine.tournaments().get(cup.id).await.unwrap();
    assert_eq!(live.status, TournamentStatus::Live);

    let finals: Vec<_> = h
        .engine
        .matches()
        .list_matches(cup.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.bracket_type == BracketType::Finals)
        .collect();
    assert_eq!(finals.len(), 2);
    let reset = &finals[1];
    assert_eq!(reset.round_number, finals[0].round_number + 1);
    assert_eq!(reset.status, MatchStatus::Scheduled);
    assert!(reset.ready_at.is_some());

    h.play(cup.id, A, B).await;

    let done = h.engine.tournaments().get(cup.id).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Completed);
    assert_eq!(done.current_round, reset.round_number);
    assert_eq!(positions(&h, &cup).await, vec![(1, A), (2, B), (3, C), (4, D)]);
    assert_eq!(h.participant(cup.id, A).await.payout_amount, Some(28));
}

#[tokio::test]
async fn test_no_reset_without_setting() {
    let h = harness();
    let cup = double_cup(&h, false).await;
    play_to_grand_final(&h, &cup).await;

    h.play(cup.id, B, A).await;

    let done = h.engine.tournaments().get(cup.id).await.unwrap();
    assert_eq!(done.status, TournamentStatus::Completed);
    assert_eq!(positions(&h, &cup).await[0], (1, B));
}
