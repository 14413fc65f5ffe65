//! Final standings from a resolved (or partially resolved) bracket.
//!
//! Elimination: the champion is first. Everyone else is ordered by how late
//! they exited, then by the standing of whoever eliminated them, then by seed.
//! Round robin: wins, then score differential, then seed.

use super::models::{BracketType, Match};
use crate::tournament::{Participant, ParticipantId, Standing, TournamentFormat};
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    wins: u32,
    losses: u32,
    points_for: i64,
    points_against: i64,
}

/// Compute distinct positions 1..=N for every participant
pub fn compute_standings(
    format: TournamentFormat,
    participants: &[Participant],
    matches: &[Match],
) -> Vec<Standing> {
    let nodes: Vec<&Match> = matches.iter().filter(|m| m.is_bracket_node()).collect();
    let tallies = tally(&nodes);

    let order = if format.is_elimination() {
        elimination_order(format, participants, &nodes)
    } else {
        round_robin_order(participants, &tallies)
    };

    order
        .into_iter()
        .enumerate()
        .map(|(i, participant_id)| {
            let t = tallies.get(&participant_id).copied().unwrap_or_default();
            Standing {
                participant_id,
                position: i as u32 + 1,
                wins: t.wins,
                losses: t.losses,
            }
        })
        .collect()
}

fn tally(nodes: &[&Match]) -> HashMap<ParticipantId, Tally> {
    let mut tallies: HashMap<ParticipantId, Tally> = HashMap::new();

    for m in nodes {
        let Some(outcome) = m.outcome() else { continue };
        if let Some(winner) = outcome.winner {
            tallies.entry(winner).or_default().wins += 1;
        }
        if let Some(loser) = outcome.loser {
            tallies.entry(loser).or_default().losses += 1;
        }

        if let (Some((p1, p2)), Some(s1), Some(s2)) =
            (m.participants(), m.participant1_score, m.participant2_score)
        {
            let first = tallies.entry(p1).or_default();
            first.points_for += i64::from(s1);
            first.points_against += i64::from(s2);
            let second = tallies.entry(p2).or_default();
            second.points_for += i64::from(s2);
            second.points_against += i64::from(s1);
        }
    }

    tallies
}

fn seed_key(participant: &Participant) -> (u32, i64) {
    (participant.seed.unwrap_or(u32::MAX), participant.id)
}

fn round_robin_order(
    participants: &[Participant],
    tallies: &HashMap<ParticipantId, Tally>,
) -> Vec<ParticipantId> {
    let mut ranked: Vec<&Participant> = participants.iter().collect();
    ranked.sort_by_key(|p| {
        let t = tallies.get(&p.id).copied().unwrap_or_default();
        (
            Reverse(t.wins),
            Reverse(t.points_for - t.points_against),
            seed_key(p),
        )
    });
    ranked.into_iter().map(|p| p.id).collect()
}

/// How far a participant got. Larger is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Exit {
    /// Out at this stage; the eliminator is who beat them, if anyone did
    Eliminated { stage: (u8, u32) },
    /// Still has an unsettled match
    Alive,
    Champion,
}

fn stage_of(format: TournamentFormat, m: &Match) -> (u8, u32) {
    let tier = match (format, m.bracket_type) {
        (TournamentFormat::DoubleElimination, BracketType::Winners) => 0,
        (TournamentFormat::DoubleElimination, BracketType::Losers) => 1,
        (_, BracketType::Finals) => 2,
        _ => 0,
    };
    (tier, m.round_number)
}

fn elimination_order(
    format: TournamentFormat,
    participants: &[Participant],
    nodes: &[&Match],
) -> Vec<ParticipantId> {
    let mut exits: Vec<(&Participant, Exit, Option<ParticipantId>)> = participants
        .iter()
        .map(|p| {
            let last = nodes
                .iter()
                .filter(|m| m.involves(p.id))
                .max_by_key(|m| stage_of(format, m));

            match last {
                None => (p, Exit::Alive, None),
                Some(m) if !m.status.is_settled() => (p, Exit::Alive, None),
                Some(m) if m.winner_id == Some(p.id) && m.is_terminal() => (p, Exit::Champion, None),
                Some(m) if m.winner_id == Some(p.id) => (p, Exit::Alive, None),
                Some(m) => (
                    p,
                    Exit::Eliminated {
                        stage: stage_of(format, m),
                    },
                    m.winner_id,
                ),
            }
        })
        .collect();

    // Better exits first; eliminators always exit later than their victims,
    // so their positions are known by the time a tie needs them.
    exits.sort_by_key(|(p, exit, _)| (Reverse(*exit), seed_key(p)));

    let mut positions: HashMap<ParticipantId, usize> = HashMap::new();
    let mut order: Vec<ParticipantId> = Vec::with_capacity(exits.len());
    let mut start = 0;

    while start < exits.len() {
        let exit = exits[start].1;
        let end = exits[start..]
            .iter()
            .position(|(_, e, _)| *e != exit)
            .map_or(exits.len(), |offset| start + offset);

        let group = &mut exits[start..end];
        group.sort_by_key(|(p, _, eliminator)| {
            let by = eliminator
                .and_then(|id| positions.get(&id).copied())
                .unwrap_or(usize::MAX);
            (by, seed_key(p))
        });

        for (p, _, _) in group.iter() {
            positions.insert(p.id, order.len());
            order.push(p.id);
        }
        start = end;
    }

    order
}
