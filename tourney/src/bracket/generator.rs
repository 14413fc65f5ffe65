//! Bracket generation.
//!
//! Elimination formats are built as a padded template (a full power-of-two
//! bracket whose slots reference seeds or other template nodes), then
//! collapsed: a node with only one present side passes that side through, and
//! only nodes with two present sides become matches. This is how byes advance
//! without ever producing a playable match.

use super::models::{BracketType, SlotPosition};
use super::seeding::{bracket_size, round_count, standard_order};
use crate::errors::{EngineError, EngineResult};
use crate::tournament::{ParticipantId, TournamentFormat, TournamentSettings};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Pointer to a slot of another planned match, by plan index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanFeed {
    pub index: usize,
    pub slot: SlotPosition,
}

/// Initial contents of a planned slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannedSlot {
    /// Placed at generation time (round one, or a bye straight into a later round)
    Seeded(ParticipantId),
    /// Filled later by a feeder match
    Fed,
}

impl PlannedSlot {
    pub fn participant(&self) -> Option<ParticipantId> {
        match self {
            PlannedSlot::Seeded(id) => Some(*id),
            PlannedSlot::Fed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMatch {
    pub bracket_type: BracketType,
    pub round_number: u32,
    pub bracket_position: u32,
    pub participant1: PlannedSlot,
    pub participant2: PlannedSlot,
    pub next: Option<PlanFeed>,
    pub loser_next: Option<PlanFeed>,
    pub best_of: u32,
}

impl PlannedMatch {
    /// Both participants known at generation time
    pub fn is_ready(&self) -> bool {
        self.participant1.participant().is_some() && self.participant2.participant().is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.next.is_none() && self.loser_next.is_none()
    }
}

/// Match graph produced by [`BracketGenerator`], in topological order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketPlan {
    pub format: TournamentFormat,
    pub matches: Vec<PlannedMatch>,
}

impl BracketPlan {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Indices of matches whose winner and loser go nowhere
    pub fn terminal_indices(&self) -> Vec<usize> {
        self.matches
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_terminal())
            .map(|(i, _)| i)
            .collect()
    }

    /// Matches of one side of the bracket
    pub fn bracket(&self, bracket_type: BracketType) -> impl Iterator<Item = &PlannedMatch> {
        self.matches
            .iter()
            .filter(move |m| m.bracket_type == bracket_type)
    }
}

/// Builds the initial match graph for a seeded participant list
pub struct BracketGenerator;

impl BracketGenerator {
    /// Generate a bracket. `participants` is in seed order: index 0 is seed 1.
    pub fn generate(
        format: TournamentFormat,
        participants: &[ParticipantId],
        settings: &TournamentSettings,
    ) -> EngineResult<BracketPlan> {
        if participants.len() < 2 {
            return Err(EngineError::Validation(format!(
                "a bracket needs at least 2 participants, got {}",
                participants.len()
            )));
        }

        let unique: HashSet<_> = participants.iter().collect();
        if unique.len() != participants.len() {
            return Err(EngineError::Validation(
                "participant list contains duplicates".to_string(),
            ));
        }

        settings.validate()?;

        let matches = match format {
            TournamentFormat::SingleElimination => {
                let template = elimination_template(participants.len(), false, settings);
                collapse(&template, participants)?
            }
            TournamentFormat::DoubleElimination => {
                let template = elimination_template(participants.len(), true, settings);
                collapse(&template, participants)?
            }
            TournamentFormat::RoundRobin => round_robin(participants, settings.match_best_of),
        };

        Ok(BracketPlan { format, matches })
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    /// 1-based seed
    Seed(usize),
    Winner(usize),
    Loser(usize),
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Winner,
    Loser,
}

#[derive(Debug)]
struct TemplateNode {
    bracket_type: BracketType,
    round: u32,
    sources: [Source; 2],
    best_of: u32,
}

#[derive(Debug, Clone, Copy)]
enum Resolved {
    Absent,
    Known(ParticipantId),
    From(usize, Side),
}

#[derive(Debug, Clone, Copy)]
enum NodeState {
    Real(Resolved, Resolved),
    PassThrough(Resolved),
    Empty,
}

fn elimination_template(
    entrants: usize,
    double: bool,
    settings: &TournamentSettings,
) -> Vec<TemplateNode> {
    let size = bracket_size(entrants);
    let rounds = round_count(entrants);
    let order = standard_order(size);
    let mut nodes: Vec<TemplateNode> = Vec::new();

    // Winners bracket
    let mut winners: Vec<Vec<usize>> = Vec::with_capacity(rounds as usize);
    let first: Vec<usize> = order
        .chunks(2)
        .map(|pair| {
            push_node(
                &mut nodes,
                BracketType::Winners,
                1,
                [Source::Seed(pair[0]), Source::Seed(pair[1])],
                settings.match_best_of,
            )
        })
        .collect();
    winners.push(first);

    for round in 2..=rounds {
        let previous = winners[winners.len() - 1].clone();
        let current = previous
            .chunks(2)
            .map(|pair| {
                push_node(
                    &mut nodes,
                    BracketType::Winners,
                    round,
                    [Source::Winner(pair[0]), Source::Winner(pair[1])],
                    settings.match_best_of,
                )
            })
            .collect();
        winners.push(current);
    }

    let winners_final = winners[winners.len() - 1][0];
    if !double {
        return nodes;
    }

    // Losers bracket: round 1 pairs winners-round-1 losers, then each
    // winners round r >= 2 drops its losers into losers round 2r-2.
    let losers_champion = if rounds == 1 {
        Source::Loser(winners_final)
    } else {
        let mut survivors: Vec<Source> = winners[0]
            .chunks(2)
            .map(|pair| {
                let node = push_node(
                    &mut nodes,
                    BracketType::Losers,
                    1,
                    [Source::Loser(pair[0]), Source::Loser(pair[1])],
                    settings.match_best_of,
                );
                Source::Winner(node)
            })
            .collect();

        for round in 2..=rounds {
            let droppers = &winners[(round - 1) as usize];
            let count = droppers.len();
            let drop_round = 2 * round - 2;

            survivors = (0..count)
                .map(|i| {
                    let k = if round % 2 == 0 { count - 1 - i } else { i };
                    let node = push_node(
                        &mut nodes,
                        BracketType::Losers,
                        drop_round,
                        [survivors[i], Source::Loser(droppers[k])],
                        settings.match_best_of,
                    );
                    Source::Winner(node)
                })
                .collect();

            if round < rounds {
                survivors = survivors
                    .chunks(2)
                    .map(|pair| {
                        let node = push_node(
                            &mut nodes,
                            BracketType::Losers,
                            drop_round + 1,
                            [pair[0], pair[1]],
                            settings.match_best_of,
                        );
                        Source::Winner(node)
                    })
                    .collect();
            }
        }

        survivors[0]
    };

    let finals_round = rounds.max(2 * rounds.saturating_sub(1)) + 1;
    push_node(
        &mut nodes,
        BracketType::Finals,
        finals_round,
        [Source::Winner(winners_final), losers_champion],
        settings.grand_final_best_of,
    );

    nodes
}

fn push_node(
    nodes: &mut Vec<TemplateNode>,
    bracket_type: BracketType,
    round: u32,
    sources: [Source; 2],
    best_of: u32,
) -> usize {
    nodes.push(TemplateNode {
        bracket_type,
        round,
        sources,
        best_of,
    });
    nodes.len() - 1
}

fn collapse(
    template: &[TemplateNode],
    participants: &[ParticipantId],
) -> EngineResult<Vec<PlannedMatch>> {
    let mut states: Vec<NodeState> = Vec::with_capacity(template.len());

    for node in template {
        let resolve = |source: Source| match source {
            Source::Seed(seed) => participants
                .get(seed - 1)
                .map_or(Resolved::Absent, |id| Resolved::Known(*id)),
            Source::Winner(j) => match states[j] {
                NodeState::Real(..) => Resolved::From(j, Side::Winner),
                NodeState::PassThrough(resolved) => resolved,
                NodeState::Empty => Resolved::Absent,
            },
            Source::Loser(j) => match states[j] {
                NodeState::Real(..) => Resolved::From(j, Side::Loser),
                NodeState::PassThrough(_) | NodeState::Empty => Resolved::Absent,
            },
        };

        let a = resolve(node.sources[0]);
        let b = resolve(node.sources[1]);
        let state = match (a, b) {
            (Resolved::Absent, Resolved::Absent) => NodeState::Empty,
            (side, Resolved::Absent) | (Resolved::Absent, side) => NodeState::PassThrough(side),
            (a, b) => NodeState::Real(a, b),
        };
        states.push(state);
    }

    let mut plan_index: Vec<Option<usize>> = vec![None; template.len()];
    let mut positions: HashMap<(BracketType, u32), u32> = HashMap::new();
    let mut matches: Vec<PlannedMatch> = Vec::new();

    for (idx, node) in template.iter().enumerate() {
        let NodeState::Real(a, b) = states[idx] else {
            continue;
        };

        let index = matches.len();
        let position = positions.entry((node.bracket_type, node.round)).or_insert(0);
        *position += 1;

        let mut slots = [PlannedSlot::Fed, PlannedSlot::Fed];
        for (slot_idx, resolved) in [a, b].into_iter().enumerate() {
            let slot = if slot_idx == 0 {
                SlotPosition::Participant1
            } else {
                SlotPosition::Participant2
            };

            slots[slot_idx] = match resolved {
                Resolved::Known(id) => PlannedSlot::Seeded(id),
                Resolved::From(source, side) => {
                    let feeder = plan_index[source].ok_or_else(|| {
                        EngineError::Integrity(format!("template node {source} feeds before it exists"))
                    })?;
                    let pointer = match side {
                        Side::Winner => &mut matches[feeder].next,
                        Side::Loser => &mut matches[feeder].loser_next,
                    };
                    if pointer.is_some() {
                        return Err(EngineError::Integrity(format!(
                            "planned match {feeder} feeds two slots"
                        )));
                    }
                    *pointer = Some(PlanFeed { index, slot });
                    PlannedSlot::Fed
                }
                Resolved::Absent => {
                    return Err(EngineError::Integrity(format!(
                        "template node {idx} has an absent side"
                    )));
                }
            };
        }

        plan_index[idx] = Some(index);
        matches.push(PlannedMatch {
            bracket_type: node.bracket_type,
            round_number: node.round,
            bracket_position: *position,
            participant1: slots[0],
            participant2: slots[1],
            next: None,
            loser_next: None,
            best_of: node.best_of,
        });
    }

    Ok(matches)
}

/// Circle method: seat 0 stays fixed, everyone else rotates one seat per round.
fn round_robin(participants: &[ParticipantId], best_of: u32) -> Vec<PlannedMatch> {
    let mut ring: Vec<Option<ParticipantId>> = participants.iter().copied().map(Some).collect();
    if ring.len() % 2 == 1 {
        ring.push(None);
    }

    let seats = ring.len();
    let mut matches = Vec::with_capacity(participants.len() * (participants.len() - 1) / 2);

    for round in 0..seats - 1 {
        let mut position = 0;
        for i in 0..seats / 2 {
            let (Some(a), Some(b)) = (ring[i], ring[seats - 1 - i]) else {
                continue;
            };
            // The fixed seat alternates sides so it is not always participant1
            let (first, second) = if i == 0 && round % 2 == 1 { (b, a) } else { (a, b) };
            position += 1;
            matches.push(PlannedMatch {
                bracket_type: BracketType::Winners,
                round_number: round as u32 + 1,
                bracket_position: position,
                participant1: PlannedSlot::Seeded(first),
                participant2: PlannedSlot::Seeded(second),
                next: None,
                loser_next: None,
                best_of,
            });
        }

        if let Some(last) = ring.pop() {
            ring.insert(1, last);
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: i64) -> Vec<ParticipantId> {
        (1..=n).collect()
    }

    fn single(n: i64) -> BracketPlan {
        BracketGenerator::generate(
            TournamentFormat::SingleElimination,
            &ids(n),
            &TournamentSettings::default(),
        )
        .unwrap()
    }

    fn double(n: i64) -> BracketPlan {
        BracketGenerator::generate(
            TournamentFormat::DoubleElimination,
            &ids(n),
            &TournamentSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_fewer_than_two() {
        let err = BracketGenerator::generate(
            TournamentFormat::SingleElimination,
            &[1],
            &TournamentSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = BracketGenerator::generate(
            TournamentFormat::RoundRobin,
            &[1, 2, 2],
            &TournamentSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_four_player_single_elimination() {
        let plan = single(4);
        assert_eq!(plan.len(), 3);

        // Seed 1 vs 4, seed 2 vs 3
        assert_eq!(plan.matches[0].participant1, PlannedSlot::Seeded(1));
        assert_eq!(plan.matches[0].participant2, PlannedSlot::Seeded(4));
        assert_eq!(plan.matches[1].participant1, PlannedSlot::Seeded(2));
        assert_eq!(plan.matches[1].participant2, PlannedSlot::Seeded(3));

        assert_eq!(
            plan.matches[0].next,
            Some(PlanFeed {
                index: 2,
                slot: SlotPosition::Participant1
            })
        );
        assert_eq!(
            plan.matches[1].next,
            Some(PlanFeed {
                index: 2,
                slot: SlotPosition::Participant2
            })
        );
        assert_eq!(plan.terminal_indices(), vec![2]);
    }

    #[test]
    fn test_byes_skip_round_one() {
        // 5 entrants in an 8 bracket: only 4 vs 5 plays in round one
        let plan = single(5);
        assert_eq!(plan.len(), 4);

        let round_one: Vec<_> = plan.matches.iter().filter(|m| m.round_number == 1).collect();
        assert_eq!(round_one.len(), 1);
        assert_eq!(round_one[0].participant1, PlannedSlot::Seeded(4));
        assert_eq!(round_one[0].participant2, PlannedSlot::Seeded(5));

        // Seed 1 waits in round two for the winner of 4 vs 5
        let seed_one = plan
            .matches
            .iter()
            .find(|m| m.participant1 == PlannedSlot::Seeded(1))
            .unwrap();
        assert_eq!(seed_one.round_number, 2);
        assert_eq!(seed_one.participant2, PlannedSlot::Fed);
    }

    #[test]
    fn test_two_player_double_elimination() {
        let plan = double(2);
        assert_eq!(plan.len(), 2);
        let winners_final = &plan.matches[0];
        assert_eq!(
            winners_final.loser_next,
            Some(PlanFeed {
                index: 1,
                slot: SlotPosition::Participant2
            })
        );
        assert_eq!(plan.matches[1].bracket_type, BracketType::Finals);
    }

    #[test]
    fn test_double_elimination_sizes() {
        // 2N - 2 matches before any bracket reset
        for n in 2..=17 {
            assert_eq!(double(n).len(), (2 * n - 2) as usize, "n = {n}");
        }
    }

    #[test]
    fn test_every_winners_match_drops_its_loser() {
        let plan = double(8);
        for m in plan.bracket(BracketType::Winners) {
            let feed = m.loser_next.expect("winners match without losers path");
            assert_ne!(plan.matches[feed.index].bracket_type, BracketType::Winners);
        }
        assert_eq!(plan.bracket(BracketType::Losers).count(), 6);
        assert_eq!(plan.terminal_indices().len(), 1);
    }

    #[test]
    fn test_grand_final_best_of() {
        let settings = TournamentSettings {
            grand_final_best_of: 3,
            ..TournamentSettings::default()
        };
        let plan =
            BracketGenerator::generate(TournamentFormat::DoubleElimination, &ids(4), &settings)
                .unwrap();
        let finals: Vec<_> = plan.bracket(BracketType::Finals).collect();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].best_of, 3);
        assert_eq!(finals[0].round_number, 3);
    }

    #[test]
    fn test_round_robin_all_pairs() {
        let plan = BracketGenerator::generate(
            TournamentFormat::RoundRobin,
            &ids(5),
            &TournamentSettings::default(),
        )
        .unwrap();
        assert_eq!(plan.len(), 10);

        let mut pairs = HashSet::new();
        let mut per_round: HashMap<u32, HashSet<ParticipantId>> = HashMap::new();
        for m in &plan.matches {
            let a = m.participant1.participant().unwrap();
            let b = m.participant2.participant().unwrap();
            assert!(pairs.insert((a.min(b), a.max(b))));
            let seen = per_round.entry(m.round_number).or_default();
            assert!(seen.insert(a), "{a} plays twice in round {}", m.round_number);
            assert!(seen.insert(b), "{b} plays twice in round {}", m.round_number);
            assert!(m.is_terminal());
        }
        assert_eq!(per_round.len(), 5);
    }
}
