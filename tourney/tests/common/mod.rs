//! Shared setup for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use tokio::sync::mpsc;
use tourney::bracket::{Match, MatchStatus, Slot};
use tourney::tournament::{NewTournament, Participant, Tournament, TournamentId, UserId};
use tourney::{
    ChannelNotifier, EngineConfig, EngineEvent, MemoryLedger, MemoryStore, TournamentEngine,
};

pub const STARTING_BALANCE: i64 = 100;

pub struct Harness {
    pub engine: TournamentEngine,
    pub ledger: Arc<MemoryLedger>,
    pub events: mpsc::Receiver<EngineEvent>,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let (notifier, events) = ChannelNotifier::channel(1024);
    let engine = TournamentEngine::new(
        Arc::new(MemoryStore::new()),
        ledger.clone(),
        Arc::new(notifier),
        config,
    );
    Harness {
        engine,
        ledger,
        events,
    }
}

impl Harness {
    /// Create a tournament and register `players` in order, funding each first
    pub async fn create_with_players(
        &self,
        new: NewTournament,
        players: &[(UserId, &str)],
    ) -> Tournament {
        let tournament = self
            .engine
            .tournaments()
            .create(new)
            .await
            .expect("create tournament");

        for (user_id, tag) in players {
            self.ledger.fund(*user_id, STARTING_BALANCE).await;
            self.engine
                .tournaments()
                .join(tournament.id, *user_id, tag)
                .await
                .expect("join");
        }

        self.engine
            .tournaments()
            .get(tournament.id)
            .await
            .expect("reload tournament")
    }

    pub async fn participant(&self, tournament_id: TournamentId, user_id: UserId) -> Participant {
        self.engine
            .tournaments()
            .participants(tournament_id)
            .await
            .expect("participants")
            .into_iter()
            .find(|p| p.user_id == user_id)
            .expect("user is registered")
    }

    /// The playable match between two users
    pub async fn match_between(&self, tournament_id: TournamentId, a: UserId, b: UserId) -> Match {
        let pa = self.participant(tournament_id, a).await.id;
        let pb = self.participant(tournament_id, b).await.id;

        self.engine
            .matches()
            .list_matches(tournament_id)
            .await
            .expect("matches")
            .into_iter()
            .find(|m| {
                m.involves(pa)
                    && m.involves(pb)
                    && !m.is_anchor()
                    && matches!(m.status, MatchStatus::Scheduled | MatchStatus::Live)
            })
            .unwrap_or_else(|| panic!("no open match between users {a} and {b}"))
    }

    /// Winner reports 2-1, loser confirms
    pub async fn play(&self, tournament_id: TournamentId, winner: UserId, loser: UserId) -> Match {
        let m = self.match_between(tournament_id, winner, loser).await;
        let (s1, s2) = scores_for(&m, self.participant(tournament_id, winner).await.id);

        self.engine
            .matches()
            .report(m.id, winner, s1, s2, None)
            .await
            .expect("report");
        self.engine
            .matches()
            .confirm(m.id, loser)
            .await
            .expect("confirm")
    }

    /// Events dispatched so far
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Scores that make `winner` win `m`
pub fn scores_for(m: &Match, winner: tourney::tournament::ParticipantId) -> (i32, i32) {
    if m.participant1 == Slot::Occupied(winner) {
        (2, 1)
    } else {
        (1, 2)
    }
}

pub fn event_names(events: &[EngineEvent]) -> Vec<&'static str> {
    events.iter().map(EngineEvent::name).collect()
}
