//! Unit of work over one tournament.
//!
//! A [`TournamentSession`] loads the tournament aggregate (participants,
//! matches, series, disputes), lets synchronous domain code mutate it, and
//! writes only what changed in a single version-guarded commit. Records
//! created during the session carry negative provisional ids until the commit
//! reserves real ones.

use crate::bracket::{Match, MatchId};
use crate::errors::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::lifecycle::{Dispute, DisputeId};
use crate::series::{Series, SeriesId};
use crate::store::{Change, Changeset, IdKind, StoreError, TournamentStore};
use crate::tournament::{Participant, ParticipantId, Tournament, TournamentId, UserId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Clean,
    Dirty,
    New,
}

#[derive(Debug, Clone)]
struct Tracked<T> {
    record: T,
    state: TrackState,
}

impl<T> Tracked<T> {
    fn clean(record: T) -> Self {
        Self {
            record,
            state: TrackState::Clean,
        }
    }

    fn new(record: T) -> Self {
        Self {
            record,
            state: TrackState::New,
        }
    }

    fn get_mut(&mut self) -> &mut T {
        if self.state == TrackState::Clean {
            self.state = TrackState::Dirty;
        }
        &mut self.record
    }
}

/// Provisional-to-real id assignments made by a commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    assigned: HashMap<i64, i64>,
}

impl IdMap {
    /// Real id for `id`; ids that were never provisional map to themselves
    pub fn resolve(&self, id: i64) -> i64 {
        self.assigned.get(&id).copied().unwrap_or(id)
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Default)]
pub struct Committed {
    pub events: Vec<EngineEvent>,
    pub ids: IdMap,
}

/// Loaded tournament aggregate with change tracking
#[derive(Debug, Clone)]
pub struct TournamentSession {
    tournament: Tracked<Tournament>,
    participants: BTreeMap<ParticipantId, Tracked<Participant>>,
    matches: BTreeMap<MatchId, Tracked<Match>>,
    series: BTreeMap<SeriesId, Tracked<Series>>,
    disputes: BTreeMap<DisputeId, Tracked<Dispute>>,
    removed_participants: Vec<Participant>,
    events: Vec<EngineEvent>,
    next_provisional: i64,
}

impl TournamentSession {
    /// Load the full aggregate of a tournament
    pub async fn load(
        store: &dyn TournamentStore,
        tournament_id: TournamentId,
    ) -> EngineResult<Self> {
        let tournament = store
            .get_tournament(tournament_id)
            .await?
            .ok_or_else(|| EngineError::not_found("tournament", tournament_id))?;
        let participants = store.list_participants(tournament_id).await?;
        let matches = store.list_matches(tournament_id).await?;
        let series = store.list_series(tournament_id).await?;
        let disputes = store.list_disputes(tournament_id).await?;

        Ok(Self::from_records(
            tournament,
            participants,
            matches,
            series,
            disputes,
        ))
    }

    pub fn from_records(
        tournament: Tournament,
        participants: Vec<Participant>,
        matches: Vec<Match>,
        series: Vec<Series>,
        disputes: Vec<Dispute>,
    ) -> Self {
        Self {
            tournament: Tracked::clean(tournament),
            participants: participants
                .into_iter()
                .map(|p| (p.id, Tracked::clean(p)))
                .collect(),
            matches: matches
                .into_iter()
                .map(|m| (m.id, Tracked::clean(m)))
                .collect(),
            series: series
                .into_iter()
                .map(|s| (s.id, Tracked::clean(s)))
                .collect(),
            disputes: disputes
                .into_iter()
                .map(|d| (d.id, Tracked::clean(d)))
                .collect(),
            removed_participants: Vec::new(),
            events: Vec::new(),
            next_provisional: -1,
        }
    }

    /// Fresh negative id for a record created in this session
    pub fn provisional_id(&mut self) -> i64 {
        let id = self.next_provisional;
        self.next_provisional -= 1;
        id
    }

    pub fn tournament(&self) -> &Tournament {
        &self.tournament.record
    }

    /// Mutable tournament. Always written back on commit, which also
    /// serializes concurrent sessions that touch it.
    pub fn tournament_mut(&mut self) -> &mut Tournament {
        self.tournament.get_mut()
    }

    pub fn participant(&self, id: ParticipantId) -> EngineResult<&Participant> {
        self.participants
            .get(&id)
            .map(|t| &t.record)
            .ok_or_else(|| EngineError::not_found("participant", id))
    }

    pub fn participant_mut(&mut self, id: ParticipantId) -> EngineResult<&mut Participant> {
        self.participants
            .get_mut(&id)
            .map(Tracked::get_mut)
            .ok_or_else(|| EngineError::not_found("participant", id))
    }

    pub fn participant_by_user(&self, user_id: UserId) -> Option<&Participant> {
        self.participants()
            .find(|p| p.user_id == user_id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values().map(|t| &t.record)
    }

    pub fn insert_participant(&mut self, participant: Participant) {
        self.participants
            .insert(participant.id, Tracked::new(participant));
    }

    /// Drop a participant. Stored rows are deleted on commit.
    pub fn remove_participant(&mut self, id: ParticipantId) -> EngineResult<Participant> {
        let tracked = self
            .participants
            .remove(&id)
            .ok_or_else(|| EngineError::not_found("participant", id))?;
        if tracked.state != TrackState::New {
            self.removed_participants.push(tracked.record.clone());
        }
        Ok(tracked.record)
    }

    pub fn get_match(&self, id: MatchId) -> EngineResult<&Match> {
        self.matches
            .get(&id)
            .map(|t| &t.record)
            .ok_or_else(|| EngineError::not_found("match", id))
    }

    pub fn match_mut(&mut self, id: MatchId) -> EngineResult<&mut Match> {
        self.matches
            .get_mut(&id)
            .map(Tracked::get_mut)
            .ok_or_else(|| EngineError::not_found("match", id))
    }

    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.matches.values().map(|t| &t.record)
    }

    pub fn insert_match(&mut self, m: Match) {
        self.matches.insert(m.id, Tracked::new(m));
    }

    #[cfg(test)]
    pub fn series(&self, id: SeriesId) -> EngineResult<&Series> {
        self.series
            .get(&id)
            .map(|t| &t.record)
            .ok_or_else(|| EngineError::not_found("series", id))
    }

    pub fn series_mut(&mut self, id: SeriesId) -> EngineResult<&mut Series> {
        self.series
            .get_mut(&id)
            .map(Tracked::get_mut)
            .ok_or_else(|| EngineError::not_found("series", id))
    }

    pub fn insert_series(&mut self, series: Series) {
        self.series.insert(series.id, Tracked::new(series));
    }

    pub fn dispute(&self, id: DisputeId) -> EngineResult<&Dispute> {
        self.disputes
            .get(&id)
            .map(|t| &t.record)
            .ok_or_else(|| EngineError::not_found("dispute", id))
    }

    pub fn dispute_mut(&mut self, id: DisputeId) -> EngineResult<&mut Dispute> {
        self.disputes
            .get_mut(&id)
            .map(Tracked::get_mut)
            .ok_or_else(|| EngineError::not_found("dispute", id))
    }

    pub fn insert_dispute(&mut self, dispute: Dispute) {
        self.disputes.insert(dispute.id, Tracked::new(dispute));
    }

    /// The unresolved dispute on a match, if any
    pub fn open_dispute_for(&self, match_id: MatchId) -> Option<&Dispute> {
        self.disputes
            .values()
            .map(|t| &t.record)
            .find(|d| d.match_id == match_id && d.is_unresolved())
    }

    /// Queue an event for dispatch after a successful commit
    pub fn emit(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    #[cfg(test)]
    pub fn has_changes(&self) -> bool {
        self.tournament.state != TrackState::Clean
            || !self.removed_participants.is_empty()
            || self.participants.values().any(|t| t.state != TrackState::Clean)
            || self.matches.values().any(|t| t.state != TrackState::Clean)
            || self.series.values().any(|t| t.state != TrackState::Clean)
            || self.disputes.values().any(|t| t.state != TrackState::Clean)
    }

    /// Reserve real ids, build the changeset and write it atomically
    pub async fn commit(self, store: &dyn TournamentStore) -> Result<Committed, StoreError> {
        let mut ids = IdMap::default();
        reserve(store, IdKind::Participant, self.participants.keys(), &mut ids).await?;
        reserve(store, IdKind::Match, self.matches.keys(), &mut ids).await?;
        reserve(store, IdKind::Series, self.series.keys(), &mut ids).await?;
        reserve(store, IdKind::Dispute, self.disputes.keys(), &mut ids).await?;

        let mut changes = Changeset::default();
        if let Some(change) = to_change(self.tournament) {
            changes.tournaments.push(change);
        }
        for tracked in self.participants.into_values() {
            changes.participants.extend(to_change(tracked).map(|change| {
                change.map(|mut p| {
                    p.id = ids.resolve(p.id);
                    p
                })
            }));
        }
        changes
            .participants
            .extend(self.removed_participants.into_iter().map(Change::Delete));
        for tracked in self.matches.into_values() {
            changes
                .matches
                .extend(to_change(tracked).map(|change| change.map(|m| remap_match(m, &ids))));
        }
        for tracked in self.series.into_values() {
            changes.series.extend(to_change(tracked).map(|change| {
                change.map(|mut s| {
                    s.id = ids.resolve(s.id);
                    s.anchor_match_id = ids.resolve(s.anchor_match_id);
                    s
                })
            }));
        }
        for tracked in self.disputes.into_values() {
            changes.disputes.extend(to_change(tracked).map(|change| {
                change.map(|mut d| {
                    d.id = ids.resolve(d.id);
                    d.match_id = ids.resolve(d.match_id);
                    d
                })
            }));
        }

        if !changes.is_empty() {
            store.commit(changes).await?;
        }

        let mut events = self.events;
        for event in &mut events {
            event.remap_ids(|id| ids.resolve(id));
        }

        Ok(Committed { events, ids })
    }
}

async fn reserve<'a>(
    store: &dyn TournamentStore,
    kind: IdKind,
    keys: impl Iterator<Item = &'a i64>,
    ids: &mut IdMap,
) -> Result<(), StoreError> {
    // Provisional ids are negative and sort first
    let provisional: Vec<i64> = keys.copied().filter(|id| *id < 0).collect();
    if provisional.is_empty() {
        return Ok(());
    }

    let reserved = store.reserve_ids(kind, provisional.len()).await?;
    if reserved.len() != provisional.len() {
        return Err(StoreError::Corrupt {
            table: kind.table(),
            detail: format!(
                "reserved {} ids for {} records",
                reserved.len(),
                provisional.len()
            ),
        });
    }

    ids.assigned.extend(provisional.into_iter().zip(reserved));
    Ok(())
}

fn to_change<T>(tracked: Tracked<T>) -> Option<Change<T>> {
    match tracked.state {
        TrackState::Clean => None,
        TrackState::Dirty => Some(Change::Update(tracked.record)),
        TrackState::New => Some(Change::Insert(tracked.record)),
    }
}

fn remap_match(mut m: Match, ids: &IdMap) -> Match {
    m.id = ids.resolve(m.id);
    if let Some(feed) = m.next_match.as_mut() {
        feed.match_id = ids.resolve(feed.match_id);
    }
    if let Some(feed) = m.loser_next_match.as_mut() {
        feed.match_id = ids.resolve(feed.match_id);
    }
    m.series_id = m.series_id.map(|id| ids.resolve(id));
    m
}
