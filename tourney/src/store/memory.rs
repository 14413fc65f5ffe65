//! In-memory store.

use super::{
    Change, Changeset, IdKind, StoreError, StoreResult, TournamentStore, Versioned, is_due,
};
use crate::bracket::{Match, MatchId};
use crate::lifecycle::{Dispute, DisputeId};
use crate::series::Series;
use crate::tournament::{Participant, Tournament, TournamentId, TournamentStatus, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    tournaments: BTreeMap<i64, Tournament>,
    participants: BTreeMap<i64, Participant>,
    matches: BTreeMap<i64, Match>,
    series: BTreeMap<i64, Series>,
    disputes: BTreeMap<i64, Dispute>,
}

/// Store backed by in-process maps. Commits are atomic and version-checked
/// exactly like the PostgreSQL store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored matches, games included
    pub async fn match_count(&self) -> usize {
        self.state.lock().await.matches.len()
    }
}

fn apply<T: Versioned>(table: &mut BTreeMap<i64, T>, changes: Vec<Change<T>>) -> StoreResult<()> {
    for change in changes {
        match change {
            Change::Insert(record) => {
                if table.contains_key(&record.id()) {
                    return Err(StoreError::Duplicate {
                        entity: T::ENTITY,
                        detail: format!("id {} already exists", record.id()),
                    });
                }
                table.insert(record.id(), record);
            }
            Change::Update(mut record) => {
                let current = table.get(&record.id()).ok_or(StoreError::Missing {
                    entity: T::ENTITY,
                    id: record.id(),
                })?;
                if current.version() != record.version() {
                    return Err(StoreError::VersionConflict {
                        entity: T::ENTITY,
                        id: record.id(),
                        expected: record.version(),
                    });
                }
                record.set_version(record.version() + 1);
                table.insert(record.id(), record);
            }
            Change::Delete(record) => {
                let current = table.get(&record.id()).ok_or(StoreError::Missing {
                    entity: T::ENTITY,
                    id: record.id(),
                })?;
                if current.version() != record.version() {
                    return Err(StoreError::VersionConflict {
                        entity: T::ENTITY,
                        id: record.id(),
                        expected: record.version(),
                    });
                }
                table.remove(&record.id());
            }
        }
    }
    Ok(())
}

fn check_unique_participants(participants: &BTreeMap<i64, Participant>) -> StoreResult<()> {
    let mut seen = HashSet::new();
    for p in participants.values() {
        if !seen.insert((p.tournament_id, p.user_id)) {
            return Err(StoreError::Duplicate {
                entity: "participant",
                detail: format!("user {} already in tournament {}", p.user_id, p.tournament_id),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl TournamentStore for MemoryStore {
    async fn reserve_ids(&self, _kind: IdKind, count: usize) -> StoreResult<Vec<i64>> {
        let mut state = self.state.lock().await;
        let start = state.next_id + 1;
        state.next_id += count as i64;
        Ok((start..=state.next_id).collect())
    }

    async fn get_tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        Ok(self.state.lock().await.tournaments.get(&id).cloned())
    }

    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Vec<Participant>> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .values()
            .filter(|p| p.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn find_participant(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> StoreResult<Option<Participant>> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .values()
            .find(|p| p.tournament_id == tournament_id && p.user_id == user_id)
            .cloned())
    }

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>> {
        Ok(self.state.lock().await.matches.get(&id).cloned())
    }

    async fn list_matches(&self, tournament_id: TournamentId) -> StoreResult<Vec<Match>> {
        let state = self.state.lock().await;
        Ok(state
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn list_series(&self, tournament_id: TournamentId) -> StoreResult<Vec<Series>> {
        let state = self.state.lock().await;
        Ok(state
            .series
            .values()
            .filter(|s| s.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn get_dispute(&self, id: DisputeId) -> StoreResult<Option<Dispute>> {
        Ok(self.state.lock().await.disputes.get(&id).cloned())
    }

    async fn list_disputes(&self, tournament_id: TournamentId) -> StoreResult<Vec<Dispute>> {
        let state = self.state.lock().await;
        Ok(state
            .disputes
            .values()
            .filter(|d| d.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn list_due_matches(&self, now: DateTime<Utc>) -> StoreResult<Vec<Match>> {
        let state = self.state.lock().await;
        Ok(state
            .matches
            .values()
            .filter(|m| is_due(m, now))
            .cloned()
            .collect())
    }

    async fn list_pending_disbursements(&self) -> StoreResult<Vec<TournamentId>> {
        let state = self.state.lock().await;
        Ok(state
            .tournaments
            .values()
            .filter(|t| {
                let mut participants = state
                    .participants
                    .values()
                    .filter(|p| p.tournament_id == t.id);
                match t.status {
                    TournamentStatus::Completed => {
                        participants.any(|p| p.unpaid_payout().is_some())
                    }
                    TournamentStatus::Cancelled if t.entry_fee > 0 => {
                        participants.any(|p| p.refunded_at.is_none())
                    }
                    _ => false,
                }
            })
            .map(|t| t.id)
            .collect())
    }

    async fn commit(&self, changes: Changeset) -> StoreResult<()> {
        let mut state = self.state.lock().await;

        // Apply to a copy so a failed changeset leaves nothing behind
        let mut next = state.clone();
        apply(&mut next.tournaments, changes.tournaments)?;
        apply(&mut next.participants, changes.participants)?;
        apply(&mut next.matches, changes.matches)?;
        apply(&mut next.series, changes.series)?;
        apply(&mut next.disputes, changes.disputes)?;
        check_unique_participants(&next.participants)?;

        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::NewTournament;

    #[tokio::test]
    async fn test_reserve_ids_are_increasing() {
        let store = MemoryStore::new();
        let a = store.reserve_ids(IdKind::Match, 3).await.unwrap();
        let b = store.reserve_ids(IdKind::Series, 2).await.unwrap();
        assert_eq!(a, vec![1, 2, 3]);
        assert_eq!(b, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = MemoryStore::new();
        let created = store
            .create_tournament(NewTournament::single_elimination("Cup", 4, 0), Utc::now())
            .await
            .unwrap();

        let mut renamed = created.clone();
        renamed.name = "Cup II".to_string();
        store
            .commit(Changeset {
                tournaments: vec![Change::Update(renamed.clone())],
                ..Changeset::default()
            })
            .await
            .unwrap();

        let stored = store.get_tournament(created.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.name, "Cup II");

        // Same stale version again
        let err = store
            .commit(Changeset {
                tournaments: vec![Change::Update(renamed)],
                ..Changeset::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, .. }));
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let created = store
            .create_tournament(NewTournament::single_elimination("Cup", 4, 0), now)
            .await
            .unwrap();

        let participant = |id, user| Participant {
            id,
            tournament_id: created.id,
            user_id: user,
            gamer_tag: format!("u{user}"),
            seed: None,
            checked_in: false,
            final_standing: None,
            payout_amount: None,
            payout_paid_at: None,
            refunded_at: None,
            joined_at: now,
            version: 0,
        };

        let err = store
            .commit(Changeset {
                participants: vec![
                    Change::Insert(participant(10, 7)),
                    Change::Insert(participant(11, 7)),
                ],
                ..Changeset::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert!(store.list_participants(created.id).await.unwrap().is_empty());
    }
}
