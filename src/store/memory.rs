//! In-process store backed by mutex-guarded maps.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{AssetResolver, ComparisonStore, Leaderboard, RosterSource, StoreError};
use crate::model::{AssetHandle, ComparisonKey, ParticipantId, Roster, Standing};

#[derive(Debug, Default)]
struct State {
    roster: Vec<ParticipantId>,
    assets: HashMap<ParticipantId, String>,
    records: HashMap<ParticipantId, HashSet<ComparisonKey>>,
    wins: HashMap<ParticipantId, u64>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant to the roster. Re-registering only updates the asset URL.
    pub fn register(
        &self,
        id: impl Into<ParticipantId>,
        asset_url: impl Into<String>,
    ) -> Result<(), StoreError> {
        let id = id.into();
        self.with_state(|state| {
            if !state.roster.contains(&id) {
                state.roster.push(id.clone());
            }
            state.assets.insert(id, asset_url.into());
            Ok(())
        })
    }

    /// Number of keys stored for `owner`.
    pub fn record_count(&self, owner: &ParticipantId) -> Result<usize, StoreError> {
        self.with_state(|state| Ok(state.records.get(owner).map_or(0, HashSet::len)))
    }

    fn with_state<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut State) -> Result<R, StoreError>,
    {
        let mut guard = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut guard)
    }
}

#[async_trait]
impl RosterSource for MemoryStore {
    async fn fetch_roster(&self) -> Result<Roster, StoreError> {
        self.with_state(|state| Ok(Roster::new(state.roster.clone())))
    }
}

#[async_trait]
impl ComparisonStore for MemoryStore {
    async fn contains(
        &self,
        owner: &ParticipantId,
        key: &ComparisonKey,
    ) -> Result<bool, StoreError> {
        self.with_state(|state| {
            Ok(state
                .records
                .get(owner)
                .is_some_and(|keys| keys.contains(key)))
        })
    }

    async fn append(&self, owner: &ParticipantId, key: &ComparisonKey) -> Result<(), StoreError> {
        self.with_state(|state| {
            state
                .records
                .entry(owner.clone())
                .or_default()
                .insert(key.clone());
            Ok(())
        })
    }
}

#[async_trait]
impl AssetResolver for MemoryStore {
    async fn resolve_asset(&self, participant: &ParticipantId) -> Result<AssetHandle, StoreError> {
        self.with_state(|state| {
            let url = state
                .assets
                .get(participant)
                .ok_or_else(|| StoreError::UnknownParticipant(participant.clone()))?;
            Ok(AssetHandle {
                participant: participant.clone(),
                url: url.clone(),
            })
        })
    }
}

#[async_trait]
impl Leaderboard for MemoryStore {
    async fn award(&self, winner: &ParticipantId) -> Result<(), StoreError> {
        self.with_state(|state| {
            *state.wins.entry(winner.clone()).or_insert(0) += 1;
            Ok(())
        })
    }

    async fn standings(&self, limit: Option<usize>) -> Result<Vec<Standing>, StoreError> {
        self.with_state(|state| {
            let mut rows: Vec<Standing> = state
                .wins
                .iter()
                .map(|(participant, wins)| Standing {
                    participant: participant.clone(),
                    wins: *wins,
                })
                .collect();
            rows.sort_by(|a, b| {
                b.wins
                    .cmp(&a.wins)
                    .then_with(|| a.participant.cmp(&b.participant))
            });
            if let Some(limit) = limit {
                rows.truncate(limit);
            }
            Ok(rows)
        })
    }
}
