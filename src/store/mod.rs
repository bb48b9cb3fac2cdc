//! Storage seams for rosters, comparison records, display assets and standings.
//!
//! The pairing core stays storage-agnostic. Callers inject implementations of
//! these traits; `MemoryStore` and `SqliteStore` ship with the crate.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::model::{AssetHandle, ComparisonKey, ParticipantId, Roster, Standing};

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreLock};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unknown participant: {0}")]
    UnknownParticipant(ParticipantId),
}

#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch_roster(&self) -> Result<Roster, StoreError>;
}

/// Per-owner list of already-compared keys.
#[async_trait]
pub trait ComparisonStore: Send + Sync {
    async fn contains(&self, owner: &ParticipantId, key: &ComparisonKey)
        -> Result<bool, StoreError>;
    async fn append(&self, owner: &ParticipantId, key: &ComparisonKey) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AssetResolver: Send + Sync {
    async fn resolve_asset(&self, participant: &ParticipantId) -> Result<AssetHandle, StoreError>;
}

#[async_trait]
pub trait Leaderboard: Send + Sync {
    async fn award(&self, winner: &ParticipantId) -> Result<(), StoreError>;
    /// Highest score first. `None` returns every participant with a score.
    async fn standings(&self, limit: Option<usize>) -> Result<Vec<Standing>, StoreError>;
}
