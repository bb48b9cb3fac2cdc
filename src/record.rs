//! Recording finished comparisons and answering "already compared?" lookups.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::model::{ComparisonKey, ComparisonPair, Outcome, ParticipantId};
use crate::selection::{ComparisonOracle, OracleError};
use crate::store::{ComparisonStore, Leaderboard, StoreError};

/// How a pair is keyed in the owner's record list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// One key, smaller id first. Single write.
    #[default]
    Canonical,
    /// `"a + b"` and `"b + a"`, written one after the other.
    Bidirectional,
}

impl KeyScheme {
    /// Keys written when recording `pair`, in write order.
    pub fn write_keys(&self, pair: &ComparisonPair) -> Vec<ComparisonKey> {
        match self {
            KeyScheme::Canonical => vec![ComparisonKey::canonical(pair)],
            KeyScheme::Bidirectional => vec![
                ComparisonKey::directed(pair.a(), pair.b()),
                ComparisonKey::directed(pair.b(), pair.a()),
            ],
        }
    }

    /// Keys any one of which marks `pair` as already compared.
    pub fn lookup_keys(&self, pair: &ComparisonPair) -> Vec<ComparisonKey> {
        match self {
            KeyScheme::Canonical => vec![ComparisonKey::canonical(pair)],
            KeyScheme::Bidirectional => vec![
                ComparisonKey::directed(pair.a(), pair.b()),
                ComparisonKey::directed(pair.b(), pair.a()),
            ],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Some keys were written before a later write failed. Left for external reconciliation.
    #[error("recording left partial state: wrote {written:?}, failed on {failed}: {source}")]
    Inconsistent {
        written: Vec<ComparisonKey>,
        failed: ComparisonKey,
        #[source]
        source: StoreError,
    },
    #[error("{winner} is not part of the compared pair")]
    WinnerNotInPair { winner: ParticipantId },
}

/// `ComparisonOracle` over a `ComparisonStore`.
pub struct RecordOracle {
    store: Arc<dyn ComparisonStore>,
    scheme: KeyScheme,
}

impl RecordOracle {
    pub fn new(store: Arc<dyn ComparisonStore>, scheme: KeyScheme) -> Self {
        Self { store, scheme }
    }
}

#[async_trait::async_trait]
impl ComparisonOracle for RecordOracle {
    async fn is_already_compared(
        &self,
        owner: &ParticipantId,
        pair: &ComparisonPair,
    ) -> Result<bool, OracleError> {
        for key in self.scheme.lookup_keys(pair) {
            if self.store.contains(owner, &key).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub struct ComparisonRecorder {
    store: Arc<dyn ComparisonStore>,
    leaderboard: Option<Arc<dyn Leaderboard>>,
    scheme: KeyScheme,
}

impl ComparisonRecorder {
    pub fn new(store: Arc<dyn ComparisonStore>, scheme: KeyScheme) -> Self {
        Self {
            store,
            leaderboard: None,
            scheme,
        }
    }

    pub fn with_leaderboard(mut self, leaderboard: Arc<dyn Leaderboard>) -> Self {
        self.leaderboard = Some(leaderboard);
        self
    }

    pub fn scheme(&self) -> KeyScheme {
        self.scheme
    }

    /// Marks `pair` as compared by `owner`.
    pub async fn record(
        &self,
        owner: &ParticipantId,
        pair: &ComparisonPair,
    ) -> Result<(), RecordError> {
        let mut written: Vec<ComparisonKey> = Vec::new();
        for key in self.scheme.write_keys(pair) {
            if let Err(source) = self.store.append(owner, &key).await {
                if written.is_empty() {
                    return Err(RecordError::Store(source));
                }
                error!(
                    owner = %owner,
                    written = ?written,
                    failed = %key,
                    error = %source,
                    "comparison record partially written"
                );
                return Err(RecordError::Inconsistent {
                    written,
                    failed: key,
                    source,
                });
            }
            written.push(key);
        }
        debug!(owner = %owner, a = %pair.a(), b = %pair.b(), "recorded comparison");
        Ok(())
    }

    /// Records the pair, then awards the winner a point if a leaderboard is attached.
    pub async fn record_outcome(
        &self,
        owner: &ParticipantId,
        outcome: &Outcome,
    ) -> Result<(), RecordError> {
        self.record(owner, &outcome.pair()).await?;
        if let Some(leaderboard) = &self.leaderboard {
            leaderboard.award(&outcome.winner).await?;
        }
        Ok(())
    }
}
