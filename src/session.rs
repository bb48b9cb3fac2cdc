//! Compare session: the explicit state object driving fetch, select, resolve, record.
//!
//! The caller owns the roster returned by [`CompareSession::start`] and passes
//! it back into every round, so nothing about the roster lives inside the
//! session between calls.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::model::{AssetHandle, ComparisonPair, Outcome, ParticipantId, Roster};
use crate::record::{ComparisonRecorder, RecordError, RecordOracle};
use crate::selection::{max_attempts, PairSelector, Presentation, Selection, SelectionError};
use crate::store::{AssetResolver, ComparisonStore, Leaderboard, RosterSource, StoreError};
use crate::trace::{SelectionTrace, SelectionTraceSink};

/// Collaborators injected into a session.
#[derive(Clone)]
pub struct SessionDeps {
    pub roster: Arc<dyn RosterSource>,
    pub records: Arc<dyn ComparisonStore>,
    pub assets: Arc<dyn AssetResolver>,
    pub leaderboard: Option<Arc<dyn Leaderboard>>,
}

impl SessionDeps {
    /// All collaborators backed by one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: RosterSource + ComparisonStore + AssetResolver + Leaderboard + 'static,
    {
        Self {
            roster: store.clone(),
            records: store.clone(),
            assets: store.clone(),
            leaderboard: Some(store),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("roster fetch failed: {0}")]
    Roster(#[source] StoreError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("asset resolution failed: {0}")]
    Asset(#[source] StoreError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

impl SessionError {
    pub fn presentation(&self) -> Presentation {
        match self {
            SessionError::Selection(e) => e.presentation(),
            _ => Presentation::RetryAlert,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundAssets {
    pub a: AssetHandle,
    pub b: AssetHandle,
}

/// One pair ready to be shown.
#[derive(Debug, Clone, Serialize)]
pub struct Round {
    pub pair: ComparisonPair,
    pub attempts: usize,
    pub max_attempts: usize,
    pub assets: Option<RoundAssets>,
}

pub struct CompareSession {
    owner: ParticipantId,
    deps: SessionDeps,
    config: SessionConfig,
    selector: PairSelector,
    oracle: RecordOracle,
    recorder: ComparisonRecorder,
    trace: Option<Arc<dyn SelectionTraceSink>>,
}

impl CompareSession {
    pub fn new(owner: ParticipantId, deps: SessionDeps, config: SessionConfig) -> Self {
        let selector = PairSelector::from_seed_option(config.sampling, config.rng_seed);
        let oracle = RecordOracle::new(deps.records.clone(), config.key_scheme);
        let mut recorder = ComparisonRecorder::new(deps.records.clone(), config.key_scheme);
        if let Some(leaderboard) = &deps.leaderboard {
            recorder = recorder.with_leaderboard(leaderboard.clone());
        }
        Self {
            owner,
            deps,
            config,
            selector,
            oracle,
            recorder,
            trace: None,
        }
    }

    pub fn with_trace(mut self, sink: Arc<dyn SelectionTraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn owner(&self) -> &ParticipantId {
        &self.owner
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Fetches a fresh roster for this session.
    pub async fn start(&self) -> Result<Roster, SessionError> {
        let roster = self
            .deps
            .roster
            .fetch_roster()
            .await
            .map_err(SessionError::Roster)?;
        info!(owner = %self.owner, roster_size = roster.len(), "compare session started");
        Ok(roster)
    }

    /// Selects the next unseen pair and resolves its display assets.
    ///
    /// If `cancel_flag` is raised at any point before returning, the round is
    /// discarded with `SelectionError::Cancelled`.
    pub async fn next_round(
        &mut self,
        roster: &Roster,
        cancel_flag: Option<&AtomicBool>,
    ) -> Result<Round, SessionError> {
        let result = self
            .selector
            .select(roster, &self.owner, &self.oracle, cancel_flag)
            .await;
        self.emit_trace(roster, &result);
        let selection = result?;

        let assets = if self.config.resolve_assets {
            let (a, b) = futures::future::try_join(
                self.deps.assets.resolve_asset(selection.pair.a()),
                self.deps.assets.resolve_asset(selection.pair.b()),
            )
            .await
            .map_err(SessionError::Asset)?;
            Some(RoundAssets { a, b })
        } else {
            None
        };

        if let Some(flag) = cancel_flag {
            if flag.load(AtomicOrdering::Relaxed) {
                return Err(SelectionError::Cancelled.into());
            }
        }

        Ok(Round {
            pair: selection.pair,
            attempts: selection.attempts,
            max_attempts: selection.max_attempts,
            assets,
        })
    }

    /// Records the round. With a winner, also awards the win.
    pub async fn finish_round(
        &self,
        round: &Round,
        winner: Option<&ParticipantId>,
    ) -> Result<Option<Outcome>, SessionError> {
        match winner {
            Some(winner) => {
                let outcome = Outcome::from_pair(&round.pair, winner).ok_or_else(|| {
                    RecordError::WinnerNotInPair {
                        winner: winner.clone(),
                    }
                })?;
                self.recorder.record_outcome(&self.owner, &outcome).await?;
                Ok(Some(outcome))
            }
            None => {
                self.recorder.record(&self.owner, &round.pair).await?;
                Ok(None)
            }
        }
    }

    fn emit_trace(
        &self,
        roster: &Roster,
        result: &Result<Selection, SelectionError>,
    ) {
        let Some(sink) = &self.trace else {
            return;
        };
        let candidates = roster.candidates(&self.owner).len();
        let event = SelectionTrace::from_result(
            &self.owner,
            self.selector.strategy(),
            roster.len(),
            max_attempts(candidates),
            result,
        );
        if let Err(e) = sink.record(event) {
            warn!(error = %e, "failed to record selection trace");
        }
    }
}
