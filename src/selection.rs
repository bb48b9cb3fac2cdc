//! Random selection of an unseen comparison pair.
//!
//! Given a roster and the current user, the selector draws a pair of two other
//! participants, asks the oracle whether the current user has already been
//! shown that pair, and retries with a fresh draw until it finds a new pair or
//! spends its attempt budget. The oracle is only ever read; recording happens
//! later through [`crate::record::ComparisonRecorder`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{ComparisonPair, ParticipantId, Roster};
use crate::store::StoreError;

/// Transport failure while checking the comparison record store.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("record store unreachable: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Message(String),
}

/// Answers whether `owner` has already been offered `pair`.
#[async_trait::async_trait]
pub trait ComparisonOracle: Send + Sync {
    async fn is_already_compared(
        &self,
        owner: &ParticipantId,
        pair: &ComparisonPair,
    ) -> Result<bool, OracleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Fresh uniform shuffle per attempt; rejected pairs may be redrawn.
    #[default]
    Resample,
    /// Draw only from pairs not yet rejected during this call.
    Exhaustive,
}

impl SamplingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingStrategy::Resample => "resample",
            SamplingStrategy::Exhaustive => "exhaustive",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("not enough participants to form a pair ({candidates} candidates)")]
    NotEnoughParticipants { candidates: usize },
    #[error("connection problem: {0}")]
    ConnectionProblem(#[source] OracleError),
    #[error("no new comparisons available after {attempts} attempts")]
    NoNewComparisonsAvailable { attempts: usize },
    #[error("selection cancelled")]
    Cancelled,
}

/// How a failed selection should be shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    /// Calm "check back later" state, not an error dialog.
    EmptyState,
    /// Modal error with a manual "try again" action.
    RetryAlert,
    /// Nothing to show; the screen went away.
    Silent,
}

/// Stable outcome label for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOutcomeKind {
    Selected,
    NotEnoughParticipants,
    NoNewComparisons,
    ConnectionProblem,
    Cancelled,
}

impl SelectionError {
    pub fn presentation(&self) -> Presentation {
        match self {
            SelectionError::NotEnoughParticipants { .. }
            | SelectionError::NoNewComparisonsAvailable { .. } => Presentation::EmptyState,
            SelectionError::ConnectionProblem(_) => Presentation::RetryAlert,
            SelectionError::Cancelled => Presentation::Silent,
        }
    }

    /// Kept distinct even where the presentation is shared.
    pub fn kind(&self) -> SelectionOutcomeKind {
        match self {
            SelectionError::NotEnoughParticipants { .. } => {
                SelectionOutcomeKind::NotEnoughParticipants
            }
            SelectionError::ConnectionProblem(_) => SelectionOutcomeKind::ConnectionProblem,
            SelectionError::NoNewComparisonsAvailable { .. } => {
                SelectionOutcomeKind::NoNewComparisons
            }
            SelectionError::Cancelled => SelectionOutcomeKind::Cancelled,
        }
    }

    /// Attempts spent before failing.
    pub fn attempts(&self) -> usize {
        match self {
            SelectionError::NoNewComparisonsAvailable { attempts } => *attempts,
            _ => 0,
        }
    }
}

/// A successful draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub pair: ComparisonPair,
    /// 1-based attempt on which the pair was accepted.
    pub attempts: usize,
    pub max_attempts: usize,
}

/// Retry budget for `candidates` participants: `n * (n - 1)`.
///
/// This counts ordered pairs while the dedup relation is unordered, so it
/// allows twice as many attempts as there are distinct pairs.
pub fn max_attempts(candidates: usize) -> usize {
    candidates.saturating_mul(candidates.saturating_sub(1))
}

pub struct PairSelector {
    strategy: SamplingStrategy,
    rng: StdRng,
}

impl PairSelector {
    pub fn new(strategy: SamplingStrategy) -> Self {
        Self {
            strategy,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(strategy: SamplingStrategy, seed: u64) -> Self {
        Self {
            strategy,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_seed_option(strategy: SamplingStrategy, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::with_seed(strategy, seed),
            None => Self::new(strategy),
        }
    }

    pub fn strategy(&self) -> SamplingStrategy {
        self.strategy
    }

    pub async fn select(
        &mut self,
        roster: &Roster,
        current: &ParticipantId,
        oracle: &dyn ComparisonOracle,
        cancel_flag: Option<&AtomicBool>,
    ) -> Result<Selection, SelectionError> {
        let candidates = roster.candidates(current);
        // The budget counts one removed occurrence of `current`; the draw pool drops all of them.
        let budget = max_attempts(candidates.len());
        let pool: Vec<ParticipantId> = candidates.into_iter().filter(|id| id != current).collect();
        if pool.len() < 2 {
            return Err(SelectionError::NotEnoughParticipants {
                candidates: pool.len(),
            });
        }

        match self.strategy {
            SamplingStrategy::Resample => {
                self.select_resample(pool, current, oracle, cancel_flag, budget)
                    .await
            }
            SamplingStrategy::Exhaustive => {
                self.select_exhaustive(&pool, current, oracle, cancel_flag, budget)
                    .await
            }
        }
    }

    async fn select_resample(
        &mut self,
        mut working: Vec<ParticipantId>,
        current: &ParticipantId,
        oracle: &dyn ComparisonOracle,
        cancel_flag: Option<&AtomicBool>,
        budget: usize,
    ) -> Result<Selection, SelectionError> {
        for attempt in 1..=budget {
            check_cancelled(cancel_flag)?;
            working.shuffle(&mut self.rng);
            // A duplicated roster entry can put the same id in both slots.
            let Some(pair) = ComparisonPair::new(working[0].clone(), working[1].clone()) else {
                debug!(attempt, participant = %working[0], "duplicate roster entry drawn twice");
                continue;
            };
            if !check_pair(oracle, current, &pair, attempt).await? {
                return Ok(Selection {
                    pair,
                    attempts: attempt,
                    max_attempts: budget,
                });
            }
        }
        Err(SelectionError::NoNewComparisonsAvailable { attempts: budget })
    }

    async fn select_exhaustive(
        &mut self,
        candidates: &[ParticipantId],
        current: &ParticipantId,
        oracle: &dyn ComparisonOracle,
        cancel_flag: Option<&AtomicBool>,
        budget: usize,
    ) -> Result<Selection, SelectionError> {
        let mut seen = HashSet::new();
        let distinct: Vec<&ParticipantId> =
            candidates.iter().filter(|id| seen.insert(*id)).collect();

        let mut remaining: Vec<ComparisonPair> = Vec::new();
        for (i, a) in distinct.iter().enumerate() {
            remaining.extend(
                distinct[i + 1..]
                    .iter()
                    .filter_map(|b| ComparisonPair::new((*a).clone(), (*b).clone())),
            );
        }

        let mut attempts = 0;
        while attempts < budget && !remaining.is_empty() {
            check_cancelled(cancel_flag)?;
            attempts += 1;
            let idx = self.rng.gen_range(0..remaining.len());
            let mut pair = remaining.swap_remove(idx);
            if self.rng.gen_bool(0.5) {
                pair = pair.reversed();
            }
            if !check_pair(oracle, current, &pair, attempts).await? {
                return Ok(Selection {
                    pair,
                    attempts,
                    max_attempts: budget,
                });
            }
        }
        Err(SelectionError::NoNewComparisonsAvailable { attempts })
    }
}

fn check_cancelled(cancel_flag: Option<&AtomicBool>) -> Result<(), SelectionError> {
    if let Some(flag) = cancel_flag {
        if flag.load(AtomicOrdering::Relaxed) {
            return Err(SelectionError::Cancelled);
        }
    }
    Ok(())
}

/// One oracle round-trip. Transport failures abort the whole selection.
async fn check_pair(
    oracle: &dyn ComparisonOracle,
    current: &ParticipantId,
    pair: &ComparisonPair,
    attempt: usize,
) -> Result<bool, SelectionError> {
    match oracle.is_already_compared(current, pair).await {
        Ok(seen) => {
            debug!(attempt, a = %pair.a(), b = %pair.b(), seen, "checked candidate pair");
            Ok(seen)
        }
        Err(e) => {
            warn!(owner = %current, attempt, error = %e, "comparison oracle failed");
            Err(SelectionError::ConnectionProblem(e))
        }
    }
}
