//! Core value types: participants, rosters, pairs and record keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque participant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Participants available for comparison in one session.
///
/// Order is whatever the roster source returned. Duplicates are tolerated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster(Vec<ParticipantId>);

impl Roster {
    pub fn new(ids: Vec<ParticipantId>) -> Self {
        Self(ids)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> &[ParticipantId] {
        &self.0
    }

    /// Working copy with the first occurrence of `current` removed. Sizes the
    /// attempt budget; pair draws additionally skip any remaining copies.
    pub fn candidates(&self, current: &ParticipantId) -> Vec<ParticipantId> {
        let mut working = self.0.clone();
        if let Some(pos) = working.iter().position(|id| id == current) {
            working.remove(pos);
        }
        working
    }
}

impl<S: Into<ParticipantId>> FromIterator<S> for Roster {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Two distinct participants offered against each other in one round.
///
/// Equality ignores order. Deserializing rejects a pair of identical ids.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "PairFields")]
pub struct ComparisonPair {
    a: ParticipantId,
    b: ParticipantId,
}

#[derive(Deserialize)]
struct PairFields {
    a: ParticipantId,
    b: ParticipantId,
}

impl TryFrom<PairFields> for ComparisonPair {
    type Error = String;

    fn try_from(fields: PairFields) -> Result<Self, Self::Error> {
        ComparisonPair::new(fields.a, fields.b)
            .ok_or_else(|| "pair members must be distinct".to_string())
    }
}

impl ComparisonPair {
    /// Returns `None` when both sides are the same participant.
    pub fn new(a: ParticipantId, b: ParticipantId) -> Option<Self> {
        if a == b {
            return None;
        }
        Some(Self { a, b })
    }

    pub fn a(&self) -> &ParticipantId {
        &self.a
    }

    pub fn b(&self) -> &ParticipantId {
        &self.b
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        &self.a == id || &self.b == id
    }

    pub fn reversed(&self) -> Self {
        Self {
            a: self.b.clone(),
            b: self.a.clone(),
        }
    }

    /// Same pair with the lexicographically smaller id first.
    pub fn canonical(&self) -> Self {
        if self.a <= self.b {
            self.clone()
        } else {
            self.reversed()
        }
    }

    /// The member that is not `id`, if `id` is part of the pair.
    pub fn other(&self, id: &ParticipantId) -> Option<&ParticipantId> {
        if &self.a == id {
            Some(&self.b)
        } else if &self.b == id {
            Some(&self.a)
        } else {
            None
        }
    }
}

impl PartialEq for ComparisonPair {
    fn eq(&self, other: &Self) -> bool {
        (self.a == other.a && self.b == other.b) || (self.a == other.b && self.b == other.a)
    }
}

impl std::hash::Hash for ComparisonPair {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let canonical = self.canonical();
        canonical.a.hash(state);
        canonical.b.hash(state);
    }
}

/// Persisted record key, stored in the owner's already-compared list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComparisonKey(String);

impl ComparisonKey {
    /// `"x + y"`.
    pub fn directed(x: &ParticipantId, y: &ParticipantId) -> Self {
        Self(format!("{x} + {y}"))
    }

    pub fn canonical(pair: &ComparisonPair) -> Self {
        let pair = pair.canonical();
        Self::directed(&pair.a, &pair.b)
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComparisonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a finished round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub winner: ParticipantId,
    pub loser: ParticipantId,
}

impl Outcome {
    /// `None` when `winner` is not a member of `pair`.
    pub fn from_pair(pair: &ComparisonPair, winner: &ParticipantId) -> Option<Self> {
        let loser = pair.other(winner)?.clone();
        Some(Self {
            winner: winner.clone(),
            loser,
        })
    }

    pub fn pair(&self) -> ComparisonPair {
        ComparisonPair {
            a: self.winner.clone(),
            b: self.loser.clone(),
        }
    }
}

/// Downloadable display asset for a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetHandle {
    pub participant: ParticipantId,
    pub url: String,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub participant: ParticipantId,
    pub wins: u64,
}
