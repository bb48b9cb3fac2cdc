#![forbid(unsafe_code)]

//! # comparee
//!
//! Pairing core for a photo-comparison game: every round, the current user is
//! shown two *other* participants they have not compared before, picks one,
//! and the outcome is recorded so the pair is never offered to them again.
//!
//! Selection draws random candidate pairs and checks each against the
//! already-compared record store, retrying up to `n * (n - 1)` times before
//! reporting that no new comparisons remain. Storage sits behind traits in
//! [`store`], with an in-memory and a SQLite implementation included.

pub mod config;
pub mod model;
pub mod record;
pub mod selection;
pub mod session;
pub mod store;
pub mod trace;

pub use config::{ConfigError, SessionConfig};
pub use model::{
    AssetHandle, ComparisonKey, ComparisonPair, Outcome, ParticipantId, Roster, Standing,
};
pub use record::{ComparisonRecorder, KeyScheme, RecordError, RecordOracle};
pub use selection::{
    max_attempts, ComparisonOracle, OracleError, PairSelector, Presentation, SamplingStrategy,
    Selection, SelectionError, SelectionOutcomeKind,
};
pub use session::{CompareSession, Round, RoundAssets, SessionDeps, SessionError};
pub use store::{
    AssetResolver, ComparisonStore, Leaderboard, MemoryStore, RosterSource, SqliteStore,
    StoreError,
};
pub use trace::{
    JsonlSink, JsonlTraceSink, JsonlWriter, SelectionTrace, SelectionTraceSink, TraceError,
};
