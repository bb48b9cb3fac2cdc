use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use comparee::store::{ComparisonStore, Leaderboard};
use comparee::{
    AssetHandle, AssetResolver, CompareSession, ComparisonKey, ComparisonOracle, ComparisonPair,
    ComparisonRecorder, KeyScheme, MemoryStore, ParticipantId, Presentation, RecordError,
    RecordOracle, Roster, SamplingStrategy, SelectionError, SelectionOutcomeKind, SelectionTrace,
    SelectionTraceSink, SessionConfig, SessionDeps, SessionError, StoreError, TraceError,
};

fn id(s: &str) -> ParticipantId {
    ParticipantId::new(s)
}

fn seeded(strategy: SamplingStrategy) -> SessionConfig {
    SessionConfig {
        sampling: strategy,
        rng_seed: Some(17),
        ..SessionConfig::default()
    }
}

fn populated_store(ids: &[&str]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for p in ids {
        store
            .register(*p, format!("https://cdn.example/{p}.jpg"))
            .unwrap();
    }
    store
}

#[tokio::test]
async fn round_resolves_assets_for_both_members() {
    let store = populated_store(&["A", "B", "C", "D"]);
    let mut session = CompareSession::new(
        id("A"),
        SessionDeps::from_store(store),
        seeded(SamplingStrategy::Resample),
    );
    let roster = session.start().await.unwrap();
    assert_eq!(roster.len(), 4);

    let round = session.next_round(&roster, None).await.unwrap();
    let assets = round.assets.expect("assets resolved");
    assert_eq!(&assets.a.participant, round.pair.a());
    assert_eq!(&assets.b.participant, round.pair.b());
    assert_eq!(assets.a.url, format!("https://cdn.example/{}.jpg", round.pair.a()));
}

/// Resolver that tracks how many lookups overlap.
struct BarrierResolver {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait::async_trait]
impl AssetResolver for BarrierResolver {
    async fn resolve_asset(&self, participant: &ParticipantId) -> Result<AssetHandle, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(AssetHandle {
            participant: participant.clone(),
            url: "https://cdn.example/x.jpg".into(),
        })
    }
}

#[tokio::test]
async fn asset_lookups_run_concurrently() {
    let store = populated_store(&["A", "B", "C"]);
    let resolver = Arc::new(BarrierResolver {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let deps = SessionDeps {
        assets: resolver.clone(),
        ..SessionDeps::from_store(store)
    };
    let mut session = CompareSession::new(id("A"), deps, seeded(SamplingStrategy::Resample));
    let roster = session.start().await.unwrap();
    session.next_round(&roster, None).await.unwrap();
    assert_eq!(resolver.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_asset_is_a_retryable_failure() {
    let store = populated_store(&["A", "B", "C"]);
    let deps = SessionDeps {
        // Knows no participants at all.
        assets: Arc::new(MemoryStore::new()),
        ..SessionDeps::from_store(store)
    };
    let mut session = CompareSession::new(id("A"), deps, seeded(SamplingStrategy::Resample));
    let roster = session.start().await.unwrap();
    let err = session.next_round(&roster, None).await.unwrap_err();
    assert!(matches!(err, SessionError::Asset(StoreError::UnknownParticipant(_))));
    assert_eq!(err.presentation(), Presentation::RetryAlert);
}

#[tokio::test]
async fn finishing_rounds_records_and_awards_until_exhausted() {
    let store = populated_store(&["A", "B", "C", "D"]);
    let mut session = CompareSession::new(
        id("A"),
        SessionDeps::from_store(store.clone()),
        seeded(SamplingStrategy::Exhaustive),
    );
    let roster = session.start().await.unwrap();

    let mut rounds = 0;
    loop {
        match session.next_round(&roster, None).await {
            Ok(round) => {
                let winner = round.pair.a().clone();
                let outcome = session
                    .finish_round(&round, Some(&winner))
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(outcome.winner, winner);
                rounds += 1;
            }
            Err(SessionError::Selection(e)) => {
                assert_eq!(e.kind(), SelectionOutcomeKind::NoNewComparisons);
                assert_eq!(e.presentation(), Presentation::EmptyState);
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(rounds, 3);
    assert_eq!(store.record_count(&id("A")).unwrap(), 3);

    let standings = store.standings(None).await.unwrap();
    let total: u64 = standings.iter().map(|s| s.wins).sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn winner_outside_pair_is_rejected_without_writes() {
    let store = populated_store(&["A", "B", "C"]);
    let mut session = CompareSession::new(
        id("A"),
        SessionDeps::from_store(store.clone()),
        seeded(SamplingStrategy::Resample),
    );
    let roster = session.start().await.unwrap();
    let round = session.next_round(&roster, None).await.unwrap();
    let err = session.finish_round(&round, Some(&id("A"))).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Record(RecordError::WinnerNotInPair { .. })
    ));
    assert_eq!(store.record_count(&id("A")).unwrap(), 0);
}

#[tokio::test]
async fn cancelled_round_commits_nothing() {
    let store = populated_store(&["A", "B", "C"]);
    let mut session = CompareSession::new(
        id("A"),
        SessionDeps::from_store(store.clone()),
        SessionConfig::default(),
    );
    let roster = session.start().await.unwrap();
    let cancel = AtomicBool::new(true);
    let err = session.next_round(&roster, Some(&cancel)).await.unwrap_err();
    assert!(matches!(err, SessionError::Selection(SelectionError::Cancelled)));
    assert_eq!(err.presentation(), Presentation::Silent);
    assert_eq!(store.record_count(&id("A")).unwrap(), 0);
}

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<SelectionTrace>>,
}

impl SelectionTraceSink for CollectingSink {
    fn record(&self, event: SelectionTrace) -> Result<(), TraceError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[tokio::test]
async fn trace_keeps_exhaustion_kinds_distinct() {
    let sink = Arc::new(CollectingSink::default());
    let store = populated_store(&["A", "B", "C"]);
    let mut session = CompareSession::new(
        id("A"),
        SessionDeps::from_store(store),
        seeded(SamplingStrategy::Resample),
    )
    .with_trace(sink.clone());

    let small: Roster = ["A", "B"].into_iter().collect();
    let err = session.next_round(&small, None).await.unwrap_err();
    assert_eq!(err.presentation(), Presentation::EmptyState);

    let roster = session.start().await.unwrap();
    session.next_round(&roster, None).await.unwrap();

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].outcome, SelectionOutcomeKind::NotEnoughParticipants);
    assert_eq!(events[0].attempts, 0);
    assert_eq!(events[1].outcome, SelectionOutcomeKind::Selected);
    assert_eq!(events[1].max_attempts, 2);
    assert!(events[1].pair.is_some());
}

/// Store whose appends start failing after a fixed number of successes.
struct FlakyStore {
    inner: MemoryStore,
    successes_left: AtomicUsize,
}

#[async_trait::async_trait]
impl ComparisonStore for FlakyStore {
    async fn contains(
        &self,
        owner: &ParticipantId,
        key: &ComparisonKey,
    ) -> Result<bool, StoreError> {
        self.inner.contains(owner, key).await
    }

    async fn append(&self, owner: &ParticipantId, key: &ComparisonKey) -> Result<(), StoreError> {
        let left = self.successes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Unavailable("write rejected".into()));
        }
        self.successes_left.store(left - 1, Ordering::SeqCst);
        self.inner.append(owner, key).await
    }
}

#[tokio::test]
async fn bidirectional_partial_write_reports_inconsistency() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        successes_left: AtomicUsize::new(1),
    });
    let recorder = ComparisonRecorder::new(store.clone(), KeyScheme::Bidirectional);
    let pair = ComparisonPair::new(id("B"), id("C")).unwrap();

    let err = recorder.record(&id("A"), &pair).await.unwrap_err();
    match err {
        RecordError::Inconsistent { written, failed, .. } => {
            assert_eq!(written, vec![ComparisonKey::directed(&id("B"), &id("C"))]);
            assert_eq!(failed, ComparisonKey::directed(&id("C"), &id("B")));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The surviving direction still blocks the pair from A's perspective.
    let oracle = RecordOracle::new(store.clone(), KeyScheme::Bidirectional);
    assert!(oracle.is_already_compared(&id("A"), &pair).await.unwrap());
    assert!(oracle
        .is_already_compared(&id("A"), &pair.reversed())
        .await
        .unwrap());
}

#[tokio::test]
async fn first_write_failure_is_a_plain_store_error() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        successes_left: AtomicUsize::new(0),
    });
    let recorder = ComparisonRecorder::new(store, KeyScheme::Canonical);
    let pair = ComparisonPair::new(id("B"), id("C")).unwrap();
    let err = recorder.record(&id("A"), &pair).await.unwrap_err();
    assert!(matches!(err, RecordError::Store(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn both_orderings_detected_after_record() {
    for scheme in [KeyScheme::Canonical, KeyScheme::Bidirectional] {
        let store = Arc::new(MemoryStore::new());
        let recorder = ComparisonRecorder::new(store.clone(), scheme);
        let oracle = RecordOracle::new(store.clone(), scheme);
        let pair = ComparisonPair::new(id("X"), id("Y")).unwrap();

        assert!(!oracle.is_already_compared(&id("A"), &pair).await.unwrap());
        recorder.record(&id("A"), &pair).await.unwrap();
        assert!(oracle.is_already_compared(&id("A"), &pair).await.unwrap());
        assert!(oracle
            .is_already_compared(&id("A"), &pair.reversed())
            .await
            .unwrap());
        // Records are per owner.
        assert!(!oracle.is_already_compared(&id("B"), &pair).await.unwrap());
    }
}
