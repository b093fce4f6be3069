use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use models::{OfficeState, Presence, Presentation, Transaction};
use rules::{ClassificationCriteria, Predicate};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::{CachedState, Offer};
use crate::clock::Clock;
use crate::freshness::FreshnessPolicy;
use crate::mirror::StatusMirror;

/// Shown when there is no fresh evidence but the tracker says "in the office".
pub const CONTRADICTION_REASON: &str = "(but they said they would be)";

/// Receives every change of the derived presentation.
#[async_trait]
pub trait PresenceSink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(
        &self,
        presentation: &Presentation,
        transaction: Option<&Transaction>,
    ) -> anyhow::Result<()>;
}

/// What happened to an ingested transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    NotQualifying(Predicate),
    /// Qualified, but not newer than the cached transaction.
    Stale,
    /// Became the cached transaction. `changed` is true if the sinks fired.
    Applied { changed: bool },
}

/// Point-in-time view for read handlers.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub presentation: Presentation,
    pub transaction: Option<Transaction>,
}

/// Formats minor units spent as dollars: `-550` is `$5.50`, `550` is `-$5.50`.
pub fn format_amount(units: i64) -> String {
    let spent = -(units as i128);
    let sign = if spent < 0 { "-" } else { "" };
    let abs = spent.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

/// Owns the cached state and turns transactions and timer ticks into
/// presentations, dispatching to sinks only when the output changes.
///
/// Dispatches run one at a time through `dispatch_lane`, and a presentation
/// that a later change has superseded is never sent. The last thing a sink
/// receives is always the currently recorded presentation.
pub struct Reconciler {
    criteria: ClassificationCriteria,
    freshness: FreshnessPolicy,
    clock: Arc<dyn Clock>,
    mirror: Arc<StatusMirror>,
    state: Mutex<CachedState>,
    dispatch_lane: tokio::sync::Mutex<()>,
    sinks: Vec<Arc<dyn PresenceSink>>,
    assert_office: bool,
}

impl Reconciler {
    pub fn new(
        criteria: ClassificationCriteria,
        freshness: FreshnessPolicy,
        clock: Arc<dyn Clock>,
        mirror: Arc<StatusMirror>,
    ) -> Self {
        Self {
            criteria,
            freshness,
            clock,
            mirror,
            state: Mutex::new(CachedState::new()),
            dispatch_lane: tokio::sync::Mutex::new(()),
            sinks: Vec::new(),
            assert_office: false,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PresenceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Ask the office tracker to record a work-from-office day when a
    /// transaction makes presence "yes" and nothing is tracked yet.
    pub fn with_office_assertion(mut self, enabled: bool) -> Self {
        self.assert_office = enabled;
        self
    }

    pub fn criteria(&self) -> &ClassificationCriteria {
        &self.criteria
    }

    fn tz(&self) -> Tz {
        self.criteria.reference_tz
    }

    fn lock_state(&self) -> MutexGuard<'_, CachedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn derive(
        &self,
        cached: Option<&Transaction>,
        now: DateTime<Utc>,
        office: OfficeState,
    ) -> Presentation {
        let present = self.freshness.is_fresh(cached, now, self.tz());

        let reason = match cached {
            Some(tx) if present => format!(
                "{}, {} at {}",
                tx.description,
                format_amount(tx.amount),
                tx.created_at.with_timezone(&self.tz()).format("%H:%M")
            ),
            _ if office == OfficeState::WorkFromOffice => CONTRADICTION_REASON.to_string(),
            _ => String::new(),
        };

        Presentation {
            presence: Presence::from_bool(present),
            reason,
        }
    }

    /// Classifies `tx`, merges it into the cache and notifies sinks if the
    /// derived presentation changed.
    pub async fn on_transaction(&self, tx: Transaction) -> Ingest {
        if let Some(failed) = self.criteria.first_failure(&tx) {
            tracing::info!(id = %tx.id, reason = %failed, "Transaction does not meet criteria");
            return Ingest::NotQualifying(failed);
        }

        let now = self.clock.now();
        let today = self.mirror.today();
        let office = self.mirror.state_for(today);

        let (presentation, changed, generation) = {
            let mut state = self.lock_state();
            if state.offer(tx.clone()) == Offer::Rejected {
                tracing::debug!(id = %tx.id, created_at = %tx.created_at, "Ignoring stale transaction");
                return Ingest::Stale;
            }
            let presentation = self.derive(state.latest(), now, office);
            let changed = state.record(presentation.clone());
            (presentation, changed, state.generation())
        };

        tracing::info!(id = %tx.id, presence = %presentation.presence, changed, "Stored qualifying transaction");

        if changed {
            self.dispatch(generation, &presentation, Some(&tx)).await;
        }

        if self.assert_office
            && presentation.presence.is_present()
            && office == OfficeState::Untracked
        {
            let mirror = Arc::clone(&self.mirror);
            tokio::spawn(async move {
                match mirror.service().assert_work_from_office(today).await {
                    Ok(()) => {
                        mirror.record_assertion(today);
                        tracing::info!(%today, "Asserted work from office");
                    }
                    Err(e) => tracing::warn!(%today, "Failed to assert work from office: {e:#}"),
                }
            });
        }

        Ingest::Applied { changed }
    }

    /// Re-derives the presentation without new input, e.g. after a day
    /// boundary or a mirror poll. Returns true if the presentation changed.
    pub async fn refresh(&self) -> bool {
        let now = self.clock.now();
        let office = self.mirror.state_for(self.mirror.today());

        let (presentation, transaction, changed, generation) = {
            let mut state = self.lock_state();
            let presentation = self.derive(state.latest(), now, office);
            let changed = state.record(presentation.clone());
            (presentation, state.latest().cloned(), changed, state.generation())
        };

        if changed {
            tracing::info!(presence = %presentation.presence, "Presence changed on refresh");
            self.dispatch(generation, &presentation, transaction.as_ref()).await;
        }
        changed
    }

    /// Seeds the cache with a previously persisted transaction and records
    /// the derived output as the baseline, without notifying anyone.
    pub fn prime(&self, persisted: Option<Transaction>) {
        let now = self.clock.now();
        let office = self.mirror.state_for(self.mirror.today());

        let mut state = self.lock_state();
        if let Some(tx) = persisted {
            state.offer(tx);
        }
        let presentation = self.derive(state.latest(), now, office);
        state.record(presentation);
    }

    /// Current presentation derived against now. No I/O.
    pub fn snapshot(&self) -> Snapshot {
        let now = self.clock.now();
        let office = self.mirror.state_for(self.mirror.today());

        let state = self.lock_state();
        Snapshot {
            presentation: self.derive(state.latest(), now, office),
            transaction: state.latest().cloned(),
        }
    }

    async fn dispatch(
        &self,
        generation: u64,
        presentation: &Presentation,
        transaction: Option<&Transaction>,
    ) {
        let _lane = self.dispatch_lane.lock().await;
        let current = self.lock_state().generation();
        if current != generation {
            tracing::debug!(generation, current, "Skipping superseded presentation");
            return;
        }
        for sink in &self.sinks {
            if let Err(e) = sink.publish(presentation, transaction).await {
                tracing::warn!(sink = sink.name(), "Sink failed: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::mirror::tests::FakeOffice;
    use rules::DEFAULT_TIMEZONE;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<Presentation>>,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.published.lock().unwrap().len()
        }

        fn last(&self) -> Option<Presentation> {
            self.published.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl PresenceSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn publish(
            &self,
            presentation: &Presentation,
            _transaction: Option<&Transaction>,
        ) -> anyhow::Result<()> {
            self.published.lock().unwrap().push(presentation.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl PresenceSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn publish(&self, _: &Presentation, _: Option<&Transaction>) -> anyhow::Result<()> {
            anyhow::bail!("webhook unreachable")
        }
    }

    /// Takes a while to deliver "yes", recording presences in delivery order.
    #[derive(Default)]
    struct SlowSink {
        delivered: Mutex<Vec<Presence>>,
        started: tokio::sync::Notify,
    }

    #[async_trait]
    impl PresenceSink for SlowSink {
        fn name(&self) -> &str {
            "slow"
        }

        async fn publish(&self, presentation: &Presentation, _: Option<&Transaction>) -> anyhow::Result<()> {
            if presentation.presence.is_present() {
                self.started.notify_one();
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.delivered.lock().unwrap().push(presentation.presence);
            Ok(())
        }
    }

    struct Fixture {
        clock: Arc<FixedClock>,
        office: Arc<FakeOffice>,
        mirror: Arc<StatusMirror>,
        sink: Arc<RecordingSink>,
        reconciler: Reconciler,
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn fixture(freshness: FreshnessPolicy) -> Fixture {
        // Tuesday 2024-05-14 09:00 AEST
        let clock = Arc::new(FixedClock::new(utc("2024-05-13T23:00:00Z")));
        let office = FakeOffice::returning(OfficeState::Untracked);
        let mirror = Arc::new(StatusMirror::new(
            office.clone(),
            clock.clone(),
            DEFAULT_TIMEZONE,
            Duration::from_secs(1),
        ));
        let sink = Arc::new(RecordingSink::default());
        let reconciler = Reconciler::new(
            ClassificationCriteria::default(),
            freshness,
            clock.clone(),
            mirror.clone(),
        )
        .with_sink(sink.clone());

        Fixture {
            clock,
            office,
            mirror,
            sink,
            reconciler,
        }
    }

    fn cafe(id: &str, created_at: &str, amount: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount,
            created_at: DateTime::parse_from_rfc3339(created_at).unwrap(),
            description: "Little Cafe".to_string(),
            is_foreign: false,
            category_id: Some("restaurants-and-cafes".to_string()),
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(-550), "$5.50");
        assert_eq!(format_amount(-5), "$0.05");
        assert_eq!(format_amount(1200), "-$12.00");
        assert_eq!(format_amount(0), "$0.00");
    }

    #[tokio::test]
    async fn test_qualifying_transaction_makes_present() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        let outcome = f
            .reconciler
            .on_transaction(cafe("a", "2024-05-14T08:30:00+10:00", -550))
            .await;

        assert_eq!(outcome, Ingest::Applied { changed: true });
        let snapshot = f.reconciler.snapshot();
        assert_eq!(snapshot.presentation.presence, Presence::Yes);
        assert_eq!(snapshot.presentation.reason, "Little Cafe, $5.50 at 08:30");
        assert_eq!(f.sink.count(), 1);
    }

    #[tokio::test]
    async fn test_non_qualifying_leaves_state_alone() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        let outcome = f
            .reconciler
            .on_transaction(cafe("a", "2024-05-14T08:30:00+10:00", -1000))
            .await;

        assert!(matches!(outcome, Ingest::NotQualifying(Predicate::AmountBetween { .. })));
        let snapshot = f.reconciler.snapshot();
        assert_eq!(snapshot.presentation.presence, Presence::No);
        assert!(snapshot.transaction.is_none());
        assert_eq!(f.sink.count(), 0);
    }

    #[tokio::test]
    async fn test_weekend_transaction_rejected() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        let outcome = f
            .reconciler
            .on_transaction(cafe("sat", "2024-05-18T08:30:00+10:00", -550))
            .await;
        assert!(matches!(outcome, Ingest::NotQualifying(Predicate::Weekday { .. })));
    }

    #[tokio::test]
    async fn test_stale_transaction_is_dropped() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        let newer = cafe("t2", "2024-05-14T08:45:00+10:00", -550);
        let older = cafe("t1", "2024-05-14T08:15:00+10:00", -450);

        f.reconciler.on_transaction(newer.clone()).await;
        assert_eq!(f.reconciler.on_transaction(older).await, Ingest::Stale);
        assert_eq!(f.reconciler.on_transaction(newer).await, Ingest::Stale);
        assert_eq!(f.reconciler.snapshot().transaction.unwrap().id, "t2");
        assert_eq!(f.sink.count(), 1);
    }

    #[tokio::test]
    async fn test_identical_output_notifies_once() {
        // Rolling window plus same description/amount/minute gives identical output.
        let f = fixture(FreshnessPolicy::Rolling(chrono::Duration::hours(12)));
        let first = cafe("a", "2024-05-14T08:30:00+10:00", -550);
        let second = cafe("b", "2024-05-14T08:30:30+10:00", -550);

        assert_eq!(
            f.reconciler.on_transaction(first).await,
            Ingest::Applied { changed: true }
        );
        assert_eq!(
            f.reconciler.on_transaction(second).await,
            Ingest::Applied { changed: false }
        );
        assert_eq!(f.sink.count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_expires_presence_after_midnight() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        f.reconciler
            .on_transaction(cafe("a", "2024-05-14T08:30:00+10:00", -550))
            .await;

        assert!(!f.reconciler.refresh().await);

        // 00:00:05 on Wednesday
        f.clock.set(utc("2024-05-14T14:00:05Z"));
        assert!(f.reconciler.refresh().await);
        assert_eq!(f.sink.last().unwrap().presence, Presence::No);
        assert!(!f.reconciler.refresh().await);
        assert_eq!(f.sink.count(), 2);
    }

    #[tokio::test]
    async fn test_contradiction_reason() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        f.office.set(Ok(OfficeState::WorkFromOffice));
        f.mirror.poll().await;

        assert!(f.reconciler.refresh().await);
        let last = f.sink.last().unwrap();
        assert_eq!(last.presence, Presence::No);
        assert_eq!(last.reason, CONTRADICTION_REASON);

        // Evidence arrives: the contradiction goes away.
        f.reconciler
            .on_transaction(cafe("a", "2024-05-14T08:30:00+10:00", -550))
            .await;
        assert_eq!(f.sink.last().unwrap().presence, Presence::Yes);
    }

    #[tokio::test]
    async fn test_failed_poll_omits_contradiction() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        f.office.set(Ok(OfficeState::WorkFromOffice));
        f.mirror.poll().await;
        f.office.set(Err(anyhow::anyhow!("timed out")));
        f.mirror.poll().await;

        let snapshot = f.reconciler.snapshot();
        assert_eq!(snapshot.presentation.presence, Presence::No);
        assert_eq!(snapshot.presentation.reason, "");
    }

    #[tokio::test]
    async fn test_prime_sets_baseline_without_notifying() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        let persisted = cafe("a", "2024-05-14T08:30:00+10:00", -550);
        f.reconciler.prime(Some(persisted.clone()));

        assert_eq!(f.sink.count(), 0);
        assert!(!f.reconciler.refresh().await);
        assert_eq!(f.reconciler.on_transaction(persisted).await, Ingest::Stale);
        assert_eq!(f.reconciler.snapshot().presentation.presence, Presence::Yes);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        let second = Arc::new(RecordingSink::default());
        let reconciler = Reconciler::new(
            ClassificationCriteria::default(),
            FreshnessPolicy::SinceMidnight,
            f.clock.clone(),
            f.mirror.clone(),
        )
        .with_sink(Arc::new(FailingSink))
        .with_sink(second.clone());

        let outcome = reconciler
            .on_transaction(cafe("a", "2024-05-14T08:30:00+10:00", -550))
            .await;
        assert_eq!(outcome, Ingest::Applied { changed: true });
        assert_eq!(second.count(), 1);
    }

    #[tokio::test]
    async fn test_office_assertion_when_untracked() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        let reconciler = Reconciler::new(
            ClassificationCriteria::default(),
            FreshnessPolicy::SinceMidnight,
            f.clock.clone(),
            f.mirror.clone(),
        )
        .with_office_assertion(true);
        f.mirror.poll().await;

        reconciler
            .on_transaction(cafe("a", "2024-05-14T08:30:00+10:00", -550))
            .await;

        for _ in 0..50 {
            if !f.office.asserted.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let asserted = f.office.asserted.lock().unwrap().clone();
        assert_eq!(asserted, vec![chrono::NaiveDate::from_ymd_opt(2024, 5, 14).unwrap()]);

        // The claim is mirrored, so the next purchase does not repeat it.
        let today = f.mirror.today();
        for _ in 0..50 {
            if f.mirror.state_for(today) == OfficeState::WorkFromOffice {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(f.mirror.state_for(today), OfficeState::WorkFromOffice);

        reconciler
            .on_transaction(cafe("b", "2024-05-14T08:45:00+10:00", -550))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.office.asserted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_office_assertion_when_already_claimed() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        f.office.set(Ok(OfficeState::WorkFromHome));
        f.mirror.poll().await;
        let reconciler = Reconciler::new(
            ClassificationCriteria::default(),
            FreshnessPolicy::SinceMidnight,
            f.clock.clone(),
            f.mirror.clone(),
        )
        .with_office_assertion(true);

        reconciler
            .on_transaction(cafe("a", "2024-05-14T08:30:00+10:00", -550))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.office.asserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_sink_receives_transitions_in_order() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        let sink = Arc::new(SlowSink::default());
        // 23:59:59 AEST on Tuesday
        f.clock.set(utc("2024-05-14T13:59:59Z"));
        let reconciler = Arc::new(
            Reconciler::new(
                ClassificationCriteria::default(),
                FreshnessPolicy::SinceMidnight,
                f.clock.clone(),
                f.mirror.clone(),
            )
            .with_sink(sink.clone()),
        );
        reconciler.prime(None);

        let ingest = tokio::spawn({
            let reconciler = Arc::clone(&reconciler);
            async move {
                reconciler
                    .on_transaction(cafe("late", "2024-05-14T23:59:30+10:00", -550))
                    .await
            }
        });
        sink.started.notified().await;

        // Midnight passes while "yes" is still being delivered.
        f.clock.set(utc("2024-05-14T14:00:05Z"));
        assert!(reconciler.refresh().await);
        assert_eq!(ingest.await.unwrap(), Ingest::Applied { changed: true });

        assert_eq!(*sink.delivered.lock().unwrap(), vec![Presence::Yes, Presence::No]);
        assert_eq!(reconciler.snapshot().presentation.presence, Presence::No);
    }

    #[tokio::test]
    async fn test_superseded_presentation_is_not_sent() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        f.reconciler
            .on_transaction(cafe("a", "2024-05-14T08:30:00+10:00", -550))
            .await;
        assert_eq!(f.sink.count(), 1);

        let stale = f.sink.last().unwrap();
        f.clock.set(utc("2024-05-14T14:00:05Z"));
        assert!(f.reconciler.refresh().await);

        // A dispatch for the earlier generation arriving late is dropped.
        f.reconciler.dispatch(1, &stale, None).await;
        assert_eq!(f.sink.count(), 2);
        assert_eq!(f.sink.last().unwrap().presence, Presence::No);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_offers_keep_newest() {
        let f = fixture(FreshnessPolicy::SinceMidnight);
        let reconciler = Arc::new(f.reconciler);

        let mut handles = Vec::new();
        for minute in 0..30u32 {
            let reconciler = Arc::clone(&reconciler);
            handles.push(tokio::spawn(async move {
                let created_at = format!("2024-05-14T08:{minute:02}:00+10:00");
                reconciler
                    .on_transaction(cafe(&format!("m{minute}"), &created_at, -550))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(reconciler.snapshot().transaction.unwrap().id, "m29");
        assert_eq!(
            reconciler.snapshot().presentation.reason,
            "Little Cafe, $5.50 at 08:29"
        );
    }
}
