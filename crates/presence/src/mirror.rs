use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use models::OfficeState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::clock::Clock;

/// The external office tracker, as seen by the engine.
#[async_trait]
pub trait OfficeStatusService: Send + Sync {
    /// Self-reported state for `date`.
    async fn fetch_state(&self, date: NaiveDate) -> anyhow::Result<OfficeState>;

    /// Records a work-from-office claim for `date`.
    async fn assert_work_from_office(&self, date: NaiveDate) -> anyhow::Result<()>;
}

/// Latest mirrored value. `ticket` orders polls by when they were started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MirrorSnapshot {
    pub ticket: u64,
    pub date: Option<NaiveDate>,
    pub state: OfficeState,
}

/// Read-only mirror of the office tracker's state for today.
///
/// Written by the background poller, read by the reconciler. A poll result
/// is only stored if no later-started poll has already stored one.
pub struct StatusMirror {
    service: Arc<dyn OfficeStatusService>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    timeout: Duration,
    next_ticket: AtomicU64,
    latest: RwLock<MirrorSnapshot>,
}

impl StatusMirror {
    pub fn new(
        service: Arc<dyn OfficeStatusService>,
        clock: Arc<dyn Clock>,
        tz: Tz,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            clock,
            tz,
            timeout,
            next_ticket: AtomicU64::new(0),
            latest: RwLock::new(MirrorSnapshot::default()),
        }
    }

    pub fn service(&self) -> Arc<dyn OfficeStatusService> {
        Arc::clone(&self.service)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.tz).date_naive()
    }

    /// Fetches today's state from the service and stores it.
    ///
    /// Never fails: timeouts, transport and decode errors all read as
    /// `Untracked`. The next tick is the retry.
    pub async fn poll(&self) -> OfficeState {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let date = self.today();

        let state = match tokio::time::timeout(self.timeout, self.service.fetch_state(date)).await
        {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                tracing::warn!(%date, "Office status fetch failed: {e:#}");
                OfficeState::Untracked
            }
            Err(_) => {
                tracing::warn!(%date, timeout = ?self.timeout, "Office status fetch timed out");
                OfficeState::Untracked
            }
        };

        self.store(MirrorSnapshot {
            ticket,
            date: Some(date),
            state,
        });
        state
    }

    /// Records a claim the engine itself made for `date`, so later
    /// transactions that day see it before the next poll.
    pub fn record_assertion(&self, date: NaiveDate) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        self.store(MirrorSnapshot {
            ticket,
            date: Some(date),
            state: OfficeState::WorkFromOffice,
        });
    }

    fn store(&self, snapshot: MirrorSnapshot) {
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        if snapshot.ticket > latest.ticket {
            *latest = snapshot;
        } else {
            tracing::debug!(
                ticket = snapshot.ticket,
                stored = latest.ticket,
                "Discarding office status from an older poll"
            );
        }
    }

    pub fn snapshot(&self) -> MirrorSnapshot {
        *self.latest.read().unwrap_or_else(|e| e.into_inner())
    }

    /// The mirrored state if it was fetched for `date`, `Untracked` otherwise.
    pub fn state_for(&self, date: NaiveDate) -> OfficeState {
        let snapshot = self.snapshot();
        if snapshot.date == Some(date) {
            snapshot.state
        } else {
            OfficeState::Untracked
        }
    }
}
