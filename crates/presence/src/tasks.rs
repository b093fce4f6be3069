use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::{until_next_midnight, Clock};
use crate::mirror::StatusMirror;
use crate::reconciler::Reconciler;

/// Background loops that keep presence current without new transactions:
/// the office status poller and the daily boundary refresh.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn spawn(
        reconciler: Arc<Reconciler>,
        mirror: Arc<StatusMirror>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        boundary_skew: Duration,
    ) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let tz = reconciler.criteria().reference_tz;

        let poller = tokio::spawn(poll_loop(
            Arc::clone(&mirror),
            Arc::clone(&reconciler),
            poll_interval,
            rx.clone(),
        ));
        let refresher = tokio::spawn(daily_refresh_loop(reconciler, clock, tz, boundary_skew, rx));

        Self {
            shutdown,
            handles: vec![poller, refresher],
        }
    }

    /// Signals every loop to stop and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Background task ended abnormally: {e}");
            }
        }
        tracing::info!("Background tasks stopped");
    }
}

async fn poll_loop(
    mirror: Arc<StatusMirror>,
    reconciler: Arc<Reconciler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let state = mirror.poll().await;
                tracing::debug!(?state, "Polled office status");
                reconciler.refresh().await;
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn daily_refresh_loop(
    reconciler: Arc<Reconciler>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    skew: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let wait = until_next_midnight(clock.now(), tz) + skew;
        tracing::debug!(?wait, "Sleeping until the next day boundary");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let changed = reconciler.refresh().await;
                tracing::info!(changed, "Day boundary refresh");
            }
            _ = shutdown.changed() => break,
        }
    }
}
