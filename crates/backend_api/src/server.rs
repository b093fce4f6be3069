use anyhow::Context;
use office_client::{OfficeTrackerClient, OfficeTrackerConfig, WebhookNotifier};
use presence::{BackgroundTasks, Clock, Reconciler, StatusMirror, SystemClock};
use settings_loader::Settings;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::{
    handlers::AppState,
    repository::{FileTransactionStore, MemoryTransactionStore, TransactionStore},
    router::create_router,
};

/// Wake this long after midnight so the refresh lands on the new day.
const DAY_BOUNDARY_SKEW: Duration = Duration::from_secs(5);

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "backend_api=debug,presence=info,office_client=info,tower_http=debug".into()
            }),
        )
        .init();
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Wire the engine, its background loops and the HTTP server, then serve
/// until SIGINT/SIGTERM.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    init_tracing();

    let addr = format!("{}:{}", settings.host, settings.port).parse::<SocketAddr>()?;
    // Without the listener there is no way to receive transactions.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Binding {addr}"))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let office = Arc::new(OfficeTrackerClient::new(OfficeTrackerConfig {
        base_url: settings.office_tracker_url.clone(),
        api_key: settings.office_tracker_api_key.clone(),
        timeout: settings.office_timeout,
    })?);
    if settings.office_tracker_api_key.is_empty() {
        tracing::warn!("OFFICETRACKER_API_KEY is not set; office status requests will be unauthenticated");
    }

    let mirror = Arc::new(StatusMirror::new(
        office,
        Arc::clone(&clock),
        settings.timezone,
        settings.office_timeout,
    ));

    let mut reconciler = Reconciler::new(
        settings.criteria.clone(),
        settings.freshness,
        Arc::clone(&clock),
        Arc::clone(&mirror),
    )
    .with_office_assertion(settings.assert_office);
    if let Some(url) = &settings.notify_webhook_url {
        reconciler = reconciler.with_sink(Arc::new(WebhookNotifier::new(url, settings.notify_timeout)?));
    }

    let store: Arc<dyn TransactionStore> = match &settings.transaction_store_path {
        Some(path) => {
            tracing::info!("Persisting last transaction to {}", path.display());
            Arc::new(FileTransactionStore::new(path))
        }
        None => Arc::new(MemoryTransactionStore::default()),
    };
    let persisted = match store.load().await {
        Ok(persisted) => persisted,
        Err(e) => {
            tracing::warn!("Could not load persisted transaction, starting empty: {e:#}");
            None
        }
    };
    reconciler.prime(persisted);
    let reconciler = Arc::new(reconciler);

    tracing::info!(
        freshness = ?settings.freshness,
        timezone = %settings.timezone,
        presence = %reconciler.snapshot().presentation.presence,
        "Presence engine ready"
    );

    let tasks = BackgroundTasks::spawn(
        Arc::clone(&reconciler),
        mirror,
        clock,
        settings.office_poll_interval,
        DAY_BOUNDARY_SKEW,
    );

    let app = create_router(AppState::new(reconciler, store, settings.timezone));
    tracing::info!("Starting server on http://{}", addr);

    let (signalled_tx, mut signalled_rx) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            tracing::info!("Shutdown signal received, draining requests");
            let _ = signalled_tx.send(true);
        })
        .into_future();
    let drain_deadline = async move {
        let _ = signalled_rx.changed().await;
        tokio::time::sleep(DRAIN_TIMEOUT).await;
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => tracing::warn!("Requests still in flight after {:?}, exiting", DRAIN_TIMEOUT),
    }

    tasks.shutdown().await;
    Ok(())
}
