use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    Json,
};
use chrono_tz::Tz;
use models::{RawWebhookEvent, Transaction};
use presence::{Ingest, Reconciler};
use std::sync::Arc;

use crate::{error::ApiError, render::render_page, repository::TransactionStore, Result};

/// Shared state for all handlers. Read paths only touch the reconciler's
/// in-memory snapshot.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub store: Arc<dyn TransactionStore>,
    pub tz: Tz,
}

impl AppState {
    pub fn new(reconciler: Arc<Reconciler>, store: Arc<dyn TransactionStore>, tz: Tz) -> Self {
        Self {
            reconciler,
            store,
            tz,
        }
    }
}

/// POST /webhook
/// Ingests one transaction event
pub async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let event: RawWebhookEvent = serde_json::from_slice(&body)?;
    if let Some(account) = &event.account {
        tracing::debug!(account = %account.id, "Webhook event received");
    }
    let transaction = Transaction::from(event.transaction);

    let response = match state.reconciler.on_transaction(transaction.clone()).await {
        Ingest::NotQualifying(failed) => serde_json::json!({
            "outcome": "not_qualifying",
            "reason": failed.to_string(),
        }),
        Ingest::Stale => serde_json::json!({
            "outcome": "stale",
        }),
        Ingest::Applied { changed } => {
            state
                .store
                .save(&transaction)
                .await
                .map_err(ApiError::Store)?;
            serde_json::json!({
                "outcome": "applied",
                "changed": changed,
            })
        }
    };

    Ok(Json(response))
}

/// GET /raw
/// Bare presence string
pub async fn get_raw(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.reconciler.snapshot();
    (
        [(header::CACHE_CONTROL, "no-cache")],
        snapshot.presentation.presence.to_string(),
    )
}

/// GET /
/// Status page
pub async fn get_index(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.reconciler.snapshot();
    (
        [(header::CACHE_CONTROL, "no-cache")],
        Html(render_page(&snapshot, state.tz)),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "inoffice"
    }))
}
