// src/api.rs
//! Status surface: `/health`, `/status`, `/alerts/recent`, plus the merged
//! Prometheus `/metrics` route.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use tower_http::cors::CorsLayer;

use crate::alerts::{AlertDispatcher, AlertRecord};
use crate::budget::{EndpointStatus, RateBudget};
use crate::dedup::DedupStore;
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::scheduler::{SchedulerHandle, SchedulerState};

#[derive(Clone)]
pub struct AppState {
    pub budget: Arc<RateBudget>,
    pub dedup: Arc<DedupStore>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub recorder: Arc<MetricsRecorder>,
    pub scheduler: Arc<SchedulerHandle>,
}

pub fn router(state: AppState, metrics_router: Router) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/alerts/recent", get(recent_alerts))
        .with_state(state)
        .merge(metrics_router)
        .layer(CorsLayer::very_permissive())
}

#[derive(serde::Serialize)]
struct StatusResponse {
    scheduler: SchedulerState,
    budgets: BTreeMap<String, EndpointStatus>,
    dedup_entries: usize,
    digest_queue: usize,
    last_dispatch_error: Option<String>,
    alert_history: usize,
    metrics: MetricsSnapshot,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let dispatcher = state.dispatcher.status();
    Json(StatusResponse {
        scheduler: state.scheduler.state(),
        budgets: state.budget.status(),
        dedup_entries: state.dedup.len(),
        digest_queue: dispatcher.digest_queue,
        last_dispatch_error: dispatcher.last_error,
        alert_history: dispatcher.history_len,
        metrics: state.recorder.snapshot(),
    })
}

async fn recent_alerts(State(state): State<AppState>) -> Json<Vec<AlertRecord>> {
    Json(state.dispatcher.recent(20))
}
