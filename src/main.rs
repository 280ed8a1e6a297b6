//! opportunity-radar — Binary Entrypoint
//! Wires the monitoring engine (budget, dedup, pipeline, dispatcher,
//! scheduler) and serves the status surface next to it.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use opportunity_radar::alerts::{sinks_from_env, AlertDispatcher, AlertHistory, HISTORY_CAP};
use opportunity_radar::api::{self, AppState};
use opportunity_radar::budget::RateBudget;
use opportunity_radar::config::MonitorConfig;
use opportunity_radar::dedup::DedupStore;
use opportunity_radar::discover::{x_api::XSearchProvider, DiscoverySource};
use opportunity_radar::generate::{generator_from_env, ContentGenerator};
use opportunity_radar::metrics::{ensure_metrics_described, MetricsRecorder, PrometheusExport};
use opportunity_radar::pipeline::Pipeline;
use opportunity_radar::rotation::TopicRotation;
use opportunity_radar::scheduler::Scheduler;

const ENV_BIND: &str = "RADAR_BIND";
const DEFAULT_BIND: &str = "0.0.0.0:8000";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("opportunity_radar=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local runs; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();
    ensure_metrics_described();

    let cfg = MonitorConfig::load()?;
    if cfg.topics.core.is_empty() {
        tracing::warn!("no topics configured, cycles will do nothing");
    }

    let exporter = PrometheusExport::install()?;
    let budget = Arc::new(RateBudget::new(&cfg.budgets));
    let dedup = Arc::new(DedupStore::open(cfg.dedup_path(), cfg.dedup.capacity));
    let recorder = Arc::new(MetricsRecorder::new(cfg.metrics.history_cap));

    // Missing discovery credentials are the one fatal startup error.
    let source: Arc<dyn DiscoverySource> =
        Arc::new(XSearchProvider::from_env().context("discovery provider")?);
    let generator: Arc<dyn ContentGenerator> = Arc::from(generator_from_env());
    let sinks = sinks_from_env()?;

    let history = AlertHistory::open(cfg.alert_history_path(), HISTORY_CAP);
    let dispatcher = Arc::new(AlertDispatcher::new(
        cfg.tiers.clone(),
        sinks,
        history,
        Arc::clone(&recorder),
    ));
    let pipeline = Arc::new(Pipeline::new(
        &cfg,
        source,
        generator,
        Arc::clone(&budget),
        Arc::clone(&dedup),
        Arc::clone(&recorder),
    ));
    let rotation = TopicRotation::new(cfg.topics.core.clone(), cfg.topics.batch_size);

    let (scheduler, handle) = Scheduler::new(
        &cfg,
        Arc::clone(&pipeline),
        Arc::clone(&dispatcher),
        Arc::clone(&recorder),
        Arc::clone(&budget),
        rotation,
    );
    let handle = Arc::new(handle);
    let job = scheduler.spawn();

    let state = AppState {
        budget,
        dedup: Arc::clone(&dedup),
        dispatcher,
        recorder,
        scheduler: Arc::clone(&handle),
    };
    let app = api::router(state, exporter.router());

    let bind = std::env::var(ENV_BIND).unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    tracing::info!(%bind, "status surface listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    handle.stop();
    let _ = job.await;
    if let Err(err) = dedup.persist() {
        tracing::error!(%err, "final dedup persist failed");
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
