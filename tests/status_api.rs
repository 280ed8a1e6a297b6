// Status surface over the real router, driven with in-process requests.
// Single test: the Prometheus recorder installs process-wide exactly once.

mod common;

use std::sync::Arc;

use axum::body::Body;
use http::{Request, StatusCode};
use tower::ServiceExt;

use opportunity_radar::api::{self, AppState};
use opportunity_radar::budget::RateBudget;
use opportunity_radar::config::EndpointBudgetCfg;
use opportunity_radar::dedup::DedupStore;
use opportunity_radar::generate::MockGenerator;
use opportunity_radar::metrics::{MetricsRecorder, PrometheusExport};
use opportunity_radar::pipeline::Pipeline;
use opportunity_radar::rotation::TopicRotation;
use opportunity_radar::scheduler::Scheduler;

use common::{QueueSource, RecordingSink};

#[tokio::test]
async fn health_status_and_metrics_respond() {
    let mut cfg = common::test_config("status-api");
    cfg.budgets.insert(
        "search".to_string(),
        EndpointBudgetCfg {
            limit: 60,
            window_secs: 900,
        },
    );
    let _ = std::fs::remove_file(cfg.dedup_path());

    let budget = Arc::new(RateBudget::new(&cfg.budgets));
    let dedup = Arc::new(DedupStore::open(cfg.dedup_path(), cfg.dedup.capacity));
    let recorder = Arc::new(MetricsRecorder::new(8));
    let dispatcher = Arc::new(common::dispatcher(
        "status-api",
        cfg.tiers.clone(),
        vec![Box::new(RecordingSink::new())],
        Arc::clone(&recorder),
    ));
    let pipeline = Arc::new(Pipeline::new(
        &cfg,
        Arc::new(QueueSource::new(Vec::new())),
        Arc::new(MockGenerator {
            reply: "draft".to_string(),
        }),
        Arc::clone(&budget),
        Arc::clone(&dedup),
        Arc::clone(&recorder),
    ));
    let rotation = TopicRotation::new(cfg.topics.core.clone(), cfg.topics.batch_size);
    // Handle only; the loop never runs, so /status reports the idle state.
    let (_scheduler, handle) = Scheduler::new(
        &cfg,
        pipeline,
        Arc::clone(&dispatcher),
        Arc::clone(&recorder),
        Arc::clone(&budget),
        rotation,
    );

    let exporter = PrometheusExport::install().expect("prometheus recorder");
    let app = api::router(
        AppState {
            budget,
            dedup,
            dispatcher,
            recorder,
            scheduler: Arc::new(handle),
        },
        exporter.router(),
    );

    let health = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let body = axum::body::to_bytes(health.into_body(), 64).await.unwrap();
    assert_eq!(&body[..], b"ok");

    let status = app
        .clone()
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::OK);
    let body = axum::body::to_bytes(status.into_body(), 1 << 16).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["scheduler"], "idle");
    assert_eq!(json["digest_queue"], 0);
    assert_eq!(json["dedup_entries"], 0);
    assert_eq!(json["budgets"]["search"]["used"], 0);
    assert_eq!(json["budgets"]["search"]["remaining"], 60);
    assert_eq!(json["metrics"]["cycles"], 0);

    let recent = app
        .clone()
        .oneshot(Request::get("/alerts/recent").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(recent.status(), StatusCode::OK);
    let body = axum::body::to_bytes(recent.into_body(), 1 << 16).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json.as_array().unwrap().is_empty());

    let metrics = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
}
