// At-most-once across restarts: a fingerprint marked known before dispatch
// stays known after a crash, so the opportunity is silently dropped rather
// than alerted twice.

mod common;

use std::sync::Arc;

use opportunity_radar::budget::RateBudget;
use opportunity_radar::dedup::DedupStore;
use opportunity_radar::generate::MockGenerator;
use opportunity_radar::metrics::MetricsRecorder;
use opportunity_radar::pipeline::Pipeline;

use common::QueueSource;

fn pipeline_with_store(
    cfg: &opportunity_radar::config::MonitorConfig,
    dedup: Arc<DedupStore>,
) -> Pipeline {
    Pipeline::new(
        cfg,
        Arc::new(QueueSource::new(vec![Ok(vec![common::strong_candidate(
            "restart",
        )])])),
        Arc::new(MockGenerator {
            reply: "draft".to_string(),
        }),
        Arc::new(RateBudget::new(&cfg.budgets)),
        dedup,
        Arc::new(MetricsRecorder::new(8)),
    )
}

#[tokio::test]
async fn marked_fingerprint_survives_crash_before_dispatch() {
    let cfg = common::test_config("restart");
    let path = cfg.dedup_path();
    let _ = std::fs::remove_file(&path);

    // First run: opportunity created, fingerprint marked, then "crash"
    // before any dispatch happens.
    {
        let dedup = Arc::new(DedupStore::open(&path, cfg.dedup.capacity));
        let pipeline = pipeline_with_store(&cfg, Arc::clone(&dedup));
        let report = pipeline
            .run_cycle_at(&["tokio".to_string()], common::NOW)
            .await;
        assert_eq!(report.opportunities.len(), 1);
        assert_eq!(dedup.len(), 1);
        // No dispatch: the process dies here.
    }

    // Restart: same candidate arrives again and must be suppressed.
    let dedup = Arc::new(DedupStore::open(&path, cfg.dedup.capacity));
    assert_eq!(dedup.len(), 1, "snapshot must survive the restart");
    let pipeline = pipeline_with_store(&cfg, dedup);
    let report = pipeline
        .run_cycle_at(&["tokio".to_string()], common::NOW)
        .await;
    assert_eq!(report.opportunities.len(), 0);
    assert_eq!(report.duplicates, 1);

    let _ = std::fs::remove_file(&path);
}
