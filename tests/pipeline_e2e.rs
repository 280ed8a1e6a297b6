// End-to-end pipeline behavior: filtering, tiering, dedup idempotence,
// generation fallback.

mod common;

use std::sync::Arc;

use opportunity_radar::alerts::Tier;
use opportunity_radar::budget::RateBudget;
use opportunity_radar::dedup::DedupStore;
use opportunity_radar::generate::{MockGenerator, FALLBACK_CONFIDENCE};
use opportunity_radar::metrics::MetricsRecorder;
use opportunity_radar::pipeline::Pipeline;

use common::{QueueSource, RecordingSink};

fn wiring(
    cfg: &opportunity_radar::config::MonitorConfig,
    source: Arc<QueueSource>,
) -> (Pipeline, Arc<DedupStore>, Arc<MetricsRecorder>) {
    let _ = std::fs::remove_file(cfg.dedup_path());
    let budget = Arc::new(RateBudget::new(&cfg.budgets));
    let dedup = Arc::new(DedupStore::open(cfg.dedup_path(), cfg.dedup.capacity));
    let recorder = Arc::new(MetricsRecorder::new(16));
    let pipeline = Pipeline::new(
        cfg,
        source,
        Arc::new(MockGenerator {
            reply: "mock draft".to_string(),
        }),
        budget,
        Arc::clone(&dedup),
        Arc::clone(&recorder),
    );
    (pipeline, dedup, recorder)
}

#[tokio::test]
async fn one_pass_filters_tiers_and_alerts_once() {
    let cfg = common::test_config("e2e");
    let source = Arc::new(QueueSource::new(vec![Ok(vec![
        common::strong_candidate("s1"),
        common::medium_candidate("m1"),
        common::weak_candidate("w1"),
    ])]));
    let (pipeline, _dedup, recorder) = wiring(&cfg, source);

    let report = pipeline
        .run_cycle_at(&["tokio".to_string()], common::NOW)
        .await;
    assert_eq!(report.candidates_seen, 3);
    assert_eq!(report.opportunities.len(), 2, "weak candidate must be filtered");

    let mut tiers: Vec<Tier> = report.opportunities.iter().map(|o| o.tier).collect();
    tiers.sort_by_key(|t| t.as_str());
    assert!(tiers.contains(&Tier::Immediate));
    assert!(tiers.contains(&Tier::Priority));

    let sink = RecordingSink::new();
    let dispatcher = common::dispatcher(
        "e2e",
        cfg.tiers.clone(),
        vec![Box::new(sink.clone())],
        Arc::clone(&recorder),
    );
    dispatcher.dispatch_cycle(report.opportunities).await;

    let sent = sink.sent();
    let immediate: Vec<_> = sent.iter().filter(|s| s.tier == Tier::Immediate).collect();
    let priority: Vec<_> = sent.iter().filter(|s| s.tier == Tier::Priority).collect();
    assert_eq!(immediate.len(), 1, "exactly one immediate batch");
    assert_eq!(immediate[0].count, 1);
    assert_eq!(priority.len(), 1);
    assert_eq!(priority[0].count, 1);
    assert_eq!(sent.len(), 2);

    let snap = recorder.snapshot();
    assert_eq!(snap.opportunities, 2);
    assert_eq!(snap.alerts_sent, 2);
}

#[tokio::test]
async fn identical_candidate_across_cycles_yields_one_opportunity() {
    let cfg = common::test_config("dedup-cycles");
    let source = Arc::new(QueueSource::new(vec![
        Ok(vec![common::strong_candidate("same")]),
        Ok(vec![common::strong_candidate("same")]),
    ]));
    let (pipeline, _dedup, recorder) = wiring(&cfg, source);

    let first = pipeline
        .run_cycle_at(&["tokio".to_string()], common::NOW)
        .await;
    assert_eq!(first.opportunities.len(), 1);
    assert_eq!(first.duplicates, 0);

    let second = pipeline
        .run_cycle_at(&["tokio".to_string()], common::NOW)
        .await;
    assert_eq!(second.opportunities.len(), 0);
    assert_eq!(second.duplicates, 1);

    let snap = recorder.snapshot();
    assert_eq!(snap.opportunities, 1);
    assert_eq!(snap.duplicates_suppressed, 1);
}

#[tokio::test]
async fn generation_failure_degrades_to_fallback_reply() {
    let cfg = common::test_config("fallback");
    let _ = std::fs::remove_file(cfg.dedup_path());
    let budget = Arc::new(RateBudget::new(&cfg.budgets));
    let dedup = Arc::new(DedupStore::open(cfg.dedup_path(), cfg.dedup.capacity));
    let recorder = Arc::new(MetricsRecorder::new(16));
    let pipeline = Pipeline::new(
        &cfg,
        Arc::new(QueueSource::new(vec![Ok(vec![common::strong_candidate(
            "fb",
        )])])),
        Arc::new(common::FailingGenerator),
        budget,
        dedup,
        Arc::clone(&recorder),
    );

    let report = pipeline
        .run_cycle_at(&["tokio".to_string()], common::NOW)
        .await;
    assert_eq!(
        report.opportunities.len(),
        1,
        "drafting failure must not drop the opportunity"
    );
    let opp = &report.opportunities[0];
    assert!(!opp.reply.reply.is_empty());
    assert!(opp.reply.reply.contains("tokio"), "fallback carries the topic");
    assert_eq!(opp.reply.confidence, FALLBACK_CONFIDENCE);
    assert_eq!(recorder.snapshot().generation_fallbacks, 1);
}
