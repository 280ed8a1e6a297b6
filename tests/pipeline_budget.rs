// Pipeline and rate budget interplay: backoff on rate-limit signals,
// atomic check-then-call under concurrent topic fan-out.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use opportunity_radar::budget::RateBudget;
use opportunity_radar::config::EndpointBudgetCfg;
use opportunity_radar::dedup::DedupStore;
use opportunity_radar::error::DiscoveryError;
use opportunity_radar::generate::MockGenerator;
use opportunity_radar::metrics::MetricsRecorder;
use opportunity_radar::pipeline::Pipeline;

use common::QueueSource;

fn search_budget(limit: u32) -> BTreeMap<String, EndpointBudgetCfg> {
    BTreeMap::from([(
        "search".to_string(),
        EndpointBudgetCfg {
            limit,
            window_secs: 900,
        },
    )])
}

#[tokio::test]
async fn rate_limited_discovery_puts_endpoint_in_backoff() {
    let mut cfg = common::test_config("backoff");
    cfg.budgets = search_budget(10);
    let _ = std::fs::remove_file(cfg.dedup_path());

    let budget = Arc::new(RateBudget::new(&cfg.budgets));
    let pipeline = Pipeline::new(
        &cfg,
        Arc::new(QueueSource::new(vec![Err(DiscoveryError::RateLimited {
            retry_after: Some(Duration::from_secs(120)),
        })])),
        Arc::new(MockGenerator {
            reply: "draft".to_string(),
        }),
        Arc::clone(&budget),
        Arc::new(DedupStore::open(cfg.dedup_path(), cfg.dedup.capacity)),
        Arc::new(MetricsRecorder::new(8)),
    );

    assert!(budget.can_call("search"));
    let report = pipeline
        .run_cycle_at(&["tokio".to_string()], common::NOW)
        .await;
    assert_eq!(report.discovery_failures, 1);
    assert_eq!(report.opportunities.len(), 0);

    // Backoff overrides the nine remaining window slots.
    assert!(!budget.can_call("search"));
    let status = budget.status();
    assert!(status["search"].backoff_remaining_secs > 0);
    assert!(status["search"].remaining > 0);
}

#[tokio::test]
async fn exhausted_budget_skips_topics_without_calling() {
    let mut cfg = common::test_config("exhausted");
    cfg.budgets = search_budget(1);
    let _ = std::fs::remove_file(cfg.dedup_path());

    let budget = Arc::new(RateBudget::new(&cfg.budgets));
    // Only one response queued: the second topic must never reach the source.
    let pipeline = Pipeline::new(
        &cfg,
        Arc::new(QueueSource::new(vec![Ok(Vec::new())])),
        Arc::new(MockGenerator {
            reply: "draft".to_string(),
        }),
        Arc::clone(&budget),
        Arc::new(DedupStore::open(cfg.dedup_path(), cfg.dedup.capacity)),
        Arc::new(MetricsRecorder::new(8)),
    );

    let topics = vec!["tokio".to_string(), "rust async".to_string()];
    let report = pipeline.run_cycle_at(&topics, common::NOW).await;
    assert_eq!(report.topics_searched, 1);
    assert_eq!(report.skipped_budget, 1);
    assert_eq!(budget.status()["search"].used, 1);
}
