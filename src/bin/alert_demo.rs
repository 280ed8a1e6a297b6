//! Pushes one synthetic alert through the configured sinks for manual
//! transport verification. Without SMTP or webhook env vars the alert only
//! lands in the log.

use std::sync::Arc;

use opportunity_radar::alerts::{sinks_from_env, AlertDispatcher, AlertHistory, Tier};
use opportunity_radar::config::TierSection;
use opportunity_radar::discover::{Candidate, InteractionCounts};
use opportunity_radar::generate::GeneratedReply;
use opportunity_radar::metrics::MetricsRecorder;
use opportunity_radar::pipeline::Opportunity;
use opportunity_radar::score::ScoreBreakdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let sinks = sinks_from_env()?;
    let history_path = std::env::temp_dir().join("radar-alert-demo-history.json");
    let dispatcher = AlertDispatcher::new(
        TierSection::default(),
        sinks,
        AlertHistory::open(history_path, 10),
        Arc::new(MetricsRecorder::new(10)),
    );

    let now = chrono::Utc::now().timestamp();
    let candidate = Candidate {
        source_id: Some("demo-1".into()),
        author_id: "demo_author".into(),
        text: "Has anyone benchmarked tokio task starvation under heavy select loops? \
               I've hit a case where one branch dominates."
            .into(),
        interactions: InteractionCounts {
            likes: 12,
            reposts: 3,
            replies: 4,
        },
        discovered_at: now,
        trigger_keyword: "tokio".into(),
        author: None,
    };
    let breakdown = ScoreBreakdown {
        relevance: 0.9,
        technical_depth: 0.75,
        engagement_opportunity: 0.8,
        time_sensitivity: 1.0,
        bot_likelihood: 0.0,
        shill_likelihood: 0.0,
        quality_discussion: true,
    };
    let opportunity = Opportunity {
        fingerprint: format!("demo_{now}"),
        overall_score: breakdown.overall(),
        breakdown,
        reply: GeneratedReply {
            reply: "Biased select branches will do that. Have you tried the \
                    randomized polling order or splitting the hot branch out?"
                .into(),
            alternatives: vec!["What does tokio-console show for that task?".into()],
            confidence: 0.9,
            voice_alignment: 1.0,
        },
        candidate,
        tier: Tier::Immediate,
        created_at: now,
        feedback_reference: None,
    };

    dispatcher.dispatch_cycle(vec![opportunity]).await;
    let status = dispatcher.status();
    println!(
        "alert-demo done (history={}, last_error={:?})",
        status.history_len, status.last_error
    );
    Ok(())
}
