// Shared fixtures for the integration tests: canned candidates, a queue-fed
// discovery source, recording/failing sinks, and wiring helpers.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use opportunity_radar::alerts::{AlertDispatcher, AlertHistory, NotificationSink, Tier};
use opportunity_radar::config::{MonitorConfig, TierSection};
use opportunity_radar::discover::{AuthorProfile, Candidate, DiscoverySource, InteractionCounts};
use opportunity_radar::error::{DiscoveryError, DispatchError, GenerationError};
use opportunity_radar::generate::{ContentGenerator, GeneratedReply, ReplyContext};
use opportunity_radar::metrics::MetricsRecorder;
use opportunity_radar::score::ScoreBreakdown;
use opportunity_radar::pipeline::Opportunity;

/// Fixed "now" so time-sensitivity scoring is deterministic.
pub const NOW: i64 = 1_755_000_000;

/// Scores high on every axis: immediate tier under default thresholds.
pub const STRONG_TEXT: &str = "Has anyone profiled tokio's scheduler under real production load? I've hit odd latency spikes with @baseline after our runtime migration.";
/// Accepted but lands in the priority band when two hours old.
pub const MEDIUM_TEXT: &str = "Anyone tried structured tracing in tokio apps? I've tried a couple of setups with @vector and keep losing spans.";
/// On topic but too thin: rejected on relevance.
pub const WEAK_TEXT: &str = "tokio release notes are out";

pub fn tmp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("radar-it-{}-{tag}.json", std::process::id()))
}

pub fn test_config(tag: &str) -> MonitorConfig {
    let mut cfg = MonitorConfig::default();
    cfg.topics.core = vec!["tokio".to_string(), "rust async".to_string()];
    cfg.dedup.path = Some(tmp_path(&format!("dedup-{tag}")).display().to_string());
    cfg
}

pub fn reputable_author() -> AuthorProfile {
    AuthorProfile {
        followers: 1_500,
        following: 700,
        posts: 3_000,
        account_age_days: 700,
    }
}

pub fn candidate(id: &str, text: &str, discovered_at: i64, likes: u32) -> Candidate {
    Candidate {
        source_id: Some(id.to_string()),
        author_id: format!("author_{id}"),
        text: text.to_string(),
        interactions: InteractionCounts {
            likes,
            reposts: 0,
            replies: 0,
        },
        discovered_at,
        trigger_keyword: "tokio".to_string(),
        author: Some(reputable_author()),
    }
}

pub fn strong_candidate(id: &str) -> Candidate {
    candidate(id, STRONG_TEXT, NOW, 10)
}

pub fn medium_candidate(id: &str) -> Candidate {
    // Two hours old: warm time sensitivity keeps it under the immediate bar.
    candidate(id, MEDIUM_TEXT, NOW - 7_200, 5)
}

pub fn weak_candidate(id: &str) -> Candidate {
    candidate(id, WEAK_TEXT, NOW, 0)
}

/// Synthetic opportunity for dispatcher-only tests.
pub fn opportunity(id: &str, score: f32, tier: Tier) -> Opportunity {
    Opportunity {
        fingerprint: format!("fp_{id}"),
        candidate: strong_candidate(id),
        breakdown: ScoreBreakdown {
            relevance: score,
            technical_depth: score,
            engagement_opportunity: score,
            time_sensitivity: score,
            bot_likelihood: 0.0,
            shill_likelihood: 0.0,
            quality_discussion: true,
        },
        reply: GeneratedReply {
            reply: format!("draft for {id}"),
            alternatives: Vec::new(),
            confidence: 0.9,
            voice_alignment: 1.0,
        },
        overall_score: score,
        tier,
        created_at: NOW,
        feedback_reference: None,
    }
}

/// Discovery source fed from a queue; exhausted queues return empty pages.
pub struct QueueSource {
    responses: Mutex<VecDeque<Result<Vec<Candidate>, DiscoveryError>>>,
}

impl QueueSource {
    pub fn new(responses: Vec<Result<Vec<Candidate>, DiscoveryError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl DiscoverySource for QueueSource {
    async fn search(
        &self,
        _topic: &str,
        _max_results: u32,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "queue"
    }
}

#[derive(Debug, Clone)]
pub struct SentAlert {
    pub tier: Tier,
    pub count: usize,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<SentAlert>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(
        &self,
        subject: &str,
        body: &str,
        tier: Tier,
        count: usize,
    ) -> Result<(), DispatchError> {
        self.sent.lock().unwrap().push(SentAlert {
            tier,
            count,
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn send(
        &self,
        _subject: &str,
        _body: &str,
        _tier: Tier,
        _count: usize,
    ) -> Result<(), DispatchError> {
        Err(DispatchError::Failed {
            sink: "failing",
            message: "simulated transport outage".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub struct FailingGenerator;

#[async_trait]
impl ContentGenerator for FailingGenerator {
    async fn generate(&self, _ctx: &ReplyContext<'_>) -> Result<GeneratedReply, GenerationError> {
        Err(GenerationError::Provider {
            status: 500,
            message: "simulated provider outage".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn dispatcher(
    tag: &str,
    tiers: TierSection,
    sinks: Vec<Box<dyn NotificationSink>>,
    recorder: Arc<MetricsRecorder>,
) -> AlertDispatcher {
    let path = tmp_path(&format!("hist-{tag}"));
    let _ = std::fs::remove_file(&path);
    AlertDispatcher::new(tiers, sinks, AlertHistory::open(path, 50), recorder)
}
