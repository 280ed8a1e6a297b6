// src/pipeline.rs
//! One monitoring cycle: budget-gated discovery fan-out, scoring, dedup,
//! enrichment.
//!
//! Discovery calls for independent topics run concurrently up to a small
//! fixed width; results are drained sequentially so every dedup-store and
//! recorder write is linearized. A fingerprint is marked known before the
//! opportunity becomes visible anywhere else, which is what makes alerting
//! at-most-once across crashes.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::alerts::Tier;
use crate::budget::RateBudget;
use crate::config::{MonitorConfig, TierSection, VoiceSection};
use crate::dedup::DedupStore;
use crate::discover::{normalize_text, Candidate, DiscoverySource};
use crate::error::DiscoveryError;
use crate::generate::{
    fallback_reply, ContentGenerator, GeneratedReply, ReplyContext, FALLBACK_CONFIDENCE,
    FALLBACK_VOICE_ALIGNMENT,
};
use crate::metrics::MetricsRecorder;
use crate::score::{CandidateScorer, ScoreBreakdown};

/// A candidate that passed every filter, was unseen, and got enriched.
/// Immutable after creation except for attaching feedback metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub fingerprint: String,
    pub candidate: Candidate,
    pub breakdown: ScoreBreakdown,
    pub reply: GeneratedReply,
    pub overall_score: f32,
    pub tier: Tier,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_reference: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CycleReport {
    pub topics_searched: usize,
    pub skipped_budget: usize,
    pub discovery_failures: usize,
    pub candidates_seen: usize,
    pub duplicates: usize,
    pub sub_threshold: usize,
    #[serde(skip)]
    pub opportunities: Vec<Opportunity>,
}

pub struct Pipeline {
    source: Arc<dyn DiscoverySource>,
    generator: Arc<dyn ContentGenerator>,
    scorer: CandidateScorer,
    budget: Arc<RateBudget>,
    dedup: Arc<DedupStore>,
    recorder: Arc<MetricsRecorder>,
    tiers: TierSection,
    voice: VoiceSection,
    max_results: u32,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(
        cfg: &MonitorConfig,
        source: Arc<dyn DiscoverySource>,
        generator: Arc<dyn ContentGenerator>,
        budget: Arc<RateBudget>,
        dedup: Arc<DedupStore>,
        recorder: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            source,
            generator,
            scorer: CandidateScorer::new(&cfg.topics.core),
            budget,
            dedup,
            recorder,
            tiers: cfg.tiers.clone(),
            voice: cfg.voice.clone(),
            max_results: cfg.monitor.max_results_per_topic,
            concurrency: cfg.monitor.discovery_concurrency,
        }
    }

    /// Budget key this pipeline's discovery calls debit.
    pub fn endpoint(&self) -> &'static str {
        self.source.endpoint()
    }

    pub async fn run_cycle(&self, topics: &[String]) -> CycleReport {
        self.run_cycle_at(topics, chrono::Utc::now().timestamp())
            .await
    }

    pub async fn run_cycle_at(&self, topics: &[String], now_unix: i64) -> CycleReport {
        let mut report = CycleReport::default();

        // Fan-out: `None` means the budget refused before any call was made.
        let fetches: Vec<(String, Option<Result<Vec<Candidate>, DiscoveryError>>)> =
            stream::iter(topics.to_vec())
                .map(|topic| {
                    let source = Arc::clone(&self.source);
                    let budget = Arc::clone(&self.budget);
                    let max_results = self.max_results;
                    async move {
                        if !budget.try_acquire(source.endpoint()) {
                            return (topic, None);
                        }
                        let result = source.search(&topic, max_results).await;
                        (topic, Some(result))
                    }
                })
                .buffer_unordered(self.concurrency.max(1))
                .collect()
                .await;

        // Sequential drain; all shared-state writes happen here.
        for (topic, outcome) in fetches {
            match outcome {
                None => {
                    report.skipped_budget += 1;
                    tracing::debug!(target: "pipeline", topic, "budget exhausted, topic skipped");
                }
                Some(Err(err)) => {
                    self.recorder.discovery_call();
                    report.discovery_failures += 1;
                    if err.is_rate_limit() {
                        self.budget
                            .apply_backoff(self.source.endpoint(), err.retry_after());
                    }
                    tracing::warn!(target: "pipeline", topic, %err, "discovery failed");
                }
                Some(Ok(candidates)) => {
                    self.recorder.discovery_call();
                    report.topics_searched += 1;
                    for candidate in candidates {
                        if let Some(opp) = self.consider(candidate, now_unix, &mut report).await {
                            report.opportunities.push(opp);
                        }
                    }
                }
            }
        }

        self.recorder.cycle_completed();
        tracing::info!(
            target: "pipeline",
            topics = report.topics_searched,
            skipped = report.skipped_budget,
            failures = report.discovery_failures,
            candidates = report.candidates_seen,
            duplicates = report.duplicates,
            opportunities = report.opportunities.len(),
            "cycle finished"
        );
        report
    }

    async fn consider(
        &self,
        mut candidate: Candidate,
        now_unix: i64,
        report: &mut CycleReport,
    ) -> Option<Opportunity> {
        candidate.text = normalize_text(&candidate.text);
        report.candidates_seen += 1;
        self.recorder.candidate_scored();

        let breakdown = self.scorer.score(&candidate, now_unix);
        if let Some(reason) = self.scorer.rejection(&candidate, &breakdown) {
            self.recorder.candidate_rejected();
            tracing::debug!(target: "pipeline", reason, author = %candidate.author_id, "candidate rejected");
            return None;
        }

        let overall_score = breakdown.overall();
        let Some(tier) = Tier::classify(overall_score, &self.tiers) else {
            report.sub_threshold += 1;
            self.recorder.candidate_rejected();
            return None;
        };

        let fingerprint = candidate.fingerprint();
        if self.dedup.is_known(&fingerprint) {
            report.duplicates += 1;
            self.recorder.duplicate_suppressed();
            return None;
        }
        // Mark before enrichment or any dispatch. A crash from here on loses
        // the opportunity instead of repeating it.
        if let Err(err) = self.dedup.mark_known_at(&fingerprint, now_unix) {
            tracing::error!(
                target: "pipeline",
                %err,
                fingerprint,
                "fingerprint persist failed, in-memory only this cycle"
            );
        }

        let reply = self.enrich(&candidate, &fingerprint).await;
        self.recorder.opportunity_created();
        tracing::info!(
            target: "pipeline",
            fingerprint,
            tier = tier.as_str(),
            score = overall_score,
            topic = %candidate.trigger_keyword,
            "opportunity created"
        );
        Some(Opportunity {
            fingerprint,
            candidate,
            breakdown,
            reply,
            overall_score,
            tier,
            created_at: now_unix,
            feedback_reference: None,
        })
    }

    /// Drafting never blocks an opportunity: any failure degrades to the
    /// deterministic fallback pool.
    async fn enrich(&self, candidate: &Candidate, fingerprint: &str) -> GeneratedReply {
        let topic_tags = vec![candidate.trigger_keyword.clone()];
        let ctx = ReplyContext {
            text: &candidate.text,
            topic_tags: &topic_tags,
            voice: &self.voice,
        };
        match self.generator.generate(&ctx).await {
            Ok(reply) => reply,
            Err(err) => {
                self.recorder.generation_fallback();
                tracing::warn!(target: "pipeline", %err, fingerprint, "generation failed, using fallback");
                GeneratedReply {
                    reply: fallback_reply(fingerprint, &candidate.trigger_keyword),
                    alternatives: Vec::new(),
                    confidence: FALLBACK_CONFIDENCE,
                    voice_alignment: FALLBACK_VOICE_ALIGNMENT,
                }
            }
        }
    }
}
