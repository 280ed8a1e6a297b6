// src/score/mod.rs
//! Candidate scoring: breakdown, overall score and the acceptance policy.
//!
//! Scoring is pure: the same candidate snapshot and clock always produce the
//! same [`ScoreBreakdown`]. The acceptance conjunction is frozen here in one
//! place; the only escape hatch is exceptional relevance lifting the
//! discussion-quality requirement, never the bot/shill gates.

pub mod authenticity;
pub mod relevance;

use serde::{Deserialize, Serialize};

use crate::discover::Candidate;

pub use authenticity::{BOT_LIKELIHOOD_CUTOFF, SHILL_LIKELIHOOD_CUTOFF};

/// A candidate must clear this relevance to be considered at all.
pub const RELEVANCE_ACCEPT: f32 = 0.7;
/// Secondary gates: the reply-worthiness and substance thresholds.
pub const ENGAGEMENT_ACCEPT: f32 = 0.6;
pub const TECHNICAL_ACCEPT: f32 = 0.2;
/// Above this relevance the discussion-quality gate is waived.
pub const RELEVANCE_BYPASS: f32 = 0.85;

/// Overall-score blend. Weights sum to 1.0 and are all positive, so the
/// overall score is monotone in every component.
pub const OVERALL_RELEVANCE_WEIGHT: f32 = 0.40;
pub const OVERALL_TECHNICAL_WEIGHT: f32 = 0.20;
pub const OVERALL_ENGAGEMENT_WEIGHT: f32 = 0.25;
pub const OVERALL_TIME_WEIGHT: f32 = 0.15;

/// Topic-gate tokens shorter than this are ignored ("ai" still passes).
const TOPIC_TOKEN_MIN: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub relevance: f32,
    pub technical_depth: f32,
    pub engagement_opportunity: f32,
    pub time_sensitivity: f32,
    pub bot_likelihood: f32,
    pub shill_likelihood: f32,
    pub quality_discussion: bool,
}

impl ScoreBreakdown {
    pub fn overall(&self) -> f32 {
        clamp01(
            self.relevance * OVERALL_RELEVANCE_WEIGHT
                + self.technical_depth * OVERALL_TECHNICAL_WEIGHT
                + self.engagement_opportunity * OVERALL_ENGAGEMENT_WEIGHT
                + self.time_sensitivity * OVERALL_TIME_WEIGHT,
        )
    }
}

fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

pub struct CandidateScorer {
    /// Lowercased configured core terms.
    core_terms: Vec<String>,
}

impl CandidateScorer {
    pub fn new(core_terms: &[String]) -> Self {
        Self {
            core_terms: core_terms.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// The trigger keyword (any token) or any configured core term appears
    /// in the text.
    pub fn topic_gate(&self, text_lc: &str, trigger_keyword: &str) -> bool {
        let trigger_hit = trigger_keyword
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() >= TOPIC_TOKEN_MIN)
            .any(|t| text_lc.contains(t));
        trigger_hit || self.core_terms.iter().any(|t| text_lc.contains(t.as_str()))
    }

    pub fn score(&self, candidate: &Candidate, now_unix: i64) -> ScoreBreakdown {
        let text_lc = candidate.text.to_lowercase();
        let core_hit = self.topic_gate(&text_lc, &candidate.trigger_keyword);
        ScoreBreakdown {
            relevance: relevance::relevance_score(&text_lc, core_hit, &candidate.interactions),
            technical_depth: relevance::technical_depth(&text_lc),
            engagement_opportunity: relevance::engagement_opportunity(&candidate.text),
            time_sensitivity: relevance::time_sensitivity(candidate.discovered_at, now_unix),
            bot_likelihood: authenticity::bot_likelihood(
                &candidate.text,
                candidate.author.as_ref(),
            ),
            shill_likelihood: authenticity::shill_likelihood(&candidate.text),
            quality_discussion: authenticity::quality_discussion(
                &candidate.text,
                candidate.author.as_ref(),
            ),
        }
    }

    /// Why the candidate is not promoted, or `None` when it passes the whole
    /// conjunction. Reasons are checked in policy order; the first failing
    /// gate wins.
    pub fn rejection(
        &self,
        candidate: &Candidate,
        breakdown: &ScoreBreakdown,
    ) -> Option<&'static str> {
        if breakdown.relevance <= RELEVANCE_ACCEPT {
            return Some("low_relevance");
        }
        if breakdown.engagement_opportunity <= ENGAGEMENT_ACCEPT {
            return Some("weak_engagement");
        }
        if breakdown.technical_depth < TECHNICAL_ACCEPT {
            return Some("shallow_technical");
        }
        if breakdown.bot_likelihood >= BOT_LIKELIHOOD_CUTOFF {
            return Some("likely_bot");
        }
        if breakdown.shill_likelihood >= SHILL_LIKELIHOOD_CUTOFF {
            return Some("likely_shill");
        }
        let text_lc = candidate.text.to_lowercase();
        if !self.topic_gate(&text_lc, &candidate.trigger_keyword) {
            return Some("off_topic");
        }
        if !(breakdown.quality_discussion || breakdown.relevance > RELEVANCE_BYPASS) {
            return Some("low_quality");
        }
        None
    }

    pub fn accepts(&self, candidate: &Candidate, breakdown: &ScoreBreakdown) -> bool {
        self.rejection(candidate, breakdown).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::{AuthorProfile, InteractionCounts};

    fn mk(text: &str, trigger: &str, likes: u32) -> Candidate {
        Candidate {
            source_id: Some("1".into()),
            author_id: "dev".into(),
            text: text.into(),
            interactions: InteractionCounts {
                likes,
                reposts: 0,
                replies: 0,
            },
            discovered_at: 1_700_000_000,
            trigger_keyword: trigger.into(),
            author: Some(AuthorProfile {
                followers: 1_500,
                following: 700,
                posts: 3_000,
                account_age_days: 700,
            }),
        }
    }

    fn scorer() -> CandidateScorer {
        CandidateScorer::new(&["rust".to_string(), "tokio".to_string()])
    }

    const NOW: i64 = 1_700_000_600;

    const STRONG_TEXT: &str = "Has anyone profiled tokio's scheduler under real production load? I've hit odd latency spikes with @baseline after our runtime migration.";

    #[test]
    fn strong_discussion_is_accepted() {
        let s = scorer();
        let c = mk(STRONG_TEXT, "tokio", 10);
        let b = s.score(&c, NOW);
        assert!(b.relevance > RELEVANCE_ACCEPT);
        assert!(b.quality_discussion);
        assert_eq!(s.rejection(&c, &b), None);
        assert!(b.overall() > 0.8);
    }

    #[test]
    fn off_topic_text_is_rejected() {
        let s = scorer();
        let c = mk(
            "Has anyone debugged a weird latency incident in production? I've spent a benchmark week on this with @a.",
            "quantum",
            20,
        );
        let b = s.score(&c, NOW);
        // Tech vocabulary alone cannot stand in for the topic.
        assert_eq!(s.rejection(&c, &b), Some("off_topic"));
    }

    #[test]
    fn bot_blocks_even_at_maximum_relevance() {
        let s = scorer();
        let mut c = mk(STRONG_TEXT, "tokio", 100);
        // Emoji wall forces the hard bot rule regardless of everything else.
        c.text = format!("{STRONG_TEXT} 🚀🚀🚀🔥🔥🔥✨✨");
        let b = s.score(&c, NOW);
        assert!(b.relevance > RELEVANCE_BYPASS);
        assert_eq!(s.rejection(&c, &b), Some("likely_bot"));
    }

    #[test]
    fn relevance_bypass_lifts_only_the_quality_gate() {
        let s = scorer();
        let b = ScoreBreakdown {
            relevance: 0.9,
            technical_depth: 0.5,
            engagement_opportunity: 0.7,
            time_sensitivity: 1.0,
            bot_likelihood: 0.0,
            shill_likelihood: 0.0,
            quality_discussion: false,
        };
        let c = mk("tokio runtime question?", "tokio", 0);
        assert_eq!(s.rejection(&c, &b), None);

        let modest = ScoreBreakdown {
            relevance: 0.75,
            ..b
        };
        assert_eq!(s.rejection(&c, &modest), Some("low_quality"));

        let bot = ScoreBreakdown {
            bot_likelihood: 1.0,
            ..b
        };
        assert_eq!(s.rejection(&c, &bot), Some("likely_bot"));
    }

    #[test]
    fn overall_is_monotone_in_each_component() {
        let base = ScoreBreakdown {
            relevance: 0.5,
            technical_depth: 0.5,
            engagement_opportunity: 0.5,
            time_sensitivity: 0.5,
            bot_likelihood: 0.2,
            shill_likelihood: 0.2,
            quality_discussion: true,
        };
        let bumps = [
            ScoreBreakdown {
                relevance: 0.8,
                ..base
            },
            ScoreBreakdown {
                technical_depth: 0.8,
                ..base
            },
            ScoreBreakdown {
                engagement_opportunity: 0.8,
                ..base
            },
            ScoreBreakdown {
                time_sensitivity: 0.8,
                ..base
            },
        ];
        for bumped in bumps {
            assert!(bumped.overall() >= base.overall());
        }
    }

    #[test]
    fn overall_weights_are_a_partition() {
        let full = ScoreBreakdown {
            relevance: 1.0,
            technical_depth: 1.0,
            engagement_opportunity: 1.0,
            time_sensitivity: 1.0,
            bot_likelihood: 0.0,
            shill_likelihood: 0.0,
            quality_discussion: true,
        };
        assert!((full.overall() - 1.0).abs() < 1e-6);
    }
}
