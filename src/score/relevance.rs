// src/score/relevance.rs
//! Relevance and engagement-side scoring primitives.
//!
//! All functions are pure over (lowercased text, candidate metadata) and
//! return values in 0.0..=1.0. Weights are named constants; they are tuned
//! defaults, not contractual values.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::discover::InteractionCounts;

/// Weight for a hit on the trigger topic or a configured core term.
pub const CORE_TERM_WEIGHT: f32 = 0.4;
/// Each secondary technical-vocabulary hit adds this much...
pub const TECH_TERM_WEIGHT: f32 = 0.1;
/// ...up to this cap.
pub const TECH_TERM_CAP: f32 = 0.3;
/// Added when the text carries genuine-discussion markers.
pub const DISCUSSION_BONUS: f32 = 0.2;
/// Interaction contribution saturates at this value...
pub const INTERACTION_CAP: f32 = 0.3;
/// ...reached at this many likes+reposts+replies.
pub const INTERACTION_NORM: f32 = 20.0;

/// One technical term contributes this much depth, saturating at 1.0.
pub const TECH_DEPTH_STEP: f32 = 0.25;

pub const ENGAGE_QUESTION_WEIGHT: f32 = 0.4;
pub const ENGAGE_EXPERIENCE_WEIGHT: f32 = 0.2;
pub const ENGAGE_MENTION_WEIGHT: f32 = 0.2;
pub const ENGAGE_LENGTH_WEIGHT: f32 = 0.2;
/// Reply-friendly body length, chars.
pub const ENGAGE_LENGTH_RANGE: (usize, usize) = (50, 500);
/// A couple of mentions reads as a conversation; a wall of them as spam.
pub const ENGAGE_MENTION_RANGE: (u32, u32) = (1, 3);

/// Freshness steps for time sensitivity, seconds -> score.
pub const FRESH_HOUR_SECS: i64 = 3_600;
pub const FRESH_QUARTER_DAY_SECS: i64 = 6 * 3_600;
pub const FRESH_DAY_SECS: i64 = 24 * 3_600;
pub const TIME_SENSITIVITY_HOT: f32 = 1.0;
pub const TIME_SENSITIVITY_WARM: f32 = 0.7;
pub const TIME_SENSITIVITY_COOL: f32 = 0.4;
pub const TIME_SENSITIVITY_STALE: f32 = 0.2;

/// Secondary technical vocabulary. A hit here signals substance beyond the
/// trigger keyword itself.
pub static TECH_TERMS: &[&str] = &[
    "async",
    "await",
    "latency",
    "throughput",
    "deadlock",
    "race condition",
    "backpressure",
    "benchmark",
    "profiling",
    "allocator",
    "borrow checker",
    "lifetime",
    "unsafe",
    "runtime",
    "scheduler",
    "tracing",
    "observability",
    "migration",
    "production",
    "incident",
];

static QUESTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\?|^how |\bhow (do|can|would|should)\b|\bwhy (is|does|do|did)\b|\bwhat('s| is| are)\b|\banyone (know|tried|using)\b")
        .expect("question regex")
});

static EXPERIENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bi('ve| have| tried| ran| built| migrated| debugged| spent)\b|\bin my experience\b|\bwe (ran|built|moved|migrated|hit|shipped)\b|\bmy (team|project|setup)\b")
        .expect("experience regex")
});

pub fn has_question(text: &str) -> bool {
    QUESTION_RE.is_match(text)
}

pub fn has_experience_marker(text: &str) -> bool {
    EXPERIENCE_RE.is_match(text)
}

pub fn tech_term_matches(text_lc: &str) -> usize {
    TECH_TERMS.iter().filter(|t| text_lc.contains(*t)).count()
}

pub fn mention_count(text: &str) -> u32 {
    text.split_whitespace()
        .filter(|w| w.starts_with('@') && w.len() > 1)
        .count() as u32
}

/// Weighted relevance: core-term presence, secondary technical vocabulary,
/// discussion markers, interaction volume. Capped at 1.0.
pub fn relevance_score(
    text_lc: &str,
    core_hit: bool,
    interactions: &InteractionCounts,
) -> f32 {
    let mut score = 0.0;
    if core_hit {
        score += CORE_TERM_WEIGHT;
    }
    score += (tech_term_matches(text_lc) as f32 * TECH_TERM_WEIGHT).min(TECH_TERM_CAP);
    if has_question(text_lc) || has_experience_marker(text_lc) {
        score += DISCUSSION_BONUS;
    }
    score += (interactions.total() as f32 / INTERACTION_NORM * INTERACTION_CAP).min(INTERACTION_CAP);
    score.min(1.0)
}

pub fn technical_depth(text_lc: &str) -> f32 {
    (tech_term_matches(text_lc) as f32 * TECH_DEPTH_STEP).min(1.0)
}

/// How worthwhile a reply looks: open question, first-hand experience,
/// conversational mention count, reply-friendly length.
pub fn engagement_opportunity(text: &str) -> f32 {
    let mut score = 0.0;
    if has_question(text) {
        score += ENGAGE_QUESTION_WEIGHT;
    }
    if has_experience_marker(text) {
        score += ENGAGE_EXPERIENCE_WEIGHT;
    }
    let mentions = mention_count(text);
    if (ENGAGE_MENTION_RANGE.0..=ENGAGE_MENTION_RANGE.1).contains(&mentions) {
        score += ENGAGE_MENTION_WEIGHT;
    }
    let len = text.chars().count();
    if (ENGAGE_LENGTH_RANGE.0..ENGAGE_LENGTH_RANGE.1).contains(&len) {
        score += ENGAGE_LENGTH_WEIGHT;
    }
    score.min(1.0)
}

/// Step function over content age. Future timestamps count as fresh.
pub fn time_sensitivity(discovered_at: i64, now_unix: i64) -> f32 {
    let age = now_unix.saturating_sub(discovered_at).max(0);
    if age < FRESH_HOUR_SECS {
        TIME_SENSITIVITY_HOT
    } else if age < FRESH_QUARTER_DAY_SECS {
        TIME_SENSITIVITY_WARM
    } else if age < FRESH_DAY_SECS {
        TIME_SENSITIVITY_COOL
    } else {
        TIME_SENSITIVITY_STALE
    }
}
