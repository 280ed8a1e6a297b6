// src/score/authenticity.rs
//! Bot, shill and discussion-quality heuristics.
//!
//! Rule-based and deliberately tunable; every threshold is a named constant.
//! Weak signals accumulate and classification happens at the cutoffs below,
//! so "three independent weak signals" and "one overwhelming signal" both
//! classify without any trained model.

use once_cell::sync::Lazy;
use regex::Regex;
use strsim::normalized_levenshtein;

use super::relevance::{has_experience_marker, has_question, mention_count, ENGAGE_LENGTH_RANGE, ENGAGE_MENTION_RANGE};
use crate::discover::AuthorProfile;

/// Weak-signal count at which a candidate classifies as a bot.
pub const BOT_SIGNALS_MIN: u32 = 3;
/// Likelihood saturates at this many weak signals.
pub const BOT_SIGNALS_SATURATION: f32 = 5.0;
/// `bot_likelihood >= cutoff` is the classification boundary. Three weak
/// signals land exactly on it.
pub const BOT_LIKELIHOOD_CUTOFF: f32 = 0.6;
/// This many emoji alone classifies as a bot.
pub const EMOJI_HARD_BOT: usize = 8;
/// Paired with two other weak signals, this many emoji classifies.
pub const EMOJI_SOFT: usize = 5;
pub const HASHTAG_MAX: usize = 4;
pub const LINK_MAX: usize = 2;
/// Sentence-length variance below this (with enough sentences) suggests
/// templated generation.
pub const VARIANCE_TEMPLATED: f32 = 100.0;
pub const VARIANCE_MIN_SENTENCES: usize = 3;
/// Near-duplicate similarity to a known announcement skeleton.
pub const TEMPLATE_SIMILARITY_MIN: f64 = 0.8;

pub const LOW_FOLLOWERS: u32 = 100;
pub const HIGH_POSTS: u32 = 1_000;
pub const FOLLOW_RATIO_SUSPECT: u32 = 10;
pub const RATIO_FOLLOWERS_MAX: u32 = 1_000;
pub const FOLLOW_RATIO_EXTREME: u32 = 50;
pub const YOUNG_ACCOUNT_DAYS: u32 = 30;
pub const BURST_POSTS: u32 = 500;

/// `shill_likelihood >= cutoff` is the classification boundary.
pub const SHILL_LIKELIHOOD_CUTOFF: f32 = 0.5;
pub const SHILL_PROMO_WEIGHT: f32 = 0.3;
pub const SHILL_PROMO_CAP: f32 = 0.6;
pub const SHILL_CAPS_WEIGHT: f32 = 0.25;
pub const SHILL_EMOJI_WEIGHT: f32 = 0.25;
pub const CAPS_RATIO_MAX: f32 = 0.3;
/// Caps ratio only counts on texts with at least this many letters.
pub const CAPS_MIN_LETTERS: usize = 12;

pub const QUALITY_MIN_SIGNALS: u32 = 3;
pub const REPUTABLE_FOLLOWERS: (u32, u32) = (100, 50_000);
pub const REPUTABLE_POSTS: (u32, u32) = (500, 20_000);

static ANNOUNCEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bdon'?t miss\b|\bgiveaway\b|\blimited time\b|\bfollow (and|&) (rt|retweet)\b|\blink in bio\b|\bsign up now\b|\bjoin (now|us today)\b|\bclaim your\b|\b100% (guaranteed|free)\b|\bto the moon\b",
    )
    .expect("announcement regex")
});

static PROMO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bbuy now\b|\bpresale\b|\bpump\b|\b\d+x (gains|returns)\b|\bguaranteed (returns|profit)\b|\bairdrop\b|\bdm (me|for)\b|\b(promo|use) code\b|\bdiscount\b|\bwhitelist spot\b",
    )
    .expect("promo regex")
});

/// Canonical templated announcements for the near-duplicate check.
static ANNOUNCEMENT_TEMPLATES: &[&str] = &[
    "big news dropping soon stay tuned and follow for updates",
    "we are excited to announce our new partnership",
    "check out this amazing project before it is too late",
];

pub fn emoji_count(text: &str) -> usize {
    text.chars()
        .filter(|c| {
            let cp = *c as u32;
            (0x1F300..=0x1FAFF).contains(&cp) || (0x2600..=0x27BF).contains(&cp)
        })
        .count()
}

pub fn hashtag_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.starts_with('#') && w.len() > 1)
        .count()
}

pub fn link_count(text: &str) -> usize {
    text.matches("http://").count() + text.matches("https://").count()
}

/// Uppercase share of alphabetic chars; 0.0 for short texts where a ratio
/// is meaningless.
pub fn caps_ratio(text: &str) -> f32 {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < CAPS_MIN_LETTERS {
        return 0.0;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f32 / letters.len() as f32
}

/// Variance of sentence lengths in chars; `None` with fewer than
/// [`VARIANCE_MIN_SENTENCES`] sentences.
pub fn sentence_length_variance(text: &str) -> Option<f32> {
    let lengths: Vec<f32> = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().count() as f32)
        .collect();
    if lengths.len() < VARIANCE_MIN_SENTENCES {
        return None;
    }
    let mean = lengths.iter().sum::<f32>() / lengths.len() as f32;
    let var = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f32>() / lengths.len() as f32;
    Some(var)
}

fn matches_announcement_template(text_lc: &str) -> bool {
    ANNOUNCEMENT_TEMPLATES
        .iter()
        .any(|t| normalized_levenshtein(text_lc, t) >= TEMPLATE_SIMILARITY_MIN)
}

/// Count of independent weak bot signals for a candidate.
pub fn bot_signals(text: &str, profile: Option<&AuthorProfile>) -> u32 {
    let text_lc = text.to_lowercase();
    let mut signals = 0;

    if ANNOUNCEMENT_RE.is_match(&text_lc) {
        signals += 1;
    }
    if matches_announcement_template(&text_lc) {
        signals += 1;
    }
    if hashtag_count(text) > HASHTAG_MAX {
        signals += 1;
    }
    if link_count(text) > LINK_MAX {
        signals += 1;
    }
    if let Some(var) = sentence_length_variance(text) {
        if var < VARIANCE_TEMPLATED {
            signals += 1;
        }
    }
    if let Some(p) = profile {
        if p.followers < LOW_FOLLOWERS && p.posts > HIGH_POSTS {
            signals += 1;
        }
        if p.followers < RATIO_FOLLOWERS_MAX && p.following > p.followers.saturating_mul(FOLLOW_RATIO_SUSPECT) {
            signals += 1;
        }
        if p.following / p.followers.max(1) > FOLLOW_RATIO_EXTREME {
            signals += 2;
        }
        if p.account_age_days < YOUNG_ACCOUNT_DAYS && p.posts > BURST_POSTS {
            signals += 2;
        }
    }
    signals
}

/// 0.0..=1.0. Crosses [`BOT_LIKELIHOOD_CUTOFF`] exactly when the rule set
/// classifies the candidate as a bot.
pub fn bot_likelihood(text: &str, profile: Option<&AuthorProfile>) -> f32 {
    let emoji = emoji_count(text);
    if emoji >= EMOJI_HARD_BOT {
        return 1.0;
    }
    let signals = bot_signals(text, profile);
    let base = (signals as f32 / BOT_SIGNALS_SATURATION).min(1.0);
    if signals >= 2 && emoji >= EMOJI_SOFT {
        return base.max(BOT_LIKELIHOOD_CUTOFF);
    }
    base
}

/// 0.0..=1.0. Promotional-phrase density plus excess formatting.
pub fn shill_likelihood(text: &str) -> f32 {
    let text_lc = text.to_lowercase();
    let promo = PROMO_RE.find_iter(&text_lc).count() as f32;
    let mut score = (promo * SHILL_PROMO_WEIGHT).min(SHILL_PROMO_CAP);
    if caps_ratio(text) > CAPS_RATIO_MAX {
        score += SHILL_CAPS_WEIGHT;
    }
    if emoji_count(text) > EMOJI_SOFT {
        score += SHILL_EMOJI_WEIGHT;
    }
    score.min(1.0)
}

/// Genuine-discussion gate: enough human signals to be worth a reply.
pub fn quality_discussion(text: &str, profile: Option<&AuthorProfile>) -> bool {
    let mut signals = 0;
    if has_question(text) {
        signals += 1;
    }
    if has_experience_marker(text) {
        signals += 1;
    }
    let mentions = mention_count(text);
    if (ENGAGE_MENTION_RANGE.0..=ENGAGE_MENTION_RANGE.1).contains(&mentions) {
        signals += 1;
    }
    let len = text.chars().count();
    if (ENGAGE_LENGTH_RANGE.0..ENGAGE_LENGTH_RANGE.1).contains(&len) {
        signals += 1;
    }
    if let Some(p) = profile {
        if (REPUTABLE_FOLLOWERS.0..=REPUTABLE_FOLLOWERS.1).contains(&p.followers)
            && (REPUTABLE_POSTS.0..=REPUTABLE_POSTS.1).contains(&p.posts)
        {
            signals += 1;
        }
    }
    signals >= QUALITY_MIN_SIGNALS
}
