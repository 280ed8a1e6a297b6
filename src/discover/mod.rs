// src/discover/mod.rs
//! Discovery layer: candidate model, provider seam, text normalization.
//!
//! Providers return raw [`Candidate`]s per topic; the pipeline normalizes,
//! scores and fingerprints them. Candidates are ephemeral and never persisted.

pub mod x_api;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DiscoveryError;

/// Cap applied after entity decoding and whitespace collapse.
const MAX_TEXT_LEN: usize = 2000;

/// Prefix length fed into content fingerprints. Coarse on purpose: reposts
/// with trailing edits still collapse to one fingerprint.
const FINGERPRINT_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InteractionCounts {
    pub likes: u32,
    pub reposts: u32,
    pub replies: u32,
}

impl InteractionCounts {
    /// Saturates rather than trusting provider metrics to stay in range.
    pub fn total(&self) -> u32 {
        self.likes
            .saturating_add(self.reposts)
            .saturating_add(self.replies)
    }
}

/// Account metadata used by the authenticity heuristics. Absent when the
/// provider response carried no author expansion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorProfile {
    pub followers: u32,
    pub following: u32,
    pub posts: u32,
    pub account_age_days: u32,
}

/// Raw discovered item prior to scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Provider-native content id, when one exists.
    pub source_id: Option<String>,
    pub author_id: String,
    pub text: String,
    pub interactions: InteractionCounts,
    /// Unix seconds.
    pub discovered_at: i64,
    pub trigger_keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorProfile>,
}

impl Candidate {
    /// Deterministic dedup identity. Native id wins; otherwise a short
    /// content hash bucketed to the UTC hour, so near-duplicate bursts
    /// inside one hour collapse to a single fingerprint.
    pub fn fingerprint(&self) -> String {
        if let Some(id) = &self.source_id {
            return format!("{}_{}", self.author_id, id);
        }
        let prefix: String = self.text.chars().take(FINGERPRINT_PREFIX_CHARS).collect();
        let mut hasher = Sha256::new();
        hasher.update(self.author_id.as_bytes());
        hasher.update(prefix.as_bytes());
        let digest = hasher.finalize();
        let short: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
        format!("{}_{}", short, hour_bucket(self.discovered_at))
    }
}

fn hour_bucket(unix_secs: i64) -> String {
    chrono::DateTime::from_timestamp(unix_secs, 0)
        .unwrap_or_default()
        .format("%Y%m%d%H")
        .to_string()
}

/// Search seam to the external content source. A rate-limit failure must be
/// distinguishable (see [`DiscoveryError::RateLimited`]) so the caller can
/// put the endpoint into backoff.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn search(
        &self,
        topic: &str,
        max_results: u32,
    ) -> Result<Vec<Candidate>, DiscoveryError>;

    fn name(&self) -> &'static str;

    /// Budget key debited per `search` call.
    fn endpoint(&self) -> &'static str {
        "search"
    }
}

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

/// Decode HTML entities, collapse whitespace, trim, cap length.
pub fn normalize_text(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    let collapsed = WS_RE.replace_all(decoded.as_ref(), " ");
    let trimmed = collapsed.trim();
    if trimmed.chars().count() > MAX_TEXT_LEN {
        trimmed.chars().take(MAX_TEXT_LEN).collect()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(text: &str, at: i64) -> Candidate {
        Candidate {
            source_id: None,
            author_id: "tester".into(),
            text: text.into(),
            interactions: InteractionCounts::default(),
            discovered_at: at,
            trigger_keyword: "rust".into(),
            author: None,
        }
    }

    #[test]
    fn normalize_decodes_and_collapses() {
        let out = normalize_text("  Tokio &amp; Axum \n\n are   nice&#39;s  ");
        assert_eq!(out, "Tokio & Axum are nice's");
    }

    #[test]
    fn normalize_caps_length() {
        let long = "x".repeat(MAX_TEXT_LEN + 50);
        assert_eq!(normalize_text(&long).chars().count(), MAX_TEXT_LEN);
    }

    #[test]
    fn native_id_wins_fingerprint() {
        let mut c = candidate("whatever", 0);
        c.source_id = Some("12345".into());
        assert_eq!(c.fingerprint(), "tester_12345");
    }

    #[test]
    fn same_hour_same_prefix_collapses() {
        let a = candidate("identical burst text", 1_700_000_000);
        let b = candidate("identical burst text", 1_700_000_100);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn different_hour_splits_fingerprint() {
        let a = candidate("identical burst text", 1_700_000_000);
        let b = candidate("identical burst text", 1_700_000_000 + 3_600);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn long_tail_beyond_prefix_is_ignored() {
        let base = "y".repeat(FINGERPRINT_PREFIX_CHARS);
        let a = candidate(&format!("{base} tail one"), 1_700_000_000);
        let b = candidate(&format!("{base} tail two"), 1_700_000_000);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn interaction_total_saturates_on_hostile_counts() {
        let counts = InteractionCounts {
            likes: u32::MAX,
            reposts: 7,
            replies: 1,
        };
        assert_eq!(counts.total(), u32::MAX);
    }
}
