// src/discover/x_api.rs
//! Recent-search provider against the X API v2.
//!
//! One `search` call maps to one GET on `/2/tweets/search/recent` with the
//! author expansion, so candidates arrive with the account metadata the
//! authenticity heuristics need. HTTP 429 is surfaced as
//! [`DiscoveryError::RateLimited`] with the server cool-down hint.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{AuthorProfile, Candidate, DiscoverySource, InteractionCounts};
use crate::error::DiscoveryError;

pub const ENV_BEARER_TOKEN: &str = "X_BEARER_TOKEN";

const DEFAULT_BASE_URL: &str = "https://api.x.com";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// The recent-search endpoint rejects max_results outside 10..=100.
const API_MIN_RESULTS: u32 = 10;
const API_MAX_RESULTS: u32 = 100;
const ERROR_BODY_SNIPPET: usize = 200;

pub struct XSearchProvider {
    http: reqwest::Client,
    base_url: String,
    bearer: String,
}

impl XSearchProvider {
    /// Requires `X_BEARER_TOKEN`; absence is a startup error.
    pub fn from_env() -> anyhow::Result<Self> {
        let bearer = std::env::var(ENV_BEARER_TOKEN)
            .with_context(|| format!("missing {ENV_BEARER_TOKEN} env var"))?;
        Ok(Self::new(bearer))
    }

    pub fn new(bearer: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("opportunity-radar/0.1")
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            bearer,
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into();
        self
    }
}

#[async_trait]
impl DiscoverySource for XSearchProvider {
    async fn search(
        &self,
        topic: &str,
        max_results: u32,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        let url = format!("{}/2/tweets/search/recent", self.base_url);
        let clamped = max_results.clamp(API_MIN_RESULTS, API_MAX_RESULTS);
        let query = format!("{topic} -is:retweet");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.bearer)
            .query(&[
                ("query", query.as_str()),
                ("max_results", &clamped.to_string()),
                ("tweet.fields", "created_at,public_metrics,author_id"),
                ("expansions", "author_id"),
                ("user.fields", "created_at,public_metrics,username"),
            ])
            .send()
            .await?;

        let now_unix = chrono::Utc::now().timestamp();
        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after = parse_retry_after(resp.headers(), now_unix);
            return Err(DiscoveryError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DiscoveryError::Api {
                status: status.as_u16(),
                message: body.chars().take(ERROR_BODY_SNIPPET).collect(),
            });
        }

        let body = resp.text().await?;
        let candidates = parse_search_response(&body, topic, now_unix)?;
        counter!("discovery_candidates_total", "source" => self.name())
            .increment(candidates.len() as u64);
        tracing::debug!(
            target: "discover",
            topic,
            count = candidates.len(),
            "search returned"
        );
        Ok(candidates)
    }

    fn name(&self) -> &'static str {
        "x_search"
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap, now_unix: i64) -> Option<Duration> {
    if let Some(v) = headers.get("retry-after") {
        if let Some(secs) = v.to_str().ok().and_then(|s| s.trim().parse::<u64>().ok()) {
            return Some(Duration::from_secs(secs));
        }
    }
    // Fallback: absolute window reset time.
    if let Some(v) = headers.get("x-rate-limit-reset") {
        if let Some(reset) = v.to_str().ok().and_then(|s| s.trim().parse::<i64>().ok()) {
            let delta = reset.saturating_sub(now_unix);
            if delta > 0 {
                return Some(Duration::from_secs(delta as u64));
            }
        }
    }
    None
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Deserialize)]
struct Tweet {
    id: String,
    text: String,
    author_id: String,
    created_at: Option<String>,
    public_metrics: Option<TweetMetrics>,
}

#[derive(Deserialize)]
struct TweetMetrics {
    #[serde(default)]
    like_count: u32,
    #[serde(default)]
    retweet_count: u32,
    #[serde(default)]
    reply_count: u32,
}

#[derive(Deserialize, Default)]
struct Includes {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Deserialize)]
struct User {
    id: String,
    username: Option<String>,
    created_at: Option<String>,
    public_metrics: Option<UserMetrics>,
}

#[derive(Deserialize)]
struct UserMetrics {
    #[serde(default)]
    followers_count: u32,
    #[serde(default)]
    following_count: u32,
    #[serde(default)]
    tweet_count: u32,
}

fn parse_rfc3339_to_unix(s: &str) -> Option<i64> {
    OffsetDateTime::parse(s, &Rfc3339)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

/// Pure response mapping, kept separate from transport for tests.
fn parse_search_response(
    body: &str,
    topic: &str,
    now_unix: i64,
) -> Result<Vec<Candidate>, DiscoveryError> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| DiscoveryError::Api {
            status: 200,
            message: format!("unparsable search payload: {e}"),
        })?;

    let mut out = Vec::with_capacity(parsed.data.len());
    for tweet in parsed.data {
        let user = parsed.includes.users.iter().find(|u| u.id == tweet.author_id);
        let author_id = user
            .and_then(|u| u.username.clone())
            .unwrap_or_else(|| tweet.author_id.clone());
        let author = user.map(|u| {
            let account_age_days = u
                .created_at
                .as_deref()
                .and_then(parse_rfc3339_to_unix)
                .map(|created| now_unix.saturating_sub(created).max(0) / 86_400)
                .unwrap_or(0) as u32;
            let m = u.public_metrics.as_ref();
            AuthorProfile {
                followers: m.map(|m| m.followers_count).unwrap_or(0),
                following: m.map(|m| m.following_count).unwrap_or(0),
                posts: m.map(|m| m.tweet_count).unwrap_or(0),
                account_age_days,
            }
        });
        let discovered_at = tweet
            .created_at
            .as_deref()
            .and_then(parse_rfc3339_to_unix)
            .unwrap_or(now_unix);
        let interactions = tweet
            .public_metrics
            .map(|m| InteractionCounts {
                likes: m.like_count,
                reposts: m.retweet_count,
                replies: m.reply_count,
            })
            .unwrap_or_default();
        out.push(Candidate {
            source_id: Some(tweet.id),
            author_id,
            text: tweet.text,
            interactions,
            discovered_at,
            trigger_keyword: topic.to_string(),
            author,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "data": [
            {
                "id": "1001",
                "text": "Anyone tried tokio graceful shutdown in prod?",
                "author_id": "77",
                "created_at": "2026-08-01T12:30:00.000Z",
                "public_metrics": {"retweet_count": 2, "reply_count": 5, "like_count": 11, "quote_count": 0}
            },
            {
                "id": "1002",
                "text": "unrelated",
                "author_id": "unknown-user",
                "created_at": "not-a-date"
            }
        ],
        "includes": {
            "users": [
                {
                    "id": "77",
                    "username": "asyncdev",
                    "created_at": "2025-08-01T00:00:00.000Z",
                    "public_metrics": {"followers_count": 420, "following_count": 310, "tweet_count": 2900}
                }
            ]
        }
    }"#;

    #[test]
    fn maps_tweets_and_author_expansion() {
        let now = parse_rfc3339_to_unix("2026-08-02T00:00:00Z").unwrap();
        let out = parse_search_response(FIXTURE, "tokio", now).unwrap();
        assert_eq!(out.len(), 2);

        let first = &out[0];
        assert_eq!(first.source_id.as_deref(), Some("1001"));
        assert_eq!(first.author_id, "asyncdev");
        assert_eq!(first.interactions.likes, 11);
        assert_eq!(first.trigger_keyword, "tokio");
        let profile = first.author.unwrap();
        assert_eq!(profile.followers, 420);
        // 2025-08-01 -> 2026-08-02 is a year and a day.
        assert_eq!(profile.account_age_days, 366);

        // Missing expansion falls back to the raw author id, bad date to now.
        let second = &out[1];
        assert_eq!(second.author_id, "unknown-user");
        assert!(second.author.is_none());
        assert_eq!(second.discovered_at, now);
    }

    #[test]
    fn empty_payload_is_empty_vec() {
        let out = parse_search_response("{}", "tokio", 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn retry_after_header_wins() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("retry-after", "120".parse().unwrap());
        headers.insert("x-rate-limit-reset", "9999999999".parse().unwrap());
        assert_eq!(
            parse_retry_after(&headers, 0),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn reset_header_is_relative_to_now() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-rate-limit-reset", "1000".parse().unwrap());
        assert_eq!(
            parse_retry_after(&headers, 400),
            Some(Duration::from_secs(600))
        );
        assert_eq!(parse_retry_after(&headers, 2000), None);
    }
}
