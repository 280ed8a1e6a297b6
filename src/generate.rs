//! Reply drafting: generator seam + deterministic fallback.
//!
//! The pipeline never depends on drafting success. A provider failure of any
//! kind degrades to [`fallback_reply`], which picks from a fixed pool keyed
//! by the candidate fingerprint so retries produce the same text.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::VoiceSection;
use crate::error::GenerationError;

pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const MAX_TOKENS: u32 = 400;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Confidence attached when the provider answered but without a usable
/// confidence of its own.
pub const DEFAULT_CONFIDENCE: f32 = 0.6;
/// Confidence attached to fallback replies.
pub const FALLBACK_CONFIDENCE: f32 = 0.25;
pub const FALLBACK_VOICE_ALIGNMENT: f32 = 0.5;
/// Each configured avoid-phrase found in a draft costs this much alignment.
pub const AVOID_PENALTY: f32 = 0.25;
/// Hard cap applied to drafts, platform reply length.
pub const MAX_REPLY_CHARS: usize = 280;

#[derive(Debug, Clone)]
pub struct ReplyContext<'a> {
    pub text: &'a str,
    pub topic_tags: &'a [String],
    pub voice: &'a VoiceSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedReply {
    pub reply: String,
    pub alternatives: Vec<String>,
    pub confidence: f32,
    pub voice_alignment: f32,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, ctx: &ReplyContext<'_>) -> Result<GeneratedReply, GenerationError>;
    fn name(&self) -> &'static str;
}

/// Share of avoid-phrases absent from the draft, 0.0..=1.0.
pub fn voice_alignment(reply: &str, voice: &VoiceSection) -> f32 {
    let reply_lc = reply.to_lowercase();
    let hits = voice
        .avoid
        .iter()
        .filter(|phrase| !phrase.is_empty() && reply_lc.contains(&phrase.to_lowercase()))
        .count();
    (1.0 - hits as f32 * AVOID_PENALTY).max(0.0)
}

/// Trim, collapse runs of whitespace, cap at the platform limit.
pub fn sanitize_reply(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_REPLY_CHARS));
    let mut last_ws = true;
    for c in raw.chars() {
        if c.is_whitespace() {
            if !last_ws {
                out.push(' ');
            }
            last_ws = true;
        } else {
            out.push(c);
            last_ws = false;
        }
        if out.chars().count() >= MAX_REPLY_CHARS {
            break;
        }
    }
    out.trim_end().to_string()
}

static FALLBACK_REPLIES: &[&str] = &[
    "Interesting take on {topic}. What pushed you toward that setup?",
    "Curious about the details here, especially around {topic}. What did the numbers look like?",
    "This matches what we have seen with {topic}. Did you find a workaround you would recommend?",
    "Good thread. How has {topic} held up for you under real load?",
    "Worth digging into. What surprised you most about {topic} here?",
];

/// Deterministic pool pick: the same fingerprint always yields the same
/// fallback text.
pub fn fallback_reply(fingerprint: &str, topic: &str) -> String {
    let sum: u64 = fingerprint.bytes().map(u64::from).sum();
    let idx = (sum % FALLBACK_REPLIES.len() as u64) as usize;
    FALLBACK_REPLIES[idx].replace("{topic}", topic)
}

/// Anthropic messages-API provider. Requires `ANTHROPIC_API_KEY`.
pub struct ClaudeGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeGenerator {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var(ENV_ANTHROPIC_API_KEY).map_err(|_| {
            anyhow::anyhow!("missing {ENV_ANTHROPIC_API_KEY} env var for the reply generator")
        })?;
        Ok(Self::new(api_key))
    }

    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("opportunity-radar/0.1")
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: API_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn system_prompt(voice: &VoiceSection) -> String {
        let mut prompt = String::from(
            "You draft short social replies for an engineer. Reply with JSON only: \
             {\"reply\": str, \"alternatives\": [str, str], \"confidence\": number 0..1}. \
             Each option under 280 chars, no hashtags, no emojis.",
        );
        if !voice.tone.is_empty() {
            prompt.push_str(&format!(" Tone: {}.", voice.tone));
        }
        if !voice.expertise.is_empty() {
            prompt.push_str(&format!(" Expertise: {}.", voice.expertise.join(", ")));
        }
        if !voice.avoid.is_empty() {
            prompt.push_str(&format!(" Never mention: {}.", voice.avoid.join(", ")));
        }
        prompt
    }
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ApiContent>,
}

#[derive(Deserialize)]
struct ApiContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct DraftPayload {
    reply: String,
    #[serde(default)]
    alternatives: Vec<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[async_trait]
impl ContentGenerator for ClaudeGenerator {
    async fn generate(&self, ctx: &ReplyContext<'_>) -> Result<GeneratedReply, GenerationError> {
        let system = Self::system_prompt(ctx.voice);
        let user = format!(
            "Topics: {}\nPost:\n{}",
            ctx.topic_tags.join(", "),
            ctx.text
        );
        let req = ApiRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: &system,
            messages: vec![ApiMessage {
                role: "user",
                content: &user,
            }],
        };

        let resp = self
            .http
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Provider {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let text = body
            .content
            .first()
            .map(|c| c.text.trim())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GenerationError::Malformed("empty content".to_string()));
        }

        // Preferred shape is the JSON contract; a plain-text answer still
        // counts as a single draft.
        let (reply, alternatives, confidence) = match serde_json::from_str::<DraftPayload>(text) {
            Ok(draft) => (
                draft.reply,
                draft.alternatives,
                draft.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            ),
            Err(_) => (text.to_string(), Vec::new(), DEFAULT_CONFIDENCE),
        };
        let reply = sanitize_reply(&reply);
        if reply.is_empty() {
            return Err(GenerationError::Malformed("blank reply".to_string()));
        }
        let alternatives: Vec<String> = alternatives
            .iter()
            .map(|a| sanitize_reply(a))
            .filter(|a| !a.is_empty())
            .collect();
        let alignment = voice_alignment(&reply, ctx.voice);
        Ok(GeneratedReply {
            reply,
            alternatives,
            confidence: confidence.clamp(0.0, 1.0),
            voice_alignment: alignment,
        })
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}

/// Always fails with [`GenerationError::Disabled`]; wiring for runs without
/// a drafting credential. The pipeline falls back on every opportunity.
pub struct DisabledGenerator;

#[async_trait]
impl ContentGenerator for DisabledGenerator {
    async fn generate(&self, _ctx: &ReplyContext<'_>) -> Result<GeneratedReply, GenerationError> {
        Err(GenerationError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic generator for tests and demos.
pub struct MockGenerator {
    pub reply: String,
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, ctx: &ReplyContext<'_>) -> Result<GeneratedReply, GenerationError> {
        Ok(GeneratedReply {
            reply: self.reply.clone(),
            alternatives: vec![format!("Alt take: {}", self.reply)],
            confidence: 0.9,
            voice_alignment: voice_alignment(&self.reply, ctx.voice),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Environment-driven wiring: a key selects the real provider, its absence
/// selects [`DisabledGenerator`] with a warning.
pub fn generator_from_env() -> Box<dyn ContentGenerator> {
    match ClaudeGenerator::from_env() {
        Ok(g) => Box::new(g),
        Err(err) => {
            tracing::warn!(target: "generate", %err, "reply drafting disabled");
            Box::new(DisabledGenerator)
        }
    }
}
