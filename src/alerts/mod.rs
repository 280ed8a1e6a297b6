// src/alerts/mod.rs
//! Alert tiering, batching, dispatch and the audit trail.
//!
//! One Opportunity -> payload transformation for every tier; realtime alerts
//! and digests render through [`render_batch`] and nothing else. Dispatch is
//! at-least-once per batch: each configured sink gets one timed attempt, a
//! failure is logged and surfaced in status, and there is no retry queue
//! beyond the current cycle.

pub mod email;
pub mod webhook;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Timelike};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::config::TierSection;
use crate::error::{DispatchError, PersistenceError};
use crate::metrics::MetricsRecorder;
use crate::pipeline::Opportunity;

/// A stuck send is a failure, never a stall of the scheduler loop.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const HISTORY_CAP: usize = 1_000;
const SUMMARY_SNIPPET: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Immediate,
    Priority,
    Digest,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Immediate => "immediate",
            Tier::Priority => "priority",
            Tier::Digest => "digest",
        }
    }

    /// Inclusive boundaries: a score exactly on a threshold enters that
    /// tier. Below the digest threshold means no alert at all.
    pub fn classify(score: f32, tiers: &TierSection) -> Option<Tier> {
        if score >= tiers.immediate {
            Some(Tier::Immediate)
        } else if score >= tiers.priority {
            Some(Tier::Priority)
        } else if score >= tiers.digest {
            Some(Tier::Digest)
        } else {
            None
        }
    }
}

/// Transport seam. Body formatting stays on this side; sinks only carry.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        subject: &str,
        body: &str,
        tier: Tier,
        count: usize,
    ) -> Result<(), DispatchError>;

    fn name(&self) -> &'static str;
}

/// Sink of last resort: the alert goes to the log stream and nowhere else.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(
        &self,
        subject: &str,
        _body: &str,
        tier: Tier,
        count: usize,
    ) -> Result<(), DispatchError> {
        tracing::info!(target: "alerts", tier = tier.as_str(), count, subject, "alert (log sink)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Every configured sink, by env presence: SMTP vars select email, a
/// webhook URL selects the webhook. With neither, alerts go to the log.
pub fn sinks_from_env() -> anyhow::Result<Vec<Box<dyn NotificationSink>>> {
    let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();
    if std::env::var(email::ENV_SMTP_HOST).is_ok() {
        sinks.push(Box::new(email::EmailSink::from_env()?));
    }
    if std::env::var(webhook::ENV_WEBHOOK_URL).is_ok() {
        sinks.push(Box::new(webhook::WebhookSink::from_env()?));
    }
    if sinks.is_empty() {
        tracing::warn!(target: "alerts", "no notification sinks configured, alerts will only be logged");
        sinks.push(Box::new(LogSink));
    }
    Ok(sinks)
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertBatch {
    pub tier: Tier,
    pub opportunities: Vec<Opportunity>,
    pub subject: String,
    pub body: String,
    pub dispatched_at: i64,
}

/// The single Opportunity -> payload code path.
pub fn render_batch(tier: Tier, opportunities: &[Opportunity]) -> (String, String) {
    let lead = opportunities
        .first()
        .map(|o| o.candidate.trigger_keyword.as_str())
        .unwrap_or("monitor");
    let subject = format!(
        "[{}] {} opportunit{} — {}",
        tier.as_str(),
        opportunities.len(),
        if opportunities.len() == 1 { "y" } else { "ies" },
        lead
    );
    let mut body = String::new();
    for (i, opp) in opportunities.iter().enumerate() {
        body.push_str(&format!(
            "{}. [{:.2}] @{} on \"{}\"\n   {}\n   draft: {}\n",
            i + 1,
            opp.overall_score,
            opp.candidate.author_id,
            opp.candidate.trigger_keyword,
            snippet(&opp.candidate.text),
            opp.reply.reply,
        ));
        if !opp.reply.alternatives.is_empty() {
            body.push_str(&format!(
                "   ({} alternative draft{})\n",
                opp.reply.alternatives.len(),
                if opp.reply.alternatives.len() == 1 { "" } else { "s" }
            ));
        }
    }
    (subject, body)
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= SUMMARY_SNIPPET {
        text.to_string()
    } else {
        let cut: String = text.chars().take(SUMMARY_SNIPPET).collect();
        format!("{cut}…")
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub ts_unix: i64,
    pub tier: Tier,
    pub count: usize,
    pub summary: String,
    pub delivered: bool,
}

/// Ordered, capped log of dispatched batches, persisted as JSON next to the
/// dedup snapshot. Load errors degrade to an empty in-memory log.
pub struct AlertHistory {
    path: PathBuf,
    cap: usize,
    inner: Mutex<Vec<AlertRecord>>,
}

impl AlertHistory {
    pub fn open(path: impl Into<PathBuf>, cap: usize) -> Self {
        let path = path.into();
        let records = match load_records(&path) {
            Ok(r) => r,
            Err(err) => {
                tracing::error!(target: "alerts", %err, "alert history load failed, starting empty");
                Vec::new()
            }
        };
        Self {
            path,
            cap: cap.max(1),
            inner: Mutex::new(records),
        }
    }

    pub fn append(&self, record: AlertRecord) -> Result<(), PersistenceError> {
        let snapshot = {
            let mut records = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            records.push(record);
            if records.len() > self.cap {
                let excess = records.len() - self.cap;
                records.drain(0..excess);
            }
            records.clone()
        };
        write_records(&self.path, &snapshot)
    }

    pub fn last_n(&self, n: usize) -> Vec<AlertRecord> {
        let records = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_records(path: &Path) -> Result<Vec<AlertRecord>, PersistenceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PersistenceError::Decode {
        path: path.display().to_string(),
        source,
    })
}

fn write_records(path: &Path, records: &[AlertRecord]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }
    let body = serde_json::to_string(records).map_err(|source| PersistenceError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body).map_err(|source| PersistenceError::Io {
        path: tmp.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatus {
    pub digest_queue: usize,
    pub last_error: Option<String>,
    pub history_len: usize,
}

pub struct AlertDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
    tiers: TierSection,
    history: AlertHistory,
    recorder: Arc<MetricsRecorder>,
    digest_queue: Mutex<Vec<Opportunity>>,
    last_digest_day: Mutex<Option<NaiveDate>>,
    last_error: Mutex<Option<String>>,
}

impl AlertDispatcher {
    pub fn new(
        tiers: TierSection,
        sinks: Vec<Box<dyn NotificationSink>>,
        history: AlertHistory,
        recorder: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            sinks,
            tiers,
            history,
            recorder,
            digest_queue: Mutex::new(Vec::new()),
            last_digest_day: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Realtime tiers alert now, top-K by score per tier; the digest tier
    /// only queues until the flush hour.
    pub async fn dispatch_cycle(&self, opportunities: Vec<Opportunity>) {
        let mut immediate = Vec::new();
        let mut priority = Vec::new();
        let mut digest = Vec::new();
        for opp in opportunities {
            match opp.tier {
                Tier::Immediate => immediate.push(opp),
                Tier::Priority => priority.push(opp),
                Tier::Digest => digest.push(opp),
            }
        }

        for (tier, mut batch) in [(Tier::Immediate, immediate), (Tier::Priority, priority)] {
            if batch.is_empty() {
                continue;
            }
            batch.sort_by(|a, b| {
                b.overall_score
                    .partial_cmp(&a.overall_score)
                    .unwrap_or(Ordering::Equal)
            });
            batch.truncate(self.tiers.top_k);
            self.send_batch(tier, batch).await;
        }

        if !digest.is_empty() {
            let mut queue = self.digest_queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.extend(digest);
            tracing::debug!(target: "alerts", queued = queue.len(), "digest queue grew");
        }
    }

    /// Flushes the digest queue when the local clock enters the configured
    /// hour, at most once per day. An empty queue still marks the day so a
    /// late-arriving opportunity cannot trigger a second same-day digest.
    pub async fn maybe_flush_digest(&self, now: DateTime<Local>) {
        if now.hour() != self.tiers.digest_flush_hour {
            return;
        }
        let today = now.date_naive();
        {
            let mut last = self.last_digest_day.lock().unwrap_or_else(|e| e.into_inner());
            if *last == Some(today) {
                return;
            }
            *last = Some(today);
        }
        let queued: Vec<Opportunity> = {
            let mut queue = self.digest_queue.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *queue)
        };
        if queued.is_empty() {
            tracing::debug!(target: "alerts", "digest hour with an empty queue");
            return;
        }
        tracing::info!(target: "alerts", count = queued.len(), "flushing daily digest");
        self.send_batch(Tier::Digest, queued).await;
    }

    async fn send_batch(&self, tier: Tier, opportunities: Vec<Opportunity>) -> AlertBatch {
        let (subject, body) = render_batch(tier, &opportunities);
        let count = opportunities.len();
        let mut delivered = false;

        for sink in &self.sinks {
            let attempt =
                tokio::time::timeout(DISPATCH_TIMEOUT, sink.send(&subject, &body, tier, count))
                    .await;
            match attempt {
                Ok(Ok(())) => {
                    delivered = true;
                    counter!(
                        "alerts_sent_total",
                        "sink" => sink.name(),
                        "tier" => tier.as_str()
                    )
                    .increment(1);
                }
                Ok(Err(err)) => self.note_failure(sink.name(), err.to_string()),
                Err(_) => self.note_failure(
                    sink.name(),
                    DispatchError::Timeout {
                        sink: sink.name(),
                        after: DISPATCH_TIMEOUT,
                    }
                    .to_string(),
                ),
            }
        }
        if delivered {
            self.recorder.alert_sent();
        }

        let record = AlertRecord {
            ts_unix: chrono::Utc::now().timestamp(),
            tier,
            count,
            summary: snippet(
                opportunities
                    .first()
                    .map(|o| o.candidate.text.as_str())
                    .unwrap_or(""),
            ),
            delivered,
        };
        if let Err(err) = self.history.append(record) {
            tracing::error!(target: "alerts", %err, "alert history persist failed");
        }

        AlertBatch {
            tier,
            opportunities,
            subject,
            body,
            dispatched_at: chrono::Utc::now().timestamp(),
        }
    }

    fn note_failure(&self, sink: &'static str, message: String) {
        tracing::warn!(target: "alerts", sink, %message, "alert send failed");
        counter!("dispatch_failures_total", "sink" => sink).increment(1);
        self.recorder.dispatch_failed();
        let mut last = self.last_error.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(format!("{sink}: {message}"));
    }

    pub fn digest_queue_len(&self) -> usize {
        self.digest_queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            digest_queue: self.digest_queue_len(),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            history_len: self.history.len(),
        }
    }

    pub fn recent(&self, n: usize) -> Vec<AlertRecord> {
        self.history.last_n(n)
    }
}
