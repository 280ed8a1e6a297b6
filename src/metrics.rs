// src/metrics.rs
//! Metrics Recorder: process-local counters, snapshot history, Prometheus.
//!
//! Two sides on purpose. The `metrics` facade feeds the Prometheus exporter
//! and is export-only; the [`MetricsRecorder`] keeps its own counters so it
//! can derive efficiency ratios and append immutable snapshots to a capped
//! history, independent of whatever scrapes `/metrics`.

use std::sync::Mutex;

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::Serialize;

/// One-time registration of every metric the engine emits.
pub fn ensure_metrics_described() {
    static DESCRIBED: OnceCell<()> = OnceCell::new();
    DESCRIBED.get_or_init(|| {
        describe_counter!("api_calls_total", "External API calls, labeled by endpoint");
        describe_counter!(
            "budget_refusals_total",
            "Calls refused by the rate budget, labeled by endpoint"
        );
        describe_counter!("backoffs_total", "Backoffs applied, labeled by endpoint");
        describe_counter!(
            "discovery_candidates_total",
            "Raw candidates returned by discovery, labeled by source"
        );
        describe_counter!("opportunities_total", "Opportunities created");
        describe_counter!("duplicates_suppressed_total", "Candidates dropped as already seen");
        describe_counter!("candidates_rejected_total", "Candidates rejected by the scorer");
        describe_counter!("generation_fallbacks_total", "Replies served from the fallback pool");
        describe_counter!("alerts_sent_total", "Alert batches delivered, labeled by sink and tier");
        describe_counter!("dispatch_failures_total", "Alert sends that failed, labeled by sink");
        describe_gauge!("dedup_entries", "Fingerprints currently held by the dedup store");
        describe_gauge!("metrics_snapshots", "Snapshots currently held in history");
    });
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    cycles: u64,
    discovery_calls: u64,
    candidates_scored: u64,
    candidates_rejected: u64,
    duplicates_suppressed: u64,
    opportunities: u64,
    generation_fallbacks: u64,
    alerts_sent: u64,
    dispatch_failures: u64,
}

/// Point-in-time counters plus derived ratios. Immutable once taken.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub at_unix: i64,
    pub cycles: u64,
    pub discovery_calls: u64,
    pub candidates_scored: u64,
    pub candidates_rejected: u64,
    pub duplicates_suppressed: u64,
    pub opportunities: u64,
    pub generation_fallbacks: u64,
    pub alerts_sent: u64,
    pub dispatch_failures: u64,
    /// Opportunities per scored candidate.
    pub opportunity_rate: f32,
    /// Discovery calls spent per opportunity found.
    pub calls_per_opportunity: f32,
    /// Alert batches per opportunity.
    pub alert_rate: f32,
}

pub struct MetricsRecorder {
    counters: Mutex<Counters>,
    history: Mutex<Vec<MetricsSnapshot>>,
    history_cap: usize,
}

impl MetricsRecorder {
    pub fn new(history_cap: usize) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            history: Mutex::new(Vec::new()),
            history_cap: history_cap.max(1),
        }
    }

    fn bump(&self, f: impl FnOnce(&mut Counters)) {
        let mut c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut c);
    }

    pub fn cycle_completed(&self) {
        self.bump(|c| c.cycles += 1);
    }

    pub fn discovery_call(&self) {
        self.bump(|c| c.discovery_calls += 1);
    }

    pub fn candidate_scored(&self) {
        self.bump(|c| c.candidates_scored += 1);
    }

    pub fn candidate_rejected(&self) {
        self.bump(|c| c.candidates_rejected += 1);
        metrics::counter!("candidates_rejected_total").increment(1);
    }

    pub fn duplicate_suppressed(&self) {
        self.bump(|c| c.duplicates_suppressed += 1);
        metrics::counter!("duplicates_suppressed_total").increment(1);
    }

    pub fn opportunity_created(&self) {
        self.bump(|c| c.opportunities += 1);
        metrics::counter!("opportunities_total").increment(1);
    }

    pub fn generation_fallback(&self) {
        self.bump(|c| c.generation_fallbacks += 1);
        metrics::counter!("generation_fallbacks_total").increment(1);
    }

    pub fn alert_sent(&self) {
        self.bump(|c| c.alerts_sent += 1);
    }

    pub fn dispatch_failed(&self) {
        self.bump(|c| c.dispatch_failures += 1);
    }

    /// Live snapshot of the counters; does not touch history.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(chrono::Utc::now().timestamp())
    }

    pub fn snapshot_at(&self, now_unix: i64) -> MetricsSnapshot {
        let c = *self.counters.lock().unwrap_or_else(|e| e.into_inner());
        MetricsSnapshot {
            at_unix: now_unix,
            cycles: c.cycles,
            discovery_calls: c.discovery_calls,
            candidates_scored: c.candidates_scored,
            candidates_rejected: c.candidates_rejected,
            duplicates_suppressed: c.duplicates_suppressed,
            opportunities: c.opportunities,
            generation_fallbacks: c.generation_fallbacks,
            alerts_sent: c.alerts_sent,
            dispatch_failures: c.dispatch_failures,
            opportunity_rate: ratio(c.opportunities, c.candidates_scored),
            calls_per_opportunity: ratio(c.discovery_calls, c.opportunities),
            alert_rate: ratio(c.alerts_sent, c.opportunities),
        }
    }

    /// Appends a snapshot to the capped history and returns it. Runs on the
    /// snapshot timer, decoupled from the cycle.
    pub fn record_snapshot(&self) -> MetricsSnapshot {
        self.record_snapshot_at(chrono::Utc::now().timestamp())
    }

    pub fn record_snapshot_at(&self, now_unix: i64) -> MetricsSnapshot {
        let snap = self.snapshot_at(now_unix);
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(snap.clone());
        if history.len() > self.history_cap {
            let excess = history.len() - self.history_cap;
            history.drain(0..excess);
        }
        gauge!("metrics_snapshots").set(history.len() as f64);
        snap
    }

    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn ratio(num: u64, den: u64) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

/// Prometheus recorder + the `/metrics` route; export-only.
pub struct PrometheusExport {
    pub handle: PrometheusHandle,
}

impl PrometheusExport {
    pub fn install() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
