// src/config.rs
//! Runtime configuration: TOML file + environment overrides.
//!
//! The file is optional (all sections have defaults); a present but
//! unparsable file aborts startup. Credentials never live here — providers
//! and sinks read their own env vars.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_CONFIG_PATH: &str = "RADAR_CONFIG_PATH";
pub const ENV_CYCLE_INTERVAL_SECS: &str = "RADAR_CYCLE_INTERVAL_SECS";
pub const ENV_DIGEST_FLUSH_HOUR: &str = "RADAR_DIGEST_FLUSH_HOUR";
pub const ENV_STATE_DIR: &str = "RADAR_STATE_DIR";

pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";

fn default_cycle_interval_secs() -> u64 {
    1800
}
fn default_max_results_per_topic() -> u32 {
    10
}
fn default_discovery_concurrency() -> usize {
    3
}
fn default_immediate_threshold() -> f32 {
    0.8
}
fn default_priority_threshold() -> f32 {
    0.6
}
fn default_digest_threshold() -> f32 {
    0.4
}
fn default_top_k() -> usize {
    2
}
fn default_digest_flush_hour() -> u32 {
    18
}
fn default_dedup_capacity() -> usize {
    10_000
}
fn default_snapshot_interval_secs() -> u64 {
    300
}
fn default_metrics_history_cap() -> usize {
    500
}
fn default_topic_batch_size() -> usize {
    3
}
fn default_state_dir() -> String {
    "state".to_string()
}

fn default_budgets() -> BTreeMap<String, EndpointBudgetCfg> {
    BTreeMap::from([
        (
            "search".to_string(),
            EndpointBudgetCfg {
                limit: 300,
                window_secs: 900,
            },
        ),
        (
            "timeline".to_string(),
            EndpointBudgetCfg {
                limit: 1500,
                window_secs: 900,
            },
        ),
        (
            "post".to_string(),
            EndpointBudgetCfg {
                limit: 50,
                window_secs: 86_400,
            },
        ),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    #[serde(default = "default_max_results_per_topic")]
    pub max_results_per_topic: u32,
    #[serde(default = "default_discovery_concurrency")]
    pub discovery_concurrency: usize,
    /// Local-time window in which cycles run; `None` means 24/7.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_hours: Option<ActiveHours>,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
            max_results_per_topic: default_max_results_per_topic(),
            discovery_concurrency: default_discovery_concurrency(),
            active_hours: None,
            state_dir: default_state_dir(),
        }
    }
}

/// Inclusive start, exclusive end, local clock hours 0..=23.
/// A wrapped window (e.g. 22..6) spans midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl ActiveHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSection {
    #[serde(default = "default_immediate_threshold")]
    pub immediate: f32,
    #[serde(default = "default_priority_threshold")]
    pub priority: f32,
    #[serde(default = "default_digest_threshold")]
    pub digest: f32,
    /// Max opportunities carried in one realtime alert.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_digest_flush_hour")]
    pub digest_flush_hour: u32,
}

impl Default for TierSection {
    fn default() -> Self {
        Self {
            immediate: default_immediate_threshold(),
            priority: default_priority_threshold(),
            digest: default_digest_threshold(),
            top_k: default_top_k(),
            digest_flush_hour: default_digest_flush_hour(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EndpointBudgetCfg {
    pub limit: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSection {
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,
    /// Snapshot file; relative paths resolve under `monitor.state_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            capacity: default_dedup_capacity(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSection {
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
    #[serde(default = "default_metrics_history_cap")]
    pub history_cap: usize,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: default_snapshot_interval_secs(),
            history_cap: default_metrics_history_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TopicsSection {
    #[serde(default)]
    pub core: Vec<String>,
    #[serde(default = "default_topic_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VoiceSection {
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub tiers: TierSection,
    #[serde(default = "default_budgets")]
    pub budgets: BTreeMap<String, EndpointBudgetCfg>,
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub metrics: MetricsSection,
    #[serde(default)]
    pub topics: TopicsSection,
    #[serde(default)]
    pub voice: VoiceSection,
}

impl MonitorConfig {
    /// Load from `RADAR_CONFIG_PATH` (or the default path), apply env
    /// overrides, sanitize. A missing file yields the defaults; a file that
    /// exists but does not parse is a startup error.
    pub fn load() -> Result<Self> {
        let path = env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = Self::load_from_path(Path::new(&path))?;
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(target: "config", path = %path.display(), "no config file, using defaults");
            let mut cfg = Self::default();
            cfg.budgets = default_budgets();
            return Ok(cfg);
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut cfg: MonitorConfig = toml::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        if cfg.budgets.is_empty() {
            cfg.budgets = default_budgets();
        }
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64(ENV_CYCLE_INTERVAL_SECS) {
            self.monitor.cycle_interval_secs = v;
        }
        if let Some(v) = env_u64(ENV_DIGEST_FLUSH_HOUR) {
            self.tiers.digest_flush_hour = v as u32;
        }
        if let Ok(dir) = env::var(ENV_STATE_DIR) {
            if !dir.trim().is_empty() {
                self.monitor.state_dir = dir;
            }
        }
    }

    fn sanitize(&mut self) {
        if self.monitor.cycle_interval_secs == 0 {
            self.monitor.cycle_interval_secs = default_cycle_interval_secs();
        }
        if self.monitor.discovery_concurrency == 0 {
            self.monitor.discovery_concurrency = 1;
        }
        if self.topics.batch_size == 0 {
            self.topics.batch_size = 1;
        }
        self.tiers.digest_flush_hour = self.tiers.digest_flush_hour.min(23);
        if let Some(h) = &mut self.monitor.active_hours {
            h.start_hour = h.start_hour.min(23);
            h.end_hour = h.end_hour.min(24);
        }
        // Thresholds must be ordered immediate >= priority >= digest.
        let t = &mut self.tiers;
        if t.priority > t.immediate {
            t.priority = t.immediate;
        }
        if t.digest > t.priority {
            t.digest = t.priority;
        }
        if t.top_k == 0 {
            t.top_k = 1;
        }
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.cycle_interval_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.metrics.snapshot_interval_secs)
    }

    pub fn state_dir(&self) -> PathBuf {
        PathBuf::from(&self.monitor.state_dir)
    }

    pub fn dedup_path(&self) -> PathBuf {
        match &self.dedup.path {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => self.state_dir().join(p),
            None => self.state_dir().join("fingerprints.json"),
        }
    }

    pub fn alert_history_path(&self) -> PathBuf {
        self.state_dir().join("alert_history.json")
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse::<u64>().ok())
}
