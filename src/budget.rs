//! # Rate Budget
//!
//! Sliding-window call accounting per external endpoint, with an explicit
//! backoff override. The tracker never inspects responses itself; callers
//! that see a rate-limit failure apply backoff with the server hint.
//!
//! All check/record paths run under one lock per call so two concurrent
//! tasks can never both observe "available" and jointly exceed a limit.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::counter;
use serde::Serialize;

use crate::config::EndpointBudgetCfg;

struct EndpointState {
    limit: u32,
    window_ms: u64,
    /// Call offsets in ms since tracker creation, oldest first.
    calls: VecDeque<u64>,
    backoff_until_ms: Option<u64>,
}

impl EndpointState {
    fn prune(&mut self, now_ms: u64) {
        while let Some(&oldest) = self.calls.front() {
            if now_ms.saturating_sub(oldest) >= self.window_ms {
                self.calls.pop_front();
            } else {
                break;
            }
        }
        if let Some(until) = self.backoff_until_ms {
            if now_ms >= until {
                self.backoff_until_ms = None;
            }
        }
    }

    fn available(&mut self, now_ms: u64) -> bool {
        self.prune(now_ms);
        if self.backoff_until_ms.is_some() {
            return false;
        }
        (self.calls.len() as u32) < self.limit
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub used: u32,
    pub remaining: u32,
    pub backoff_remaining_secs: u64,
}

pub struct RateBudget {
    epoch: Instant,
    inner: Mutex<BTreeMap<String, EndpointState>>,
}

impl RateBudget {
    pub fn new(budgets: &BTreeMap<String, EndpointBudgetCfg>) -> Self {
        let inner = budgets
            .iter()
            .map(|(name, cfg)| {
                (
                    name.clone(),
                    EndpointState {
                        limit: cfg.limit,
                        window_ms: cfg.window_secs.saturating_mul(1000),
                        calls: VecDeque::new(),
                        backoff_until_ms: None,
                    },
                )
            })
            .collect();
        Self {
            epoch: Instant::now(),
            inner: Mutex::new(inner),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, EndpointState>> {
        // A poisoned lock means a panic mid-update; state is a prune-only
        // window, safe to keep using.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read-only probe. Untracked endpoints are always allowed.
    pub fn can_call(&self, endpoint: &str) -> bool {
        self.can_call_at(endpoint, self.now_ms())
    }

    pub fn can_call_at(&self, endpoint: &str, now_ms: u64) -> bool {
        let mut map = self.lock();
        match map.get_mut(endpoint) {
            Some(state) => state.available(now_ms),
            None => true,
        }
    }

    pub fn record_call(&self, endpoint: &str) {
        self.record_call_at(endpoint, self.now_ms());
    }

    pub fn record_call_at(&self, endpoint: &str, now_ms: u64) {
        let mut map = self.lock();
        if let Some(state) = map.get_mut(endpoint) {
            state.prune(now_ms);
            state.calls.push_back(now_ms);
        }
        counter!("api_calls_total", "endpoint" => endpoint.to_string()).increment(1);
    }

    /// Atomic check-then-record: returns `false` without consuming budget
    /// when the endpoint is exhausted or in backoff.
    pub fn try_acquire(&self, endpoint: &str) -> bool {
        self.try_acquire_at(endpoint, self.now_ms())
    }

    pub fn try_acquire_at(&self, endpoint: &str, now_ms: u64) -> bool {
        let mut map = self.lock();
        let Some(state) = map.get_mut(endpoint) else {
            return true;
        };
        if !state.available(now_ms) {
            drop(map);
            counter!("budget_refusals_total", "endpoint" => endpoint.to_string()).increment(1);
            return false;
        }
        state.calls.push_back(now_ms);
        drop(map);
        counter!("api_calls_total", "endpoint" => endpoint.to_string()).increment(1);
        true
    }

    /// Overrides window availability until the cool-down expires. With no
    /// server hint the endpoint's own window length is used.
    pub fn apply_backoff(&self, endpoint: &str, retry_after: Option<Duration>) {
        self.apply_backoff_at(endpoint, retry_after, self.now_ms());
    }

    pub fn apply_backoff_at(&self, endpoint: &str, retry_after: Option<Duration>, now_ms: u64) {
        let mut map = self.lock();
        if let Some(state) = map.get_mut(endpoint) {
            let cool_ms = retry_after
                .map(|d| d.as_millis() as u64)
                .unwrap_or(state.window_ms);
            state.backoff_until_ms = Some(now_ms.saturating_add(cool_ms));
            tracing::warn!(
                target: "budget",
                endpoint,
                cool_secs = cool_ms / 1000,
                "endpoint placed in backoff"
            );
        }
        counter!("backoffs_total", "endpoint" => endpoint.to_string()).increment(1);
    }

    pub fn status(&self) -> BTreeMap<String, EndpointStatus> {
        self.status_at(self.now_ms())
    }

    pub fn status_at(&self, now_ms: u64) -> BTreeMap<String, EndpointStatus> {
        let mut map = self.lock();
        map.iter_mut()
            .map(|(name, state)| {
                state.prune(now_ms);
                let used = state.calls.len() as u32;
                let backoff_remaining_secs = state
                    .backoff_until_ms
                    .map(|until| until.saturating_sub(now_ms).div_ceil(1000))
                    .unwrap_or(0);
                (
                    name.clone(),
                    EndpointStatus {
                        used,
                        remaining: state.limit.saturating_sub(used),
                        backoff_remaining_secs,
                    },
                )
            })
            .collect()
    }
}
