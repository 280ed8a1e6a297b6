// src/scheduler.rs
//! The monitoring loop: cycle cadence, active-hours gate, digest and
//! snapshot timers, prompt shutdown.
//!
//! Digest flushing and metrics snapshotting run on their own timers inside
//! the same `select!`, so a slow cycle cannot starve them. The stop signal
//! is a watch channel; it interrupts any in-progress sleep.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, Timelike};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::alerts::AlertDispatcher;
use crate::budget::RateBudget;
use crate::config::{ActiveHours, MonitorConfig};
use crate::metrics::MetricsRecorder;
use crate::pipeline::Pipeline;
use crate::rotation::TopicRotation;

/// Cadence of the digest flush-hour check.
const DIGEST_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    CycleRunning,
    BackoffSleep,
    Stopped,
}

/// Observer + stop switch for a running scheduler.
pub struct SchedulerHandle {
    state: Arc<Mutex<SchedulerState>>,
    stop: watch::Sender<bool>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    dispatcher: Arc<AlertDispatcher>,
    recorder: Arc<MetricsRecorder>,
    budget: Arc<RateBudget>,
    rotation: TopicRotation,
    cycle_interval: Duration,
    snapshot_interval: Duration,
    active_hours: Option<ActiveHours>,
    state: Arc<Mutex<SchedulerState>>,
    stop_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        cfg: &MonitorConfig,
        pipeline: Arc<Pipeline>,
        dispatcher: Arc<AlertDispatcher>,
        recorder: Arc<MetricsRecorder>,
        budget: Arc<RateBudget>,
        rotation: TopicRotation,
    ) -> (Self, SchedulerHandle) {
        let state = Arc::new(Mutex::new(SchedulerState::Idle));
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = SchedulerHandle {
            state: Arc::clone(&state),
            stop: stop_tx,
        };
        let scheduler = Self {
            pipeline,
            dispatcher,
            recorder,
            budget,
            rotation,
            cycle_interval: cfg.cycle_interval(),
            snapshot_interval: cfg.snapshot_interval(),
            active_hours: cfg.monitor.active_hours,
            state,
            stop_rx,
        };
        (scheduler, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::info!(
            target: "scheduler",
            cycle_secs = self.cycle_interval.as_secs(),
            topics = self.rotation.len(),
            "scheduler started"
        );
        let mut cycle = tokio::time::interval(self.cycle_interval);
        cycle.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut digest_check = tokio::time::interval(DIGEST_CHECK_INTERVAL);
        digest_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut snapshots = tokio::time::interval(self.snapshot_interval);
        snapshots.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.stop_rx.borrow() {
                break;
            }
            tokio::select! {
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        break;
                    }
                }
                _ = cycle.tick() => self.run_gated_cycle().await,
                _ = digest_check.tick() => self.dispatcher.maybe_flush_digest(Local::now()).await,
                _ = snapshots.tick() => {
                    let snap = self.recorder.record_snapshot();
                    tracing::debug!(
                        target: "scheduler",
                        cycles = snap.cycles,
                        opportunities = snap.opportunities,
                        "metrics snapshot recorded"
                    );
                }
            }
        }
        self.set_state(SchedulerState::Stopped);
        tracing::info!(target: "scheduler", "scheduler stopped");
    }

    async fn run_gated_cycle(&self) {
        if let Some(hours) = self.active_hours {
            let hour = Local::now().hour();
            if !hours.contains(hour) {
                self.set_state(SchedulerState::Idle);
                tracing::debug!(target: "scheduler", hour, "outside active hours, cycle skipped");
                return;
            }
        }
        if !self.budget.can_call(self.pipeline.endpoint()) {
            self.set_state(SchedulerState::BackoffSleep);
            tracing::warn!(
                target: "scheduler",
                endpoint = self.pipeline.endpoint(),
                "endpoint unavailable, cycle skipped"
            );
            return;
        }
        let topics = self.rotation.next_batch();
        if topics.is_empty() {
            self.set_state(SchedulerState::Idle);
            return;
        }

        self.set_state(SchedulerState::CycleRunning);
        let report = self.pipeline.run_cycle(&topics).await;
        self.dispatcher
            .dispatch_cycle(report.opportunities)
            .await;
        self.set_state(SchedulerState::Idle);
    }

    fn set_state(&self, next: SchedulerState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = next;
    }
}
