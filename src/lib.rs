// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod alerts;
pub mod api;
pub mod budget;
pub mod config;
pub mod dedup;
pub mod discover;
pub mod error;
pub mod generate;
pub mod metrics;
pub mod pipeline;
pub mod rotation;
pub mod scheduler;
pub mod score;

// ---- Re-exports for the common wiring path ----
pub use crate::alerts::{AlertDispatcher, AlertHistory, NotificationSink, Tier};
pub use crate::api::{router, AppState};
pub use crate::budget::RateBudget;
pub use crate::config::MonitorConfig;
pub use crate::dedup::DedupStore;
pub use crate::discover::{Candidate, DiscoverySource};
pub use crate::generate::ContentGenerator;
pub use crate::metrics::MetricsRecorder;
pub use crate::pipeline::{Opportunity, Pipeline};
pub use crate::rotation::TopicRotation;
pub use crate::scheduler::{Scheduler, SchedulerHandle, SchedulerState};
