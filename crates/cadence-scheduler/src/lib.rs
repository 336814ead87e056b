//! Build-cause scheduling for Cadence pipelines.
//!
//! Decides when a pipeline should run and with which material revisions,
//! whether triggered by material changes, an operator, or a cron timer.

pub mod calculator;
pub mod config;
pub mod debounce;
pub mod fanin;
pub mod graph;
pub mod health;
pub mod queue;
pub mod resolver;
pub mod scheduler;
pub mod snapshot;
pub mod triggers;

pub use calculator::{BuildCauseCalculator, Rejection, ScheduleOutcome};
pub use config::SchedulerConfig;
pub use debounce::TimerDebounceTracker;
pub use fanin::{FanInDeduplicator, MaterialSet};
pub use graph::DependencyGraph;
pub use health::{HealthLog, HealthStatus};
pub use queue::PipelineScheduleQueue;
pub use resolver::{MaterialRevisionResolver, Resolution};
pub use scheduler::{SchedulerPorts, SchedulingEngine};
pub use snapshot::{ConfigSnapshot, SnapshotBuilder};
pub use triggers::{TimerScheduler, TriggerEvent};
