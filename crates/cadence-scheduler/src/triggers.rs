//! Trigger events and timer evaluation.

use crate::scheduler::SchedulingEngine;
use crate::snapshot::ConfigSnapshot;
use cadence_core::PipelineName;
use cadence_core::build_cause::TriggerKind;
use cadence_core::pipeline::TimerSpec;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Event that can trigger a scheduling attempt for one pipeline.
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    /// Material change sweep.
    Auto,
    /// Operator request, optionally pegging revisions by material
    /// (pipeline-unique fingerprint or fingerprint).
    Manual {
        user: String,
        revisions: HashMap<String, String>,
    },
    /// Cron timer fired.
    Timer,
}

impl TriggerEvent {
    pub fn manual(user: impl Into<String>) -> Self {
        TriggerEvent::Manual {
            user: user.into(),
            revisions: HashMap::new(),
        }
    }

    pub fn trigger_kind(&self) -> TriggerKind {
        match self {
            TriggerEvent::Auto => TriggerKind::Auto,
            TriggerEvent::Manual { .. } => TriggerKind::Manual,
            TriggerEvent::Timer => TriggerKind::Timer,
        }
    }
}

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Invalid cron syntax '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },
}

/// Parse a timer's cron expression (seconds first, optional year).
pub fn parse_timer(timer: &TimerSpec) -> Result<Schedule, TimerError> {
    Schedule::from_str(timer.spec.trim()).map_err(|e| TimerError::InvalidSpec {
        spec: timer.spec.clone(),
        reason: e.to_string(),
    })
}

/// Whether the schedule fires in the window `(after, until]`.
pub fn fires_between(schedule: &Schedule, after: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    schedule
        .after(&after)
        .next()
        .is_some_and(|fire_at| fire_at <= until)
}

/// Pipelines whose timer fires in the window `(after, until]`, in name order.
pub fn due_pipelines(
    snapshot: &ConfigSnapshot,
    after: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Vec<PipelineName> {
    let mut due: Vec<_> = snapshot
        .timers()
        .filter(|(_, schedule)| fires_between(schedule, after, until))
        .map(|(name, _)| name.clone())
        .collect();
    due.sort();
    due
}

/// Drives timer-triggered scheduling from the pipelines' cron specs.
pub struct TimerScheduler {
    engine: Arc<SchedulingEngine>,
    tick: Duration,
}

impl TimerScheduler {
    pub fn new(engine: Arc<SchedulingEngine>) -> Self {
        let tick = engine.config().timer_tick();
        Self { engine, tick }
    }

    /// Fire every timer due in `(after, until]`. Returns the pipelines that
    /// got a build cause queued.
    pub async fn tick(&self, after: DateTime<Utc>, until: DateTime<Utc>) -> Vec<PipelineName> {
        let snapshot = self.engine.snapshot().await;
        let mut scheduled = Vec::new();

        for pipeline in due_pipelines(&snapshot, after, until) {
            debug!(pipeline = %pipeline, "Timer fired");
            match self.engine.timer_schedule(&pipeline).await {
                Ok(outcome) if outcome.is_succeeded() => scheduled.push(pipeline),
                Ok(_) => {}
                Err(e) => error!(pipeline = %pipeline, error = %e, "Timer scheduling failed"),
            }
        }

        scheduled
    }

    /// Run until the task is aborted.
    pub async fn run(self) {
        info!(tick_ms = self.tick.as_millis() as u64, "Starting timer scheduler");
        let mut interval = tokio::time::interval(self.tick);
        let mut last = Utc::now();

        loop {
            interval.tick().await;
            let now = Utc::now();
            self.tick(last, now).await;
            last = now;
        }
    }
}
