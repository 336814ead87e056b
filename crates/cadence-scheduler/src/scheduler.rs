//! Main scheduling orchestration.

use crate::calculator::{BuildCauseCalculator, Rejection, ScheduleOutcome};
use crate::config::SchedulerConfig;
use crate::debounce::TimerDebounceTracker;
use crate::resolver::MaterialRevisionResolver;
use crate::snapshot::{ConfigSnapshot, SnapshotBuilder};
use crate::triggers::TriggerEvent;

use cadence_core::build_cause::TriggerKind;
use cadence_core::material::MaterialConfig;
use cadence_core::pipeline::Configuration;
use cadence_core::ports::{
    HealthEntry, HealthLevel, HealthScope, HealthSink, InstanceTracker, MaterialPoller,
    ScheduleQueue, UpstreamHistory,
};
use cadence_core::{Error, MaterialFingerprint, PipelineName, Result};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, error, info, warn};

/// Collaborators the engine talks to.
#[derive(Clone)]
pub struct SchedulerPorts {
    pub poller: Arc<dyn MaterialPoller>,
    pub upstream: Arc<dyn UpstreamHistory>,
    pub instances: Arc<dyn InstanceTracker>,
    pub queue: Arc<dyn ScheduleQueue>,
    pub health: Arc<dyn HealthSink>,
}

/// The scheduling engine.
///
/// Holds the current configuration snapshot and turns triggers into build
/// causes. Attempts for the same pipeline are serialized; different
/// pipelines schedule in parallel.
pub struct SchedulingEngine {
    config: SchedulerConfig,
    snapshot: RwLock<Arc<ConfigSnapshot>>,
    snapshot_builder: SnapshotBuilder,
    calculator: BuildCauseCalculator,
    debounce: Arc<TimerDebounceTracker>,
    queue: Arc<dyn ScheduleQueue>,
    health: Arc<dyn HealthSink>,
    pipeline_locks: DashMap<PipelineName, Arc<Mutex<()>>>,
}

impl SchedulingEngine {
    pub fn new(config: SchedulerConfig, ports: SchedulerPorts) -> Self {
        let debounce = Arc::new(TimerDebounceTracker::new());
        let resolver = MaterialRevisionResolver::new(ports.poller, ports.upstream);

        Self {
            config,
            snapshot: RwLock::new(Arc::new(ConfigSnapshot::empty())),
            snapshot_builder: SnapshotBuilder::new(),
            calculator: BuildCauseCalculator::new(resolver, ports.instances, debounce.clone()),
            debounce,
            queue: ports.queue,
            health: ports.health,
            pipeline_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn debounce(&self) -> &TimerDebounceTracker {
        &self.debounce
    }

    pub fn resolver(&self) -> &MaterialRevisionResolver {
        self.calculator.resolver()
    }

    /// The snapshot currently in effect.
    pub async fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Validate and publish a new configuration. On failure the previous
    /// snapshot stays in effect and every error is reported.
    pub async fn reload(&self, configuration: &Configuration) -> Result<Arc<ConfigSnapshot>> {
        let mut current = self.snapshot.write().await;
        let version = current.version() + 1;

        let snapshot = match self.snapshot_builder.build(configuration, version) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(errors) => {
                let kept_version = current.version();
                drop(current);

                error!(
                    errors = errors.len(),
                    kept_version,
                    "Configuration rejected, keeping last valid snapshot"
                );
                for e in &errors {
                    self.report(HealthEntry::new(
                        HealthScope::Configuration,
                        HealthLevel::Error,
                        e.to_string(),
                    ))
                    .await;
                }
                return Err(Error::Configuration(errors));
            }
        };

        for removed in current.pipeline_names().difference(&snapshot.pipeline_names()) {
            self.debounce.forget(removed);
        }
        self.pipeline_locks
            .retain(|name, _| snapshot.pipeline(name).is_some());
        self.resolver()
            .retain_materials(&snapshot.material_fingerprints());

        *current = snapshot.clone();
        drop(current);

        if let Err(e) = self.health.clear(&HealthScope::Configuration).await {
            warn!(error = %e, "Failed to clear configuration health entries");
        }

        info!(
            version,
            pipelines = snapshot.graph().len(),
            pollable = snapshot.pollable().len(),
            post_commit = snapshot.post_commit().len(),
            "Published configuration snapshot"
        );
        Ok(snapshot)
    }

    /// Reload on every configuration change until the sender goes away.
    pub async fn follow(self: Arc<Self>, mut changes: watch::Receiver<Arc<Configuration>>) {
        loop {
            let configuration = changes.borrow_and_update().clone();
            if let Err(e) = self.reload(&configuration).await {
                warn!(error = %e, "Configuration change not applied");
            }

            if changes.changed().await.is_err() {
                debug!("Configuration source closed");
                return;
            }
        }
    }

    /// Schedule after a material change.
    pub async fn auto_schedule(&self, pipeline: &PipelineName) -> Result<ScheduleOutcome> {
        self.schedule(pipeline, TriggerEvent::Auto).await
    }

    /// Force a run on behalf of `user`, optionally pegging revisions.
    pub async fn manual_schedule(
        &self,
        pipeline: &PipelineName,
        user: &str,
        revisions: HashMap<String, String>,
    ) -> Result<ScheduleOutcome> {
        let event = TriggerEvent::Manual {
            user: user.to_string(),
            revisions,
        };
        self.schedule(pipeline, event).await
    }

    /// Handle a commit notification for the repository at `url`. Every
    /// pipeline building from a matching post-commit material gets an
    /// automatic attempt; pipelines that fail are reported and skipped.
    pub async fn post_commit(&self, url: &str) -> Vec<(PipelineName, ScheduleOutcome)> {
        let snapshot = self.snapshot().await;
        let notified: HashSet<MaterialFingerprint> = snapshot
            .post_commit()
            .with_url(url)
            .map(MaterialConfig::fingerprint)
            .collect();
        if notified.is_empty() {
            debug!(url, "No post-commit material matches notification");
            return Vec::new();
        }

        let pipelines: Vec<PipelineName> = snapshot
            .graph()
            .pipelines()
            .filter(|p| p.materials.iter().any(|m| notified.contains(&m.fingerprint())))
            .map(|p| p.name.clone())
            .collect();

        let mut outcomes = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            match self.auto_schedule(&pipeline).await {
                Ok(outcome) => outcomes.push((pipeline, outcome)),
                Err(e) => debug!(pipeline = %pipeline, error = %e, "Skipping notified pipeline"),
            }
        }
        outcomes
    }

    /// Schedule because the pipeline's timer fired.
    pub async fn timer_schedule(&self, pipeline: &PipelineName) -> Result<ScheduleOutcome> {
        self.schedule(pipeline, TriggerEvent::Timer).await
    }

    pub async fn schedule(
        &self,
        pipeline: &PipelineName,
        event: TriggerEvent,
    ) -> Result<ScheduleOutcome> {
        if self.snapshot().await.pipeline(pipeline).is_none() {
            return Err(Error::PipelineNotFound(pipeline.clone()));
        }
        let lock = self.pipeline_lock(pipeline);
        let _guard = lock.lock().await;

        // A reload may have removed the pipeline while waiting for the lock.
        let snapshot = self.snapshot().await;
        let config = snapshot
            .pipeline(pipeline)
            .ok_or_else(|| Error::PipelineNotFound(pipeline.clone()))?;
        let kind = event.trigger_kind();
        if kind == TriggerKind::Timer && config.timer.is_none() {
            return Err(Error::NoTimer(config.name.clone()));
        }

        // A waiting forced cause wins over every trigger; any other waiting
        // cause is replaced by the outcome of this attempt.
        if let Some(pending) = self.queue.pending(&config.name).await? {
            if pending.is_forced() {
                return self.rejected(&config.name, Rejection::AlreadyScheduled).await;
            }
        }

        let attempt = async {
            match &event {
                TriggerEvent::Auto => self.calculator.auto_schedule(&snapshot, config).await,
                TriggerEvent::Manual { user, revisions } => {
                    self.calculator.manual_schedule(&snapshot, config, user, revisions).await
                }
                TriggerEvent::Timer => match &config.timer {
                    Some(timer) => self.calculator.timer_schedule(&snapshot, config, timer).await,
                    None => Err(Error::NoTimer(config.name.clone())),
                },
            }
        };

        let timeout = self.config.resolution_timeout();
        let outcome = match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return Err(self.failed(&config.name, e).await),
            Err(_) => {
                let e = Error::Resolution(format!(
                    "timed out after {}s resolving materials",
                    timeout.as_secs()
                ));
                return Err(self.failed(&config.name, e).await);
            }
        };

        match outcome {
            ScheduleOutcome::Succeeded(cause) => {
                self.queue.enqueue(&config.name, cause.clone()).await?;
                if kind == TriggerKind::Timer {
                    self.debounce.record(&config.name, &cause);
                }
                if let Err(e) = self.health.clear(&HealthScope::Pipeline(config.name.clone())).await {
                    warn!(pipeline = %config.name, error = %e, "Failed to clear health entries");
                }
                info!(
                    pipeline = %config.name,
                    trigger = ?kind,
                    approver = cause.approver(),
                    changed = cause.has_changes(),
                    revisions = ?cause.revision_ids(),
                    "Scheduled pipeline"
                );
                Ok(ScheduleOutcome::Succeeded(cause))
            }
            ScheduleOutcome::Rejected(rejection) => self.rejected(&config.name, rejection).await,
        }
    }

    /// Pipelines with a scheduling lock allocated.
    pub fn tracked_locks(&self) -> usize {
        self.pipeline_locks.len()
    }

    fn pipeline_lock(&self, pipeline: &PipelineName) -> Arc<Mutex<()>> {
        self.pipeline_locks
            .entry(pipeline.clone())
            .or_default()
            .clone()
    }

    async fn rejected(&self, pipeline: &PipelineName, rejection: Rejection) -> Result<ScheduleOutcome> {
        match rejection.level() {
            HealthLevel::Info => info!(pipeline = %pipeline, reason = %rejection, "Scheduling rejected"),
            _ => warn!(pipeline = %pipeline, reason = %rejection, "Scheduling rejected"),
        }
        let entry = HealthEntry::new(
            HealthScope::Pipeline(pipeline.clone()),
            rejection.level(),
            format!("Unable to schedule pipeline '{}'", pipeline),
        )
        .with_detail(rejection.to_string());
        self.report(entry).await;
        Ok(ScheduleOutcome::Rejected(rejection))
    }

    async fn failed(&self, pipeline: &PipelineName, e: Error) -> Error {
        error!(pipeline = %pipeline, error = %e, "Scheduling failed");
        let entry = HealthEntry::new(
            HealthScope::Pipeline(pipeline.clone()),
            HealthLevel::Error,
            format!("Failed to schedule pipeline '{}'", pipeline),
        )
        .with_detail(e.to_string());
        self.report(entry).await;
        e
    }

    async fn report(&self, entry: HealthEntry) {
        if let Err(e) = self.health.report(entry).await {
            warn!(error = %e, "Failed to record health entry");
        }
    }
}
