//! In-memory collaborators for driving the engine in tests.

use async_trait::async_trait;
use cadence_core::material::MaterialConfig;
use cadence_core::ports::{InstanceTracker, MaterialPoller, UpstreamHistory};
use cadence_core::revision::{Revision, UpstreamInstance};
use cadence_core::{Error, MaterialFingerprint, PipelineName, Result, StageName};
use dashmap::{DashMap, DashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Poller backed by per-material revision lists, newest first.
#[derive(Default)]
pub struct MockMaterialPoller {
    revisions: DashMap<MaterialFingerprint, Vec<Revision>>,
    unchanged: DashSet<(PipelineName, MaterialFingerprint)>,
    failure: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    on_demand_polls: AtomicUsize,
}

impl MockMaterialPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new check-in; it becomes the material's head.
    pub fn check_in(&self, material: &MaterialConfig, revision: Revision) {
        self.revisions
            .entry(material.fingerprint())
            .or_default()
            .insert(0, revision);
    }

    /// Replace the whole history, newest first.
    pub fn set_history(&self, material: &MaterialConfig, revisions: Vec<Revision>) {
        self.revisions.insert(material.fingerprint(), revisions);
    }

    /// Materials count as changed unless marked otherwise.
    pub fn set_changed(&self, pipeline: &str, material: &MaterialConfig, changed: bool) {
        let key = (PipelineName::from(pipeline), material.fingerprint());
        if changed {
            self.unchanged.remove(&key);
        } else {
            self.unchanged.insert(key);
        }
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Make every lookup take at least `delay`.
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn on_demand_polls(&self) -> usize {
        self.on_demand_polls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(Error::Resolution(message)),
            None => Ok(()),
        }
    }

    fn history(&self, material: &MaterialFingerprint) -> Vec<Revision> {
        self.revisions
            .get(material)
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MaterialPoller for MockMaterialPoller {
    async fn latest_revisions(&self, material: &MaterialFingerprint) -> Result<Vec<Revision>> {
        self.simulate().await?;
        Ok(self.history(material))
    }

    async fn changed_since_last_build(
        &self,
        pipeline: &PipelineName,
        material: &MaterialFingerprint,
    ) -> Result<bool> {
        self.simulate().await?;
        Ok(!self
            .unchanged
            .contains(&(pipeline.clone(), material.clone())))
    }

    async fn poll_now(&self, material: &MaterialConfig) -> Result<Vec<Revision>> {
        self.simulate().await?;
        self.on_demand_polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.history(&material.fingerprint()))
    }
}

/// Upstream stage history keyed by pipeline and stage.
#[derive(Default)]
pub struct MockUpstreamHistory {
    instances: DashMap<(PipelineName, StageName), Vec<UpstreamInstance>>,
}

impl MockUpstreamHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, instance: UpstreamInstance) {
        self.instances
            .entry((instance.pipeline.clone(), instance.stage.clone()))
            .or_default()
            .push(instance);
    }

    /// Replace the recorded runs of one stage.
    pub fn set_history(&self, pipeline: &str, stage: &str, instances: Vec<UpstreamInstance>) {
        self.instances
            .insert((pipeline.into(), stage.into()), instances);
    }
}

#[async_trait]
impl UpstreamHistory for MockUpstreamHistory {
    async fn stage_instances(
        &self,
        pipeline: &PipelineName,
        stage: &StageName,
    ) -> Result<Vec<UpstreamInstance>> {
        Ok(self
            .instances
            .get(&(pipeline.clone(), stage.clone()))
            .map(|i| i.clone())
            .unwrap_or_default())
    }
}

/// Tracks which pipelines have an unfinished instance.
#[derive(Default)]
pub struct MockInstanceTracker {
    running: DashSet<PipelineName>,
}

impl MockInstanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, pipeline: &str, running: bool) {
        if running {
            self.running.insert(pipeline.into());
        } else {
            self.running.remove(&PipelineName::from(pipeline));
        }
    }
}

#[async_trait]
impl InstanceTracker for MockInstanceTracker {
    async fn has_unfinished_instance(&self, pipeline: &PipelineName) -> Result<bool> {
        Ok(self.running.contains(pipeline))
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: AsyncFnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
