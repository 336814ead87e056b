//! Test context wiring the engine to in-memory collaborators.

use crate::helpers::{MockInstanceTracker, MockMaterialPoller, MockUpstreamHistory};
use cadence_core::pipeline::Configuration;
use cadence_scheduler::{
    HealthLog, PipelineScheduleQueue, SchedulerConfig, SchedulerPorts, SchedulingEngine,
};
use std::sync::Arc;

pub struct TestContext {
    pub engine: Arc<SchedulingEngine>,
    pub poller: Arc<MockMaterialPoller>,
    pub upstream: Arc<MockUpstreamHistory>,
    pub instances: Arc<MockInstanceTracker>,
    pub queue: Arc<PipelineScheduleQueue>,
    pub health: Arc<HealthLog>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        crate::init_test_logging();

        let poller = Arc::new(MockMaterialPoller::new());
        let upstream = Arc::new(MockUpstreamHistory::new());
        let instances = Arc::new(MockInstanceTracker::new());
        let queue = Arc::new(PipelineScheduleQueue::new());
        let health = Arc::new(HealthLog::new(config.health_history_limit));

        let engine = Arc::new(SchedulingEngine::new(
            config,
            SchedulerPorts {
                poller: poller.clone(),
                upstream: upstream.clone(),
                instances: instances.clone(),
                queue: queue.clone(),
                health: health.clone(),
            },
        ));

        Self {
            engine,
            poller,
            upstream,
            instances,
            queue,
            health,
        }
    }

    /// Build a context and publish `configuration`.
    pub async fn loaded(configuration: Configuration) -> anyhow::Result<Self> {
        let ctx = Self::new();
        ctx.engine.reload(&configuration).await?;
        Ok(ctx)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
