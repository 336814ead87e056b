//! In-memory schedule queue.

use async_trait::async_trait;
use cadence_core::build_cause::BuildCause;
use cadence_core::ports::ScheduleQueue;
use cadence_core::{PipelineName, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Holds at most one pending cause per pipeline until a consumer turns it
/// into a pipeline instance.
#[derive(Debug, Default)]
pub struct PipelineScheduleQueue {
    pending: RwLock<HashMap<PipelineName, BuildCause>>,
}

impl PipelineScheduleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every pending cause.
    pub async fn to_be_scheduled(&self) -> HashMap<PipelineName, BuildCause> {
        self.pending.read().await.clone()
    }

    /// Hand a pending cause to the consumer, removing it from the queue.
    pub async fn finish_schedule(&self, pipeline: &PipelineName) -> Option<BuildCause> {
        self.pending.write().await.remove(pipeline)
    }

    pub async fn clear(&self) {
        self.pending.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}

#[async_trait]
impl ScheduleQueue for PipelineScheduleQueue {
    async fn enqueue(&self, pipeline: &PipelineName, cause: BuildCause) -> Result<()> {
        let mut pending = self.pending.write().await;
        if let Some(previous) = pending.insert(pipeline.clone(), cause) {
            debug!(pipeline = %pipeline, replaced = %previous.message(), "Replaced pending build cause");
        }
        Ok(())
    }

    async fn pending(&self, pipeline: &PipelineName) -> Result<Option<BuildCause>> {
        Ok(self.pending.read().await.get(pipeline).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_finish() {
        let queue = PipelineScheduleQueue::new();
        let p1: PipelineName = "p1".into();

        queue.enqueue(&p1, BuildCause::auto(vec![])).await.unwrap();
        assert_eq!(queue.len().await, 1);
        assert!(queue.pending(&"P1".into()).await.unwrap().is_some());

        let cause = queue.finish_schedule(&p1).await.unwrap();
        assert_eq!(cause.message(), "modification detected");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_enqueue_replaces_pending() {
        let queue = PipelineScheduleQueue::new();
        let p1: PipelineName = "p1".into();

        queue.enqueue(&p1, BuildCause::auto(vec![])).await.unwrap();
        queue.enqueue(&p1, BuildCause::forced(vec![], "admin")).await.unwrap();

        let pending = queue.pending(&p1).await.unwrap().unwrap();
        assert!(pending.is_forced());
        assert_eq!(queue.to_be_scheduled().await.len(), 1);
    }
}
