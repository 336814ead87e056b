//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the scheduling engine and the
//! collaborators that poll materials, record pipeline history, accept
//! scheduled causes, and surface diagnostics.

use crate::build_cause::BuildCause;
use crate::ids::{MaterialFingerprint, PipelineName, StageName};
use crate::material::MaterialConfig;
use crate::revision::{Revision, UpstreamInstance};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of material revisions, fed by independent pollers.
#[async_trait]
pub trait MaterialPoller: Send + Sync {
    /// Known revisions of a polled material, newest first.
    async fn latest_revisions(&self, material: &MaterialFingerprint) -> Result<Vec<Revision>>;

    /// Whether the material moved since the pipeline last built it.
    async fn changed_since_last_build(
        &self,
        pipeline: &PipelineName,
        material: &MaterialFingerprint,
    ) -> Result<bool>;

    /// Poll a material right now. Used for materials nobody polls
    /// proactively. Returns revisions newest first.
    async fn poll_now(&self, material: &MaterialConfig) -> Result<Vec<Revision>>;
}

/// Stage history of upstream pipelines.
#[async_trait]
pub trait UpstreamHistory: Send + Sync {
    /// All recorded runs of a stage, in any order.
    async fn stage_instances(
        &self,
        pipeline: &PipelineName,
        stage: &StageName,
    ) -> Result<Vec<UpstreamInstance>>;
}

/// Tracks running pipeline instances for lock checks.
#[async_trait]
pub trait InstanceTracker: Send + Sync {
    async fn has_unfinished_instance(&self, pipeline: &PipelineName) -> Result<bool>;
}

/// Sink for finalized build causes.
#[async_trait]
pub trait ScheduleQueue: Send + Sync {
    async fn enqueue(&self, pipeline: &PipelineName, cause: BuildCause) -> Result<()>;

    /// Cause waiting to be turned into a pipeline instance, if any.
    async fn pending(&self, pipeline: &PipelineName) -> Result<Option<BuildCause>>;
}

/// Sink for operator-visible diagnostics.
#[async_trait]
pub trait HealthSink: Send + Sync {
    async fn report(&self, entry: HealthEntry) -> Result<()>;

    /// Drop every entry recorded for a scope.
    async fn clear(&self, scope: &HealthScope) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum HealthScope {
    Configuration,
    Pipeline(PipelineName),
}

impl fmt::Display for HealthScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthScope::Configuration => write!(f, "configuration"),
            HealthScope::Pipeline(name) => write!(f, "pipeline '{}'", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEntry {
    pub scope: HealthScope,
    pub level: HealthLevel,
    pub message: String,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl HealthEntry {
    pub fn new(scope: HealthScope, level: HealthLevel, message: impl Into<String>) -> Self {
        Self {
            scope,
            level,
            message: message.into(),
            detail: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
