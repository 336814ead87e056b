//! Revisions produced by material pollers and upstream pipelines.

use crate::ids::{PipelineName, StageName};
use crate::material::MaterialConfig;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A revision of a single material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Revision {
    /// Opaque identifier (commit hash, `pipeline/counter/stage/stage_counter`, ...).
    pub identifier: String,
    pub details: RevisionDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevisionDetails {
    Scm(Modification),
    Dependency(UpstreamInstance),
}

/// A check-in reported by an SCM poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Modification {
    pub revision: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub changed_files: Vec<String>,
}

/// A completed stage run of an upstream pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UpstreamInstance {
    pub pipeline: PipelineName,
    pub counter: u64,
    pub label: String,
    pub stage: StageName,
    pub stage_counter: u32,
    pub result: StageResult,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageResult {
    Passed,
    Failed,
    Cancelled,
    Unknown,
}

impl UpstreamInstance {
    /// Only complete and passed stage runs feed downstream pipelines.
    pub fn is_passed(&self) -> bool {
        self.completed_at.is_some() && self.result == StageResult::Passed
    }

    pub fn identifier(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.pipeline, self.counter, self.stage, self.stage_counter
        )
    }
}

impl Revision {
    pub fn scm(modification: Modification) -> Self {
        Self {
            identifier: modification.revision.clone(),
            details: RevisionDetails::Scm(modification),
        }
    }

    pub fn dependency(instance: UpstreamInstance) -> Self {
        Self {
            identifier: instance.identifier(),
            details: RevisionDetails::Dependency(instance),
        }
    }

    /// Whether `self` is strictly newer than `other` in the material's own
    /// order: check-in time for SCM, pipeline counter then stage counter for
    /// upstream instances. Revisions of different kinds are not comparable.
    pub fn is_newer_than(&self, other: &Revision) -> bool {
        match (&self.details, &other.details) {
            (RevisionDetails::Scm(a), RevisionDetails::Scm(b)) => a.modified_at > b.modified_at,
            (RevisionDetails::Dependency(a), RevisionDetails::Dependency(b)) => {
                (a.counter, a.stage_counter).cmp(&(b.counter, b.stage_counter))
                    == Ordering::Greater
            }
            _ => false,
        }
    }
}

/// A material paired with the revision it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MaterialRevision {
    pub material: MaterialConfig,
    pub revision: Revision,
    /// Whether the revision differs from the one the pipeline last built.
    pub changed: bool,
}

impl MaterialRevision {
    pub fn new(material: MaterialConfig, revision: Revision, changed: bool) -> Self {
        Self {
            material,
            revision,
            changed,
        }
    }

    pub fn revision_id(&self) -> &str {
        &self.revision.identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn modification(rev: &str, minute: u32) -> Modification {
        Modification {
            revision: rev.to_string(),
            author: Some("dev".to_string()),
            comment: None,
            modified_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
            changed_files: vec![],
        }
    }

    fn instance(counter: u64, result: StageResult) -> UpstreamInstance {
        UpstreamInstance {
            pipeline: "up1".into(),
            counter,
            label: counter.to_string(),
            stage: "build".into(),
            stage_counter: 1,
            result,
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_scm_ordering_uses_checkin_time() {
        let older = Revision::scm(modification("g11", 1));
        let newer = Revision::scm(modification("g12", 2));
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
    }

    #[test]
    fn test_dependency_ordering_uses_counter() {
        let first = Revision::dependency(instance(1, StageResult::Passed));
        let second = Revision::dependency(instance(2, StageResult::Passed));
        assert!(second.is_newer_than(&first));
        assert_eq!(second.identifier, "up1/2/build/1");
    }

    #[test]
    fn test_incomplete_instance_is_not_passed() {
        let mut running = instance(3, StageResult::Passed);
        running.completed_at = None;
        assert!(!running.is_passed());
        assert!(!instance(4, StageResult::Failed).is_passed());
    }
}
