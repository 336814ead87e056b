//! Build causes: the finalized record of why and with what a pipeline runs.

use crate::pipeline::{ConfigOrigin, PipelineConfig};
use crate::revision::MaterialRevision;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Approver recorded for automatically triggered causes.
pub const DEFAULT_APPROVER: &str = "changes";
/// Approver recorded for timer-triggered causes.
pub const TIMER_APPROVER: &str = "timer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Auto,
    Manual,
    Timer,
}

/// Immutable set of material revisions that triggered a pipeline instance,
/// one per declared material in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BuildCause {
    material_revisions: Vec<MaterialRevision>,
    trigger: TriggerKind,
    message: String,
    approver: String,
}

impl BuildCause {
    pub fn auto(material_revisions: Vec<MaterialRevision>) -> Self {
        Self {
            material_revisions,
            trigger: TriggerKind::Auto,
            message: "modification detected".to_string(),
            approver: DEFAULT_APPROVER.to_string(),
        }
    }

    pub fn forced(material_revisions: Vec<MaterialRevision>, user: &str) -> Self {
        Self {
            material_revisions,
            trigger: TriggerKind::Manual,
            message: format!("Forced by {}", user),
            approver: user.to_string(),
        }
    }

    pub fn timer(material_revisions: Vec<MaterialRevision>) -> Self {
        Self {
            material_revisions,
            trigger: TriggerKind::Timer,
            message: "timer".to_string(),
            approver: TIMER_APPROVER.to_string(),
        }
    }

    pub fn material_revisions(&self) -> &[MaterialRevision] {
        &self.material_revisions
    }

    pub fn trigger(&self) -> TriggerKind {
        self.trigger
    }

    pub fn is_forced(&self) -> bool {
        self.trigger == TriggerKind::Manual
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn approver(&self) -> &str {
        &self.approver
    }

    /// Revision identifiers in declaration order.
    pub fn revision_ids(&self) -> Vec<&str> {
        self.material_revisions
            .iter()
            .map(MaterialRevision::revision_id)
            .collect()
    }

    /// Whether any material moved since the pipeline last built.
    pub fn has_changes(&self) -> bool {
        self.material_revisions.iter().any(|mr| mr.changed)
    }

    /// A pipeline whose definition comes from one of its own materials may
    /// only build that material at the revision the definition was parsed
    /// from. Pipelines with any other origin always match.
    pub fn pipeline_config_and_material_revision_match(&self, pipeline: &PipelineConfig) -> bool {
        if !pipeline.is_config_origin_same_as_one_of_materials() {
            return true;
        }
        let ConfigOrigin::Remote { material, revision } = &pipeline.origin else {
            return true;
        };
        self.material_revisions
            .iter()
            .filter(|mr| &mr.material.fingerprint() == material)
            .all(|mr| mr.revision_id() == revision)
    }
}
