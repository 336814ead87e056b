//! Build cause calculation.
//!
//! Decides, for one trigger, whether a pipeline should run and with which
//! material revisions. The calculator has no side effects beyond port reads;
//! queueing and bookkeeping belong to the engine.

use crate::debounce::TimerDebounceTracker;
use crate::resolver::{MaterialRevisionResolver, Resolution};
use crate::snapshot::ConfigSnapshot;
use cadence_core::build_cause::BuildCause;
use cadence_core::pipeline::{ConfigOrigin, PipelineConfig, TimerSpec};
use cadence_core::ports::{HealthLevel, InstanceTracker};
use cadence_core::revision::MaterialRevision;
use cadence_core::{MaterialFingerprint, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Why a scheduling attempt produced no build cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The pipeline is locked and an instance is still running.
    Locked,
    /// Some materials have no usable revision yet.
    NoModifications { missing: Vec<String> },
    /// The configuration was parsed from a different revision of one of the
    /// pipeline's own materials.
    ConfigMaterialMismatch {
        material: MaterialFingerprint,
        expected: String,
        actual: String,
    },
    /// Timer run skipped: nothing new since the last timer run.
    NoNewMaterials,
    /// A cause is already waiting for this pipeline.
    AlreadyScheduled,
}

impl Rejection {
    pub fn level(&self) -> HealthLevel {
        match self {
            Rejection::Locked | Rejection::NoNewMaterials | Rejection::AlreadyScheduled => {
                HealthLevel::Info
            }
            Rejection::NoModifications { .. } | Rejection::ConfigMaterialMismatch { .. } => {
                HealthLevel::Warning
            }
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Locked => write!(f, "Pipeline is locked while an instance is running"),
            Rejection::NoModifications { missing } => write!(
                f,
                "No modifications found for material(s): {}",
                missing.join(", ")
            ),
            Rejection::ConfigMaterialMismatch {
                material,
                expected,
                actual,
            } => write!(
                f,
                "Configuration was parsed at revision '{}' of material '{}' but the latest revision is '{}'",
                expected, material, actual
            ),
            Rejection::NoNewMaterials => {
                write!(f, "Previously run with the latest material(s)")
            }
            Rejection::AlreadyScheduled => write!(f, "A build cause is already scheduled"),
        }
    }
}

/// Outcome of one scheduling attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleOutcome {
    Succeeded(BuildCause),
    Rejected(Rejection),
}

impl ScheduleOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, ScheduleOutcome::Succeeded(_))
    }

    pub fn build_cause(&self) -> Option<&BuildCause> {
        match self {
            ScheduleOutcome::Succeeded(cause) => Some(cause),
            ScheduleOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ScheduleOutcome::Succeeded(_) => None,
            ScheduleOutcome::Rejected(rejection) => Some(rejection),
        }
    }
}

pub struct BuildCauseCalculator {
    resolver: MaterialRevisionResolver,
    instances: Arc<dyn InstanceTracker>,
    debounce: Arc<TimerDebounceTracker>,
}

impl BuildCauseCalculator {
    pub fn new(
        resolver: MaterialRevisionResolver,
        instances: Arc<dyn InstanceTracker>,
        debounce: Arc<TimerDebounceTracker>,
    ) -> Self {
        Self {
            resolver,
            instances,
            debounce,
        }
    }

    pub fn resolver(&self) -> &MaterialRevisionResolver {
        &self.resolver
    }

    /// Cause for a material-change sweep.
    pub async fn auto_schedule(
        &self,
        snapshot: &ConfigSnapshot,
        pipeline: &PipelineConfig,
    ) -> Result<ScheduleOutcome> {
        if let Some(rejected) = self.check_lock(pipeline).await? {
            return Ok(rejected);
        }

        let revisions = match self.resolver.resolve(snapshot, pipeline, &HashMap::new()).await? {
            Resolution::Complete(revisions) => revisions,
            Resolution::Incomplete { missing } => {
                return Ok(ScheduleOutcome::Rejected(Rejection::NoModifications { missing }));
            }
        };

        let cause = BuildCause::auto(revisions);
        Ok(consistent(pipeline, cause))
    }

    /// Cause for an operator-forced run. Skips the config consistency check.
    pub async fn manual_schedule(
        &self,
        snapshot: &ConfigSnapshot,
        pipeline: &PipelineConfig,
        user: &str,
        overrides: &HashMap<String, String>,
    ) -> Result<ScheduleOutcome> {
        if let Some(rejected) = self.check_lock(pipeline).await? {
            return Ok(rejected);
        }

        match self.resolver.resolve(snapshot, pipeline, overrides).await? {
            Resolution::Complete(revisions) => Ok(ScheduleOutcome::Succeeded(BuildCause::forced(
                revisions, user,
            ))),
            Resolution::Incomplete { missing } => {
                Ok(ScheduleOutcome::Rejected(Rejection::NoModifications { missing }))
            }
        }
    }

    /// Cause for a fired timer. With `only_on_changes`, a run whose revisions
    /// equal those of the previous timer run is skipped.
    pub async fn timer_schedule(
        &self,
        snapshot: &ConfigSnapshot,
        pipeline: &PipelineConfig,
        timer: &TimerSpec,
    ) -> Result<ScheduleOutcome> {
        if let Some(rejected) = self.check_lock(pipeline).await? {
            return Ok(rejected);
        }

        let revisions = match self.resolver.resolve(snapshot, pipeline, &HashMap::new()).await? {
            Resolution::Complete(revisions) => revisions,
            Resolution::Incomplete { missing } => {
                return Ok(ScheduleOutcome::Rejected(Rejection::NoModifications { missing }));
            }
        };

        if timer.only_on_changes && self.debounce.has_run_with_latest(&pipeline.name, &revisions) {
            info!(
                pipeline = %pipeline.name,
                "Skipping scheduling of timer-triggered pipeline '{}' as it has previously run with the latest material(s).",
                pipeline.name
            );
            return Ok(ScheduleOutcome::Rejected(Rejection::NoNewMaterials));
        }

        Ok(consistent(pipeline, BuildCause::timer(revisions)))
    }

    async fn check_lock(&self, pipeline: &PipelineConfig) -> Result<Option<ScheduleOutcome>> {
        if pipeline.is_locked() && self.instances.has_unfinished_instance(&pipeline.name).await? {
            return Ok(Some(ScheduleOutcome::Rejected(Rejection::Locked)));
        }
        Ok(None)
    }
}

fn consistent(pipeline: &PipelineConfig, cause: BuildCause) -> ScheduleOutcome {
    if cause.pipeline_config_and_material_revision_match(pipeline) {
        return ScheduleOutcome::Succeeded(cause);
    }
    match &pipeline.origin {
        ConfigOrigin::Remote { material, revision } => {
            ScheduleOutcome::Rejected(Rejection::ConfigMaterialMismatch {
                material: material.clone(),
                expected: revision.clone(),
                actual: mismatched_revision(cause.material_revisions(), material, revision),
            })
        }
        ConfigOrigin::Local => ScheduleOutcome::Succeeded(cause),
    }
}

fn mismatched_revision(
    revisions: &[MaterialRevision],
    material: &MaterialFingerprint,
    expected: &str,
) -> String {
    revisions
        .iter()
        .find(|mr| &mr.material.fingerprint() == material && mr.revision_id() != expected)
        .map(|mr| mr.revision_id().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_levels() {
        assert_eq!(Rejection::Locked.level(), HealthLevel::Info);
        assert_eq!(
            Rejection::NoModifications { missing: vec!["git1".into()] }.level(),
            HealthLevel::Warning
        );
    }

    #[test]
    fn test_rejection_messages() {
        let mismatch = Rejection::ConfigMaterialMismatch {
            material: MaterialFingerprint::new("abc"),
            expected: "r1".into(),
            actual: "r2".into(),
        };
        assert_eq!(
            mismatch.to_string(),
            "Configuration was parsed at revision 'r1' of material 'abc' but the latest revision is 'r2'"
        );
        assert_eq!(
            Rejection::NoModifications {
                missing: vec!["git1".into(), "up1 [build]".into()]
            }
            .to_string(),
            "No modifications found for material(s): git1, up1 [build]"
        );
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = ScheduleOutcome::Rejected(Rejection::NoNewMaterials);
        assert!(!outcome.is_succeeded());
        assert!(outcome.build_cause().is_none());
        assert_eq!(outcome.rejection(), Some(&Rejection::NoNewMaterials));
    }
}
