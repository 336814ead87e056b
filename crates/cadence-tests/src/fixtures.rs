//! Test fixtures for creating sample configuration and history.

use cadence_core::material::MaterialConfig;
use cadence_core::pipeline::{ConfigOrigin, LockBehavior, PipelineConfig, TimerSpec};
use cadence_core::revision::{Modification, Revision, StageResult, UpstreamInstance};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Factory for materials.
pub struct MaterialFixture;

impl MaterialFixture {
    pub fn git(name: &str) -> MaterialConfig {
        MaterialConfig::git(format!("https://git.example.com/{}.git", name)).with_name(name)
    }

    pub fn manual_only_git(name: &str) -> MaterialConfig {
        Self::git(name).with_auto_update(false)
    }

    pub fn upstream(pipeline: &str, stage: &str) -> MaterialConfig {
        MaterialConfig::dependency(pipeline, stage)
    }
}

/// Factory for pipelines.
pub struct PipelineFixture;

impl PipelineFixture {
    /// A pipeline with a `build` stage and the given materials.
    pub fn with_materials(name: &str, materials: Vec<MaterialConfig>) -> PipelineConfig {
        materials
            .into_iter()
            .fold(PipelineConfig::new(name).with_stage("build"), |p, m| {
                p.with_material(m)
            })
    }

    pub fn simple(name: &str, material: &MaterialConfig) -> PipelineConfig {
        Self::with_materials(name, vec![material.clone()])
    }

    pub fn locked(name: &str, material: &MaterialConfig) -> PipelineConfig {
        Self::simple(name, material).with_lock_behavior(LockBehavior::LockOnFailure)
    }

    pub fn timed(name: &str, material: &MaterialConfig, only_on_changes: bool) -> PipelineConfig {
        Self::simple(name, material).with_timer(TimerSpec::new("0 0 22 * * *", only_on_changes))
    }

    /// A pipeline defined in a config repository that is also one of its
    /// materials, parsed at `revision`.
    pub fn from_config_repo(name: &str, repo: &MaterialConfig, revision: &str) -> PipelineConfig {
        Self::simple(name, repo).with_origin(ConfigOrigin::remote(repo.fingerprint(), revision))
    }
}

/// Factory for revisions.
pub struct RevisionFixture;

impl RevisionFixture {
    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    /// An SCM check-in `minutes` after a fixed base time.
    pub fn scm(revision: &str, minutes: i64) -> Revision {
        Revision::scm(Modification {
            revision: revision.to_string(),
            author: Some("dev".to_string()),
            comment: Some(format!("Commit {}", revision)),
            modified_at: Self::base_time() + Duration::minutes(minutes),
            changed_files: vec!["src/main.rs".to_string()],
        })
    }

    pub fn stage_run(pipeline: &str, counter: u64, stage: &str, result: StageResult) -> UpstreamInstance {
        UpstreamInstance {
            pipeline: pipeline.into(),
            counter,
            label: counter.to_string(),
            stage: stage.into(),
            stage_counter: 1,
            result,
            completed_at: Some(Self::base_time() + Duration::minutes(counter as i64)),
        }
    }

    pub fn passed(pipeline: &str, counter: u64, stage: &str) -> UpstreamInstance {
        Self::stage_run(pipeline, counter, stage, StageResult::Passed)
    }

    /// A passed re-run of a stage within pipeline run `counter`.
    pub fn rerun(pipeline: &str, counter: u64, stage: &str, stage_counter: u32) -> UpstreamInstance {
        UpstreamInstance {
            stage_counter,
            ..Self::passed(pipeline, counter, stage)
        }
    }

    pub fn failed(pipeline: &str, counter: u64, stage: &str) -> UpstreamInstance {
        Self::stage_run(pipeline, counter, stage, StageResult::Failed)
    }

    pub fn running(pipeline: &str, counter: u64, stage: &str) -> UpstreamInstance {
        UpstreamInstance {
            completed_at: None,
            ..Self::stage_run(pipeline, counter, stage, StageResult::Unknown)
        }
    }
}
