//! Pipeline configuration types.
//!
//! These are the already-parsed configuration objects the engine consumes.
//! A [`Configuration`] is replaced wholesale whenever the provider reports a
//! change.

use crate::error::Result;
use crate::ids::{MaterialFingerprint, PipelineName, StageName};
use crate::material::MaterialConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Every pipeline and config repository known to the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Configuration {
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
    #[serde(default)]
    pub config_repos: Vec<ConfigRepoConfig>,
}

impl Configuration {
    pub fn new(pipelines: Vec<PipelineConfig>) -> Self {
        Self {
            pipelines,
            config_repos: vec![],
        }
    }

    pub fn with_config_repo(mut self, repo: ConfigRepoConfig) -> Self {
        self.config_repos.push(repo);
        self
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn pipeline(&self, name: &PipelineName) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| &p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    pub name: PipelineName,
    pub materials: Vec<MaterialConfig>,
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub origin: ConfigOrigin,
    #[serde(default)]
    pub lock_behavior: LockBehavior,
    #[serde(default)]
    pub timer: Option<TimerSpec>,
}

impl PipelineConfig {
    pub fn new(name: impl Into<PipelineName>) -> Self {
        Self {
            name: name.into(),
            materials: vec![],
            stages: vec![],
            origin: ConfigOrigin::Local,
            lock_behavior: LockBehavior::None,
            timer: None,
        }
    }

    pub fn with_material(mut self, material: MaterialConfig) -> Self {
        self.materials.push(material);
        self
    }

    pub fn with_stage(mut self, name: impl Into<StageName>) -> Self {
        self.stages.push(StageConfig { name: name.into() });
        self
    }

    pub fn with_origin(mut self, origin: ConfigOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_lock_behavior(mut self, lock_behavior: LockBehavior) -> Self {
        self.lock_behavior = lock_behavior;
        self
    }

    pub fn with_timer(mut self, timer: TimerSpec) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn has_stage(&self, stage: &StageName) -> bool {
        self.stages.iter().any(|s| &s.name == stage)
    }

    pub fn is_locked(&self) -> bool {
        self.lock_behavior.is_locked()
    }

    /// Dependency materials in declaration order, with their index.
    pub fn dependency_materials(&self) -> impl Iterator<Item = (usize, &PipelineName, &StageName)> {
        self.materials
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.upstream().map(|(p, s)| (i, p, s)))
    }

    /// Whether the pipeline's definition came from one of its own materials.
    pub fn is_config_origin_same_as_one_of_materials(&self) -> bool {
        match &self.origin {
            ConfigOrigin::Local => false,
            ConfigOrigin::Remote { material, .. } => {
                self.materials.iter().any(|m| &m.fingerprint() == material)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StageConfig {
    pub name: StageName,
}

/// Where a pipeline definition came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigOrigin {
    /// The local configuration file.
    #[default]
    Local,
    /// A config repository, parsed at `revision`.
    Remote {
        material: MaterialFingerprint,
        revision: String,
    },
}

impl ConfigOrigin {
    pub fn remote(material: MaterialFingerprint, revision: impl Into<String>) -> Self {
        ConfigOrigin::Remote {
            material,
            revision: revision.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LockBehavior {
    #[default]
    None,
    LockOnFailure,
    UnlockWhenFinished,
}

impl LockBehavior {
    pub fn is_locked(&self) -> bool {
        !matches!(self, LockBehavior::None)
    }
}

/// Cron-driven trigger, using seconds-first cron syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TimerSpec {
    pub spec: String,
    /// Skip the run when the pipeline already ran with the latest materials.
    #[serde(default)]
    pub only_on_changes: bool,
}

impl TimerSpec {
    pub fn new(spec: impl Into<String>, only_on_changes: bool) -> Self {
        Self {
            spec: spec.into(),
            only_on_changes,
        }
    }
}

/// An externally versioned configuration source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigRepoConfig {
    pub id: String,
    pub material: MaterialConfig,
}

impl ConfigRepoConfig {
    pub fn new(id: impl Into<String>, material: MaterialConfig) -> Self {
        Self {
            id: id.into(),
            material,
        }
    }
}
