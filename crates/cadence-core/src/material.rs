//! Material configuration.
//!
//! A material is an input source a pipeline builds from: a source repository
//! or a stage of an upstream pipeline.

use crate::ids::{MaterialFingerprint, PipelineName, StageName};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MaterialConfig {
    #[serde(flatten)]
    pub kind: MaterialKind,
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,
    /// Checkout folder relative to the pipeline working directory.
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_auto_update() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialKind {
    Scm {
        scm: ScmType,
        url: String,
        #[serde(default)]
        branch: Option<String>,
    },
    Dependency {
        pipeline: PipelineName,
        stage: StageName,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScmType {
    Git,
    Hg,
    Svn,
    P4,
    Tfs,
}

impl ScmType {
    fn as_str(&self) -> &'static str {
        match self {
            ScmType::Git => "GitMaterial",
            ScmType::Hg => "HgMaterial",
            ScmType::Svn => "SvnMaterial",
            ScmType::P4 => "P4Material",
            ScmType::Tfs => "TfsMaterial",
        }
    }
}

impl MaterialConfig {
    pub fn scm(scm: ScmType, url: impl Into<String>) -> Self {
        Self {
            kind: MaterialKind::Scm {
                scm,
                url: url.into(),
                branch: None,
            },
            auto_update: true,
            destination: None,
            name: None,
        }
    }

    pub fn git(url: impl Into<String>) -> Self {
        Self::scm(ScmType::Git, url)
    }

    pub fn dependency(pipeline: impl Into<PipelineName>, stage: impl Into<StageName>) -> Self {
        Self {
            kind: MaterialKind::Dependency {
                pipeline: pipeline.into(),
                stage: stage.into(),
            },
            auto_update: true,
            destination: None,
            name: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        if let MaterialKind::Scm { branch: b, .. } = &mut self.kind {
            *b = Some(branch.into());
        }
        self
    }

    pub fn with_auto_update(mut self, auto_update: bool) -> Self {
        self.auto_update = auto_update;
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self.kind, MaterialKind::Dependency { .. })
    }

    /// Upstream pipeline and stage for dependency materials.
    pub fn upstream(&self) -> Option<(&PipelineName, &StageName)> {
        match &self.kind {
            MaterialKind::Dependency { pipeline, stage } => Some((pipeline, stage)),
            MaterialKind::Scm { .. } => None,
        }
    }

    /// Repository location for source materials.
    pub fn url(&self) -> Option<&str> {
        match &self.kind {
            MaterialKind::Scm { url, .. } => Some(url),
            MaterialKind::Dependency { .. } => None,
        }
    }

    /// Identity of the material across the whole configuration. Destination,
    /// name and the auto-update flag do not take part.
    pub fn fingerprint(&self) -> MaterialFingerprint {
        let source = match &self.kind {
            MaterialKind::Scm { scm, url, branch } => format!(
                "type={}<|>url={}<|>branch={}",
                scm.as_str(),
                url,
                branch.as_deref().unwrap_or("")
            ),
            MaterialKind::Dependency { pipeline, stage } => format!(
                "type=DependencyMaterial<|>pipelineName={}<|>stageName={}",
                pipeline.as_str().to_ascii_lowercase(),
                stage.as_str().to_ascii_lowercase()
            ),
        };
        MaterialFingerprint::new(sha256_hex(&source))
    }

    /// Fingerprint that also distinguishes the checkout destination, so one
    /// repository used twice in a pipeline yields two identities.
    pub fn pipeline_unique_fingerprint(&self) -> String {
        let source = format!(
            "{}<|>dest={}",
            self.fingerprint(),
            self.destination.as_deref().unwrap_or("")
        );
        sha256_hex(&source)
    }

    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.kind {
            MaterialKind::Scm { url, .. } => url.clone(),
            MaterialKind::Dependency { pipeline, stage } => format!("{} [{}]", pipeline, stage),
        }
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
