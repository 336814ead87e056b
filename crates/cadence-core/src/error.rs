//! Error types for Cadence.

use crate::ids::{MaterialFingerprint, PipelineName, StageName};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("Configuration rejected with {} error(s): {}", .0.len(), render_errors(.0))]
    Configuration(Vec<ConfigError>),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(PipelineName),

    #[error("Pipeline '{0}' has no timer configured")]
    NoTimer(PipelineName),

    // Manual trigger errors
    #[error("Material with fingerprint '{material}' not found in pipeline '{pipeline}'")]
    MaterialNotFound {
        pipeline: PipelineName,
        material: String,
    },

    #[error("Unable to find revision '{revision}' for material '{material}'")]
    RevisionNotFound {
        material: MaterialFingerprint,
        revision: String,
    },

    #[error("Invalid scheduler settings: {0}")]
    Settings(String),

    // Infrastructure errors
    #[error("Revision resolution failed: {0}")]
    Resolution(String),

    #[error("Schedule queue error: {0}")]
    Queue(String),

    #[error("Health sink error: {0}")]
    Health(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

fn render_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A validation error attached to the element that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// Pipeline that owns the offending element.
    pub pipeline: PipelineName,
    /// Index of the offending material within the pipeline, if any.
    pub material_index: Option<usize>,
    pub kind: ConfigErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// Path rendered from the owning pipeline back to itself.
    CircularDependency { path: Vec<PipelineName> },
    MissingUpstreamPipeline { upstream: PipelineName },
    MissingUpstreamStage {
        upstream: PipelineName,
        stage: StageName,
    },
    DuplicatePipeline,
    InvalidTimer { spec: String, reason: String },
}

impl ConfigError {
    pub fn on_material(pipeline: PipelineName, index: usize, kind: ConfigErrorKind) -> Self {
        Self {
            pipeline,
            material_index: Some(index),
            kind,
        }
    }

    pub fn on_pipeline(pipeline: PipelineName, kind: ConfigErrorKind) -> Self {
        Self {
            pipeline,
            material_index: None,
            kind,
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::CircularDependency { .. })
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConfigErrorKind::CircularDependency { path } => {
                let rendered = path
                    .iter()
                    .map(PipelineName::as_str)
                    .collect::<Vec<_>>()
                    .join(" <- ");
                write!(f, "Circular dependency: {}", rendered)
            }
            ConfigErrorKind::MissingUpstreamPipeline { upstream } => write!(
                f,
                "Pipeline '{}' does not exist. It is used from pipeline '{}'.",
                upstream, self.pipeline
            ),
            ConfigErrorKind::MissingUpstreamStage { upstream, stage } => write!(
                f,
                "Stage with name '{}' does not exist on pipeline '{}', it is being referred to from pipeline '{}'.",
                stage, upstream, self.pipeline
            ),
            ConfigErrorKind::DuplicatePipeline => write!(
                f,
                "You have defined multiple pipelines called '{}'. Pipeline names must be unique.",
                self.pipeline
            ),
            ConfigErrorKind::InvalidTimer { spec, reason } => write!(
                f,
                "Invalid cron syntax '{}' for timer of pipeline '{}': {}",
                spec, self.pipeline, reason
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message() {
        let err = ConfigError::on_material(
            "p1".into(),
            1,
            ConfigErrorKind::CircularDependency {
                path: vec!["p1".into(), "p2".into(), "p3".into(), "p1".into()],
            },
        );
        assert_eq!(err.to_string(), "Circular dependency: p1 <- p2 <- p3 <- p1");
        assert!(err.is_cycle());
    }

    #[test]
    fn test_missing_upstream_message() {
        let err = ConfigError::on_material(
            "pipeline1".into(),
            0,
            ConfigErrorKind::MissingUpstreamPipeline {
                upstream: "invalid".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "Pipeline 'invalid' does not exist. It is used from pipeline 'pipeline1'."
        );
        assert!(!err.is_cycle());
    }
}
