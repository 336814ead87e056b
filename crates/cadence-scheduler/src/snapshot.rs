//! Immutable configuration snapshots.
//!
//! A snapshot bundles the pipelines of one configuration version with their
//! validated dependency graph and its fan-in material sets. Snapshots are
//! built once, shared behind `Arc`, and never mutated.

use crate::fanin::{FanInDeduplicator, MaterialSet};
use crate::graph::DependencyGraph;
use crate::triggers::parse_timer;
use cadence_core::pipeline::{Configuration, PipelineConfig};
use cadence_core::{ConfigError, ConfigErrorKind, MaterialFingerprint, PipelineName};
use cron::Schedule;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug)]
pub struct ConfigSnapshot {
    version: u64,
    graph: DependencyGraph,
    pollable: MaterialSet,
    post_commit: MaterialSet,
    timers: HashMap<PipelineName, Schedule>,
}

impl ConfigSnapshot {
    /// The snapshot in effect before any configuration was loaded.
    pub fn empty() -> Self {
        Self {
            version: 0,
            graph: DependencyGraph::build(&[]),
            pollable: MaterialSet::default(),
            post_commit: MaterialSet::default(),
            timers: HashMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn pipeline(&self, name: &PipelineName) -> Option<&PipelineConfig> {
        self.graph.pipeline(name)
    }

    pub fn pipeline_names(&self) -> BTreeSet<PipelineName> {
        self.graph.pipelines().map(|p| p.name.clone()).collect()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Materials that need active polling.
    pub fn pollable(&self) -> &MaterialSet {
        &self.pollable
    }

    /// Materials that only build on commit notifications.
    pub fn post_commit(&self) -> &MaterialSet {
        &self.post_commit
    }

    /// Fingerprints of every material some pipeline builds from.
    pub fn material_fingerprints(&self) -> HashSet<MaterialFingerprint> {
        self.graph
            .pipelines()
            .flat_map(|p| p.materials.iter().map(|m| m.fingerprint()))
            .collect()
    }

    pub fn timers(&self) -> impl Iterator<Item = (&PipelineName, &Schedule)> {
        self.timers.iter()
    }
}

/// Validates a configuration and turns it into a snapshot.
pub struct SnapshotBuilder {
    fan_in: FanInDeduplicator,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            fan_in: FanInDeduplicator::new(),
        }
    }

    /// Build a snapshot, or every error that prevents publishing one.
    pub fn build(
        &self,
        config: &Configuration,
        version: u64,
    ) -> Result<ConfigSnapshot, Vec<ConfigError>> {
        let graph = DependencyGraph::build(&config.pipelines);
        let mut errors = graph.validate();

        let mut timers = HashMap::new();
        for pipeline in graph.pipelines() {
            let Some(timer) = &pipeline.timer else {
                continue;
            };
            match parse_timer(timer) {
                Ok(schedule) => {
                    timers.insert(pipeline.name.clone(), schedule);
                }
                Err(e) => errors.push(ConfigError::on_pipeline(
                    pipeline.name.clone(),
                    ConfigErrorKind::InvalidTimer {
                        spec: timer.spec.clone(),
                        reason: e.to_string(),
                    },
                )),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ConfigSnapshot {
            version,
            pollable: self.fan_in.pollable_materials(config),
            post_commit: self.fan_in.post_commit_materials(config),
            graph,
            timers,
        })
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::material::MaterialConfig;
    use cadence_core::pipeline::TimerSpec;

    #[test]
    fn test_build_valid_snapshot() {
        let git = MaterialConfig::git("https://example.com/app.git");
        let config = Configuration::new(vec![
            PipelineConfig::new("up")
                .with_material(git.clone())
                .with_stage("build")
                .with_timer(TimerSpec::new("0 0 22 * * *", true)),
            PipelineConfig::new("down")
                .with_material(MaterialConfig::dependency("up", "build"))
                .with_stage("deploy"),
        ]);

        let snapshot = SnapshotBuilder::new().build(&config, 3).unwrap();
        assert_eq!(snapshot.version(), 3);
        assert!(snapshot.pipeline(&"UP".into()).is_some());
        assert!(snapshot.pollable().contains(&git.fingerprint()));
        assert_eq!(snapshot.timers().count(), 1);
        assert_eq!(snapshot.pipeline_names().len(), 2);
        assert!(snapshot.post_commit().is_empty());
        assert_eq!(snapshot.material_fingerprints().len(), 2);
    }

    #[test]
    fn test_cyclic_configuration_is_rejected() {
        let config = Configuration::new(vec![
            PipelineConfig::new("a")
                .with_material(MaterialConfig::dependency("b", "s"))
                .with_stage("s"),
            PipelineConfig::new("b")
                .with_material(MaterialConfig::dependency("a", "s"))
                .with_stage("s"),
        ]);

        let errors = SnapshotBuilder::new().build(&config, 1).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_invalid_timer_is_rejected() {
        let config = Configuration::new(vec![
            PipelineConfig::new("p1")
                .with_material(MaterialConfig::git("repo"))
                .with_stage("s")
                .with_timer(TimerSpec::new("not a cron", false)),
        ]);

        let errors = SnapshotBuilder::new().build(&config, 1).unwrap_err();
        assert!(matches!(errors[0].kind, ConfigErrorKind::InvalidTimer { .. }));
    }
}
