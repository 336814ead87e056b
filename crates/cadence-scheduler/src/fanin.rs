//! Fan-in deduplication of materials across the configuration.

use cadence_core::MaterialFingerprint;
use cadence_core::material::MaterialConfig;
use cadence_core::pipeline::Configuration;
use std::collections::BTreeMap;

/// Materials keyed by fingerprint, one entry per fingerprint.
#[derive(Debug, Clone, Default)]
pub struct MaterialSet {
    materials: BTreeMap<MaterialFingerprint, MaterialConfig>,
}

impl MaterialSet {
    pub fn contains(&self, fingerprint: &MaterialFingerprint) -> bool {
        self.materials.contains_key(fingerprint)
    }

    pub fn get(&self, fingerprint: &MaterialFingerprint) -> Option<&MaterialConfig> {
        self.materials.get(fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MaterialFingerprint, &MaterialConfig)> {
        self.materials.iter()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Source materials whose repository location is `url`.
    pub fn with_url<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a MaterialConfig> + 'a {
        self.materials.values().filter(move |m| m.url() == Some(url))
    }
}

/// Collapses materials shared by several pipelines into one pollable unit.
pub struct FanInDeduplicator;

impl FanInDeduplicator {
    pub fn new() -> Self {
        Self
    }

    /// A fingerprint is pollable when at least one occurrence, in a pipeline
    /// or a config repository, has auto-update on. The first declaration with
    /// auto-update on represents the fingerprint.
    pub fn pollable_materials(&self, config: &Configuration) -> MaterialSet {
        collect(declared(config).filter(|m| m.auto_update))
    }

    /// Source materials that only build when a commit notification arrives:
    /// every declaration with auto-update off, config repositories included.
    /// Dependency materials never qualify.
    pub fn post_commit_materials(&self, config: &Configuration) -> MaterialSet {
        collect(declared(config).filter(|m| !m.auto_update && !m.is_dependency()))
    }
}

fn declared(config: &Configuration) -> impl Iterator<Item = &MaterialConfig> {
    config
        .pipelines
        .iter()
        .flat_map(|p| p.materials.iter())
        .chain(config.config_repos.iter().map(|r| &r.material))
}

fn collect<'a>(materials: impl Iterator<Item = &'a MaterialConfig>) -> MaterialSet {
    let mut set = BTreeMap::new();
    for material in materials {
        set.entry(material.fingerprint())
            .or_insert_with(|| material.clone());
    }
    MaterialSet { materials: set }
}

impl Default for FanInDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}
