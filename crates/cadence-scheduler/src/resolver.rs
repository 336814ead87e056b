//! Material revision resolution.
//!
//! Turns a pipeline's materials into concrete revisions: the latest known
//! revision for each material, or an operator-pegged one for manual runs.

use crate::snapshot::ConfigSnapshot;
use cadence_core::material::MaterialConfig;
use cadence_core::pipeline::PipelineConfig;
use cadence_core::ports::{MaterialPoller, UpstreamHistory};
use cadence_core::revision::{MaterialRevision, Revision, UpstreamInstance};
use cadence_core::{Error, MaterialFingerprint, PipelineName, Result, StageName};
use dashmap::DashMap;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of resolving every material of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// One revision per material, in declaration order.
    Complete(Vec<MaterialRevision>),
    /// Materials with no usable revision, by display name.
    Incomplete { missing: Vec<String> },
}

pub struct MaterialRevisionResolver {
    poller: Arc<dyn MaterialPoller>,
    upstream: Arc<dyn UpstreamHistory>,
    latest_known: DashMap<MaterialFingerprint, Revision>,
}

impl MaterialRevisionResolver {
    pub fn new(poller: Arc<dyn MaterialPoller>, upstream: Arc<dyn UpstreamHistory>) -> Self {
        Self {
            poller,
            upstream,
            latest_known: DashMap::new(),
        }
    }

    /// Resolve every material of `pipeline`. `overrides` pegs revisions by
    /// pipeline-unique fingerprint or plain fingerprint.
    pub async fn resolve(
        &self,
        snapshot: &ConfigSnapshot,
        pipeline: &PipelineConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<Resolution> {
        check_override_keys(pipeline, overrides)?;

        let mut revisions = Vec::with_capacity(pipeline.materials.len());
        let mut missing = Vec::new();

        for material in &pipeline.materials {
            let fingerprint = material.fingerprint();
            let pegged = overrides
                .get(&material.pipeline_unique_fingerprint())
                .or_else(|| overrides.get(fingerprint.as_str()));

            let revision = match pegged {
                Some(wanted) => Some(self.find_revision(snapshot, material, wanted).await?),
                None => self.latest(snapshot, material).await?,
            };

            match revision {
                Some(revision) => {
                    let changed = self
                        .poller
                        .changed_since_last_build(&pipeline.name, &fingerprint)
                        .await?;
                    revisions.push(MaterialRevision::new(material.clone(), revision, changed));
                }
                None => missing.push(material.display_name()),
            }
        }

        if missing.is_empty() {
            Ok(Resolution::Complete(revisions))
        } else {
            debug!(pipeline = %pipeline.name, ?missing, "Materials without revisions");
            Ok(Resolution::Incomplete { missing })
        }
    }

    /// Latest known revision of a material: the head reported by the poller
    /// or upstream history. A report that no longer contains the previously
    /// known head, and whose head is older, comes from a lagging source and is
    /// ignored so the latest known revision never moves backwards.
    pub async fn latest(
        &self,
        snapshot: &ConfigSnapshot,
        material: &MaterialConfig,
    ) -> Result<Option<Revision>> {
        let reported: Vec<Revision> = match material.upstream() {
            Some((pipeline, stage)) => {
                let mut passed = self.passed_instances(pipeline, stage).await?;
                passed.sort_by_key(|i| Reverse((i.counter, i.stage_counter)));
                passed.into_iter().map(Revision::dependency).collect()
            }
            None => self.history(snapshot, material).await?,
        };

        let Some(head) = reported.first().cloned() else {
            return Ok(None);
        };
        Ok(Some(self.remember(material.fingerprint(), head, &reported)))
    }

    pub fn latest_known(&self, material: &MaterialFingerprint) -> Option<Revision> {
        self.latest_known.get(material).map(|r| r.clone())
    }

    /// Drop cached heads of materials no longer in the configuration.
    pub fn retain_materials(&self, materials: &HashSet<MaterialFingerprint>) {
        self.latest_known.retain(|fingerprint, _| materials.contains(fingerprint));
    }

    pub fn known_materials(&self) -> usize {
        self.latest_known.len()
    }

    fn remember(
        &self,
        fingerprint: MaterialFingerprint,
        head: Revision,
        reported: &[Revision],
    ) -> Revision {
        let mut entry = self
            .latest_known
            .entry(fingerprint)
            .or_insert_with(|| head.clone());

        let still_reported = reported.iter().any(|r| r.identifier == entry.identifier);
        if !still_reported && entry.is_newer_than(&head) {
            warn!(
                material = %entry.key(),
                known = %entry.identifier,
                reported = %head.identifier,
                "Ignoring stale history that predates the latest known revision"
            );
        } else {
            *entry = head;
        }
        entry.clone()
    }

    /// Look up a specific revision. Pegged revisions bypass the latest-known
    /// cache and do not update it.
    async fn find_revision(
        &self,
        snapshot: &ConfigSnapshot,
        material: &MaterialConfig,
        wanted: &str,
    ) -> Result<Revision> {
        let found = match material.upstream() {
            Some((pipeline, stage)) => self
                .passed_instances(pipeline, stage)
                .await?
                .into_iter()
                .find(|i| i.identifier() == wanted || i.label == wanted)
                .map(Revision::dependency),
            None => self
                .history(snapshot, material)
                .await?
                .into_iter()
                .find(|r| r.identifier == wanted),
        };

        found.ok_or_else(|| Error::RevisionNotFound {
            material: material.fingerprint(),
            revision: wanted.to_string(),
        })
    }

    async fn history(
        &self,
        snapshot: &ConfigSnapshot,
        material: &MaterialConfig,
    ) -> Result<Vec<Revision>> {
        let fingerprint = material.fingerprint();
        if snapshot.pollable().contains(&fingerprint) {
            self.poller.latest_revisions(&fingerprint).await
        } else {
            debug!(material = %material.display_name(), "Polling material on demand");
            self.poller.poll_now(material).await
        }
    }

    async fn passed_instances(
        &self,
        pipeline: &PipelineName,
        stage: &StageName,
    ) -> Result<Vec<UpstreamInstance>> {
        let instances = self.upstream.stage_instances(pipeline, stage).await?;
        Ok(instances.into_iter().filter(|i| i.is_passed()).collect())
    }
}

fn check_override_keys(pipeline: &PipelineConfig, overrides: &HashMap<String, String>) -> Result<()> {
    for key in overrides.keys() {
        let known = pipeline.materials.iter().any(|m| {
            &m.pipeline_unique_fingerprint() == key || m.fingerprint().as_str() == key
        });
        if !known {
            return Err(Error::MaterialNotFound {
                pipeline: pipeline.name.clone(),
                material: key.clone(),
            });
        }
    }
    Ok(())
}
