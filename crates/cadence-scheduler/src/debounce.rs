//! Debounce state for timer-triggered runs.

use cadence_core::PipelineName;
use cadence_core::build_cause::BuildCause;
use cadence_core::revision::MaterialRevision;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Pipeline-unique fingerprint to revision identifier.
type RevisionSet = BTreeMap<String, String>;

/// Remembers, per pipeline, the revisions of the last queued timer cause.
/// Kept in memory only; losing it costs one redundant run.
#[derive(Debug, Default)]
pub struct TimerDebounceTracker {
    last_queued: DashMap<PipelineName, RevisionSet>,
}

impl TimerDebounceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last queued timer run used exactly these revisions.
    pub fn has_run_with_latest(&self, pipeline: &PipelineName, candidate: &[MaterialRevision]) -> bool {
        self.last_queued
            .get(pipeline)
            .is_some_and(|last| *last == revision_set(candidate))
    }

    /// Record a timer cause that was queued.
    pub fn record(&self, pipeline: &PipelineName, cause: &BuildCause) {
        self.last_queued
            .insert(pipeline.clone(), revision_set(cause.material_revisions()));
    }

    pub fn forget(&self, pipeline: &PipelineName) {
        self.last_queued.remove(pipeline);
    }

    pub fn tracked_pipelines(&self) -> Vec<PipelineName> {
        self.last_queued.iter().map(|e| e.key().clone()).collect()
    }
}

fn revision_set(revisions: &[MaterialRevision]) -> RevisionSet {
    revisions
        .iter()
        .map(|mr| {
            (
                mr.material.pipeline_unique_fingerprint(),
                mr.revision_id().to_string(),
            )
        })
        .collect()
}
