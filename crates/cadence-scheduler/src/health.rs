//! In-memory health log.

use async_trait::async_trait;
use cadence_core::Result;
use cadence_core::ports::{HealthEntry, HealthLevel, HealthScope, HealthSink};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Overall scheduler health derived from the recorded entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// No warnings or errors recorded.
    Healthy,
    /// Warnings recorded, scheduling still works.
    Degraded { reason: String },
    /// Errors recorded.
    Unhealthy { reason: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded { .. })
    }
}

/// Bounded log of health entries; the oldest entry is dropped once the
/// limit is reached.
#[derive(Debug)]
pub struct HealthLog {
    entries: RwLock<VecDeque<HealthEntry>>,
    limit: usize,
}

impl HealthLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    pub async fn entries(&self) -> Vec<HealthEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn entries_for(&self, scope: &HealthScope) -> Vec<HealthEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| &e.scope == scope)
            .cloned()
            .collect()
    }

    pub async fn status(&self) -> HealthStatus {
        let entries = self.entries.read().await;
        let count = |level: HealthLevel| entries.iter().filter(|e| e.level == level).count();

        match (count(HealthLevel::Error), count(HealthLevel::Warning)) {
            (0, 0) => HealthStatus::Healthy,
            (0, warnings) => HealthStatus::Degraded {
                reason: format!("{} warning(s) recorded", warnings),
            },
            (errors, _) => HealthStatus::Unhealthy {
                reason: format!("{} error(s) recorded", errors),
            },
        }
    }
}

#[async_trait]
impl HealthSink for HealthLog {
    async fn report(&self, entry: HealthEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.limit {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }

    async fn clear(&self, scope: &HealthScope) -> Result<()> {
        self.entries.write().await.retain(|e| &e.scope != scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pipeline: &str, level: HealthLevel) -> HealthEntry {
        HealthEntry::new(HealthScope::Pipeline(pipeline.into()), level, "message")
    }

    #[tokio::test]
    async fn test_status_follows_levels() {
        let log = HealthLog::new(10);
        assert!(log.status().await.is_healthy());

        log.report(entry("p1", HealthLevel::Warning)).await.unwrap();
        assert!(matches!(log.status().await, HealthStatus::Degraded { .. }));

        log.report(entry("p2", HealthLevel::Error)).await.unwrap();
        assert!(!log.status().await.is_operational());
    }

    #[tokio::test]
    async fn test_clear_scope() {
        let log = HealthLog::new(10);
        log.report(entry("p1", HealthLevel::Warning)).await.unwrap();
        log.report(entry("p2", HealthLevel::Warning)).await.unwrap();

        log.clear(&HealthScope::Pipeline("P1".into())).await.unwrap();
        let remaining = log.entries().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].scope, HealthScope::Pipeline("p2".into()));
    }

    #[tokio::test]
    async fn test_limit_drops_oldest() {
        let log = HealthLog::new(2);
        for name in ["p1", "p2", "p3"] {
            log.report(entry(name, HealthLevel::Info)).await.unwrap();
        }
        let entries = log.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].scope, HealthScope::Pipeline("p2".into()));
    }
}
