//! BlacklistManager (C4): timed or permanent exclusion of (pipeline,
//! instance) pairs, with a periodic sweep. Grounded on the source
//! `LoadBalancer::update_endpoint_health`'s failure-count bookkeeping,
//! generalized into an explicit entry map keyed by the pair instead of an
//! implicit health flag.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use scheduler_common::BlacklistEntry;
use tracing::debug;

fn key(pipeline_id: &str, instance_id: Option<&str>) -> String {
    match instance_id {
        Some(i) => format!("{pipeline_id}::{i}"),
        None => pipeline_id.to_string(),
    }
}

/// Observed when an entry is added or removed, for the scheduler's metrics.
#[derive(Debug, Clone)]
pub enum BlacklistEvent {
    Added(BlacklistEntry),
    Removed { pipeline_id: String, instance_id: Option<String> },
    Expired { pipeline_id: String, instance_id: Option<String> },
}

pub struct BlacklistManager {
    entries: DashMap<String, BlacklistEntry>,
    log: std::sync::Mutex<Vec<BlacklistEvent>>,
}

impl Default for BlacklistManager {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            log: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl BlacklistManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, overwriting any prior entry for the same key (spec
    /// §4.4: "overwrites any prior entry for the same key").
    pub fn add(&self, entry: BlacklistEntry) {
        let k = key(&entry.pipeline_id, entry.instance_id.as_deref());
        self.entries.insert(k, entry.clone());
        self.log.lock().unwrap().push(BlacklistEvent::Added(entry));
    }

    pub fn remove(&self, pipeline_id: &str, instance_id: Option<&str>) {
        let k = key(pipeline_id, instance_id);
        if self.entries.remove(&k).is_some() {
            self.log.lock().unwrap().push(BlacklistEvent::Removed {
                pipeline_id: pipeline_id.to_string(),
                instance_id: instance_id.map(str::to_string),
            });
        }
    }

    pub fn is_blacklisted(&self, pipeline_id: &str, instance_id: Option<&str>) -> bool {
        let k = key(pipeline_id, instance_id);
        match self.entries.get(&k) {
            Some(entry) => entry.permanent || !entry.is_expired(Utc::now()),
            None => false,
        }
    }

    /// Remove every expired, non-permanent entry. Called by the scheduler's
    /// `blacklistCleanupInterval`-periodic background worker.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().permanent && e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();

        for k in expired {
            if let Some((_, entry)) = self.entries.remove(&k) {
                debug!(pipeline_id = %entry.pipeline_id, "blacklist entry expired");
                self.log.lock().unwrap().push(BlacklistEvent::Expired {
                    pipeline_id: entry.pipeline_id,
                    instance_id: entry.instance_id,
                });
            }
        }
    }

    pub fn drain_events(&self) -> Vec<BlacklistEvent> {
        std::mem::take(&mut self.log.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_common::ErrorCode;
    use std::time::Duration as StdDuration;

    #[test]
    fn overwrites_prior_entry_for_same_key() {
        let bm = BlacklistManager::new();
        bm.add(BlacklistEntry {
            pipeline_id: "p1".into(),
            instance_id: None,
            cause: ErrorCode::ExecutionFailed,
            until: Some(Utc::now() + chrono::Duration::seconds(1)),
            permanent: false,
            entered_at: Utc::now(),
        });
        bm.add(BlacklistEntry {
            pipeline_id: "p1".into(),
            instance_id: None,
            cause: ErrorCode::ExecutionFailed,
            until: Some(Utc::now() + chrono::Duration::seconds(100)),
            permanent: true,
            entered_at: Utc::now(),
        });
        assert_eq!(bm.len(), 1);
        assert!(bm.is_blacklisted("p1", None));
    }

    #[test]
    fn sweep_removes_only_expired_non_permanent_entries() {
        let bm = BlacklistManager::new();
        let now = Utc::now();
        bm.add(BlacklistEntry {
            pipeline_id: "p1".into(),
            instance_id: Some("i1".into()),
            cause: ErrorCode::ExecutionFailed,
            until: Some(now - chrono::Duration::seconds(1)),
            permanent: false,
            entered_at: now,
        });
        bm.add(BlacklistEntry {
            pipeline_id: "p2".into(),
            instance_id: None,
            cause: ErrorCode::ExecutionFailed,
            until: Some(now - chrono::Duration::seconds(1)),
            permanent: true,
            entered_at: now,
        });
        bm.sweep(now);
        assert!(!bm.is_blacklisted("p1", Some("i1")));
        assert!(bm.is_blacklisted("p2", None));
    }

    #[tokio::test]
    async fn timed_entry_expires_at_the_configured_instant() {
        let bm = BlacklistManager::new();
        let now = Utc::now();
        bm.add(BlacklistEntry {
            pipeline_id: "p1".into(),
            instance_id: Some("i1".into()),
            cause: ErrorCode::ExecutionFailed,
            until: Some(now + chrono::Duration::milliseconds(100)),
            permanent: false,
            entered_at: now,
        });

        assert!(bm.is_blacklisted("p1", Some("i1")));
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        bm.sweep(Utc::now());
        assert!(bm.is_blacklisted("p1", Some("i1")));

        tokio::time::sleep(StdDuration::from_millis(200)).await;
        bm.sweep(Utc::now());
        assert!(!bm.is_blacklisted("p1", Some("i1")));
    }
}
