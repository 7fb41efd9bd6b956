// src/storage/memory.rs
use dashmap::DashMap;
use log::{error, warn};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::models::server::FleetSnapshot;

/// Holds the current fleet snapshot. Readers clone the `Arc` and never see a
/// half-built map; writers swap in a whole new snapshot.
pub struct SnapshotStore {
    current: RwLock<Arc<FleetSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(FleetSnapshot::empty())),
        }
    }

    pub fn current(&self) -> Arc<FleetSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Install `snapshot` and return the one it replaced.
    pub fn replace(&self, snapshot: FleetSnapshot) -> Arc<FleetSnapshot> {
        std::mem::replace(&mut *self.current.write(), Arc::new(snapshot))
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Consecutive scan failures per candidate name.
pub struct ScanFailures {
    counts: DashMap<String, u32>,
    alert_threshold: u32,
}

impl ScanFailures {
    pub fn new(alert_threshold: u32) -> Self {
        Self {
            counts: DashMap::new(),
            alert_threshold: alert_threshold.max(1),
        }
    }

    /// Record one failed build. Logs an operator alert exactly once, when the
    /// streak reaches the threshold. Returns the new streak length.
    pub fn record_failure(&self, name: &str, reason: &str) -> u32 {
        let mut entry = self.counts.entry(name.to_string()).or_insert(0);
        *entry += 1;
        let streak = *entry;
        drop(entry);

        if streak == self.alert_threshold {
            error!(
                "Server '{}' has failed {} consecutive scans, last error: {}",
                name, streak, reason
            );
        } else {
            warn!("Could not load server '{}': {}", name, reason);
        }
        streak
    }

    pub fn record_success(&self, name: &str) {
        self.counts.remove(name);
    }

    /// Forget every name not in `seen`; a directory that stops being a
    /// candidate starts from zero if it comes back.
    pub fn retain_seen(&self, seen: &[String]) {
        self.counts.retain(|name, _| seen.iter().any(|s| s == name));
    }

    pub fn streak(&self, name: &str) -> u32 {
        self.counts.get(name).map(|c| *c).unwrap_or(0)
    }

    /// Current streaks ordered by name.
    pub fn snapshot(&self) -> Vec<(String, u32)> {
        let mut out: Vec<(String, u32)> = self
            .counts
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect();
        out.sort();
        out
    }
}
