//! Debug snapshots of the dependency graph
//!
//! Recording is off unless a [`SnapshotRegistry`] is installed and enabled;
//! the default [`NoopRegistry`] drops every snapshot.

use crate::lattice::{BitId, B};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Dependency graph restricted to the bits relevant for one observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<(BitId, B)>,
    /// `(dependency, dependent)` pairs
    pub edges: Vec<(BitId, BitId)>,
    pub sources: Vec<BitId>,
    pub sinks: Vec<BitId>,
}

/// Storage for named graph snapshots
pub trait GraphRegistry {
    /// Whether `store` keeps anything; callers skip building snapshots
    /// otherwise
    fn enabled(&self) -> bool;

    fn store(&mut self, name: &str, snapshot: GraphSnapshot);

    fn snapshot(&self, _name: &str) -> Option<&GraphSnapshot> {
        None
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistry;

impl GraphRegistry for NoopRegistry {
    fn enabled(&self) -> bool {
        false
    }

    fn store(&mut self, _name: &str, _snapshot: GraphSnapshot) {}
}

/// Keeps the latest snapshot per name while enabled
#[derive(Debug, Default, Clone)]
pub struct SnapshotRegistry {
    enabled: bool,
    snapshots: IndexMap<String, GraphSnapshot>,
}

impl SnapshotRegistry {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            snapshots: IndexMap::new(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.snapshots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl GraphRegistry for SnapshotRegistry {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn store(&mut self, name: &str, snapshot: GraphSnapshot) {
        if self.enabled {
            self.snapshots.insert(name.to_string(), snapshot);
        }
    }

    fn snapshot(&self, name: &str) -> Option<&GraphSnapshot> {
        self.snapshots.get(name)
    }
}
