//! DODAG topology tracking
//!
//! [`TopologyStateTracker`] folds parent-change events into a per-instance
//! child → parent map. It answers two questions for callers:
//! - did this update change anything (`update_parent` / `apply`)
//! - is the whole topology different from the last state the caller committed
//!   (`snapshot`, `commit`, `commit_if_changed`)
//!
//! Committing is always the caller's decision; updates never commit on their own.

use crate::types::{NodeId, ParentChangeEvent};
use serde::Serialize;
use std::collections::BTreeMap;

/// child → parent for one instance
pub type InstanceTopology = BTreeMap<NodeId, NodeId>;

/// Edges of one instance in canonical (child-sorted) order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InstanceEdges {
    pub instance: String,
    /// `(child, parent)` pairs sorted by child
    pub edges: Vec<(NodeId, NodeId)>,
}

/// Canonical, order-independent view of a topology
///
/// Instances are sorted by id; instances with no edges are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Snapshot(Vec<InstanceEdges>);

impl Snapshot {
    pub fn instances(&self) -> &[InstanceEdges] {
        &self.0
    }

    /// Edges of one instance, if it has any
    pub fn edges(&self, instance: &str) -> Option<&[(NodeId, NodeId)]> {
        self.0
            .iter()
            .find(|i| i.instance == instance)
            .map(|i| i.edges.as_slice())
    }

    pub fn edge_count(&self) -> usize {
        self.0.iter().map(|i| i.edges.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Incrementally maintained DODAG topology
#[derive(Debug, Default)]
pub struct TopologyStateTracker {
    topology: BTreeMap<String, InstanceTopology>,
    last_committed: Option<Snapshot>,
}

impl TopologyStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or with `None`, remove) the parent of `child` in `instance`
    ///
    /// Returns true if the stored parent changed.
    pub fn update_parent(&mut self, instance: &str, child: NodeId, parent: Option<NodeId>) -> bool {
        match parent {
            Some(parent) => {
                let edges = self.topology.entry(instance.to_string()).or_default();
                edges.insert(child, parent) != Some(parent)
            }
            None => {
                let Some(edges) = self.topology.get_mut(instance) else {
                    return false;
                };
                let removed = edges.remove(&child).is_some();
                if edges.is_empty() {
                    self.topology.remove(instance);
                }
                removed
            }
        }
    }

    /// Apply a parent-change event; returns true if the topology changed
    pub fn apply(&mut self, event: &ParentChangeEvent) -> bool {
        self.update_parent(&event.dag_id, event.node, event.parent)
    }

    /// Current parent of `child` in `instance`
    pub fn parent_of(&self, instance: &str, child: NodeId) -> Option<NodeId> {
        self.topology.get(instance)?.get(&child).copied()
    }

    /// Instances with at least one edge, sorted
    pub fn instances(&self) -> impl Iterator<Item = &str> + '_ {
        self.topology.keys().map(String::as_str)
    }

    /// Build the canonical snapshot of the current state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(
            self.topology
                .iter()
                .map(|(instance, edges)| InstanceEdges {
                    instance: instance.clone(),
                    edges: edges.iter().map(|(c, p)| (*c, *p)).collect(),
                })
                .collect(),
        )
    }

    /// The snapshot most recently committed by the caller
    pub fn last_committed(&self) -> Option<&Snapshot> {
        self.last_committed.as_ref()
    }

    /// Store `snapshot` as committed; returns false if it equals the held one
    pub fn commit(&mut self, snapshot: Snapshot) -> bool {
        if self.last_committed.as_ref() == Some(&snapshot) {
            return false;
        }
        self.last_committed = Some(snapshot);
        true
    }

    /// Commit the current state if it differs from the last commit
    ///
    /// Returns the newly committed snapshot, or `None` when nothing changed.
    pub fn commit_if_changed(&mut self) -> Option<Snapshot> {
        let snapshot = self.snapshot();
        self.commit(snapshot.clone()).then_some(snapshot)
    }

    /// True if `child`'s parent has `child` as its own parent (A → B → A)
    pub fn is_mutual_loop(&self, instance: &str, child: NodeId) -> bool {
        self.parent_of(instance, child)
            .and_then(|parent| self.parent_of(instance, parent))
            == Some(child)
    }

    /// All `(child, parent)` edges of `instance` that sit on a two-node loop
    pub fn mutual_loops(&self, instance: &str) -> Vec<(NodeId, NodeId)> {
        let Some(edges) = self.topology.get(instance) else {
            return Vec::new();
        };
        edges
            .iter()
            .filter(|&(child, parent)| edges.get(parent) == Some(child))
            .map(|(c, p)| (*c, *p))
            .collect()
    }
}
