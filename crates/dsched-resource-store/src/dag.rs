//! The per-task peer DAG (§3, §4.1, §9): a task-owned structure mapping
//! peer id to its in/out neighbors. A cycle check is a reachability query
//! from the proposed child back to the proposed parent — if the child can
//! already reach the parent, adding `parent -> child` would close a loop.

use dsched_common::PeerId;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct TaskGraph {
    graph: DiGraph<PeerId, ()>,
    index_of: HashMap<PeerId, NodeIndex>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, peer: &PeerId) -> NodeIndex {
        if let Some(idx) = self.index_of.get(peer) {
            return *idx;
        }
        let idx = self.graph.add_node(peer.clone());
        self.index_of.insert(peer.clone(), idx);
        idx
    }

    fn node(&self, peer: &PeerId) -> Option<NodeIndex> {
        self.index_of.get(peer).copied()
    }

    /// Equivalent to the cycle-check half of `add_peer_edge`, without
    /// committing (§4.1's `can_add_peer_edge`).
    pub fn can_add_edge(&self, parent: &PeerId, child: &PeerId) -> bool {
        if parent == child {
            return false;
        }
        match (self.node(parent), self.node(child)) {
            (Some(p), Some(c)) => !has_path_connecting(&self.graph, c, p, None),
            _ => true,
        }
    }

    /// Inserts `parent -> child` iff it would not create a cycle. Both
    /// endpoints are created as isolated nodes if new.
    pub fn add_edge(&mut self, parent: &PeerId, child: &PeerId) -> bool {
        if !self.can_add_edge(parent, child) {
            return false;
        }
        let p = self.ensure_node(parent);
        let c = self.ensure_node(child);
        self.graph.update_edge(p, c, ());
        true
    }

    /// Removes every edge with `peer` as the target.
    pub fn delete_in_edges(&mut self, peer: &PeerId) {
        let Some(idx) = self.node(peer) else {
            return;
        };
        let incoming: Vec<_> = self
            .graph
            .edges_directed(idx, petgraph::Direction::Incoming)
            .map(|e| e.id())
            .collect();
        for edge in incoming {
            self.graph.remove_edge(edge);
        }
    }

    /// `None` if `peer` has never been registered in this task's graph.
    pub fn in_degree(&self, peer: &PeerId) -> Option<usize> {
        let idx = self.node(peer)?;
        Some(
            self.graph
                .edges_directed(idx, petgraph::Direction::Incoming)
                .count(),
        )
    }

    pub fn ensure_registered(&mut self, peer: &PeerId) {
        self.ensure_node(peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PeerId {
        s.into()
    }

    #[test]
    fn rejects_edge_that_would_close_a_cycle() {
        let mut g = TaskGraph::new();
        assert!(g.add_edge(&pid("a"), &pid("b")));
        assert!(g.add_edge(&pid("b"), &pid("c")));
        // c -> a would make a reachable from c, and a -> b -> c already
        // exists, so a -> b -> c -> a is a cycle.
        assert!(!g.can_add_edge(&pid("c"), &pid("a")));
        assert!(!g.add_edge(&pid("c"), &pid("a")));
    }

    #[test]
    fn self_edge_always_rejected() {
        let mut g = TaskGraph::new();
        g.ensure_registered(&pid("a"));
        assert!(!g.can_add_edge(&pid("a"), &pid("a")));
    }

    #[test]
    fn in_degree_tracks_commits_and_prunes() {
        let mut g = TaskGraph::new();
        g.add_edge(&pid("a"), &pid("c"));
        g.add_edge(&pid("b"), &pid("c"));
        assert_eq!(g.in_degree(&pid("c")), Some(2));
        g.delete_in_edges(&pid("c"));
        assert_eq!(g.in_degree(&pid("c")), Some(0));
    }

    #[test]
    fn unregistered_peer_has_no_in_degree() {
        let g = TaskGraph::new();
        assert_eq!(g.in_degree(&pid("ghost")), None);
    }
}
