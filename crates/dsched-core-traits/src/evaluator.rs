//! The Evaluator boundary (§4.3, §9): a pluggable scoring strategy so the
//! Scheduler and Replica Planner never depend on the weighted-sum default
//! directly. `dsched-evaluator` ships that default implementation.

use crate::data::{Host, Peer, PersistentPeer, Task};

/// A candidate parent alongside the host it runs on, the unit the scorer
/// ranks against a child peer.
#[derive(Debug, Clone)]
pub struct ScoredCandidate<'a> {
    pub peer: &'a Peer,
    pub host: &'a Host,
}

pub trait ParentScorer: Send + Sync {
    /// Ranks `candidates` for `child` given `task`, descending score, ties
    /// broken by input position (§4.3).
    fn evaluate_parents(
        &self,
        task: &Task,
        child: &Peer,
        child_host: &Host,
        candidates: &[ScoredCandidate<'_>],
    ) -> Vec<usize>;

    /// Persistent-cache variant: piece-progress, IDC affinity, and locality
    /// affinity only (§4.3).
    fn evaluate_persistent_cache_parents(
        &self,
        task: &Task,
        child_host: &Host,
        candidates: &[(&PersistentPeer, &Host)],
    ) -> Vec<usize>;

    fn is_bad_parent(&self, peer: &Peer) -> bool;

    fn is_bad_persistent_cache_parent(&self, peer: &PersistentPeer) -> bool;
}
