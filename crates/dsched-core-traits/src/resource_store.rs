//! The Resource Store boundary (§4.1): the in-memory registry of Hosts,
//! Tasks and Peers plus the per-task peer DAG. Implemented by
//! `dsched-resource-store`; consumed by the Scheduler and Replica Planner.

use crate::data::{Host, Peer, Task};
use async_trait::async_trait;
use dsched_common::{HostId, PeerId, TaskId};

/// Result of a lookup that is allowed to come back empty without being an
/// error (§4.1: "lookup of a missing entity returns a not-found sentinel").
pub type Loaded<T> = Option<T>;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn load_host(&self, id: &HostId) -> Loaded<Host>;
    async fn store_host(&self, host: Host);
    async fn delete_host(&self, id: &HostId);

    async fn load_task(&self, id: &TaskId) -> Loaded<Task>;
    async fn store_task(&self, task: Task);
    async fn delete_task(&self, id: &TaskId);

    async fn load_peer(&self, task_id: &TaskId, peer_id: &PeerId) -> Loaded<Peer>;
    async fn store_peer(&self, peer: Peer);
    async fn delete_peer(&self, task_id: &TaskId, peer_id: &PeerId);

    /// Up to `n` peers of `task_id` in unspecified (not necessarily
    /// uniform, never adversarial) order — the scheduling candidate pool.
    async fn load_random_peers(&self, task_id: &TaskId, n: usize) -> Vec<Peer>;

    /// Inserts an edge `parent -> child` iff it would not create a cycle.
    /// Atomic per task.
    async fn add_peer_edge(
        &self,
        task_id: &TaskId,
        parent: &PeerId,
        child: &PeerId,
    ) -> Result<(), crate::error::CoreTraitsError>;

    /// Predicate form of `add_peer_edge`'s cycle check, without committing.
    async fn can_add_peer_edge(&self, task_id: &TaskId, parent: &PeerId, child: &PeerId) -> bool;

    /// Removes all incoming edges to `peer` within `task_id`.
    async fn delete_peer_in_edges(&self, task_id: &TaskId, peer: &PeerId);

    /// `None` if `peer` is not present in the task's DAG at all.
    async fn peer_in_degree(&self, task_id: &TaskId, peer: &PeerId) -> Option<usize>;
}
