//! The Resource Store (§4.1): an in-memory registry of Hosts, Tasks and
//! Peers, sharded so unrelated lookups never contend, with a per-task peer
//! DAG guarded by its own lock so edge mutations on one task never block
//! scheduling decisions for another (§5).

mod dag;
pub mod metrics;

use async_trait::async_trait;
use dag::TaskGraph;
use dsched_common::{CommonError, HostId, PeerId, TaskId};
use dsched_core_traits::{CoreTraitsError, Host, Peer, ResourceStore, Task};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

struct TaskEntry {
    task: Task,
    peers: HashMap<PeerId, Peer>,
    graph: TaskGraph,
}

impl TaskEntry {
    fn new(task: Task) -> Self {
        Self {
            task,
            peers: HashMap::new(),
            graph: TaskGraph::new(),
        }
    }
}

/// The default, in-process Resource Store. There is no persistence here —
/// durability for the entities that need it lives in the Persistent-Cache
/// Store (`dsched-persistent-cache`).
#[derive(Default)]
pub struct InMemoryResourceStore {
    hosts: RwLock<HashMap<HostId, Host>>,
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<TaskEntry>>>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn task_entry(&self, id: &TaskId) -> Option<Arc<Mutex<TaskEntry>>> {
        self.tasks.read().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn load_host(&self, id: &HostId) -> Option<Host> {
        self.hosts.read().unwrap().get(id).cloned()
    }

    async fn store_host(&self, host: Host) {
        self.hosts.write().unwrap().insert(host.id.clone(), host);
    }

    async fn delete_host(&self, id: &HostId) {
        self.hosts.write().unwrap().remove(id);
    }

    async fn load_task(&self, id: &TaskId) -> Option<Task> {
        let entry = self.task_entry(id)?;
        let guard = entry.lock().unwrap();
        Some(guard.task.clone())
    }

    async fn store_task(&self, task: Task) {
        let mut tasks = self.tasks.write().unwrap();
        match tasks.get(&task.id) {
            Some(existing) => existing.lock().unwrap().task = task,
            None => {
                tasks.insert(task.id.clone(), Arc::new(Mutex::new(TaskEntry::new(task))));
            }
        }
    }

    async fn delete_task(&self, id: &TaskId) {
        self.tasks.write().unwrap().remove(id);
    }

    async fn load_peer(&self, task_id: &TaskId, peer_id: &PeerId) -> Option<Peer> {
        let entry = self.task_entry(task_id)?;
        let guard = entry.lock().unwrap();
        guard.peers.get(peer_id).cloned()
    }

    async fn store_peer(&self, peer: Peer) {
        let Some(entry) = self.task_entry(&peer.task_id) else {
            log::warn!(
                "store_peer for unknown task {} (peer {})",
                peer.task_id,
                peer.id
            );
            return;
        };
        let mut guard = entry.lock().unwrap();
        guard.graph.ensure_registered(&peer.id);
        guard.peers.insert(peer.id.clone(), peer);
    }

    async fn delete_peer(&self, task_id: &TaskId, peer_id: &PeerId) {
        let Some(entry) = self.task_entry(task_id) else {
            return;
        };
        let mut guard = entry.lock().unwrap();
        guard.graph.delete_in_edges(peer_id);
        guard.peers.remove(peer_id);
    }

    async fn load_random_peers(&self, task_id: &TaskId, n: usize) -> Vec<Peer> {
        let Some(entry) = self.task_entry(task_id) else {
            return Vec::new();
        };
        let guard = entry.lock().unwrap();
        let mut all: Vec<Peer> = guard.peers.values().cloned().collect();
        fastrand::shuffle(&mut all);
        all.truncate(n);
        all
    }

    async fn add_peer_edge(
        &self,
        task_id: &TaskId,
        parent: &PeerId,
        child: &PeerId,
    ) -> Result<(), CoreTraitsError> {
        let entry = self
            .task_entry(task_id)
            .ok_or_else(|| CommonError::not_found(format!("task {task_id}")))?;
        let mut guard = entry.lock().unwrap();
        if guard.graph.add_edge(parent, child) {
            metrics::EDGE_COMMITS.inc();
            Ok(())
        } else {
            metrics::EDGE_CYCLE_REJECTIONS.inc();
            Err(CommonError::cycle_detected(format!("{parent} -> {child}")).into())
        }
    }

    async fn can_add_peer_edge(&self, task_id: &TaskId, parent: &PeerId, child: &PeerId) -> bool {
        let Some(entry) = self.task_entry(task_id) else {
            return false;
        };
        entry.lock().unwrap().graph.can_add_edge(parent, child)
    }

    async fn delete_peer_in_edges(&self, task_id: &TaskId, peer: &PeerId) {
        let Some(entry) = self.task_entry(task_id) else {
            return;
        };
        metrics::EDGE_PRUNES.inc();
        entry.lock().unwrap().graph.delete_in_edges(peer);
    }

    async fn peer_in_degree(&self, task_id: &TaskId, peer: &PeerId) -> Option<usize> {
        let entry = self.task_entry(task_id)?;
        entry.lock().unwrap().graph.in_degree(peer)
    }
}
