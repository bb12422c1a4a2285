//! The in-memory `PersistentCacheBackend` (§10.5): the default test double.
//! It reproduces the hash/set/TTL/transaction semantics of the real
//! Redis-compatible backend closely enough to exercise GC and round-trip
//! properties without any network access.

use async_trait::async_trait;
use dsched_common::{HostId, PeerId, SystemTimeProvider, TaskId, TimeProvider};
use dsched_core_traits::{PcResult, PersistentCacheBackend, PersistentHost, PersistentPeer, PersistentTask};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Falls back to this TTL when a peer's task cannot be resolved at store
/// time (orphaned peer write racing a task delete).
const ORPHAN_PEER_TTL_SECS: u64 = 3600;

struct Expiring<T> {
    value: T,
    expires_at: Option<u64>,
}

#[derive(Default)]
struct State {
    hosts: HashMap<HostId, PersistentHost>,
    tasks: HashMap<TaskId, Expiring<PersistentTask>>,
    peers: HashMap<PeerId, Expiring<PersistentPeer>>,
    peers_of_task: HashMap<TaskId, HashMap<PeerId, Option<u64>>>,
    persistent_peers_of_task: HashMap<TaskId, HashMap<PeerId, Option<u64>>>,
    peers_of_host: HashMap<HostId, HashMap<PeerId, Option<u64>>>,
}

pub struct InMemoryBackend {
    state: RwLock<State>,
    clock: Arc<dyn TimeProvider>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemTimeProvider))
    }
}

impl InMemoryBackend {
    pub fn new(clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
        }
    }

    fn now(&self) -> u64 {
        self.clock.unix_seconds()
    }

    fn expired(&self, expires_at: Option<u64>) -> bool {
        expires_at.map(|at| at <= self.now()).unwrap_or(false)
    }
}

#[async_trait]
impl PersistentCacheBackend for InMemoryBackend {
    async fn load_host(&self, id: &HostId) -> PcResult<Option<PersistentHost>> {
        Ok(self.state.read().unwrap().hosts.get(id).cloned())
    }

    async fn store_host(&self, host: PersistentHost) -> PcResult<()> {
        self.state
            .write()
            .unwrap()
            .hosts
            .insert(host.host.id.clone(), host);
        Ok(())
    }

    async fn delete_host(&self, id: &HostId) -> PcResult<()> {
        self.state.write().unwrap().hosts.remove(id);
        Ok(())
    }

    async fn load_all_hosts(&self) -> PcResult<Vec<PersistentHost>> {
        Ok(self.state.read().unwrap().hosts.values().cloned().collect())
    }

    async fn load_random_hosts(&self, n: usize, blocklist: &[HostId]) -> PcResult<Vec<PersistentHost>> {
        let guard = self.state.read().unwrap();
        let mut candidates: Vec<PersistentHost> = guard
            .hosts
            .values()
            .filter(|h| !blocklist.contains(&h.host.id))
            .cloned()
            .collect();
        fastrand::shuffle(&mut candidates);
        candidates.truncate(n);
        Ok(candidates)
    }

    async fn run_gc(&self) -> PcResult<u64> {
        let now = self.now();
        let mut guard = self.state.write().unwrap();
        let stale: Vec<HostId> = guard
            .hosts
            .values()
            .filter(|h| now.saturating_sub(h.host.updated_at) > 2 * h.host.announce_interval_secs)
            .map(|h| h.host.id.clone())
            .collect();
        for id in &stale {
            guard.hosts.remove(id);
        }
        let evicted = stale.len() as u64;
        crate::metrics::GC_EVICTIONS.inc_by(evicted);
        Ok(evicted)
    }

    async fn load_task(&self, id: &TaskId) -> PcResult<Option<PersistentTask>> {
        let guard = self.state.read().unwrap();
        match guard.tasks.get(id) {
            Some(entry) if !self.expired(entry.expires_at) => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn store_task(&self, task: PersistentTask) -> PcResult<()> {
        let now = self.now();
        let elapsed = now.saturating_sub(task.created_at);
        let remaining = task.ttl_secs.saturating_sub(elapsed);
        let expires_at = now + remaining;
        self.state.write().unwrap().tasks.insert(
            task.id.clone(),
            Expiring {
                value: task,
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete_task(&self, id: &TaskId) -> PcResult<()> {
        self.state.write().unwrap().tasks.remove(id);
        Ok(())
    }

    async fn load_all_tasks(&self) -> PcResult<Vec<PersistentTask>> {
        let now = self.now();
        Ok(self
            .state
            .read()
            .unwrap()
            .tasks
            .values()
            .filter(|e| !e.expires_at.map(|at| at <= now).unwrap_or(false))
            .map(|e| e.value.clone())
            .collect())
    }

    async fn load_current_replica_count(&self, task_id: &TaskId) -> PcResult<u64> {
        let now = self.now();
        let guard = self.state.read().unwrap();
        Ok(guard
            .peers_of_task
            .get(task_id)
            .map(|set| set.values().filter(|exp| !exp.map(|at| at <= now).unwrap_or(false)).count())
            .unwrap_or(0) as u64)
    }

    async fn load_current_persistent_replica_count(&self, task_id: &TaskId) -> PcResult<u64> {
        let now = self.now();
        let guard = self.state.read().unwrap();
        Ok(guard
            .persistent_peers_of_task
            .get(task_id)
            .map(|set| set.values().filter(|exp| !exp.map(|at| at <= now).unwrap_or(false)).count())
            .unwrap_or(0) as u64)
    }

    async fn load_peer(&self, id: &PeerId) -> PcResult<Option<PersistentPeer>> {
        let guard = self.state.read().unwrap();
        match guard.peers.get(id) {
            Some(entry) if !self.expired(entry.expires_at) => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn store_peer(&self, peer: PersistentPeer) -> PcResult<()> {
        let mut guard = self.state.write().unwrap();
        let deadline = guard
            .tasks
            .get(&peer.task_id)
            .and_then(|t| t.expires_at)
            .unwrap_or_else(|| self.now() + ORPHAN_PEER_TTL_SECS);

        guard.peers.insert(
            peer.id.clone(),
            Expiring {
                value: peer.clone(),
                expires_at: Some(deadline),
            },
        );
        guard
            .peers_of_task
            .entry(peer.task_id.clone())
            .or_default()
            .insert(peer.id.clone(), Some(deadline));
        if peer.persistent {
            guard
                .persistent_peers_of_task
                .entry(peer.task_id.clone())
                .or_default()
                .insert(peer.id.clone(), Some(deadline));
        }
        guard
            .peers_of_host
            .entry(peer.host_id.clone())
            .or_default()
            .insert(peer.id.clone(), Some(deadline));
        Ok(())
    }

    async fn delete_peer(&self, id: &PeerId) -> PcResult<()> {
        let mut guard = self.state.write().unwrap();
        if let Some(entry) = guard.peers.remove(id) {
            let peer = entry.value;
            if let Some(set) = guard.peers_of_task.get_mut(&peer.task_id) {
                set.remove(id);
            }
            if let Some(set) = guard.persistent_peers_of_task.get_mut(&peer.task_id) {
                set.remove(id);
            }
            if let Some(set) = guard.peers_of_host.get_mut(&peer.host_id) {
                set.remove(id);
            }
        }
        Ok(())
    }

    async fn load_all_peers(&self) -> PcResult<Vec<PersistentPeer>> {
        let now = self.now();
        Ok(self
            .state
            .read()
            .unwrap()
            .peers
            .values()
            .filter(|e| !e.expires_at.map(|at| at <= now).unwrap_or(false))
            .map(|e| e.value.clone())
            .collect())
    }

    async fn load_all_by_task(&self, task_id: &TaskId) -> PcResult<Vec<PersistentPeer>> {
        let ids = self.load_all_ids_by_task(task_id).await?;
        self.resolve_ids(&ids)
    }

    async fn load_all_ids_by_task(&self, task_id: &TaskId) -> PcResult<Vec<PeerId>> {
        let now = self.now();
        let guard = self.state.read().unwrap();
        Ok(guard
            .peers_of_task
            .get(task_id)
            .map(|set| {
                set.iter()
                    .filter(|(_, exp)| !exp.map(|at| at <= now).unwrap_or(false))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_persistent_all_by_task(&self, task_id: &TaskId) -> PcResult<Vec<PersistentPeer>> {
        let now = self.now();
        let ids: Vec<PeerId> = {
            let guard = self.state.read().unwrap();
            guard
                .persistent_peers_of_task
                .get(task_id)
                .map(|set| {
                    set.iter()
                        .filter(|(_, exp)| !exp.map(|at| at <= now).unwrap_or(false))
                        .map(|(id, _)| id.clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        self.resolve_ids(&ids)
    }

    async fn delete_all_by_task(&self, task_id: &TaskId) -> PcResult<()> {
        let ids = self.load_all_ids_by_task(task_id).await?;
        for id in ids {
            self.delete_peer(&id).await?;
        }
        let mut guard = self.state.write().unwrap();
        guard.peers_of_task.remove(task_id);
        guard.persistent_peers_of_task.remove(task_id);
        Ok(())
    }

    async fn load_all_by_host(&self, host_id: &HostId) -> PcResult<Vec<PersistentPeer>> {
        let ids = self.load_all_ids_by_host(host_id).await?;
        self.resolve_ids(&ids)
    }

    async fn load_all_ids_by_host(&self, host_id: &HostId) -> PcResult<Vec<PeerId>> {
        let now = self.now();
        let guard = self.state.read().unwrap();
        Ok(guard
            .peers_of_host
            .get(host_id)
            .map(|set| {
                set.iter()
                    .filter(|(_, exp)| !exp.map(|at| at <= now).unwrap_or(false))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_all_by_host(&self, host_id: &HostId) -> PcResult<()> {
        let ids = self.load_all_ids_by_host(host_id).await?;
        for id in ids {
            self.delete_peer(&id).await?;
        }
        self.state.write().unwrap().peers_of_host.remove(host_id);
        Ok(())
    }
}

impl InMemoryBackend {
    fn resolve_ids(&self, ids: &[PeerId]) -> PcResult<Vec<PersistentPeer>> {
        let now = self.now();
        let guard = self.state.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| guard.peers.get(id))
            .filter(|e| !e.expires_at.map(|at| at <= now).unwrap_or(false))
            .map(|e| e.value.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsched_common::FixedTimeProvider;
    use dsched_core_traits::{Host, HostType, PersistentTaskState};

    fn host(id: &str, updated_at: u64, announce_interval_secs: u64) -> PersistentHost {
        PersistentHost {
            host: Host {
                id: id.into(),
                host_type: HostType::Normal,
                ip: String::new(),
                port: 0,
                download_port: 0,
                os: String::new(),
                platform: String::new(),
                platform_family: String::new(),
                platform_version: String::new(),
                kernel_version: String::new(),
                cpu_logical_count: 0,
                memory_total: 0,
                disk_total: 0,
                disk_free: 0,
                network_upload_rate: 0,
                network_download_rate: 0,
                network_tcp_connection_count: 0,
                location: String::new(),
                idc: String::new(),
                disable_shared: false,
                announce_interval_secs,
                concurrent_upload_count: 0,
                concurrent_upload_limit: 0,
                upload_count: 0,
                upload_failed_count: 0,
                created_at: 0,
                updated_at,
            },
        }
    }

    fn task(id: &str, ttl_secs: u64) -> PersistentTask {
        PersistentTask {
            id: id.into(),
            application: None,
            tag: None,
            piece_length: 0,
            total_piece_count: 0,
            content_length: 0,
            ttl_secs,
            desired_replica_count: 1,
            state: PersistentTaskState::Uploading,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let backend = InMemoryBackend::default();
        backend.store_host(host("h1", 0, 30)).await.unwrap();
        let loaded = backend.load_host(&"h1".into()).await.unwrap().unwrap();
        assert_eq!(loaded.host.id, HostId::from("h1"));
    }

    #[tokio::test]
    async fn delete_then_load_is_not_found() {
        let backend = InMemoryBackend::default();
        backend.store_host(host("h1", 0, 30)).await.unwrap();
        backend.delete_host(&"h1".into()).await.unwrap();
        assert!(backend.load_host(&"h1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn gc_evicts_hosts_stale_past_two_announce_intervals() {
        let clock = Arc::new(FixedTimeProvider::new(1000));
        let backend = InMemoryBackend::new(clock.clone());
        backend.store_host(host("stale", 0, 30)).await.unwrap(); // 1000 - 0 = 1000 > 60
        backend.store_host(host("fresh", 990, 30)).await.unwrap(); // 10 <= 60

        let evicted = backend.run_gc().await.unwrap();
        assert_eq!(evicted, 1);

        let all = backend.load_all_hosts().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].host.id, HostId::from("fresh"));
    }

    #[tokio::test]
    async fn gc_is_idempotent() {
        let clock = Arc::new(FixedTimeProvider::new(1000));
        let backend = InMemoryBackend::new(clock);
        backend.store_host(host("stale", 0, 30)).await.unwrap();

        assert_eq!(backend.run_gc().await.unwrap(), 1);
        assert_eq!(backend.run_gc().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn task_ttl_decays_from_created_at_not_from_store_time() {
        let clock = Arc::new(FixedTimeProvider::new(1000));
        let backend = InMemoryBackend::new(clock);
        let mut t = task("t1", 500);
        t.created_at = 0; // 1000 - 0 = 1000 elapsed > 500s ttl: already past its deadline
        backend.store_task(t).await.unwrap();

        assert!(backend.load_task(&"t1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persistent_peer_set_is_distinct_from_generic_peer_set() {
        let backend = InMemoryBackend::default();
        backend.store_task(task("t1", 3600)).await.unwrap();

        let mut p = PersistentPeer {
            id: "p1".into(),
            task_id: "t1".into(),
            host_id: "h1".into(),
            persistent: false,
            finished_pieces: vec![],
            block_parents: vec![],
            cost: 0,
            created_at: 0,
            updated_at: 0,
        };
        backend.store_peer(p.clone()).await.unwrap();
        p.id = "p2".into();
        p.persistent = true;
        backend.store_peer(p).await.unwrap();

        let all = backend.load_all_by_task(&"t1".into()).await.unwrap();
        assert_eq!(all.len(), 2);
        let persistent_only = backend.load_persistent_all_by_task(&"t1".into()).await.unwrap();
        assert_eq!(persistent_only.len(), 1);
        assert_eq!(persistent_only[0].id, PeerId::from("p2"));
    }
}
