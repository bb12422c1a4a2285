//! The persistent-cache Replica Planner (§4.5): decides which hosts should
//! receive a durable replica of a task, and which persistent-cache peers
//! may parent a given peer.

use crate::error::ReplicaPlannerError;
use dsched_common::{HostId, PeerId, TaskId};
use dsched_core_traits::{
    Host, ParentScorer, Peer, PersistentCacheBackend, PersistentPeer, PersistentTask, ResourceStore,
};
use std::collections::HashSet;
use std::sync::Arc;

pub struct ReplicaPlanner {
    resource_store: Arc<dyn ResourceStore>,
    persistent_cache: Arc<dyn PersistentCacheBackend>,
    scorer: Arc<dyn ParentScorer>,
}

impl ReplicaPlanner {
    pub fn new(
        resource_store: Arc<dyn ResourceStore>,
        persistent_cache: Arc<dyn PersistentCacheBackend>,
        scorer: Arc<dyn ParentScorer>,
    ) -> Self {
        Self {
            resource_store,
            persistent_cache,
            scorer,
        }
    }

    /// §4.5 step 1-3: hosts that should receive a persistent replica of
    /// `task`, preferring hosts that already happen to hold a succeeded
    /// non-persistent copy before sampling fresh ones.
    pub async fn find_replicate_persistent_cache_hosts(
        &self,
        task: &PersistentTask,
        blocklist: &[HostId],
    ) -> Result<Vec<HostId>, ReplicaPlannerError> {
        let current = self
            .persistent_cache
            .load_current_persistent_replica_count(&task.id)
            .await?;
        let needed = task.desired_replica_count.saturating_sub(current as u32);
        if needed == 0 {
            return Ok(Vec::new());
        }

        let mut blocked: HashSet<HostId> = blocklist.iter().cloned().collect();

        let cached_hosts = self.cached_succeeded_hosts(&task.id, &blocked).await;
        if cached_hosts.len() as u32 >= needed {
            return Ok(cached_hosts.into_iter().take(needed as usize).collect());
        }

        let mut result = cached_hosts.clone();
        blocked.extend(cached_hosts);

        for peer in self.persistent_cache.load_all_by_task(&task.id).await? {
            blocked.insert(peer.host_id);
        }

        let still_needed = needed as usize - result.len();
        let blocklist_vec: Vec<HostId> = blocked.iter().cloned().collect();
        let sampled = self
            .persistent_cache
            .load_random_hosts(still_needed, &blocklist_vec)
            .await?;

        for candidate in sampled {
            if result.len() >= needed as usize {
                break;
            }
            let host = candidate.host;
            if host.disable_shared || (host.disk_free as i64) < task.content_length {
                continue;
            }
            result.push(host.id);
        }

        if (result.len() as u32) < needed {
            crate::metrics::REPLICA_PLANNER_SHORTFALLS.inc();
        }

        Ok(result)
    }

    async fn cached_succeeded_hosts(&self, task_id: &TaskId, blocked: &HashSet<HostId>) -> Vec<HostId> {
        let peers: Vec<Peer> = self.resource_store.load_random_peers(task_id, usize::MAX).await;
        let mut hosts = Vec::new();
        for peer in peers {
            if !matches!(peer.state, dsched_core_traits::PeerState::Succeeded) {
                continue;
            }
            let Some(host) = self.resource_store.load_host(&peer.host_id).await else {
                continue;
            };
            if host.disable_shared || blocked.contains(&host.id) || hosts.contains(&host.id) {
                continue;
            }
            hosts.push(host.id);
        }
        hosts
    }

    /// §4.5 last paragraph: ranks persistent-cache peers of `peer`'s task as
    /// parent candidates.
    pub async fn find_candidate_persistent_cache_parents(
        &self,
        peer: &Peer,
        peer_host: &Host,
        blocklist: &[PeerId],
        candidate_parent_limit: usize,
    ) -> Result<Vec<PersistentPeer>, ReplicaPlannerError> {
        let blocked: HashSet<PeerId> = blocklist.iter().cloned().collect();
        let all = self.persistent_cache.load_all_by_task(&peer.task_id).await?;

        let mut pairs: Vec<(PersistentPeer, Host)> = Vec::new();
        for candidate in all {
            if blocked.contains(&candidate.id) || candidate.host_id == peer_host.id {
                continue;
            }
            if self.scorer.is_bad_persistent_cache_parent(&candidate) {
                continue;
            }
            let Some(host) = self.load_persistent_host(&candidate.host_id).await else {
                continue;
            };
            pairs.push((candidate, host));
        }

        let task = self
            .resource_store
            .load_task(&peer.task_id)
            .await
            .map(|t| t.total_piece_count)
            .unwrap_or(0);
        let scored: Vec<(&PersistentPeer, &Host)> = pairs.iter().map(|(p, h)| (p, h)).collect();
        let task_ref = dsched_core_traits::Task {
            id: peer.task_id.clone(),
            url: String::new(),
            tag: None,
            application: None,
            content_length: 0,
            piece_length: 0,
            total_piece_count: task,
            digest: None,
            state: dsched_core_traits::TaskState::Running,
            back_to_source_limit: 0,
            created_at: 0,
            updated_at: 0,
            back_to_source_peers: vec![],
            peers: vec![],
        };
        let order = self
            .scorer
            .evaluate_persistent_cache_parents(&task_ref, peer_host, &scored);

        Ok(order
            .into_iter()
            .take(candidate_parent_limit)
            .map(|i| pairs[i].0.clone())
            .collect())
    }

    async fn load_persistent_host(&self, host_id: &HostId) -> Option<Host> {
        self.persistent_cache
            .load_host(host_id)
            .await
            .ok()
            .flatten()
            .map(|ph| ph.host)
    }
}
