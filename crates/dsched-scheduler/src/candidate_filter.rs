//! `filter_candidate_parents` and `find_success_parent` (§4.4).

use dsched_common::{PeerId, TaskId};
use dsched_core_traits::{Host, HostType, ParentScorer, Peer, PeerState, ResourceStore};
use std::collections::HashSet;

/// A filtered candidate alongside the host it runs on, ready to be handed
/// to the Evaluator.
pub struct FilteredCandidate {
    pub peer: Peer,
    pub host: Host,
}

/// Samples up to `filter_parent_limit` peers of `task_id` and retains those
/// eligible to parent `child` under the blocklist `B` (§4.4).
pub async fn filter_candidate_parents(
    store: &dyn ResourceStore,
    scorer: &dyn ParentScorer,
    task_id: &TaskId,
    child: &Peer,
    child_host: &Host,
    blocklist: &HashSet<PeerId>,
    filter_parent_limit: usize,
) -> Vec<FilteredCandidate> {
    let sample = store.load_random_peers(task_id, filter_parent_limit).await;
    let mut out = Vec::new();

    for candidate in sample {
        if candidate.id == child.id || blocklist.contains(&candidate.id) {
            continue;
        }
        let Some(candidate_host) = store.load_host(&candidate.host_id).await else {
            continue;
        };
        if candidate_host.disable_shared || candidate_host.id == child_host.id {
            continue;
        }
        let Some(in_degree) = store.peer_in_degree(task_id, &candidate.id).await else {
            continue;
        };
        let is_root_eligible = candidate_host.host_type == HostType::SuperSeed
            || in_degree > 0
            || matches!(candidate.state, PeerState::BackToSource | PeerState::Succeeded);
        if !is_root_eligible {
            continue;
        }
        if scorer.is_bad_parent(&candidate) {
            continue;
        }
        if candidate_host.free_upload_count() == 0 {
            continue;
        }
        if !store.can_add_peer_edge(task_id, &candidate.id, &child.id).await {
            continue;
        }
        out.push(FilteredCandidate {
            peer: candidate,
            host: candidate_host,
        });
    }

    out
}

/// Reuses the filter, keeps only `Succeeded` candidates, and returns the
/// index (into `candidates`) the given ranking places first among them.
pub fn pick_succeeded_candidate(
    candidates: &[FilteredCandidate],
    rank: impl Fn(&[FilteredCandidate]) -> Vec<usize>,
) -> Option<usize> {
    let order = rank(candidates);
    order
        .into_iter()
        .find(|&i| candidates[i].peer.state == PeerState::Succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsched_core_traits::{ResourceStore, Task, TaskState};
    use dsched_evaluator::WeightedEvaluator;
    use dsched_resource_store::InMemoryResourceStore;

    fn scorer() -> WeightedEvaluator {
        WeightedEvaluator::default()
    }

    fn host(id: &str, free_upload: u32, shared_disabled: bool) -> Host {
        Host {
            id: id.into(),
            host_type: HostType::Normal,
            ip: "127.0.0.1".into(),
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
            disable_shared: shared_disabled,
            announce_interval_secs: 30,
            concurrent_upload_count: 0,
            concurrent_upload_limit: free_upload,
            upload_count: 0,
            upload_failed_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn task(id: &str) -> Task {
        Task {
            id: id.into(),
            url: String::new(),
            tag: None,
            application: None,
            content_length: 1024,
            piece_length: 256,
            total_piece_count: 4,
            digest: None,
            state: TaskState::Running,
            back_to_source_limit: 3,
            created_at: 0,
            updated_at: 0,
            back_to_source_peers: vec![],
            peers: vec![],
        }
    }

    fn peer(task_id: &str, id: &str, host_id: &str, state: PeerState) -> Peer {
        Peer {
            id: id.into(),
            task_id: task_id.into(),
            host_id: host_id.into(),
            state,
            finished_pieces: vec![],
            block_parents: vec![],
            priority: 0,
            cost: 0,
            piece_costs: Default::default(),
            need_back_to_source: false,
            range_start: None,
            range_length: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn same_host_candidate_is_excluded() {
        let store = InMemoryResourceStore::new();
        store.store_task(task("t1")).await;
        store.store_host(host("h1", 4, false)).await;
        let child = peer("t1", "child", "h1", PeerState::Pending);
        let candidate = peer("t1", "same-host", "h1", PeerState::Running);
        store.store_peer(child.clone()).await;
        store.store_peer(candidate).await;

        let child_host = store.load_host(&"h1".into()).await.unwrap();
        let filtered = filter_candidate_parents(
            &store,
            &scorer(),
            &"t1".into(),
            &child,
            &child_host,
            &HashSet::new(),
            10,
        )
        .await;
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn shared_disabled_host_candidate_is_excluded() {
        let store = InMemoryResourceStore::new();
        store.store_task(task("t1")).await;
        store.store_host(host("h1", 4, false)).await;
        store.store_host(host("h2", 4, true)).await;
        let child = peer("t1", "child", "h1", PeerState::Pending);
        let candidate = peer("t1", "other-host", "h2", PeerState::Running);
        store.store_peer(child.clone()).await;
        store
            .add_peer_edge(&"t1".into(), &"child".into(), &"other-host".into())
            .await
            .ok();
        store.store_peer(candidate).await;

        let child_host = store.load_host(&"h1".into()).await.unwrap();
        let filtered = filter_candidate_parents(
            &store,
            &scorer(),
            &"t1".into(),
            &child,
            &child_host,
            &HashSet::new(),
            10,
        )
        .await;
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn eligible_root_peer_with_free_capacity_is_retained() {
        let store = InMemoryResourceStore::new();
        store.store_task(task("t1")).await;
        store.store_host(host("h1", 4, false)).await;
        store.store_host(host("h2", 4, false)).await;
        let child = peer("t1", "child", "h1", PeerState::Pending);
        let candidate = peer("t1", "root-seed", "h2", PeerState::Succeeded);
        store.store_peer(child.clone()).await;
        store.store_peer(candidate).await;

        let child_host = store.load_host(&"h1".into()).await.unwrap();
        let filtered = filter_candidate_parents(
            &store,
            &scorer(),
            &"t1".into(),
            &child,
            &child_host,
            &HashSet::new(),
            10,
        )
        .await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].peer.id, "root-seed".into());
    }

    #[tokio::test]
    async fn blocklisted_candidate_is_excluded() {
        let store = InMemoryResourceStore::new();
        store.store_task(task("t1")).await;
        store.store_host(host("h1", 4, false)).await;
        store.store_host(host("h2", 4, false)).await;
        let child = peer("t1", "child", "h1", PeerState::Pending);
        let candidate = peer("t1", "root-seed", "h2", PeerState::Succeeded);
        store.store_peer(child.clone()).await;
        store.store_peer(candidate).await;

        let mut blocklist = HashSet::new();
        blocklist.insert(PeerId::from("root-seed"));

        let child_host = store.load_host(&"h1".into()).await.unwrap();
        let filtered = filter_candidate_parents(
            &store,
            &scorer(),
            &"t1".into(),
            &child,
            &child_host,
            &blocklist,
            10,
        )
        .await;
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn statistically_bad_parent_is_excluded() {
        let store = InMemoryResourceStore::new();
        store.store_task(task("t1")).await;
        store.store_host(host("h1", 4, false)).await;
        store.store_host(host("h2", 4, false)).await;
        let child = peer("t1", "child", "h1", PeerState::Pending);
        let mut candidate = peer("t1", "root-seed", "h2", PeerState::Succeeded);
        candidate.piece_costs = [10, 201].into_iter().collect();
        store.store_peer(child.clone()).await;
        store.store_peer(candidate).await;

        let child_host = store.load_host(&"h1".into()).await.unwrap();
        let filtered = filter_candidate_parents(
            &store,
            &scorer(),
            &"t1".into(),
            &child,
            &child_host,
            &HashSet::new(),
            10,
        )
        .await;
        assert!(filtered.is_empty());
    }
}
