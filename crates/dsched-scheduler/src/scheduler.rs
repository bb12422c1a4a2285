//! The announce-driven scheduling loop (§4.4): one call per announce
//! iteration, looping internally on an empty candidate set.

use crate::candidate_filter::{filter_candidate_parents, FilteredCandidate};
use crate::error::SchedulerError;
use crate::metrics;
use crate::state_machine::{transition_peer, transition_task, PersistentTaskEvent, TaskEvent};
use dsched_common::{CommonError, PeerId, TaskId};
use dsched_core_traits::{
    DynamicConfigProvider, Host, ParentScorer, Peer, PeerEvent, PeerState, ResourceStore,
    ScoredCandidate, Task, TaskState,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Checked once at the top of every retry iteration and propagated to
/// downstream calls (§5 "Cancellation").
#[derive(Clone, Default)]
pub struct ScheduleContext {
    cancelled: Arc<AtomicBool>,
}

impl ScheduleContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// A candidate parent as sent over the announce stream: the wire type
/// embeds the peer alongside its host and task snapshots (§6).
#[derive(Debug, Clone)]
pub struct CandidateSnapshot {
    pub peer: Peer,
    pub host: Host,
    pub task: Task,
}

/// Abstracts the peer's open bidirectional announce stream. A real
/// transport crate implements this against the wire protocol in §6; tests
/// use an in-memory recorder.
#[async_trait::async_trait]
pub trait AnnounceResponder: Send + Sync {
    async fn send_candidates(&self, candidates: Vec<CandidateSnapshot>) -> Result<(), ()>;
    async fn send_need_back_to_source(&self, description: String) -> Result<(), ()>;
    async fn send_task_status_error(&self, description: String) -> Result<(), ()>;
}

/// Static, non-dynamically-reloadable knobs (§6, §10.3).
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub retry_limit: u32,
    pub retry_back_to_source_limit: u32,
    pub retry_interval: Duration,
    pub default_candidate_parent_limit: u32,
    pub default_filter_parent_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_limit: 10,
            retry_back_to_source_limit: 3,
            retry_interval: Duration::from_millis(50),
            default_candidate_parent_limit: 4,
            default_filter_parent_limit: 20,
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn ResourceStore>,
    scorer: Arc<dyn ParentScorer>,
    config_provider: Arc<dyn DynamicConfigProvider>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        scorer: Arc<dyn ParentScorer>,
        config_provider: Arc<dyn DynamicConfigProvider>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            config_provider,
            config,
        }
    }

    /// Runs one announce iteration for `peer_id` of `task_id`, retrying
    /// internally while candidate discovery comes back empty (§4.4).
    pub async fn schedule(
        &self,
        ctx: &ScheduleContext,
        task_id: &TaskId,
        peer_id: &PeerId,
        blocklist: &HashSet<PeerId>,
        responder: &dyn AnnounceResponder,
    ) -> Result<(), SchedulerError> {
        metrics::SCHEDULE_CALLS.inc();
        let mut attempts = 0u32;

        loop {
            if ctx.is_cancelled() {
                return Err(CommonError::Cancelled.into());
            }

            let mut peer = self
                .store
                .load_peer(task_id, peer_id)
                .await
                .ok_or_else(|| CommonError::not_found(format!("peer {peer_id}")))?;
            let mut task = self
                .store
                .load_task(task_id)
                .await
                .ok_or_else(|| CommonError::not_found(format!("task {task_id}")))?;
            let host = self
                .store
                .load_host(&peer.host_id)
                .await
                .ok_or_else(|| CommonError::not_found(format!("host {}", peer.host_id)))?;

            let back_to_source_allowed = task.back_to_source_limit > 0;
            let should_back_to_source = back_to_source_allowed
                && (peer.need_back_to_source || attempts >= self.config.retry_back_to_source_limit);

            if should_back_to_source {
                responder
                    .send_need_back_to_source("scheduler requests back-to-source".into())
                    .await
                    .map_err(|_| CommonError::failed_precondition("response stream unavailable"))?;
                peer.state =
                    transition_peer(peer.state, PeerEvent::DownloadBackToSource, task.size_scope())?;
                if task.state == TaskState::Failed {
                    task.state = transition_task(task.state, TaskEvent::Redownload)?;
                }
                self.store.store_peer(peer).await;
                self.store.store_task(task).await;
                metrics::BACK_TO_SOURCE_RESPONSES.inc();
                return Ok(());
            }

            if attempts >= self.config.retry_limit {
                let _ = responder
                    .send_task_status_error("retry limit reached".into())
                    .await;
                metrics::FAILED_PRECONDITION_TERMINATIONS.inc();
                return Err(CommonError::failed_precondition("retry limit reached").into());
            }

            self.store.delete_peer_in_edges(task_id, peer_id).await;

            let cluster_config = self.config_provider.get_scheduler_cluster_config();
            let candidates = filter_candidate_parents(
                self.store.as_ref(),
                self.scorer.as_ref(),
                task_id,
                &peer,
                &host,
                blocklist,
                cluster_config.filter_parent_limit as usize,
            )
            .await;

            if candidates.is_empty() {
                attempts += 1;
                metrics::SCHEDULE_RETRIES.inc();
                tokio::time::sleep(self.config.retry_interval).await;
                continue;
            }

            metrics::CANDIDATE_FILTER_YIELD.inc_by(candidates.len() as u64);

            let scored: Vec<ScoredCandidate<'_>> = candidates
                .iter()
                .map(|c| ScoredCandidate {
                    peer: &c.peer,
                    host: &c.host,
                })
                .collect();
            let order = self.scorer.evaluate_parents(&task, &peer, &host, &scored);
            let limit = cluster_config.candidate_parent_limit as usize;
            let chosen: Vec<&FilteredCandidate> =
                order.into_iter().take(limit).map(|i| &candidates[i]).collect();

            let snapshots = chosen
                .iter()
                .map(|c| CandidateSnapshot {
                    peer: c.peer.clone(),
                    host: c.host.clone(),
                    task: task.clone(),
                })
                .collect();

            responder
                .send_candidates(snapshots)
                .await
                .map_err(|_| CommonError::failed_precondition("response stream unavailable"))?;

            for candidate in &chosen {
                if let Err(e) = self
                    .store
                    .add_peer_edge(task_id, &candidate.peer.id, peer_id)
                    .await
                {
                    log::warn!(
                        "edge commit {} -> {} skipped: {e}",
                        candidate.peer.id,
                        peer_id
                    );
                }
            }

            return Ok(());
        }
    }
}

/// Drives a `PersistentTask` through `Pending -> Uploading -> {Succeeded,
/// Failed}` on behalf of the replica-upload workflow (§4.4), independent of
/// the per-announce peer loop above.
pub fn start_persistent_upload(
    state: dsched_core_traits::PersistentTaskState,
) -> Result<dsched_core_traits::PersistentTaskState, SchedulerError> {
    crate::state_machine::transition_persistent_task(state, PersistentTaskEvent::Start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsched_core_traits::{Task as CoreTask, TaskState as CoreTaskState};
    use dsched_evaluator::WeightedEvaluator;
    use dsched_resource_store::InMemoryResourceStore;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingResponder {
        sent_candidates: StdMutex<Vec<usize>>,
        sent_back_to_source: StdMutex<u32>,
    }

    #[async_trait::async_trait]
    impl AnnounceResponder for RecordingResponder {
        async fn send_candidates(&self, candidates: Vec<CandidateSnapshot>) -> Result<(), ()> {
            self.sent_candidates.lock().unwrap().push(candidates.len());
            Ok(())
        }
        async fn send_need_back_to_source(&self, _description: String) -> Result<(), ()> {
            *self.sent_back_to_source.lock().unwrap() += 1;
            Ok(())
        }
        async fn send_task_status_error(&self, _description: String) -> Result<(), ()> {
            Ok(())
        }
    }

    fn host(id: &str) -> Host {
        Host {
            id: id.into(),
            host_type: dsched_core_traits::HostType::Normal,
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
            disable_shared: false,
            announce_interval_secs: 30,
            concurrent_upload_count: 0,
            concurrent_upload_limit: 4,
            upload_count: 0,
            upload_failed_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn task(id: &str) -> CoreTask {
        CoreTask {
            id: id.into(),
            url: String::new(),
            tag: None,
            application: None,
            content_length: 1024,
            piece_length: 256,
            total_piece_count: 4,
            digest: None,
            state: CoreTaskState::Running,
            back_to_source_limit: 0,
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

    struct AllDefaultConfig;
    impl DynamicConfigProvider for AllDefaultConfig {
        fn get_scheduler_cluster_config(&self) -> dsched_core_traits::SchedulerClusterConfig {
            dsched_core_traits::SchedulerClusterConfig {
                candidate_parent_limit: 4,
                filter_parent_limit: 20,
            }
        }
    }

    #[tokio::test]
    async fn schedule_sends_candidate_and_commits_edge() {
        let store = Arc::new(InMemoryResourceStore::new());
        store.store_task(task("t1")).await;
        store.store_host(host("h1")).await;
        store.store_host(host("h2")).await;
        let child = peer("t1", "child", "h1", PeerState::Pending);
        let candidate = peer("t1", "parent", "h2", PeerState::Succeeded);
        store.store_peer(child).await;
        store.store_peer(candidate).await;

        let scheduler = Scheduler::new(
            store.clone(),
            Arc::new(WeightedEvaluator::default()),
            Arc::new(AllDefaultConfig),
            SchedulerConfig::default(),
        );
        let responder = RecordingResponder::default();
        let ctx = ScheduleContext::new();

        scheduler
            .schedule(&ctx, &"t1".into(), &"child".into(), &HashSet::new(), &responder)
            .await
            .unwrap();

        assert_eq!(*responder.sent_candidates.lock().unwrap(), vec![1]);
        assert_eq!(
            store.peer_in_degree(&"t1".into(), &"child".into()).await,
            Some(1)
        );
    }

    #[tokio::test]
    async fn schedule_respects_cancellation() {
        let store = Arc::new(InMemoryResourceStore::new());
        store.store_task(task("t1")).await;
        store.store_host(host("h1")).await;
        store.store_peer(peer("t1", "child", "h1", PeerState::Pending)).await;

        let scheduler = Scheduler::new(
            store,
            Arc::new(WeightedEvaluator::default()),
            Arc::new(AllDefaultConfig),
            SchedulerConfig::default(),
        );
        let responder = RecordingResponder::default();
        let ctx = ScheduleContext::new();
        ctx.cancel();

        let result = scheduler
            .schedule(&ctx, &"t1".into(), &"child".into(), &HashSet::new(), &responder)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn need_back_to_source_flag_short_circuits_candidate_search() {
        let store = Arc::new(InMemoryResourceStore::new());
        let mut t = task("t1");
        t.back_to_source_limit = 2;
        store.store_task(t).await;
        store.store_host(host("h1")).await;
        let mut child = peer("t1", "child", "h1", PeerState::Pending);
        child.need_back_to_source = true;
        store.store_peer(child).await;

        let scheduler = Scheduler::new(
            store,
            Arc::new(WeightedEvaluator::default()),
            Arc::new(AllDefaultConfig),
            SchedulerConfig::default(),
        );
        let responder = RecordingResponder::default();
        let ctx = ScheduleContext::new();

        scheduler
            .schedule(&ctx, &"t1".into(), &"child".into(), &HashSet::new(), &responder)
            .await
            .unwrap();

        assert_eq!(*responder.sent_back_to_source.lock().unwrap(), 1);
        assert!(responder.sent_candidates.lock().unwrap().is_empty());
    }
}
