//! The Persistent-Cache Store boundary (§4.2): a durable mirror of Hosts,
//! persistent-cache Tasks and persistent-cache Peers held in a shared
//! key/value service. `dsched-persistent-cache` ships an in-memory backend
//! (the test default, §10.5) and a Redis-compatible backend behind a
//! feature flag.

use crate::data::{PersistentHost, PersistentPeer, PersistentTask};
use async_trait::async_trait;
use dsched_common::{CommonError, HostId, PeerId, TaskId};

pub type PcResult<T> = Result<T, CommonError>;

#[async_trait]
pub trait PersistentCacheBackend: Send + Sync {
    // -- Host -----------------------------------------------------------
    async fn load_host(&self, id: &HostId) -> PcResult<Option<PersistentHost>>;
    async fn store_host(&self, host: PersistentHost) -> PcResult<()>;
    async fn delete_host(&self, id: &HostId) -> PcResult<()>;
    async fn load_all_hosts(&self) -> PcResult<Vec<PersistentHost>>;
    async fn load_random_hosts(&self, n: usize, blocklist: &[HostId]) -> PcResult<Vec<PersistentHost>>;
    /// Deletes every host whose `updated_at` is older than
    /// `2 * announce_interval_secs`. Returns the number evicted.
    async fn run_gc(&self) -> PcResult<u64>;

    // -- Task -------------------------------------------------------------
    async fn load_task(&self, id: &TaskId) -> PcResult<Option<PersistentTask>>;
    async fn store_task(&self, task: PersistentTask) -> PcResult<()>;
    async fn delete_task(&self, id: &TaskId) -> PcResult<()>;
    async fn load_all_tasks(&self) -> PcResult<Vec<PersistentTask>>;
    async fn load_current_replica_count(&self, task_id: &TaskId) -> PcResult<u64>;
    async fn load_current_persistent_replica_count(&self, task_id: &TaskId) -> PcResult<u64>;

    // -- Peer ---------------------------------------------------------------
    async fn load_peer(&self, id: &PeerId) -> PcResult<Option<PersistentPeer>>;
    async fn store_peer(&self, peer: PersistentPeer) -> PcResult<()>;
    async fn delete_peer(&self, id: &PeerId) -> PcResult<()>;
    async fn load_all_peers(&self) -> PcResult<Vec<PersistentPeer>>;
    async fn load_all_by_task(&self, task_id: &TaskId) -> PcResult<Vec<PersistentPeer>>;
    async fn load_all_ids_by_task(&self, task_id: &TaskId) -> PcResult<Vec<PeerId>>;
    /// Reads the persistent-peers-of-task set exclusively (§9, resolved
    /// open question — not the generic peers-of-task set).
    async fn load_persistent_all_by_task(&self, task_id: &TaskId) -> PcResult<Vec<PersistentPeer>>;
    async fn delete_all_by_task(&self, task_id: &TaskId) -> PcResult<()>;
    async fn load_all_by_host(&self, host_id: &HostId) -> PcResult<Vec<PersistentPeer>>;
    async fn load_all_ids_by_host(&self, host_id: &HostId) -> PcResult<Vec<PeerId>>;
    async fn delete_all_by_host(&self, host_id: &HostId) -> PcResult<()>;
}
