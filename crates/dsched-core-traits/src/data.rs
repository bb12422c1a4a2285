//! The shared data model (§3): Host, Task, Peer and their persistent-cache
//! counterparts, plus the state-machine enums the Scheduler drives.

use dsched_common::{HostId, HostType, PeerId, SizeScope, TaskId};
use std::collections::VecDeque;

/// A machine participating in the P2P fleet.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Host {
    pub id: HostId,
    pub host_type: HostType,
    pub ip: String,
    pub port: u32,
    pub download_port: u32,
    pub os: String,
    pub platform: String,
    pub platform_family: String,
    pub platform_version: String,
    pub kernel_version: String,

    pub cpu_logical_count: u32,
    pub memory_total: u64,
    pub disk_total: u64,
    pub disk_free: u64,
    pub network_upload_rate: u64,
    pub network_download_rate: u64,
    pub network_tcp_connection_count: u32,

    pub location: String,
    pub idc: String,

    pub disable_shared: bool,
    pub announce_interval_secs: u64,

    pub concurrent_upload_count: u32,
    pub concurrent_upload_limit: u32,
    pub upload_count: u64,
    pub upload_failed_count: u64,

    pub created_at: u64,
    pub updated_at: u64,
}

impl Host {
    /// `limit − count`, never negative (§3 invariant).
    pub fn free_upload_count(&self) -> u32 {
        self.concurrent_upload_limit
            .saturating_sub(self.concurrent_upload_count)
    }
}

/// `Task` lifecycle state (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// A content object being distributed.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub url: String,
    pub tag: Option<String>,
    pub application: Option<String>,
    pub content_length: i64,
    pub piece_length: u32,
    pub total_piece_count: i64,
    pub digest: Option<String>,
    pub state: TaskState,
    pub back_to_source_limit: i64,
    pub created_at: u64,
    pub updated_at: u64,
    pub back_to_source_peers: Vec<PeerId>,
    pub peers: Vec<PeerId>,
}

impl Task {
    pub fn size_scope(&self) -> SizeScope {
        SizeScope::derive(self.content_length, self.total_piece_count)
    }

    /// Atomically-intended decrement in the single-threaded sense; callers
    /// holding `&mut Task` already imply exclusive access via the Resource
    /// Store's per-task lock.
    pub fn take_back_to_source_attempt(&mut self) -> bool {
        if self.back_to_source_limit > 0 {
            self.back_to_source_limit -= 1;
            true
        } else {
            false
        }
    }
}

/// `Peer` lifecycle state (§4.4). The `Received*` variants are fast-path
/// states entered directly for trivially small content instead of
/// transiting through `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PeerState {
    Pending,
    Running,
    BackToSource,
    Succeeded,
    Failed,
    Leave,
    ReceivedTiny,
    ReceivedSmall,
    ReceivedNormal,
    ReceivedEmpty,
}

impl PeerState {
    /// States the candidate filter (§4.4) and `is_bad_parent` (§4.3) treat
    /// as immediately disqualifying a peer from being a parent.
    pub fn is_immediately_bad_parent(self) -> bool {
        matches!(
            self,
            PeerState::Failed
                | PeerState::Leave
                | PeerState::Pending
                | PeerState::ReceivedTiny
                | PeerState::ReceivedSmall
                | PeerState::ReceivedNormal
                | PeerState::ReceivedEmpty
        )
    }
}

/// Events that drive peer transitions (§4.4), both peer-initiated and
/// scheduler-initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Download,
    DownloadBackToSource,
    DownloadFromSource,
    DownloadSucceeded,
    DownloadFailed,
    Leave,
}

/// Bound on the piece-cost ring kept per peer for `is_bad_parent` (§4.3).
pub const PIECE_COST_HISTORY_CAPACITY: usize = 64;

/// A (host, task) participation instance.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub task_id: TaskId,
    pub host_id: HostId,
    pub state: PeerState,
    pub finished_pieces: Vec<bool>,
    pub block_parents: Vec<PeerId>,
    pub priority: i32,
    pub cost: u64,
    #[serde(skip)]
    pub piece_costs: VecDeque<u64>,
    pub need_back_to_source: bool,
    pub range_start: Option<u64>,
    pub range_length: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Peer {
    pub fn finished_piece_count(&self) -> i64 {
        self.finished_pieces.iter().filter(|done| **done).count() as i64
    }

    pub fn record_piece_cost(&mut self, cost: u64) {
        if self.piece_costs.len() == PIECE_COST_HISTORY_CAPACITY {
            self.piece_costs.pop_front();
        }
        self.piece_costs.push_back(cost);
        self.cost = self.cost.saturating_add(cost);
    }
}

/// Persistent-cache task state (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PersistentTaskState {
    Pending,
    Uploading,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistentHost {
    pub host: Host,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistentTask {
    pub id: TaskId,
    pub application: Option<String>,
    pub tag: Option<String>,
    pub piece_length: u32,
    pub total_piece_count: i64,
    pub content_length: i64,
    pub ttl_secs: u64,
    pub desired_replica_count: u32,
    pub state: PersistentTaskState,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistentPeer {
    pub id: PeerId,
    pub task_id: TaskId,
    pub host_id: HostId,
    pub persistent: bool,
    pub finished_pieces: Vec<bool>,
    pub block_parents: Vec<PeerId>,
    pub cost: u64,
    pub created_at: u64,
    pub updated_at: u64,
}
