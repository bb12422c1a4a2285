//! The production `PersistentCacheBackend`: a Redis-compatible store reached
//! over a pooled async connection (§4.2, §6). Keys are namespaced by the
//! scheduler cluster id; writes that touch a hash plus one or more set
//! memberships are issued as a single `MULTI`/`EXEC` transaction so
//! concurrent observers only ever see the pre- or post-state.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use dsched_common::{rfc3339_seconds, CommonError, HostId, PeerId, SchedulerClusterId, TaskId};
use dsched_core_traits::{
    Host, HostType, PcResult, PersistentCacheBackend, PersistentHost, PersistentPeer,
    PersistentTask, PersistentTaskState,
};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// TTL remaining from `created_at`, not a fresh full-length TTL from now
/// (§4.2: "TTL = remaining task TTL from `created_at`").
fn remaining_ttl_secs(ttl_secs: u64, created_at: u64) -> u64 {
    let elapsed = unix_now().saturating_sub(created_at);
    ttl_secs.saturating_sub(elapsed)
}

pub struct RedisBackend {
    pool: Pool,
    cluster_id: SchedulerClusterId,
    gc_batch_size: usize,
}

impl RedisBackend {
    /// `connection_string` is a `redis://` URL; `gc_batch_size` controls the
    /// cursor-based scan page size used during GC (§4.2 recommends 10).
    pub fn new(
        connection_string: &str,
        cluster_id: SchedulerClusterId,
        gc_batch_size: usize,
    ) -> Result<Self, CommonError> {
        let cfg = PoolConfig::from_url(connection_string);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CommonError::internal(format!("redis pool: {e}")))?;
        Ok(Self {
            pool,
            cluster_id,
            gc_batch_size: gc_batch_size.max(1),
        })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, CommonError> {
        self.pool
            .get()
            .await
            .map_err(|e| CommonError::internal(format!("redis connection: {e}")))
    }

    fn host_key(&self, id: &HostId) -> String {
        format!("scheduler:{}:persistent-cache-host:{}", self.cluster_id, id)
    }

    fn hosts_set_key(&self) -> String {
        format!("scheduler:{}:persistent-cache-hosts", self.cluster_id)
    }

    fn task_key(&self, id: &TaskId) -> String {
        format!("scheduler:{}:persistent-cache-task:{}", self.cluster_id, id)
    }

    fn tasks_set_key(&self) -> String {
        format!("scheduler:{}:persistent-cache-tasks", self.cluster_id)
    }

    fn peer_key(&self, id: &PeerId) -> String {
        format!("scheduler:{}:persistent-cache-peer:{}", self.cluster_id, id)
    }

    fn peers_of_task_key(&self, id: &TaskId) -> String {
        format!(
            "scheduler:{}:persistent-cache-peers-of-task:{}",
            self.cluster_id, id
        )
    }

    fn persistent_peers_of_task_key(&self, id: &TaskId) -> String {
        format!("scheduler:{}:persistent-peers-of-task:{}", self.cluster_id, id)
    }

    fn peers_of_host_key(&self, id: &HostId) -> String {
        format!(
            "scheduler:{}:persistent-cache-peers-of-host:{}",
            self.cluster_id, id
        )
    }

    async fn timed<T>(
        &self,
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> PcResult<T> {
        let start = std::time::Instant::now();
        let result = fut.await;
        crate::metrics::BACKEND_OP_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        result.map_err(|e| CommonError::internal(format!("redis op: {e}")))
    }
}

fn host_to_fields(h: &Host) -> Vec<(&'static str, String)> {
    vec![
        ("id", h.id.to_string()),
        ("host_type", if h.host_type == HostType::SuperSeed { "super-seed".into() } else { "normal".into() }),
        ("ip", h.ip.clone()),
        ("port", h.port.to_string()),
        ("download_port", h.download_port.to_string()),
        ("cpu_logical_count", h.cpu_logical_count.to_string()),
        ("memory_total", h.memory_total.to_string()),
        ("disk_total", h.disk_total.to_string()),
        ("disk_free", h.disk_free.to_string()),
        ("network_upload_rate", h.network_upload_rate.to_string()),
        ("network_download_rate", h.network_download_rate.to_string()),
        ("network_tcp_connection_count", h.network_tcp_connection_count.to_string()),
        ("location", h.location.clone()),
        ("idc", h.idc.clone()),
        ("disable_shared", h.disable_shared.to_string()),
        ("announce_interval", h.announce_interval_secs.to_string()),
        ("concurrent_upload_count", h.concurrent_upload_count.to_string()),
        ("concurrent_upload_limit", h.concurrent_upload_limit.to_string()),
        ("upload_count", h.upload_count.to_string()),
        ("upload_failed_count", h.upload_failed_count.to_string()),
        ("created_at", rfc3339_seconds(h.created_at)),
        ("updated_at", rfc3339_seconds(h.updated_at)),
        ("created_at_secs", h.created_at.to_string()),
        ("updated_at_secs", h.updated_at.to_string()),
    ]
}

fn host_from_fields(id: &HostId, fields: &HashMap<String, String>) -> Option<Host> {
    let get = |k: &str| fields.get(k).cloned();
    let parse_u64 = |k: &str| get(k)?.parse::<u64>().ok();
    let parse_u32 = |k: &str| get(k)?.parse::<u32>().ok();

    Some(Host {
        id: id.clone(),
        host_type: if get("host_type")? == "super-seed" {
            HostType::SuperSeed
        } else {
            HostType::Normal
        },
        ip: get("ip")?,
        port: parse_u32("port")?,
        download_port: parse_u32("download_port")?,
        os: String::new(),
        platform: String::new(),
        platform_family: String::new(),
        platform_version: String::new(),
        kernel_version: String::new(),
        cpu_logical_count: parse_u32("cpu_logical_count")?,
        memory_total: parse_u64("memory_total")?,
        disk_total: parse_u64("disk_total")?,
        disk_free: parse_u64("disk_free")?,
        network_upload_rate: parse_u64("network_upload_rate")?,
        network_download_rate: parse_u64("network_download_rate")?,
        network_tcp_connection_count: parse_u32("network_tcp_connection_count")?,
        location: get("location")?,
        idc: get("idc")?,
        disable_shared: get("disable_shared")? == "true",
        announce_interval_secs: parse_u64("announce_interval")?,
        concurrent_upload_count: parse_u32("concurrent_upload_count")?,
        concurrent_upload_limit: parse_u32("concurrent_upload_limit")?,
        upload_count: parse_u64("upload_count")?,
        upload_failed_count: parse_u64("upload_failed_count")?,
        // `created_at`/`updated_at` hash fields are RFC3339 for on-wire
        // compatibility (§6); GC compares raw unix-seconds, so those ride
        // alongside as `*_secs` fields rather than being re-parsed out of
        // the display string.
        created_at: parse_u64("created_at_secs").unwrap_or(0),
        updated_at: parse_u64("updated_at_secs").unwrap_or(0),
    })
}

#[async_trait]
impl PersistentCacheBackend for RedisBackend {
    async fn load_host(&self, id: &HostId) -> PcResult<Option<PersistentHost>> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = self
            .timed(conn.hgetall(self.host_key(id)))
            .await?;
        if fields.is_empty() {
            return Ok(None);
        }
        match host_from_fields(id, &fields) {
            Some(host) => Ok(Some(PersistentHost { host })),
            None => {
                crate::metrics::PARSE_FAILURES.inc();
                log::warn!("failed to parse persistent-cache host {id}, demoting to not-found");
                Ok(None)
            }
        }
    }

    async fn store_host(&self, host: PersistentHost) -> PcResult<()> {
        let mut conn = self.conn().await?;
        let key = self.host_key(&host.host.id);
        let set_key = self.hosts_set_key();
        let fields = host_to_fields(&host.host);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &fields)
            .sadd(&set_key, host.host.id.to_string());
        self.timed(pipe.query_async(&mut conn)).await
    }

    async fn delete_host(&self, id: &HostId) -> PcResult<()> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(self.host_key(id))
            .srem(self.hosts_set_key(), id.to_string());
        self.timed(pipe.query_async(&mut conn)).await
    }

    async fn load_all_hosts(&self) -> PcResult<Vec<PersistentHost>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = self.timed(conn.smembers(self.hosts_set_key())).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(h) = self.load_host(&id.into()).await? {
                out.push(h);
            }
        }
        Ok(out)
    }

    async fn load_random_hosts(&self, n: usize, blocklist: &[HostId]) -> PcResult<Vec<PersistentHost>> {
        let mut conn = self.conn().await?;
        let mut cursor = 0u64;
        let mut found = Vec::new();
        loop {
            let (next_cursor, ids): (u64, Vec<String>) = self
                .timed(redis::cmd("SSCAN").arg(self.hosts_set_key()).arg(cursor).arg("COUNT").arg(self.gc_batch_size).query_async(&mut conn))
                .await?;
            for id in ids {
                let host_id: HostId = id.into();
                if blocklist.contains(&host_id) {
                    continue;
                }
                if let Some(h) = self.load_host(&host_id).await? {
                    found.push(h);
                    if found.len() >= n {
                        return Ok(found);
                    }
                }
            }
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(found)
    }

    async fn run_gc(&self) -> PcResult<u64> {
        let start = std::time::Instant::now();
        let now = unix_now();
        let hosts = self.load_all_hosts().await?;
        let mut evicted = 0u64;
        for host in hosts {
            if now.saturating_sub(host.host.updated_at) > 2 * host.host.announce_interval_secs {
                self.delete_host(&host.host.id).await?;
                evicted += 1;
            }
        }
        crate::metrics::GC_EVICTIONS.inc_by(evicted);
        crate::metrics::GC_SWEEP_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());
        Ok(evicted)
    }

    async fn load_task(&self, id: &TaskId) -> PcResult<Option<PersistentTask>> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = self.timed(conn.hgetall(self.task_key(id))).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let parse = |k: &str| fields.get(k).cloned();
        let state = match parse("state").as_deref() {
            Some("uploading") => PersistentTaskState::Uploading,
            Some("succeeded") => PersistentTaskState::Succeeded,
            Some("failed") => PersistentTaskState::Failed,
            _ => PersistentTaskState::Pending,
        };
        Ok(Some(PersistentTask {
            id: id.clone(),
            application: parse("application"),
            tag: parse("tag"),
            piece_length: parse("piece_length").and_then(|v| v.parse().ok()).unwrap_or(0),
            total_piece_count: parse("total_piece_count").and_then(|v| v.parse().ok()).unwrap_or(0),
            content_length: parse("content_length").and_then(|v| v.parse().ok()).unwrap_or(0),
            ttl_secs: parse("ttl_secs").and_then(|v| v.parse().ok()).unwrap_or(0),
            desired_replica_count: parse("desired_replica_count").and_then(|v| v.parse().ok()).unwrap_or(0),
            state,
            created_at: parse("created_at_secs").and_then(|v| v.parse().ok()).unwrap_or(0),
            updated_at: parse("updated_at_secs").and_then(|v| v.parse().ok()).unwrap_or(0),
        }))
    }

    async fn store_task(&self, task: PersistentTask) -> PcResult<()> {
        let remaining_ttl = remaining_ttl_secs(task.ttl_secs, task.created_at);
        let mut conn = self.conn().await?;
        let key = self.task_key(&task.id);
        let state = match task.state {
            PersistentTaskState::Pending => "pending",
            PersistentTaskState::Uploading => "uploading",
            PersistentTaskState::Succeeded => "succeeded",
            PersistentTaskState::Failed => "failed",
        };
        let fields: Vec<(&str, String)> = vec![
            ("application", task.application.clone().unwrap_or_default()),
            ("tag", task.tag.clone().unwrap_or_default()),
            ("piece_length", task.piece_length.to_string()),
            ("total_piece_count", task.total_piece_count.to_string()),
            ("content_length", task.content_length.to_string()),
            ("ttl_secs", task.ttl_secs.to_string()),
            ("desired_replica_count", task.desired_replica_count.to_string()),
            ("state", state.to_string()),
            ("created_at_secs", task.created_at.to_string()),
            ("updated_at_secs", task.updated_at.to_string()),
        ];
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &fields)
            .expire(&key, remaining_ttl as i64)
            .sadd(self.tasks_set_key(), task.id.to_string());
        self.timed(pipe.query_async(&mut conn)).await
    }

    async fn delete_task(&self, id: &TaskId) -> PcResult<()> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(self.task_key(id))
            .srem(self.tasks_set_key(), id.to_string());
        self.timed(pipe.query_async(&mut conn)).await
    }

    async fn load_all_tasks(&self) -> PcResult<Vec<PersistentTask>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = self.timed(conn.smembers(self.tasks_set_key())).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(t) = self.load_task(&id.into()).await? {
                out.push(t);
            }
        }
        Ok(out)
    }

    async fn load_current_replica_count(&self, task_id: &TaskId) -> PcResult<u64> {
        let mut conn = self.conn().await?;
        self.timed(conn.scard(self.peers_of_task_key(task_id))).await
    }

    async fn load_current_persistent_replica_count(&self, task_id: &TaskId) -> PcResult<u64> {
        let mut conn = self.conn().await?;
        self.timed(conn.scard(self.persistent_peers_of_task_key(task_id)))
            .await
    }

    async fn load_peer(&self, id: &PeerId) -> PcResult<Option<PersistentPeer>> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = self.timed(conn.hgetall(self.peer_key(id))).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let get = |k: &str| fields.get(k).cloned();
        let task_id = get("task_id");
        let host_id = get("host_id");
        match (task_id, host_id) {
            (Some(task_id), Some(host_id)) => Ok(Some(PersistentPeer {
                id: id.clone(),
                task_id: task_id.into(),
                host_id: host_id.into(),
                persistent: get("persistent").as_deref() == Some("true"),
                finished_pieces: Vec::new(),
                block_parents: Vec::new(),
                cost: get("cost").and_then(|v| v.parse().ok()).unwrap_or(0),
                created_at: get("created_at_secs").and_then(|v| v.parse().ok()).unwrap_or(0),
                updated_at: get("updated_at_secs").and_then(|v| v.parse().ok()).unwrap_or(0),
            })),
            _ => {
                crate::metrics::PARSE_FAILURES.inc();
                Ok(None)
            }
        }
    }

    async fn store_peer(&self, peer: PersistentPeer) -> PcResult<()> {
        let task = self.load_task(&peer.task_id).await?;
        let ttl = task
            .map(|t| remaining_ttl_secs(t.ttl_secs, t.created_at) as i64)
            .unwrap_or(3600);
        let mut conn = self.conn().await?;
        let key = self.peer_key(&peer.id);
        let fields: Vec<(&str, String)> = vec![
            ("task_id", peer.task_id.to_string()),
            ("host_id", peer.host_id.to_string()),
            ("persistent", peer.persistent.to_string()),
            ("cost", peer.cost.to_string()),
            ("created_at_secs", peer.created_at.to_string()),
            ("updated_at_secs", peer.updated_at.to_string()),
        ];
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &fields)
            .expire(&key, ttl)
            .sadd(self.peers_of_task_key(&peer.task_id), peer.id.to_string())
            .expire(self.peers_of_task_key(&peer.task_id), ttl)
            .sadd(self.peers_of_host_key(&peer.host_id), peer.id.to_string())
            .expire(self.peers_of_host_key(&peer.host_id), ttl);
        if peer.persistent {
            pipe.sadd(self.persistent_peers_of_task_key(&peer.task_id), peer.id.to_string())
                .expire(self.persistent_peers_of_task_key(&peer.task_id), ttl);
        }
        self.timed(pipe.query_async(&mut conn)).await
    }

    async fn delete_peer(&self, id: &PeerId) -> PcResult<()> {
        let Some(peer) = self.load_peer(id).await? else {
            return Ok(());
        };
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(self.peer_key(id))
            .srem(self.peers_of_task_key(&peer.task_id), id.to_string())
            .srem(self.persistent_peers_of_task_key(&peer.task_id), id.to_string())
            .srem(self.peers_of_host_key(&peer.host_id), id.to_string());
        self.timed(pipe.query_async(&mut conn)).await
    }

    async fn load_all_peers(&self) -> PcResult<Vec<PersistentPeer>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = self.timed(conn.smembers(self.tasks_set_key())).await?;
        let mut out = Vec::new();
        for task_id in ids {
            out.extend(self.load_all_by_task(&task_id.into()).await?);
        }
        Ok(out)
    }

    async fn load_all_by_task(&self, task_id: &TaskId) -> PcResult<Vec<PersistentPeer>> {
        let ids = self.load_all_ids_by_task(task_id).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = self.load_peer(&id).await? {
                out.push(p);
            }
        }
        Ok(out)
    }

    async fn load_all_ids_by_task(&self, task_id: &TaskId) -> PcResult<Vec<PeerId>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = self
            .timed(conn.smembers(self.peers_of_task_key(task_id)))
            .await?;
        Ok(ids.into_iter().map(PeerId::from).collect())
    }

    async fn load_persistent_all_by_task(&self, task_id: &TaskId) -> PcResult<Vec<PersistentPeer>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = self
            .timed(conn.smembers(self.persistent_peers_of_task_key(task_id)))
            .await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = self.load_peer(&id.into()).await? {
                out.push(p);
            }
        }
        Ok(out)
    }

    async fn delete_all_by_task(&self, task_id: &TaskId) -> PcResult<()> {
        let ids = self.load_all_ids_by_task(task_id).await?;
        for id in ids {
            self.delete_peer(&id).await?;
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(self.peers_of_task_key(task_id))
            .del(self.persistent_peers_of_task_key(task_id));
        self.timed(pipe.query_async(&mut conn)).await
    }

    async fn load_all_by_host(&self, host_id: &HostId) -> PcResult<Vec<PersistentPeer>> {
        let ids = self.load_all_ids_by_host(host_id).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = self.load_peer(&id).await? {
                out.push(p);
            }
        }
        Ok(out)
    }

    async fn load_all_ids_by_host(&self, host_id: &HostId) -> PcResult<Vec<PeerId>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = self
            .timed(conn.smembers(self.peers_of_host_key(host_id)))
            .await?;
        Ok(ids.into_iter().map(PeerId::from).collect())
    }

    async fn delete_all_by_host(&self, host_id: &HostId) -> PcResult<()> {
        let ids = self.load_all_ids_by_host(host_id).await?;
        for id in ids {
            self.delete_peer(&id).await?;
        }
        let mut conn = self.conn().await?;
        self.timed(conn.del(self.peers_of_host_key(host_id))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_ttl_decays_from_created_at_not_from_now() {
        let created_at = unix_now() - 600;
        assert_eq!(remaining_ttl_secs(3600, created_at), 3000);
    }

    #[test]
    fn remaining_ttl_clamps_to_zero_past_deadline() {
        let created_at = unix_now() - 7200;
        assert_eq!(remaining_ttl_secs(3600, created_at), 0);
    }
}
