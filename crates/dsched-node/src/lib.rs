//! Wires the Resource Store, Persistent-Cache Store, Evaluator, Scheduler
//! and Replica Planner into a runnable process (§2, §10).

pub mod config;
pub mod gc;

use config::NodeConfig;
use dsched_core_traits::{DynamicConfigProvider, ParentScorer, PersistentCacheBackend, ResourceStore};
use dsched_evaluator::WeightedEvaluator;
use dsched_resource_store::InMemoryResourceStore;
use std::sync::Arc;

/// Everything a running node needs, assembled once at startup.
pub struct NodeHandle {
    pub resource_store: Arc<dyn ResourceStore>,
    pub persistent_cache: Arc<dyn PersistentCacheBackend>,
    pub scorer: Arc<dyn ParentScorer>,
    pub config_provider: Arc<dyn DynamicConfigProvider>,
    pub scheduler: dsched_scheduler::Scheduler,
    pub replica_planner: dsched_scheduler::ReplicaPlanner,
}

#[cfg(feature = "persist-redis")]
fn build_persistent_cache(config: &NodeConfig) -> Result<Arc<dyn PersistentCacheBackend>, dsched_common::CommonError> {
    use dsched_common::SchedulerClusterId;
    use dsched_persistent_cache::redis_backend::RedisBackend;

    let backend = RedisBackend::new(
        &config.persistent_cache_connection_string,
        SchedulerClusterId(config.scheduler_cluster_id.clone()),
        10,
    )?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "persist-redis"))]
fn build_persistent_cache(_config: &NodeConfig) -> Result<Arc<dyn PersistentCacheBackend>, dsched_common::CommonError> {
    use dsched_persistent_cache::in_memory::InMemoryBackend;
    Ok(Arc::new(InMemoryBackend::default()))
}

/// Builds the full component graph from a resolved [`NodeConfig`].
pub fn build_node(config: &NodeConfig) -> Result<NodeHandle, dsched_common::CommonError> {
    let resource_store: Arc<dyn ResourceStore> = Arc::new(InMemoryResourceStore::new());
    let persistent_cache = build_persistent_cache(config)?;
    let scorer: Arc<dyn ParentScorer> = Arc::new(WeightedEvaluator::default());
    let config_provider: Arc<dyn DynamicConfigProvider> =
        Arc::new(dsched_core_traits::StaticDefaultConfigProvider {
            config: dsched_core_traits::SchedulerClusterConfig {
                candidate_parent_limit: config.default_candidate_parent_limit,
                filter_parent_limit: config.default_filter_parent_limit,
            },
        });

    let scheduler = dsched_scheduler::Scheduler::new(
        resource_store.clone(),
        scorer.clone(),
        config_provider.clone(),
        config.scheduler_config(),
    );
    let replica_planner = dsched_scheduler::ReplicaPlanner::new(
        resource_store.clone(),
        persistent_cache.clone(),
        scorer.clone(),
    );

    Ok(NodeHandle {
        resource_store,
        persistent_cache,
        scorer,
        config_provider,
        scheduler,
        replica_planner,
    })
}
