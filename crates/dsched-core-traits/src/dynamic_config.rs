//! The dynamic scheduler-cluster configuration callback (§6, §10.3). The
//! core never performs its own network call to fetch it; an operator wires
//! in whatever refresh mechanism applies and injects it as a trait object.

/// Mirrors the manager-supplied `{ candidate_parent_limit, filter_parent_limit }`
/// pair from §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerClusterConfig {
    pub candidate_parent_limit: u32,
    pub filter_parent_limit: u32,
}

pub trait DynamicConfigProvider: Send + Sync {
    fn get_scheduler_cluster_config(&self) -> SchedulerClusterConfig;
}

/// Backs the provider when no dynamic source is configured (§10.3).
pub struct StaticDefaultConfigProvider {
    pub config: SchedulerClusterConfig,
}

impl DynamicConfigProvider for StaticDefaultConfigProvider {
    fn get_scheduler_cluster_config(&self) -> SchedulerClusterConfig {
        self.config
    }
}
