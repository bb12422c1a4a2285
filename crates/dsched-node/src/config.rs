//! Layered static configuration (§6, §10.3): compiled-in defaults,
//! overridden by an optional config file, overridden by environment
//! variables. Holds the knobs that are not dynamically reloadable; the
//! per-cluster `candidate_parent_limit`/`filter_parent_limit` pair is
//! fetched through [`dsched_core_traits::DynamicConfigProvider`] instead.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub scheduler_cluster_id: String,
    pub persistent_cache_connection_string: String,
    pub retry_limit: u32,
    pub retry_back_to_source_limit: u32,
    pub retry_interval_ms: u64,
    pub default_candidate_parent_limit: u32,
    pub default_filter_parent_limit: u32,
    pub gc_sweep_interval_secs: u64,
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            scheduler_cluster_id: "default".to_string(),
            persistent_cache_connection_string: "redis://127.0.0.1:6379".to_string(),
            retry_limit: 10,
            retry_back_to_source_limit: 3,
            retry_interval_ms: 50,
            default_candidate_parent_limit: 4,
            default_filter_parent_limit: 20,
            gc_sweep_interval_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Loads a config file (TOML or YAML, inferred from extension) on top
    /// of the compiled-in defaults.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "toml" => toml::from_str(&data)?,
            "yaml" | "yml" => serde_yaml::from_str(&data)?,
            _ => return Err(format!("unsupported config extension: {ext}").into()),
        };
        Ok(config)
    }

    /// Applies `DSCHED_*` environment overrides, the final layer (§10.3).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DSCHED_SCHEDULER_CLUSTER_ID") {
            self.scheduler_cluster_id = v;
        }
        if let Ok(v) = std::env::var("DSCHED_PERSISTENT_CACHE_CONNECTION_STRING") {
            self.persistent_cache_connection_string = v;
        }
        if let Ok(v) = std::env::var("DSCHED_RETRY_LIMIT") {
            if let Ok(parsed) = v.parse() {
                self.retry_limit = parsed;
            }
        }
        if let Ok(v) = std::env::var("DSCHED_RETRY_BACK_TO_SOURCE_LIMIT") {
            if let Ok(parsed) = v.parse() {
                self.retry_back_to_source_limit = parsed;
            }
        }
        if let Ok(v) = std::env::var("DSCHED_RETRY_INTERVAL_MS") {
            if let Ok(parsed) = v.parse() {
                self.retry_interval_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("DSCHED_DEFAULT_CANDIDATE_PARENT_LIMIT") {
            if let Ok(parsed) = v.parse() {
                self.default_candidate_parent_limit = parsed;
            }
        }
        if let Ok(v) = std::env::var("DSCHED_DEFAULT_FILTER_PARENT_LIMIT") {
            if let Ok(parsed) = v.parse() {
                self.default_filter_parent_limit = parsed;
            }
        }
        if let Ok(v) = std::env::var("DSCHED_GC_SWEEP_INTERVAL_SECS") {
            if let Ok(parsed) = v.parse() {
                self.gc_sweep_interval_secs = parsed;
            }
        }
        if let Ok(v) = std::env::var("DSCHED_LOG_LEVEL") {
            self.log_level = v;
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn gc_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.gc_sweep_interval_secs)
    }

    pub fn scheduler_config(&self) -> dsched_scheduler::SchedulerConfig {
        dsched_scheduler::SchedulerConfig {
            retry_limit: self.retry_limit,
            retry_back_to_source_limit: self.retry_back_to_source_limit,
            retry_interval: self.retry_interval(),
            default_candidate_parent_limit: self.default_candidate_parent_limit,
            default_filter_parent_limit: self.default_filter_parent_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.retry_interval(), Duration::from_millis(50));
    }

    #[test]
    fn loads_toml_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, "retry_limit = 99\nscheduler_cluster_id = \"east-1\"\n").unwrap();
        let cfg = NodeConfig::from_file(&path).unwrap();
        assert_eq!(cfg.retry_limit, 99);
        assert_eq!(cfg.scheduler_cluster_id, "east-1");
        // Unset fields keep the compiled-in default via `#[serde(default)]`.
        assert_eq!(cfg.gc_sweep_interval_secs, 60);
    }
}
