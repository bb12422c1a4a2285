//! Shared data model and trait boundaries for the distribution scheduler.
//!
//! This crate exists to break the dependency cycle between the Scheduler,
//! the Resource Store, the Persistent-Cache Store and the Evaluator: each
//! of those crates implements traits defined here rather than depending on
//! one another's concrete types.

pub mod data;
pub mod dynamic_config;
pub mod error;
pub mod evaluator;
pub mod persistent_cache;
pub mod resource_store;

pub use data::{
    Host, Peer, PeerEvent, PeerState, PersistentHost, PersistentPeer, PersistentTask,
    PersistentTaskState, Task, TaskState,
};
pub use dsched_common::HostType;
pub use dynamic_config::{DynamicConfigProvider, SchedulerClusterConfig, StaticDefaultConfigProvider};
pub use error::CoreTraitsError;
pub use evaluator::{ParentScorer, ScoredCandidate};
pub use persistent_cache::{PcResult, PersistentCacheBackend};
pub use resource_store::{Loaded, ResourceStore};
