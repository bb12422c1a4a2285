//! The Persistent-Cache Store (§4.2): a durable mirror of Hosts,
//! persistent-cache Tasks and persistent-cache Peers, reached exclusively
//! through the `PersistentCacheBackend` trait (`dsched-core-traits`) so the
//! wire protocol is swappable between a pooled Redis-compatible connection
//! and the in-process test double below.

pub mod in_memory;
pub mod metrics;
#[cfg(feature = "persist-redis")]
pub mod redis_backend;

pub use in_memory::InMemoryBackend;
#[cfg(feature = "persist-redis")]
pub use redis_backend::RedisBackend;
