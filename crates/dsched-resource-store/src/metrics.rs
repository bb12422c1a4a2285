use once_cell::sync::Lazy;
use prometheus_client::metrics::counter::Counter;

/// Counts successful `add_peer_edge` commits.
pub static EDGE_COMMITS: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts `add_peer_edge` calls rejected because they would create a cycle.
pub static EDGE_CYCLE_REJECTIONS: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts `delete_peer_in_edges` calls.
pub static EDGE_PRUNES: Lazy<Counter> = Lazy::new(Counter::default);
