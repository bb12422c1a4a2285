use once_cell::sync::Lazy;
use prometheus_client::metrics::counter::Counter;

/// Counts calls to `evaluate_parents`.
pub static PARENT_EVALUATIONS: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts peers flagged bad by `is_bad_parent`.
pub static BAD_PARENT_FLAGS: Lazy<Counter> = Lazy::new(Counter::default);
