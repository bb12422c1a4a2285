use once_cell::sync::Lazy;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::histogram::Histogram;

/// Counts hash/set parse failures demoted to not-found (§7).
pub static PARSE_FAILURES: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts hosts evicted by a GC sweep.
pub static GC_EVICTIONS: Lazy<Counter> = Lazy::new(Counter::default);

/// Observes backend call latency in seconds.
pub static BACKEND_OP_LATENCY_SECONDS: Lazy<Histogram> =
    Lazy::new(|| Histogram::new([0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0].into_iter()));

/// Observes GC sweep wall-clock duration in seconds.
pub static GC_SWEEP_DURATION_SECONDS: Lazy<Histogram> =
    Lazy::new(|| Histogram::new([0.01, 0.05, 0.1, 0.5, 1.0, 5.0].into_iter()));
