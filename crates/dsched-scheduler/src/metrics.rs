use once_cell::sync::Lazy;
use prometheus_client::metrics::counter::Counter;

/// Counts `schedule` invocations (one per announce iteration entry).
pub static SCHEDULE_CALLS: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts retry-loop iterations caused by an empty candidate set.
pub static SCHEDULE_RETRIES: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts `NeedBackToSourceResponse`/`SchedNeedBackSource` emissions.
pub static BACK_TO_SOURCE_RESPONSES: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts calls that terminated with `FailedPrecondition`.
pub static FAILED_PRECONDITION_TERMINATIONS: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts the total size of candidate-filter output across calls.
pub static CANDIDATE_FILTER_YIELD: Lazy<Counter> = Lazy::new(Counter::default);

/// Counts replica-planner shortfalls (needed > available after sampling).
pub static REPLICA_PLANNER_SHORTFALLS: Lazy<Counter> = Lazy::new(Counter::default);
