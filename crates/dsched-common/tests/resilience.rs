use dsched_common::resilience::{CircuitBreaker, CircuitBreakerError, CircuitState};
use dsched_common::FixedTimeProvider;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct SharedClock(Arc<Mutex<FixedTimeProvider>>);

impl dsched_common::TimeProvider for SharedClock {
    fn unix_seconds(&self) -> u64 {
        self.0.lock().unwrap().unix_seconds()
    }
}

#[tokio::test]
async fn circuit_breaker_opens_after_threshold_failures() {
    let clock = Arc::new(Mutex::new(FixedTimeProvider::new(0)));
    let cb = CircuitBreaker::new(SharedClock(clock), 2, Duration::from_secs(10));

    let _ = cb.call(|| async { Err::<(), _>("e1") }).await;
    assert_eq!(cb.state(), CircuitState::Closed);

    let _ = cb.call(|| async { Err::<(), _>("e2") }).await;
    assert!(matches!(cb.state(), CircuitState::Open { .. }));

    match cb.call(|| async { Ok::<(), &'static str>(()) }).await {
        Err(CircuitBreakerError::Open) => {}
        other => panic!("expected Open, got {other:?}"),
    }
}

#[tokio::test]
async fn circuit_breaker_recovers_after_timeout_and_success() {
    let clock = Arc::new(Mutex::new(FixedTimeProvider::new(0)));
    let cb = CircuitBreaker::new(SharedClock(clock.clone()), 1, Duration::from_secs(10));

    let _ = cb.call(|| async { Err::<(), _>("e") }).await;
    assert!(matches!(cb.state(), CircuitState::Open { .. }));

    clock.lock().unwrap().0 += 11;
    let result = cb.call(|| async { Ok::<_, &str>(42) }).await;
    assert_eq!(result.unwrap(), 42);
    assert_eq!(cb.state(), CircuitState::Closed);
}
