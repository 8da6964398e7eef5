//! Circuit breaker guarding a flaky external dependency (spec §4.9).
//!
//! Generalizes the teacher's `CircuitBreaker`: the same CLOSED/OPEN/HALF_OPEN
//! state machine over atomics with `compare_exchange`-guarded transitions,
//! except the trip condition is now "observed failure count over a rolling
//! minimum" rather than "latency over a fixed threshold", and the thresholds
//! are configuration fields instead of build-time constants.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<usize> for CircuitState {
    fn from(value: usize) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub failure_count: usize,
    pub request_count: usize,
}

pub struct CircuitBreaker {
    state: AtomicUsize,
    failure_count: AtomicUsize,
    request_count: AtomicUsize,
    last_failure_time_ms: AtomicU64,
    failure_threshold: usize,
    recovery_timeout_ms: u64,
    minimum_requests: usize,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicUsize::new(CircuitState::Closed as usize),
            failure_count: AtomicUsize::new(0),
            request_count: AtomicUsize::new(0),
            last_failure_time_ms: AtomicU64::new(0),
            failure_threshold: config.failure_threshold as usize,
            recovery_timeout_ms: config.recovery_timeout_ms,
            minimum_requests: config.minimum_requests as usize,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            request_count: self.request_count.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.state.store(CircuitState::Closed as usize, Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        self.request_count.store(0, Ordering::SeqCst);
    }

    fn check_allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let now = current_time_ms();
                let last_fail = self.last_failure_time_ms.load(Ordering::Acquire);
                if now >= last_fail + self.recovery_timeout_ms {
                    self.state
                        .compare_exchange(
                            CircuitState::Open as usize,
                            CircuitState::HalfOpen as usize,
                            Ordering::SeqCst,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => self.reset(),
            CircuitState::Closed => self.failure_count.store(0, Ordering::Relaxed),
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        self.last_failure_time_ms.store(current_time_ms(), Ordering::SeqCst);
        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                let requests = self.request_count.load(Ordering::SeqCst);
                if requests >= self.minimum_requests && failures >= self.failure_threshold {
                    self.trip();
                }
            }
            CircuitState::HalfOpen => self.trip(),
            CircuitState::Open => {}
        }
    }

    fn trip(&self) {
        self.state.store(CircuitState::Open as usize, Ordering::SeqCst);
    }

    /// Run `op` if the breaker allows it, recording success/failure;
    /// otherwise (or on failure) run `fallback`.
    pub async fn execute<T, Op, Fut, Fb>(&self, op: Op, fallback: Fb) -> T
    where
        Op: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Option<T>>,
        Fb: FnOnce() -> T,
    {
        if !self.check_allow() {
            return fallback();
        }
        if self.state() == CircuitState::Closed {
            self.request_count.fetch_add(1, Ordering::SeqCst);
        }
        match op().await {
            Some(value) => {
                self.record_success();
                value
            }
            None => {
                self.record_failure();
                fallback()
            }
        }
    }
}

fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout_ms: 50,
            minimum_requests: 3,
        }
    }

    #[tokio::test]
    async fn trips_after_threshold_failures_then_recovers() {
        let cb = CircuitBreaker::new(&test_config());
        assert_eq!(cb.state(), CircuitState::Closed);

        for _ in 0..3 {
            let value: i32 = cb.execute(|| async { None }, || -1).await;
            assert_eq!(value, -1);
        }
        assert_eq!(cb.state(), CircuitState::Open);

        // Fails fast without invoking the operation.
        let mut invoked = false;
        let _: i32 = cb
            .execute(
                || {
                    invoked = true;
                    async { Some(1) }
                },
                || -1,
            )
            .await;
        assert!(!invoked);

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        let value: i32 = cb.execute(|| async { Some(42) }, || -1).await;
        assert_eq!(value, 42);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(&test_config());
        for _ in 0..3 {
            let _: i32 = cb.execute(|| async { None }, || -1).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        let _: i32 = cb.execute(|| async { None }, || -1).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
