//! Health monitor (spec §4.11).
//!
//! Generalizes the teacher's `AdaptiveCircuitBreaker` degradation levels into
//! a small process-wide rollup over whichever components report status, with
//! a short-lived cache so a chatty health endpoint doesn't hammer every
//! component's `status()` on every poll.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: Status,
    pub message: String,
    pub last_checked_ms: u64,
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub status: Status,
    pub components: Vec<ComponentHealth>,
    pub generated_at_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A component that can report its own health on demand. `error_handler`,
/// `geo_analyzer`, and each circuit breaker implement this.
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self) -> ComponentHealth;
}

pub struct HealthMonitor {
    checks: Vec<Box<dyn HealthCheck>>,
    cache: Mutex<Option<(u64, SystemHealth)>>,
    cache_ttl: Duration,
}

impl HealthMonitor {
    pub fn new(checks: Vec<Box<dyn HealthCheck>>) -> Self {
        Self {
            checks,
            cache: Mutex::new(None),
            cache_ttl: Duration::from_secs(30),
        }
    }

    pub fn get(&self, force_refresh: bool) -> SystemHealth {
        if !force_refresh {
            if let Some((cached_at, health)) = self.cache.lock().unwrap().clone() {
                if now_ms().saturating_sub(cached_at) < self.cache_ttl.as_millis() as u64 {
                    return health;
                }
            }
        }

        let components: Vec<ComponentHealth> = self.checks.iter().map(|c| c.check()).collect();
        let status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(Status::Healthy);
        let health = SystemHealth {
            status,
            components,
            generated_at_ms: now_ms(),
        };

        *self.cache.lock().unwrap() = Some((now_ms(), health.clone()));
        health
    }
}

pub struct CircuitBreakerHealthCheck {
    name: String,
    breaker: std::sync::Arc<crate::circuit_breaker::CircuitBreaker>,
}

impl CircuitBreakerHealthCheck {
    pub fn new(name: impl Into<String>, breaker: std::sync::Arc<crate::circuit_breaker::CircuitBreaker>) -> Self {
        Self { name: name.into(), breaker }
    }
}

impl HealthCheck for CircuitBreakerHealthCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> ComponentHealth {
        use crate::circuit_breaker::CircuitState;
        let stats = self.breaker.stats();
        let (status, message) = match stats.state {
            CircuitState::Closed => (Status::Healthy, "closed".to_string()),
            CircuitState::HalfOpen => (Status::Degraded, "half-open, probing recovery".to_string()),
            CircuitState::Open => (Status::Unhealthy, format!("open after {} failures", stats.failure_count)),
        };
        ComponentHealth {
            name: self.name.clone(),
            status,
            message,
            last_checked_ms: now_ms(),
            response_time_ms: None,
        }
    }
}

/// A component with no internal circuit to trip, reported as a fixed status.
/// Used for `errorHandler`, which in this crate is pure `Result` propagation
/// with no retained state to go unhealthy.
pub struct StaticHealthCheck {
    name: String,
    status: Status,
    message: String,
}

impl StaticHealthCheck {
    pub fn new(name: impl Into<String>, status: Status, message: impl Into<String>) -> Self {
        Self { name: name.into(), status, message: message.into() }
    }
}

impl HealthCheck for StaticHealthCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> ComponentHealth {
        ComponentHealth {
            name: self.name.clone(),
            status: self.status,
            message: self.message.clone(),
            last_checked_ms: now_ms(),
            response_time_ms: None,
        }
    }
}
