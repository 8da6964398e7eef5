//! Rolling analytics counters (spec §4.12 / component table "Metrics/analytics").
//!
//! Hook-only and format-free per §1 non-goals (no exporter, no dashboard):
//! this just keeps the counters and rolling window the coordinator feeds, the
//! same shape as the teacher's `reducers::RateTracker` ring buffer but keyed
//! by outcome rather than by raw request rate.

use std::collections::HashMap;
use std::sync::Mutex;

const WINDOW_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy)]
struct Sample {
    suspicion_score: u32,
    is_suspicious: bool,
    processing_time_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Analytics {
    pub total_requests: u64,
    pub suspicious_requests: u64,
    pub average_suspicion_score: f64,
    pub p50_processing_time_ms: u64,
    pub p95_processing_time_ms: u64,
    pub top_countries: Vec<(String, u64)>,
}

struct Inner {
    window: std::collections::VecDeque<Sample>,
    total_requests: u64,
    suspicious_requests: u64,
    country_counts: HashMap<String, u64>,
}

pub struct MetricsRegistry {
    inner: Mutex<Inner>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                window: std::collections::VecDeque::with_capacity(WINDOW_CAPACITY),
                total_requests: 0,
                suspicious_requests: 0,
                country_counts: HashMap::new(),
            }),
        }
    }

    pub fn record(&self, suspicion_score: u32, is_suspicious: bool, processing_time_ms: u64, country: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_requests += 1;
        if is_suspicious {
            inner.suspicious_requests += 1;
        }
        *inner.country_counts.entry(country.to_string()).or_insert(0) += 1;

        if inner.window.len() == WINDOW_CAPACITY {
            inner.window.pop_front();
        }
        inner.window.push_back(Sample { suspicion_score, is_suspicious, processing_time_ms });
    }

    pub fn snapshot(&self) -> Analytics {
        let inner = self.inner.lock().unwrap();

        let average_suspicion_score = if inner.window.is_empty() {
            0.0
        } else {
            inner.window.iter().map(|s| s.suspicion_score as f64).sum::<f64>() / inner.window.len() as f64
        };

        let mut times: Vec<u64> = inner.window.iter().map(|s| s.processing_time_ms).collect();
        times.sort_unstable();
        let p50 = percentile(&times, 0.50);
        let p95 = percentile(&times, 0.95);

        let mut top_countries: Vec<(String, u64)> = inner.country_counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top_countries.sort_by(|a, b| b.1.cmp(&a.1));
        top_countries.truncate(10);

        Analytics {
            total_requests: inner.total_requests,
            suspicious_requests: inner.suspicious_requests,
            average_suspicion_score,
            p50_processing_time_ms: p50,
            p95_processing_time_ms: p95,
            top_countries,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_samples() {
        let registry = MetricsRegistry::new();
        registry.record(10, false, 5, "US");
        registry.record(80, true, 12, "CN");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.suspicious_requests, 1);
        assert!((snapshot.average_suspicion_score - 45.0).abs() < f64::EPSILON);
    }

    #[test]
    fn window_does_not_grow_unbounded() {
        let registry = MetricsRegistry::new();
        for _ in 0..(WINDOW_CAPACITY + 50) {
            registry.record(1, false, 1, "US");
        }
        let inner = registry.inner.lock().unwrap();
        assert_eq!(inner.window.len(), WINDOW_CAPACITY);
    }

    #[test]
    fn top_countries_are_sorted_descending() {
        let registry = MetricsRegistry::new();
        registry.record(1, false, 1, "US");
        registry.record(1, false, 1, "US");
        registry.record(1, false, 1, "CN");
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.top_countries[0].0, "US");
    }
}
