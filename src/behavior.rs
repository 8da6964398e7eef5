//! Behavioral / session analyzer (spec §4.4).
//!
//! `timingConsistency` generalizes the teacher's
//! `reducers::RateStats::burstiness_score` (coefficient of variation of
//! inter-arrival deltas, normalized to [0,1]) from a fixed-size atomic ring
//! to the bounded request history held in `SessionData`.

use std::collections::HashSet;

use crate::config::BehavioralConfig;
use crate::request::RequestView;
use crate::session::SessionData;

#[derive(Debug, Clone, Default)]
pub struct BehaviorMetrics {
    pub request_interval_ms: f64,
    pub navigation_pattern: Vec<String>,
    pub timing_consistency: f64,
    pub human_like_score: f64,
    pub session_duration_ms: u64,
}

pub struct BehaviorAnalyzer {
    config: BehavioralConfig,
}

impl BehaviorAnalyzer {
    pub fn new(config: BehavioralConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, session: &SessionData, _current: &RequestView) -> BehaviorMetrics {
        let deltas = inter_arrival_deltas(session);
        let request_interval_ms = mean(&deltas);
        let timing_consistency = timing_consistency(&deltas);
        let navigation_pattern = session
            .requests
            .iter()
            .rev()
            .take(10)
            .map(|r| format!("{}:{}", r.method, r.path))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let human_like_score = self.human_like_score(session, request_interval_ms, timing_consistency);

        BehaviorMetrics {
            request_interval_ms,
            navigation_pattern,
            timing_consistency,
            human_like_score,
            session_duration_ms: session.last_seen_ms.saturating_sub(session.first_seen_ms),
        }
    }

    fn human_like_score(&self, session: &SessionData, mean_interval: f64, consistency: f64) -> f64 {
        let mut score = 1.0_f64;
        let min_human = self.config.min_human_interval_ms;

        if mean_interval > 0.0 && mean_interval < min_human {
            let penalty = 0.4 * ((min_human - mean_interval) / min_human);
            score -= penalty.clamp(0.0, 0.4);
        }

        if consistency > 0.6 {
            let penalty = 0.4 * ((consistency - 0.6) / 0.4);
            score -= penalty.clamp(0.0, 0.4);
        }

        score -= navigation_penalty(session).clamp(0.0, 0.2);
        score -= 0.1 * (1.0 - diversity_score(session));

        score.clamp(0.0, 1.0)
    }
}

fn inter_arrival_deltas(session: &SessionData) -> Vec<f64> {
    session
        .requests
        .windows(2)
        .map(|pair| (pair[1].timestamp_ms.saturating_sub(pair[0].timestamp_ms)) as f64)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// `1 / (1 + cv)`; fewer than 3 requests yields 0 (not enough signal).
fn timing_consistency(deltas: &[f64]) -> f64 {
    if deltas.len() < 2 {
        return 0.0;
    }
    let m = mean(deltas);
    if m == 0.0 {
        return 1.0;
    }
    let variance = deltas.iter().map(|d| (d - m).powi(2)).sum::<f64>() / deltas.len() as f64;
    let cv = variance.sqrt() / m;
    1.0 / (1.0 + cv)
}

/// Penalize the longest run of identical (method, path) pairs beyond 3, plus
/// a flat penalty for a long session that never revisits a path.
fn navigation_penalty(session: &SessionData) -> f64 {
    let n = session.requests.len();
    if n == 0 {
        return 0.0;
    }

    let mut longest_run = 1usize;
    let mut current_run = 1usize;
    for pair in session.requests.windows(2) {
        if pair[0].method == pair[1].method && pair[0].path == pair[1].path {
            current_run += 1;
            longest_run = longest_run.max(current_run);
        } else {
            current_run = 1;
        }
    }

    let mut penalty = 0.0_f64;
    if longest_run > 3 {
        penalty += 0.1 * (longest_run - 3) as f64;
    }

    if n > 10 {
        let unique_paths: HashSet<&str> = session.requests.iter().map(|r| r.path.as_str()).collect();
        let unique_ratio = unique_paths.len() as f64 / n as f64;
        if unique_ratio < 0.1 {
            penalty += 0.3;
        }
    }

    penalty.max(0.0)
}

/// `0.2*(uniqueMethods/min(N,5)) + 0.6*(uniquePaths/N) + 0.2*(uniqueUAs/min(N,3))`
fn diversity_score(session: &SessionData) -> f64 {
    let n = session.requests.len();
    if n == 0 {
        return 1.0;
    }
    let unique_methods: HashSet<&str> = session.requests.iter().map(|r| r.method.as_str()).collect();
    let unique_paths: HashSet<&str> = session.requests.iter().map(|r| r.path.as_str()).collect();
    let unique_uas: HashSet<&str> = session.requests.iter().map(|r| r.user_agent.as_str()).collect();

    let n = n as f64;
    0.2 * (unique_methods.len() as f64 / n.min(5.0))
        + 0.6 * (unique_paths.len() as f64 / n)
        + 0.2 * (unique_uas.len() as f64 / n.min(3.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{RequestLog, SessionData};
    use std::collections::HashSet as Set;

    fn session_with_intervals(intervals_ms: &[u64]) -> SessionData {
        let mut ts = 0u64;
        let mut requests = vec![RequestLog {
            timestamp_ms: ts,
            path: "/api/data".to_string(),
            method: "GET".to_string(),
            user_agent: "ua".to_string(),
        }];
        for d in intervals_ms {
            ts += d;
            requests.push(RequestLog {
                timestamp_ms: ts,
                path: "/api/data".to_string(),
                method: "GET".to_string(),
                user_agent: "ua".to_string(),
            });
        }
        SessionData {
            first_seen_ms: 0,
            last_seen_ms: ts,
            request_count: requests.len() as u64,
            requests,
            fingerprints: Set::new(),
            suspicion_history: Vec::new(),
        }
    }

    #[test]
    fn s5_rapid_fire_ten_ms_intervals() {
        let session = session_with_intervals(&[10; 9]);
        let analyzer = BehaviorAnalyzer::new(BehavioralConfig::default());
        let req = RequestView::new("GET", "/api/data", "9.9.9.9");
        let metrics = analyzer.analyze(&session, &req);

        assert!(metrics.timing_consistency > 0.6, "{}", metrics.timing_consistency);
        assert!(metrics.request_interval_ms < 100.0);
        assert!(metrics.human_like_score < 0.5, "{}", metrics.human_like_score);
    }

    #[test]
    fn fewer_than_three_requests_has_zero_consistency() {
        let session = session_with_intervals(&[500]);
        let analyzer = BehaviorAnalyzer::new(BehavioralConfig::default());
        let req = RequestView::new("GET", "/api/data", "9.9.9.9");
        let metrics = analyzer.analyze(&session, &req);
        assert_eq!(metrics.timing_consistency, 0.0);
    }

    #[test]
    fn human_like_score_is_clamped_to_unit_interval() {
        let session = session_with_intervals(&[1; 20]);
        let analyzer = BehaviorAnalyzer::new(BehavioralConfig::default());
        let req = RequestView::new("GET", "/api/data", "9.9.9.9");
        let metrics = analyzer.analyze(&session, &req);
        assert!(metrics.human_like_score >= 0.0 && metrics.human_like_score <= 1.0);
    }
}
