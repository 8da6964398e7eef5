//! Detection coordinator (spec §4.8): the `analyze()` entry point that wires
//! every other module together behind one call, the same way the teacher's
//! `main.rs` wires `CircuitBreaker` + `NoiseDetector` + `RateTracker` behind
//! its connection-handling loop, except request-scoped instead of
//! connection-scoped and fanning out over `tokio::join!` instead of a single
//! inline decision.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::behavior::{BehaviorAnalyzer, BehaviorMetrics};
use crate::config::{Config, Thresholds};
use crate::error::Result;
use crate::events::{detection_event, Event, EventSink, NoopSink};
use crate::fingerprint::{FingerprintAnalyzer, HttpFingerprint};
use crate::geo::{GeoAnalyzer, GeoLocation, GeoResolver, SimulatedResolver};
use crate::health::{CircuitBreakerHealthCheck, HealthMonitor, StaticHealthCheck, Status, SystemHealth};
use crate::logging::{Level, LogEvent};
use crate::metrics::MetricsRegistry;
use crate::request::RequestView;
use crate::scheduler::{self, ScheduledHandle};
use crate::scoring::{Category, DetectionReason, ScoringEngine, Severity, Verdict};
use crate::session::{now_ms, SessionData, SessionStore, MAX_REQUEST_LOG};
use crate::timeout;
use crate::whitelist::{BypassType, WhitelistManager};

const ANALYZER_VERSION: &str = "warden-1";
const FALLBACK_BOT_TOKENS: &[&str] = &["bot", "crawler", "spider", "curl", "wget", "python", "selenium", "puppeteer"];
const FALLBACK_REQUIRED_HEADERS: &[&str] = &["accept", "accept-language", "accept-encoding", "connection", "cache-control", "user-agent"];

#[derive(Debug, Clone, Default)]
pub struct AnalyzerTimings {
    pub fingerprint_ms: u64,
    pub behavior_ms: u64,
    pub geo_ms: u64,
}

#[derive(Debug, Clone)]
pub struct DetectionMetadata {
    pub timestamp_ms: u64,
    pub total_processing_time_ms: u64,
    pub analyzer_times: AnalyzerTimings,
    pub analyzer_version: &'static str,
    pub fallback_reason: Option<String>,
    pub timeout_occurred: bool,
    pub geo: Option<GeoLocation>,
}

#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub correlation_id: String,
    pub is_suspicious: bool,
    pub suspicion_score: u32,
    pub confidence: f64,
    pub reasons: Vec<DetectionReason>,
    pub fingerprint: String,
    pub metadata: DetectionMetadata,
}

impl DetectionResult {
    fn neutral(correlation_id: String, reason: DetectionReason, timestamp_ms: u64) -> Self {
        Self {
            correlation_id,
            is_suspicious: false,
            suspicion_score: 0,
            confidence: 1.0,
            reasons: vec![reason],
            fingerprint: "whitelisted".to_string(),
            metadata: DetectionMetadata {
                timestamp_ms,
                total_processing_time_ms: 0,
                analyzer_times: AnalyzerTimings::default(),
                analyzer_version: ANALYZER_VERSION,
                fallback_reason: None,
                timeout_occurred: false,
                geo: None,
            },
        }
    }
}

pub struct Engine {
    config: Config,
    session_store: Arc<SessionStore>,
    fingerprint_analyzer: FingerprintAnalyzer,
    behavior_analyzer: BehaviorAnalyzer,
    geo_analyzer: Arc<GeoAnalyzer>,
    whitelist: WhitelistManager,
    scoring: ScoringEngine,
    metrics: MetricsRegistry,
    event_sink: Arc<dyn EventSink>,
    health: HealthMonitor,
    sweeper: ScheduledHandle,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_resolver_and_sink(config, Box::new(SimulatedResolver), Box::new(NoopSink))
    }

    pub fn with_resolver_and_sink(
        config: Config,
        geo_resolver: Box<dyn GeoResolver>,
        event_sink: Box<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let event_sink: Arc<dyn EventSink> = Arc::from(event_sink);

        let session_store = Arc::new(SessionStore::new(
            config.cache.max_sessions,
            Duration::from_millis(config.cache.session_timeout_ms),
        ));
        let fingerprint_analyzer = FingerprintAnalyzer::new(&config.fingerprinting);
        let behavior_analyzer = BehaviorAnalyzer::new(config.behavioral.clone());
        let geo_analyzer = Arc::new(GeoAnalyzer::new(
            &config.geographic,
            config.cache.max_geo,
            Duration::from_millis(config.cache.geo_ttl_ms),
            &config.resilience.geo_circuit,
            geo_resolver,
        ));
        let whitelist = WhitelistManager::new(&config.whitelist, event_sink.clone());
        let scoring = ScoringEngine::new(&config)?;

        let geo_breaker = geo_analyzer.circuit_breaker();
        let health = HealthMonitor::new(vec![
            Box::new(StaticHealthCheck::new(
                "errorHandler",
                Status::Healthy,
                "stateless; errors propagate via Result with nothing to go unhealthy",
            )),
            Box::new(CircuitBreakerHealthCheck::new("geoAnalyzer", geo_breaker.clone())),
            Box::new(CircuitBreakerHealthCheck::new("circuitBreakers.geo", geo_breaker)),
        ]);

        let sweep_sessions = session_store.clone();
        let sweep_geo = geo_analyzer.clone();
        let sweep_sink = event_sink.clone();
        let sweeper = scheduler::spawn(Duration::from_millis(config.cache.cleanup_interval_ms), move || {
            let expired = sweep_sessions.sweep() + sweep_geo.sweep();
            if expired > 0 {
                sweep_sink.emit(Event::EntriesExpired { count: expired });
            }
        });

        Ok(Self {
            config,
            session_store,
            fingerprint_analyzer,
            behavior_analyzer,
            geo_analyzer,
            whitelist,
            scoring,
            metrics: MetricsRegistry::new(),
            event_sink,
            health,
            sweeper,
        })
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Snapshot of per-component health (spec §4.11), cached for 30s unless
    /// `force_refresh` is set.
    pub fn health(&self, force_refresh: bool) -> SystemHealth {
        self.health.get(force_refresh)
    }

    pub async fn analyze(&self, req: &RequestView, ip: &str, reputation: Option<u32>) -> DetectionResult {
        let correlation_id = Uuid::new_v4().to_string();
        let timestamp_ms = now_ms();
        let start = Instant::now();

        // A cache-only peek: any prior request for this IP may already have
        // populated the geo cache (up to a 24h TTL), letting an ASN
        // whitelist entry fire without paying for a fresh resolution here.
        let cached_geo = self.geo_analyzer.peek_cached(ip);
        let whitelist_check = self.whitelist.check(ip, &req.user_agent, cached_geo.as_ref(), None);
        if whitelist_check.is_whitelisted {
            let bypass_type = whitelist_check.bypass_type.unwrap();
            let reason = DetectionReason {
                category: Category::Reputation,
                severity: Severity::Low,
                description: whitelist_check
                    .reason
                    .unwrap_or_else(|| "whitelist bypass".to_string()),
                score: 0,
            };
            let result = DetectionResult::neutral(correlation_id.clone(), reason, timestamp_ms);

            // A monitoring-tool bypass is informational-only and skips the
            // DETECTION_START/outcome pair entirely (recorded open question
            // decision); other bypass types still log normally.
            if bypass_type != BypassType::Monitoring {
                self.log_detection_start(&correlation_id, req, ip, timestamp_ms);
            }
            self.log_outcome(&correlation_id, req, ip, timestamp_ms, &result, true);
            self.metrics.record(0, false, 0, "unknown");
            return result;
        }

        self.log_detection_start(&correlation_id, req, ip, timestamp_ms);

        let (fp, behavior, geo, timings, timed_out, mut session) = self.run_analyzers(req, ip).await;

        // The scoring engine is otherwise infallible; a caught panic is the
        // only remaining failure mode, and still gets the §7 fallback verdict
        // rather than propagating to the caller.
        let verdict = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.scoring.score(&fp, &behavior, &geo, reputation)
        }))
        .unwrap_or_else(|_| scoring_fallback(req, &self.config.thresholds));

        session.push_fingerprint(verdict.fingerprint.clone());
        session.push_suspicion(verdict.suspicion_score, MAX_REQUEST_LOG);
        self.session_store.set(ip, session);

        let total_processing_time_ms = start.elapsed().as_millis() as u64;
        let result = DetectionResult {
            correlation_id: correlation_id.clone(),
            is_suspicious: verdict.is_suspicious,
            suspicion_score: verdict.suspicion_score,
            confidence: verdict.confidence,
            reasons: verdict.reasons,
            fingerprint: verdict.fingerprint,
            metadata: DetectionMetadata {
                timestamp_ms,
                total_processing_time_ms,
                analyzer_times: timings,
                analyzer_version: ANALYZER_VERSION,
                fallback_reason: None,
                timeout_occurred: timed_out,
                geo: Some(geo.clone()),
            },
        };

        self.log_outcome(&correlation_id, req, ip, timestamp_ms, &result, false);
        self.event_sink.emit(detection_event(
            &Verdict {
                suspicion_score: result.suspicion_score,
                is_suspicious: result.is_suspicious,
                high_risk: verdict.high_risk,
                confidence: result.confidence,
                reasons: result.reasons.clone(),
                fingerprint: result.fingerprint.clone(),
            },
            &correlation_id,
        ));
        self.metrics
            .record(result.suspicion_score, result.is_suspicious, total_processing_time_ms, &geo.country);

        result
    }

    async fn run_analyzers(
        &self,
        req: &RequestView,
        ip: &str,
    ) -> (HttpFingerprint, BehaviorMetrics, GeoLocation, AnalyzerTimings, bool, SessionData) {
        let session = self.session_store.track(ip, req);
        let timeouts = &self.config.resilience.per_analyzer_timeout_ms;

        let fp_start = Instant::now();
        let fp_future = timeout::with_timeout(
            timeouts.http_ms,
            async { self.fingerprint_analyzer.analyze(req) },
            || fingerprint_fallback(req),
        );

        let behavior_start = Instant::now();
        let behavior_future = timeout::with_timeout(
            timeouts.behavior_ms,
            async { self.behavior_analyzer.analyze(&session, req) },
            behavior_fallback,
        );

        let geo_start = Instant::now();
        let geo_future = self.geo_analyzer.analyze(ip, timeouts.geo_ms);

        let total_deadline = self.config.resilience.total_deadline_ms;
        let joined = async { tokio::join!(fp_future, behavior_future, geo_future) };
        let (joined_result, deadline_exceeded) = timeout::with_timeout(
            total_deadline,
            joined,
            || {
                (
                    (fingerprint_fallback(req), true),
                    (behavior_fallback(), true),
                    (GeoLocation::unknown_external(), true),
                )
            },
        )
        .await;
        let ((fp, fp_timed_out), (behavior, behavior_timed_out), (geo, geo_timed_out)) = joined_result;

        let timings = AnalyzerTimings {
            fingerprint_ms: fp_start.elapsed().as_millis() as u64,
            behavior_ms: behavior_start.elapsed().as_millis() as u64,
            geo_ms: geo_start.elapsed().as_millis() as u64,
        };
        let any_timeout = deadline_exceeded || fp_timed_out || behavior_timed_out || geo_timed_out;

        (fp, behavior, geo, timings, any_timeout, session)
    }

    fn log_detection_start(&self, correlation_id: &str, req: &RequestView, ip: &str, timestamp_ms: u64) {
        LogEvent::emit(
            Level::Info,
            correlation_id,
            correlation_id,
            timestamp_ms,
            "DETECTION_START",
            ip,
            &req.user_agent,
            &req.path,
            &req.method,
        );
    }

    fn log_outcome(
        &self,
        correlation_id: &str,
        req: &RequestView,
        ip: &str,
        timestamp_ms: u64,
        result: &DetectionResult,
        is_bypass: bool,
    ) {
        let event = if is_bypass || !result.is_suspicious {
            "LEGITIMATE_REQUEST_PROCESSED"
        } else {
            "SUSPICIOUS_REQUEST_DETECTED"
        };
        LogEvent::emit(
            Level::Info,
            correlation_id,
            correlation_id,
            timestamp_ms,
            event,
            ip,
            &req.user_agent,
            &req.path,
            &req.method,
        );

        if result.suspicion_score >= self.config.thresholds.high_risk {
            self.event_sink.emit(Event::DetectionEvent {
                correlation_id: correlation_id.to_string(),
                suspicion_score: result.suspicion_score,
                is_suspicious: true,
            });
            LogEvent::emit(
                Level::Warn,
                correlation_id,
                correlation_id,
                timestamp_ms,
                "THREAT_ACTION_BLOCKED",
                ip,
                &req.user_agent,
                &req.path,
                &req.method,
            );
        } else if result.is_suspicious {
            LogEvent::emit(
                Level::Warn,
                correlation_id,
                correlation_id,
                timestamp_ms,
                "THREAT_ACTION_MONITORED",
                ip,
                &req.user_agent,
                &req.path,
                &req.method,
            );
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.sweeper.stop();
    }
}

fn fingerprint_fallback(req: &RequestView) -> HttpFingerprint {
    let ua = req.user_agent.to_lowercase();
    let automation_signatures: Vec<String> = FALLBACK_BOT_TOKENS
        .iter()
        .filter(|token| ua.contains(*token))
        .map(|token| token.to_string())
        .collect();
    let common_headers_present = req.headers.contains_key("accept") && req.headers.contains_key("user-agent");

    HttpFingerprint {
        header_signature: String::new(),
        missing_headers: Vec::new(),
        suspicious_headers: Vec::new(),
        header_order_score: if common_headers_present { 0.7 } else { 0.3 },
        automation_signatures,
        tls_fingerprint: None,
        tls_fingerprint_data: None,
    }
}

fn behavior_fallback() -> BehaviorMetrics {
    BehaviorMetrics {
        request_interval_ms: 2000.0,
        navigation_pattern: Vec::new(),
        timing_consistency: 0.5,
        human_like_score: 0.5,
        session_duration_ms: 0,
    }
}

/// Scoring-stage fallback (spec §7): a cheap UA/header heuristic used only
/// if the scoring engine itself cannot be invoked. Confidence is pinned low.
fn scoring_fallback(req: &RequestView, thresholds: &Thresholds) -> Verdict {
    let ua = req.user_agent.to_lowercase();
    let matched: Vec<&str> = FALLBACK_BOT_TOKENS.iter().filter(|t| ua.contains(**t)).copied().collect();

    let mut score: i64 = 0;
    let mut reasons = Vec::new();

    if !matched.is_empty() {
        score += 50;
        reasons.push(DetectionReason {
            category: Category::Fingerprint,
            severity: Severity::High,
            description: format!("fallback heuristic matched bot token(s): {}", matched.join(", ")),
            score: 50,
        });
    }

    let missing = FALLBACK_REQUIRED_HEADERS.iter().filter(|h| !req.headers.contains_key(**h)).count();
    if missing > 0 {
        let contribution = (10 * missing) as i64;
        score += contribution;
        reasons.push(DetectionReason {
            category: Category::Fingerprint,
            severity: Severity::Medium,
            description: format!("fallback heuristic: {missing} required header(s) missing"),
            score: contribution,
        });
    }

    let final_score = score.clamp(0, 100) as u32;
    Verdict {
        suspicion_score: final_score,
        is_suspicious: final_score >= thresholds.suspicious,
        high_risk: final_score >= thresholds.high_risk,
        confidence: 0.3,
        reasons,
        fingerprint: "fallback".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chrome_request() -> RequestView {
        let mut req = RequestView::new("GET", "/", "93.184.216.34");
        for (name, value) in [
            ("host", "example.com"),
            ("connection", "keep-alive"),
            ("cache-control", "max-age=0"),
            ("upgrade-insecure-requests", "1"),
            ("user-agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0"),
            ("accept", "text/html"),
            ("sec-fetch-site", "none"),
            ("sec-fetch-mode", "navigate"),
            ("sec-fetch-dest", "document"),
            ("accept-encoding", "gzip, deflate, br"),
            ("accept-language", "en-US,en;q=0.9"),
        ] {
            req.push_header(name, value);
        }
        req
    }

    #[tokio::test]
    async fn s1_clean_chrome_request_is_not_suspicious() {
        let engine = Engine::new(Config::default()).unwrap();
        let result = engine.analyze(&chrome_request(), "93.184.216.34", None).await;
        assert!(!result.is_suspicious, "{}", result.suspicion_score);
    }

    #[tokio::test]
    async fn s2_curl_request_is_flagged_suspicious() {
        let engine = Engine::new(Config::default()).unwrap();
        let mut req = RequestView::new("GET", "/", "203.0.113.9");
        req.push_header("host", "example.com");
        req.push_header("user-agent", "curl/7.68.0");
        req.push_header("accept", "*/*");

        let result = engine.analyze(&req, "203.0.113.9", None).await;
        assert!(result.is_suspicious);
        assert!(result.suspicion_score > 60, "{}", result.suspicion_score);
    }

    #[tokio::test]
    async fn s6_googlebot_bypasses_via_whitelist() {
        let engine = Engine::new(Config::default()).unwrap();
        let mut req = RequestView::new("GET", "/", "66.249.66.1");
        req.push_header("user-agent", "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)");

        let result = engine.analyze(&req, "66.249.66.1", None).await;
        assert!(!result.is_suspicious);
        assert_eq!(result.suspicion_score, 0);
        assert_eq!(result.reasons.len(), 1);
        assert!(result.reasons[0].description.to_lowercase().contains("whitelist"));
    }

    #[tokio::test]
    async fn whitelist_bypass_short_circuits_analyzer_timings() {
        let engine = Engine::new(Config::default()).unwrap();
        let mut req = RequestView::new("GET", "/", "66.249.66.1");
        req.push_header("user-agent", "Googlebot");
        let result = engine.analyze(&req, "66.249.66.1", None).await;
        assert_eq!(result.metadata.analyzer_times.fingerprint_ms, 0);
    }
}
