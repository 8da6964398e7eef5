//! Threat scoring engine (spec §4.7).

use crate::behavior::BehaviorMetrics;
use crate::config::{Config, ScoringWeights};
use crate::error::Result;
use crate::fingerprint::HttpFingerprint;
use crate::geo::GeoLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Fingerprint,
    Behavioral,
    Geographic,
    Reputation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct DetectionReason {
    pub category: Category,
    pub severity: Severity,
    pub description: String,
    pub score: i64,
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub suspicion_score: u32,
    pub is_suspicious: bool,
    pub high_risk: bool,
    pub confidence: f64,
    pub reasons: Vec<DetectionReason>,
    pub fingerprint: String,
}

struct CategoryResult {
    category: Category,
    raw_score: f64,
    reasons: Vec<DetectionReason>,
}

pub struct ScoringEngine {
    weights: ScoringWeights,
    suspicious_threshold: u32,
    high_risk_threshold: u32,
    min_human_interval_ms: f64,
    max_consistency: f64,
    vpn_penalty: f64,
    hosting_penalty: f64,
}

const ROBOTIC_PATHS: &[&str] = &["/admin", "/wp-admin", "/login.php", "/.env", "/phpmyadmin"];

impl ScoringEngine {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            weights: config.scoring_weights.clone(),
            suspicious_threshold: config.thresholds.suspicious,
            high_risk_threshold: config.thresholds.high_risk,
            min_human_interval_ms: config.behavioral.min_human_interval_ms,
            max_consistency: config.behavioral.max_consistency,
            vpn_penalty: config.geographic.vpn_penalty as f64,
            hosting_penalty: config.geographic.hosting_penalty as f64,
        })
    }

    pub fn score(
        &self,
        fingerprint: &HttpFingerprint,
        behavior: &BehaviorMetrics,
        geo: &GeoLocation,
        reputation: Option<u32>,
    ) -> Verdict {
        let fp_result = self.score_fingerprint(fingerprint);
        let behavior_result = self.score_behavior(behavior);
        let geo_result = self.score_geo(geo);
        let reputation_result = self.score_reputation(reputation);

        let categories = [&fp_result, &behavior_result, &geo_result, &reputation_result];

        let weighted_sum: f64 = categories.iter().map(|c| self.weight_for(c.category) * c.raw_score.clamp(0.0, 100.0)).sum();
        let weight_total: f64 = categories
            .iter()
            .filter(|c| !c.reasons.is_empty() || matches!(c.category, Category::Reputation if reputation.is_some()))
            .map(|c| self.weight_for(c.category))
            .sum();
        // Denominator is the sum of weights for categories that actually
        // contributed data, falling back to the full weight total when
        // nothing fired (keeps a silent request's score at exactly 0).
        let denom = if weight_total > 0.0 {
            weight_total
        } else {
            self.weights.fingerprint + self.weights.behavioral + self.weights.geographic + self.weights.reputation
        };
        let raw = if denom > 0.0 { weighted_sum / denom } else { 0.0 };

        let escalated = if raw > 60.0 { 60.0 + (raw - 60.0) * 1.3 } else { raw };
        let final_score = escalated.clamp(0.0, 100.0).round() as u32;

        let mut reasons = Vec::new();
        reasons.extend(fp_result.reasons);
        reasons.extend(behavior_result.reasons);
        reasons.extend(geo_result.reasons);
        reasons.extend(reputation_result.reasons);

        let confidence = self.confidence(&categories, reputation);

        let fingerprint_id = format!(
            "{}:{}:{}:{}",
            fingerprint.header_signature,
            geo.country,
            geo.asn,
            (behavior.human_like_score * 100.0).round() as i64
        );

        Verdict {
            suspicion_score: final_score,
            is_suspicious: final_score >= self.suspicious_threshold,
            high_risk: final_score >= self.high_risk_threshold,
            confidence,
            reasons,
            fingerprint: fingerprint_id,
        }
    }

    fn weight_for(&self, category: Category) -> f64 {
        match category {
            Category::Fingerprint => self.weights.fingerprint,
            Category::Behavioral => self.weights.behavioral,
            Category::Geographic => self.weights.geographic,
            Category::Reputation => self.weights.reputation,
        }
    }

    fn score_fingerprint(&self, fp: &HttpFingerprint) -> CategoryResult {
        let mut reasons = Vec::new();
        let mut score = 0.0;

        if !fp.missing_headers.is_empty() {
            let contribution = 10 * fp.missing_headers.len() as i64;
            score += contribution as f64;
            reasons.push(DetectionReason {
                category: Category::Fingerprint,
                severity: if fp.missing_headers.len() >= 2 { Severity::Medium } else { Severity::Low },
                description: format!("missing {} expected header(s)", fp.missing_headers.len()),
                score: contribution,
            });
        }

        if !fp.automation_signatures.is_empty() {
            score += 80.0;
            reasons.push(DetectionReason {
                category: Category::Fingerprint,
                severity: Severity::High,
                description: format!("automation signature(s) detected: {}", fp.automation_signatures.join(", ")),
                score: 80,
            });
        }

        if !fp.suspicious_headers.is_empty() {
            let contribution = 15 * fp.suspicious_headers.len() as i64;
            score += contribution as f64;
            reasons.push(DetectionReason {
                category: Category::Fingerprint,
                severity: Severity::Medium,
                description: format!("suspicious header(s): {}", fp.suspicious_headers.join(", ")),
                score: contribution,
            });
        }

        if fp.header_order_score < 0.3 {
            score += 25.0;
            reasons.push(DetectionReason {
                category: Category::Fingerprint,
                severity: Severity::Medium,
                description: "header order deviates from canonical browser order".to_string(),
                score: 25,
            });
        }

        CategoryResult { category: Category::Fingerprint, raw_score: score, reasons }
    }

    fn score_behavior(&self, behavior: &BehaviorMetrics) -> CategoryResult {
        let mut reasons = Vec::new();
        let mut score = 0.0;

        if behavior.request_interval_ms > 0.0 && behavior.request_interval_ms < self.min_human_interval_ms {
            let contribution = 40.0 * (self.min_human_interval_ms - behavior.request_interval_ms) / self.min_human_interval_ms;
            score += contribution;
            reasons.push(DetectionReason {
                category: Category::Behavioral,
                severity: if behavior.request_interval_ms < 100.0 { Severity::High } else { Severity::Medium },
                description: format!("request interval {:.0}ms is faster than human-plausible", behavior.request_interval_ms),
                score: contribution.round() as i64,
            });
        }

        if behavior.timing_consistency > self.max_consistency {
            let contribution = 30.0 * (behavior.timing_consistency - self.max_consistency) / (1.0 - self.max_consistency);
            score += contribution;
            reasons.push(DetectionReason {
                category: Category::Behavioral,
                severity: Severity::Medium,
                description: format!("timing consistency {:.2} exceeds human variability", behavior.timing_consistency),
                score: contribution.round() as i64,
            });
        }

        if behavior.human_like_score < 0.3 {
            let contribution = 60.0 * (0.3 - behavior.human_like_score) / 0.3;
            score += contribution;
            reasons.push(DetectionReason {
                category: Category::Behavioral,
                severity: Severity::High,
                description: format!("human-like score {:.2} is far below baseline", behavior.human_like_score),
                score: contribution.round() as i64,
            });
        }

        if behavior
            .navigation_pattern
            .iter()
            .any(|entry| ROBOTIC_PATHS.iter().any(|p| entry.contains(p)))
        {
            score += 20.0;
            reasons.push(DetectionReason {
                category: Category::Behavioral,
                severity: Severity::Medium,
                description: "navigation touched a sensitive/scanned path".to_string(),
                score: 20,
            });
        }

        CategoryResult { category: Category::Behavioral, raw_score: score, reasons }
    }

    fn score_geo(&self, geo: &GeoLocation) -> CategoryResult {
        let mut reasons = Vec::new();
        let mut score = 0.0;

        if geo.is_tor {
            score += 40.0;
            reasons.push(DetectionReason {
                category: Category::Geographic,
                severity: Severity::High,
                description: "exit node or onion-routed organization".to_string(),
                score: 40,
            });
        }
        if geo.is_vpn {
            let contribution = self.vpn_penalty;
            score += contribution;
            reasons.push(DetectionReason {
                category: Category::Geographic,
                severity: Severity::Medium,
                description: "organization matches known VPN provider".to_string(),
                score: contribution.round() as i64,
            });
        }
        if geo.is_proxy {
            score += 20.0;
            reasons.push(DetectionReason {
                category: Category::Geographic,
                severity: Severity::Medium,
                description: "organization matches proxy/anonymizer pattern".to_string(),
                score: 20,
            });
        }
        if geo.is_hosting {
            let contribution = self.hosting_penalty;
            score += contribution;
            reasons.push(DetectionReason {
                category: Category::Geographic,
                severity: Severity::Low,
                description: "address belongs to a hosting/datacenter network".to_string(),
                score: contribution.round() as i64,
            });
        }
        if geo.is_high_risk_country {
            score += 30.0;
            reasons.push(DetectionReason {
                category: Category::Geographic,
                severity: Severity::Medium,
                description: format!("origin country {} is on the high-risk list", geo.country),
                score: 30,
            });
        }

        CategoryResult { category: Category::Geographic, raw_score: score, reasons }
    }

    fn score_reputation(&self, reputation: Option<u32>) -> CategoryResult {
        let mut reasons = Vec::new();
        let mut score = 0.0;
        if let Some(rep) = reputation {
            if rep >= 30 {
                score += rep as f64;
                reasons.push(DetectionReason {
                    category: Category::Reputation,
                    severity: if rep > 70 { Severity::High } else { Severity::Medium },
                    description: format!("external reputation score {rep}"),
                    score: rep as i64,
                });
            }
        }
        CategoryResult { category: Category::Reputation, raw_score: score, reasons }
    }

    fn confidence(&self, categories: &[&CategoryResult; 4], reputation: Option<u32>) -> f64 {
        let mut confidence = 0.5;
        let contributing = categories.iter().filter(|c| !c.reasons.is_empty()).count();
        confidence += (0.1 * contributing as f64).min(0.4);
        if reputation.is_some() {
            confidence += 0.1;
        }

        let max_score = categories.iter().map(|c| c.raw_score).fold(0.0_f64, f64::max);
        let min_score = categories.iter().map(|c| c.raw_score).fold(f64::MAX, f64::min);
        if max_score >= 70.0 && min_score == 0.0 {
            confidence -= 0.2;
        }

        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fingerprint::HttpFingerprint;

    fn engine() -> ScoringEngine {
        ScoringEngine::new(&Config::default()).unwrap()
    }

    fn clean_fingerprint() -> HttpFingerprint {
        HttpFingerprint {
            header_signature: "abc".to_string(),
            missing_headers: Vec::new(),
            suspicious_headers: Vec::new(),
            header_order_score: 0.9,
            automation_signatures: Vec::new(),
            tls_fingerprint: None,
            tls_fingerprint_data: None,
        }
    }

    fn clean_behavior() -> BehaviorMetrics {
        BehaviorMetrics {
            request_interval_ms: 2000.0,
            navigation_pattern: vec!["GET:/".to_string()],
            timing_consistency: 0.2,
            human_like_score: 0.9,
            session_duration_ms: 5000,
        }
    }

    fn clean_geo() -> GeoLocation {
        GeoLocation {
            country: "US".to_string(),
            region: "CA".to_string(),
            city: "SF".to_string(),
            asn: 1234,
            organization: "Residential ISP".to_string(),
            is_vpn: false,
            is_proxy: false,
            is_hosting: false,
            is_tor: false,
            is_high_risk_country: false,
            risk_score: 0,
        }
    }

    #[test]
    fn score_bounds_always_hold() {
        let verdict = engine().score(&clean_fingerprint(), &clean_behavior(), &clean_geo(), None);
        assert!(verdict.suspicion_score <= 100);
        assert!((0.0..=1.0).contains(&verdict.confidence));
    }

    #[test]
    fn s1_clean_chrome_like_signal_is_not_suspicious() {
        let verdict = engine().score(&clean_fingerprint(), &clean_behavior(), &clean_geo(), None);
        assert!(verdict.suspicion_score < 30, "{}", verdict.suspicion_score);
        assert!(!verdict.is_suspicious);
    }

    #[test]
    fn automation_signature_pushes_score_above_threshold() {
        let mut fp = clean_fingerprint();
        fp.automation_signatures = vec!["curl".to_string()];
        fp.missing_headers = vec!["accept-language".to_string(), "accept-encoding".to_string(), "connection".to_string()];
        fp.header_order_score = 0.1;

        let verdict = engine().score(&fp, &clean_behavior(), &clean_geo(), None);
        assert!(verdict.suspicion_score > 60, "{}", verdict.suspicion_score);
        assert!(verdict.is_suspicious);
    }

    #[test]
    fn monotonicity_more_missing_headers_never_decreases_score() {
        let mut fp1 = clean_fingerprint();
        fp1.missing_headers = vec!["accept-language".to_string()];
        let verdict1 = engine().score(&fp1, &clean_behavior(), &clean_geo(), None);

        let mut fp2 = fp1.clone();
        fp2.missing_headers.push("accept-encoding".to_string());
        let verdict2 = engine().score(&fp2, &clean_behavior(), &clean_geo(), None);

        assert!(verdict2.suspicion_score >= verdict1.suspicion_score);
    }

    #[test]
    fn fallback_confidence_is_capped() {
        // A fallback verdict uses the same engine but must be constructed
        // with confidence <= 0.3 by the caller (coordinator); here we check
        // the raw confidence formula doesn't exceed 1.0 in the worst case.
        let mut fp = clean_fingerprint();
        fp.automation_signatures = vec!["bot".to_string()];
        fp.missing_headers = vec!["a".to_string(), "b".to_string()];
        fp.suspicious_headers = vec!["c".to_string()];
        fp.header_order_score = 0.0;

        let verdict = engine().score(&fp, &clean_behavior(), &clean_geo(), Some(90));
        assert!(verdict.confidence <= 1.0);
    }
}
