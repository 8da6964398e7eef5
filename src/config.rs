//! Typed configuration tree (spec §6), one struct per enumerated block.
//!
//! Every field carries the documented default via `#[serde(default = ...)]`
//! so a caller can load a partial TOML file (or none at all) and still get
//! the spec's defaults, following the pack's common serde-config idiom.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub fingerprint: f64,
    pub behavioral: f64,
    pub geographic: f64,
    pub reputation: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            fingerprint: 0.3,
            behavioral: 0.3,
            geographic: 0.2,
            reputation: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub suspicious: u32,
    pub high_risk: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            suspicious: 30,
            high_risk: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintingConfig {
    pub required_headers: Vec<String>,
    pub suspicious_patterns: Vec<String>,
    pub automation_signatures: Vec<String>,
}

impl Default for FingerprintingConfig {
    fn default() -> Self {
        Self {
            required_headers: vec![
                "accept",
                "accept-language",
                "accept-encoding",
                "connection",
                "cache-control",
                "user-agent",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            suspicious_patterns: vec![
                r"(?i)^python", r"(?i)^go-http-client", r"(?i)^okhttp", r"(?i)webdriver",
                r"(?i)selenium",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            automation_signatures: vec![
                "selenium", "webdriver", "chromedriver", "geckodriver", "puppeteer",
                "headlesschrome", "playwright", "phantomjs", "scrapy", "python-requests",
                "curl", "wget", "go-http-client", "okhttp", "bot", "crawler", "spider", "scraper",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralConfig {
    pub min_human_interval_ms: f64,
    pub max_consistency: f64,
    pub session_timeout_ms: u64,
}

impl Default for BehavioralConfig {
    fn default() -> Self {
        Self {
            min_human_interval_ms: 500.0,
            max_consistency: 0.8,
            session_timeout_ms: 1_800_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographicConfig {
    pub high_risk_countries: Vec<String>,
    pub vpn_penalty: u32,
    pub hosting_penalty: u32,
}

impl Default for GeographicConfig {
    fn default() -> Self {
        Self {
            high_risk_countries: vec!["CN", "RU", "KP", "IR"].into_iter().map(String::from).collect(),
            vpn_penalty: 25,
            hosting_penalty: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    pub ips: Vec<String>,
    pub user_agents: Vec<String>,
    pub asns: Vec<u32>,
    pub max_entries: usize,
    pub enable_monitoring_tools_bypass: bool,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            ips: Vec::new(),
            user_agents: vec!["Googlebot", "Bingbot", "Slackbot"].into_iter().map(String::from).collect(),
            asns: Vec::new(),
            max_entries: 10_000,
            enable_monitoring_tools_bypass: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_sessions: usize,
    pub max_geo: usize,
    pub max_fingerprints: usize,
    pub session_timeout_ms: u64,
    pub geo_ttl_ms: u64,
    pub fingerprint_ttl_ms: u64,
    pub cleanup_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            max_geo: 50_000,
            max_fingerprints: 25_000,
            session_timeout_ms: 1_800_000,
            geo_ttl_ms: 86_400_000,
            fingerprint_ttl_ms: 3_600_000,
            cleanup_interval_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub minimum_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_ms: 30_000,
            minimum_requests: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerTimeouts {
    pub http_ms: u64,
    pub behavior_ms: u64,
    pub geo_ms: u64,
}

impl Default for AnalyzerTimeouts {
    fn default() -> Self {
        Self {
            http_ms: 15,
            behavior_ms: 10,
            geo_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub geo_circuit: CircuitBreakerConfig,
    pub per_analyzer_timeout_ms: AnalyzerTimeouts,
    pub total_deadline_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            geo_circuit: CircuitBreakerConfig::default(),
            per_analyzer_timeout_ms: AnalyzerTimeouts::default(),
            total_deadline_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enabled: bool,
    pub scoring_weights: ScoringWeights,
    pub thresholds: Thresholds,
    pub fingerprinting: FingerprintingConfig,
    pub behavioral: BehavioralConfig,
    pub geographic: GeographicConfig,
    pub whitelist: WhitelistConfig,
    pub cache: CacheConfig,
    pub resilience: ResilienceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            scoring_weights: ScoringWeights::default(),
            thresholds: Thresholds::default(),
            fingerprinting: FingerprintingConfig::default(),
            behavioral: BehavioralConfig::default(),
            geographic: GeographicConfig::default(),
            whitelist: WhitelistConfig::default(),
            cache: CacheConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(src).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// At least one scoring weight must be positive, or no signal can ever
    /// move the final score.
    pub fn validate(&self) -> Result<()> {
        let w = &self.scoring_weights;
        if w.fingerprint < 0.0 || w.behavioral < 0.0 || w.geographic < 0.0 || w.reputation < 0.0 {
            return Err(Error::Configuration("scoring weights must be non-negative".into()));
        }
        if w.fingerprint + w.behavioral + w.geographic + w.reputation <= 0.0 {
            return Err(Error::Configuration(
                "at least one scoring weight must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.thresholds.suspicious, 30);
        assert_eq!(config.thresholds.high_risk, 70);
        assert_eq!(config.resilience.total_deadline_ms, 50);
    }

    #[test]
    fn all_zero_weights_is_a_configuration_error() {
        let mut config = Config::default();
        config.scoring_weights = ScoringWeights {
            fingerprint: 0.0,
            behavioral: 0.0,
            geographic: 0.0,
            reputation: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config = Config::from_toml_str("enabled = false\n").unwrap();
        assert!(!config.enabled);
        assert_eq!(config.thresholds.suspicious, 30);
    }
}
