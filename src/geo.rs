//! Geographic / ASN analyzer (spec §4.5).
//!
//! The deterministic-simulation fallback directly generalizes the teacher's
//! hashing idiom (`generate_fingerprint`, `reducers::VerdictCache::cache_key`,
//! both keyed off `DefaultHasher`) instead of reaching for `rand`, so the
//! same IP always simulates the same location and tests stay deterministic
//! (§9 design note: "simulation mode is not authoritative").

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::cache::Cache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{CircuitBreakerConfig, GeographicConfig};
use crate::timeout;

#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub country: String,
    pub region: String,
    pub city: String,
    pub asn: u32,
    pub organization: String,
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_hosting: bool,
    pub is_tor: bool,
    pub is_high_risk_country: bool,
    pub risk_score: u32,
}

impl GeoLocation {
    fn sentinel(risk_score: u32) -> Self {
        Self {
            country: "unknown".to_string(),
            region: "unknown".to_string(),
            city: "unknown".to_string(),
            asn: 0,
            organization: "unknown".to_string(),
            is_vpn: false,
            is_proxy: false,
            is_hosting: false,
            is_tor: false,
            is_high_risk_country: false,
            risk_score,
        }
    }

    pub fn local() -> Self {
        Self::sentinel(0)
    }

    pub fn unknown_external() -> Self {
        Self::sentinel(10)
    }

    pub fn unknown_private() -> Self {
        Self::sentinel(0)
    }
}

/// Pluggable source of raw geo/ASN facts. Production callers supply a real
/// MaxMind-backed (or similar) implementation; its download/refresh tooling
/// is out of scope here (spec §1 non-goals).
pub trait GeoResolver: Send + Sync {
    fn resolve(&self, ip: &str) -> Option<RawGeoFacts>;
}

#[derive(Debug, Clone)]
pub struct RawGeoFacts {
    pub country: String,
    pub region: String,
    pub city: String,
    pub asn: u32,
    pub organization: String,
}

/// Deterministic stand-in used when no resolver is configured, or when the
/// configured one errors/returns nothing. Not authoritative.
pub struct SimulatedResolver;

impl GeoResolver for SimulatedResolver {
    fn resolve(&self, ip: &str) -> Option<RawGeoFacts> {
        let mut hasher = DefaultHasher::new();
        ip.hash(&mut hasher);
        let seed = hasher.finish();

        const COUNTRIES: &[&str] = &["US", "DE", "GB", "CN", "RU", "BR", "IN", "JP", "FR", "NL"];
        const ORGS: &[&str] = &[
            "Example Hosting LLC",
            "Consumer Broadband Inc",
            "Cloud Compute Co",
            "Residential ISP",
            "Anonymous VPN Services",
        ];

        let country = COUNTRIES[(seed % COUNTRIES.len() as u64) as usize].to_string();
        let organization = ORGS[((seed / 7) % ORGS.len() as u64) as usize].to_string();
        let asn = 10_000 + (seed % 50_000) as u32;

        Some(RawGeoFacts {
            country,
            region: "unknown".to_string(),
            city: "unknown".to_string(),
            asn,
            organization,
        })
    }
}

fn is_private_or_loopback(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}

pub struct GeoAnalyzer {
    cache: Cache<String, GeoLocation>,
    resolver: Box<dyn GeoResolver>,
    circuit_breaker: Arc<CircuitBreaker>,
    vpn_pattern: Regex,
    proxy_pattern: Regex,
    tor_pattern: Regex,
    hosting_pattern: Regex,
    high_risk_countries: Vec<String>,
    vpn_penalty: u32,
    hosting_penalty: u32,
    geo_ttl: Duration,
}

impl GeoAnalyzer {
    pub fn new(
        config: &GeographicConfig,
        cache_capacity: usize,
        geo_ttl: Duration,
        circuit_config: &CircuitBreakerConfig,
        resolver: Box<dyn GeoResolver>,
    ) -> Self {
        Self {
            cache: Cache::new(cache_capacity),
            resolver,
            circuit_breaker: Arc::new(CircuitBreaker::new(circuit_config)),
            vpn_pattern: Regex::new(r"(?i)vpn").unwrap(),
            proxy_pattern: Regex::new(r"(?i)proxy|anonymizer").unwrap(),
            tor_pattern: Regex::new(r"(?i)tor|onion").unwrap(),
            hosting_pattern: Regex::new(r"(?i)hosting|datacenter|data center|cloud").unwrap(),
            high_risk_countries: config.high_risk_countries.clone(),
            vpn_penalty: config.vpn_penalty,
            hosting_penalty: config.hosting_penalty,
            geo_ttl,
        }
    }

    pub async fn analyze(&self, ip: &str, timeout_ms: u64) -> (GeoLocation, bool) {
        let parsed = match IpAddr::from_str(ip) {
            Ok(addr) => addr,
            Err(_) => return (GeoLocation::unknown_external(), false),
        };

        if is_private_or_loopback(&parsed) {
            return (GeoLocation::local(), false);
        }

        if let Some(cached) = self.cache.get(&ip.to_string()) {
            return (cached, false);
        }

        let ip_owned = ip.to_string();
        let resolved = self
            .circuit_breaker
            .execute(
                || async { self.resolve_and_classify(&ip_owned) },
                GeoLocation::unknown_external,
            );

        let (location, timed_out) =
            timeout::with_timeout(timeout_ms, resolved, GeoLocation::unknown_external).await;

        self.cache.set(ip.to_string(), location.clone(), self.geo_ttl);
        (location, timed_out)
    }

    /// Shared handle to the resolver's circuit breaker, for the health
    /// monitor (spec §4.11) to report on without duplicating its state.
    pub fn circuit_breaker(&self) -> Arc<CircuitBreaker> {
        self.circuit_breaker.clone()
    }

    /// Returns the cached location for `ip` without resolving it, for
    /// callers that need a best-effort peek (e.g. the whitelist ASN check)
    /// without paying for a lookup or blocking on the circuit breaker.
    pub fn peek_cached(&self, ip: &str) -> Option<GeoLocation> {
        self.cache.get(&ip.to_string())
    }

    /// Evict expired cache entries. Returns the count evicted.
    pub fn sweep(&self) -> usize {
        self.cache.sweep()
    }

    fn resolve_and_classify(&self, ip: &str) -> Option<GeoLocation> {
        let facts = self.resolver.resolve(ip).or_else(|| SimulatedResolver.resolve(ip))?;
        Some(self.classify(facts))
    }

    fn classify(&self, facts: RawGeoFacts) -> GeoLocation {
        let is_vpn = self.vpn_pattern.is_match(&facts.organization);
        let is_proxy = self.proxy_pattern.is_match(&facts.organization);
        let is_tor = self.tor_pattern.is_match(&facts.organization);
        let is_hosting = self.hosting_pattern.is_match(&facts.organization) || is_known_hosting_asn(facts.asn);

        let is_high_risk_country = self.high_risk_countries.iter().any(|c| c.eq_ignore_ascii_case(&facts.country));

        let mut risk: u32 = 0;
        if is_high_risk_country {
            risk += 30;
        }
        if is_vpn {
            risk += self.vpn_penalty;
        }
        if is_proxy {
            risk += 20;
        }
        if is_hosting {
            risk += self.hosting_penalty;
        }
        if is_tor {
            risk += 40;
        }

        GeoLocation {
            country: facts.country,
            region: facts.region,
            city: facts.city,
            asn: facts.asn,
            organization: facts.organization,
            is_vpn,
            is_proxy,
            is_hosting,
            is_tor,
            is_high_risk_country,
            risk_score: risk.min(100),
        }
    }
}

/// Placeholder for a curated hosting-ASN set; real deployments would load
/// this from the same source feeding the geo resolver.
fn is_known_hosting_asn(_asn: u32) -> bool {
    false
}
