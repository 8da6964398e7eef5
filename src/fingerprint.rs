//! HTTP fingerprint analyzer (spec §4.3).
//!
//! Automation-token matching uses `aho_corasick::AhoCorasick`, the same
//! multi-pattern engine the teacher's `reducers::NoiseDetector` already uses
//! to spot known scanner/exploit-kit noise in a single pass over the
//! payload; here the "payload" is the concatenation of header names and
//! values instead of a raw TCP banner.

use aho_corasick::AhoCorasick;
use regex::Regex;

use crate::config::FingerprintingConfig;
use crate::hash::djb2_hex;
use crate::request::RequestView;

/// Canonical browser header order used to score `headerOrderScore`.
pub const CANONICAL_HEADER_ORDER: &[&str] = &[
    "host",
    "connection",
    "cache-control",
    "upgrade-insecure-requests",
    "user-agent",
    "accept",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-dest",
    "accept-encoding",
    "accept-language",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsFingerprintData {
    pub protocol: Option<String>,
    pub cipher: Option<String>,
    pub consistency_score: f64,
    pub is_known_bot_pattern: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HttpFingerprint {
    pub header_signature: String,
    pub missing_headers: Vec<String>,
    pub suspicious_headers: Vec<String>,
    pub header_order_score: f64,
    pub automation_signatures: Vec<String>,
    pub tls_fingerprint: Option<String>,
    pub tls_fingerprint_data: Option<TlsFingerprintData>,
}

/// Analyzer wrapping the precompiled pattern matchers so they are built
/// once, not per request.
pub struct FingerprintAnalyzer {
    required_headers: Vec<String>,
    suspicious_patterns: Vec<Regex>,
    automation_matcher: AhoCorasick,
}

impl FingerprintAnalyzer {
    pub fn new(config: &FingerprintingConfig) -> Self {
        let suspicious_patterns = config
            .suspicious_patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        let automation_matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&config.automation_signatures)
            .expect("automation signature patterns must compile");

        Self {
            required_headers: config.required_headers.clone(),
            suspicious_patterns,
            automation_matcher,
        }
    }

    pub fn analyze(&self, req: &RequestView) -> HttpFingerprint {
        let header_signature = self.header_signature(req);
        let missing_headers = self.missing_headers(req);
        let suspicious_headers = self.suspicious_headers(req);
        let header_order_score = self.header_order_score(req);
        let automation_signatures = self.automation_signatures(req);

        let (tls_fingerprint, tls_fingerprint_data) = if req.is_encrypted() {
            self.analyze_tls(req, header_order_score)
        } else {
            (None, None)
        };

        HttpFingerprint {
            header_signature,
            missing_headers,
            suspicious_headers,
            header_order_score,
            automation_signatures,
            tls_fingerprint,
            tls_fingerprint_data,
        }
    }

    fn header_signature(&self, req: &RequestView) -> String {
        let mut pairs: Vec<(String, usize)> = req
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.len()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let joined = pairs
            .into_iter()
            .map(|(name, len)| format!("{name}:{len}"))
            .collect::<Vec<_>>()
            .join("|");
        djb2_hex(&joined)
    }

    fn missing_headers(&self, req: &RequestView) -> Vec<String> {
        self.required_headers
            .iter()
            .filter(|name| !req.headers.contains_key(*name))
            .cloned()
            .collect()
    }

    fn suspicious_headers(&self, req: &RequestView) -> Vec<String> {
        let mut found = Vec::new();
        for (name, value) in &req.headers {
            let matched = self
                .suspicious_patterns
                .iter()
                .any(|re| re.is_match(name) || re.is_match(value));
            if matched && !found.contains(name) {
                found.push(name.clone());
            }
        }
        found.sort();
        found
    }

    fn header_order_score(&self, req: &RequestView) -> f64 {
        if req.raw_header_order.is_empty() {
            return 0.0;
        }
        let observed_len = req.raw_header_order.len();
        let canonical_len = CANONICAL_HEADER_ORDER.len();
        let matches = req
            .raw_header_order
            .iter()
            .zip(CANONICAL_HEADER_ORDER.iter())
            .filter(|(observed, canonical)| observed.as_str() == **canonical)
            .count();
        (matches as f64 / observed_len.max(canonical_len) as f64).clamp(0.0, 1.0)
    }

    fn automation_signatures(&self, req: &RequestView) -> Vec<String> {
        let mut tokens = Vec::new();
        for (name, value) in &req.headers {
            for haystack in [name.as_str(), value.as_str()] {
                for m in self.automation_matcher.find_iter(haystack) {
                    let token = haystack[m.start()..m.end()].to_lowercase();
                    if !tokens.contains(&token) {
                        tokens.push(token);
                    }
                }
            }
        }
        tokens.sort();
        tokens
    }

    /// TLS analysis is best-effort: any failure here yields `None` rather
    /// than propagating, so the overall fingerprint never fails because of it.
    fn analyze_tls(
        &self,
        req: &RequestView,
        header_order_score: f64,
    ) -> (Option<String>, Option<TlsFingerprintData>) {
        let tls = match &req.tls {
            Some(tls) => tls,
            None => return (None, None),
        };
        // Modern browsers send a well-ordered header set; a TLS session
        // paired with a sparse/out-of-order header set is inconsistent with
        // a real browser negotiating that handshake.
        let consistency_score = header_order_score;
        let is_known_bot_pattern = consistency_score < 0.2;

        (
            Some("tls-present".to_string()),
            Some(TlsFingerprintData {
                protocol: tls.protocol.clone(),
                cipher: tls.cipher.clone(),
                consistency_score,
                is_known_bot_pattern,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FingerprintingConfig;

    fn analyzer() -> FingerprintAnalyzer {
        FingerprintAnalyzer::new(&FingerprintingConfig::default())
    }

    fn chrome_request() -> RequestView {
        let mut req = RequestView::new("GET", "/", "1.2.3.4");
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

    #[test]
    fn s1_chrome_desktop_has_no_missing_or_automation_signatures() {
        let fp = analyzer().analyze(&chrome_request());
        assert!(fp.missing_headers.is_empty());
        assert!(fp.automation_signatures.is_empty());
        assert!(fp.header_order_score > 0.6, "{}", fp.header_order_score);
    }

    #[test]
    fn s2_curl_is_flagged() {
        let mut req = RequestView::new("GET", "/", "1.2.3.4");
        req.push_header("host", "example.com");
        req.push_header("user-agent", "curl/7.68.0");
        req.push_header("accept", "*/*");

        let fp = analyzer().analyze(&req);
        assert!(fp.missing_headers.contains(&"accept-language".to_string()));
        assert!(fp.missing_headers.contains(&"accept-encoding".to_string()));
        assert!(fp.missing_headers.contains(&"connection".to_string()));
        assert!(fp.automation_signatures.contains(&"curl".to_string()));
        assert!(fp.header_order_score < 0.3);
    }

    #[test]
    fn s4_selenium_headers_are_suspicious_and_automated() {
        let mut req = chrome_request();
        req.push_header("webdriver", "true");
        req.push_header("x-selenium-test", "automated");

        let fp = analyzer().analyze(&req);
        assert!(fp.automation_signatures.contains(&"webdriver".to_string()));
        assert!(fp.suspicious_headers.contains(&"webdriver".to_string()));
        assert!(fp.suspicious_headers.contains(&"x-selenium-test".to_string()));
    }

    #[test]
    fn header_signature_is_deterministic() {
        let fp1 = analyzer().analyze(&chrome_request());
        let fp2 = analyzer().analyze(&chrome_request());
        assert_eq!(fp1.header_signature, fp2.header_signature);
    }

    #[test]
    fn empty_raw_order_scores_zero() {
        let req = RequestView::new("GET", "/", "1.2.3.4");
        let fp = analyzer().analyze(&req);
        assert_eq!(fp.header_order_score, 0.0);
    }
}
