//! Whitelist manager (spec §4.6).
//!
//! `WhitelistEntry::value` is a tagged enum rather than a dynamically typed
//! field (§9 redesign guidance), and the user-agent matcher is an explicit
//! `UserAgentMatcher` variant instead of a serialized regex, so matching
//! never depends on runtime regex object identity surviving a round trip.

use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::config::WhitelistConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::geo::GeoLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Ip,
    UserAgent,
    Asn,
    Fingerprint,
}

#[derive(Clone)]
pub enum UserAgentMatcher {
    Substring(String),
    Regex(Regex),
}

impl UserAgentMatcher {
    pub fn substring(pattern: impl Into<String>) -> Self {
        Self::Substring(pattern.into())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| Error::Configuration(e.to_string()))
    }

    fn is_match(&self, ua: &str) -> bool {
        match self {
            Self::Substring(pattern) => ua.to_lowercase().contains(&pattern.to_lowercase()),
            Self::Regex(re) => re.is_match(ua),
        }
    }
}

impl std::fmt::Debug for UserAgentMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Substring(p) => write!(f, "UserAgentMatcher::Substring({p:?})"),
            Self::Regex(re) => write!(f, "UserAgentMatcher::Regex({:?})", re.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WhitelistValue {
    Ip(String),
    UserAgent(UserAgentMatcher),
    Asn(u32),
    Fingerprint(String),
}

#[derive(Debug, Clone)]
pub struct WhitelistEntry {
    pub id: String,
    pub entry_type: EntryType,
    pub value: WhitelistValue,
    pub expires_at_ms: Option<u64>,
    pub origin: String,
}

impl WhitelistEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at_ms, Some(exp) if now_ms > exp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassType {
    Ip,
    UserAgent,
    Monitoring,
    Asn,
    Fingerprint,
}

#[derive(Debug, Clone, Default)]
pub struct WhitelistCheck {
    pub is_whitelisted: bool,
    pub matched_entries: Vec<String>,
    pub reason: Option<String>,
    pub bypass_type: Option<BypassType>,
}

/// Normalize an IPv4-mapped IPv6 address (`::ffff:1.2.3.4`) down to its
/// IPv4 form before matching, per spec §4.6.
pub fn normalize_ip(ip: &str) -> String {
    ip.strip_prefix("::ffff:").unwrap_or(ip).to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct WhitelistManager {
    entries: std::sync::Mutex<Vec<WhitelistEntry>>,
    max_entries: usize,
    monitoring_tools: Vec<Regex>,
    monitoring_bypass_enabled: bool,
    next_id: std::sync::atomic::AtomicU64,
    event_sink: std::sync::Arc<dyn EventSink>,
}

impl WhitelistManager {
    pub fn new(config: &WhitelistConfig, event_sink: std::sync::Arc<dyn EventSink>) -> Self {
        let mut entries = Vec::new();
        for ip in &config.ips {
            entries.push(WhitelistEntry {
                id: format!("system-ip-{ip}"),
                entry_type: EntryType::Ip,
                value: WhitelistValue::Ip(normalize_ip(ip)),
                expires_at_ms: None,
                origin: "system".to_string(),
            });
        }
        for ua in &config.user_agents {
            entries.push(WhitelistEntry {
                id: format!("system-ua-{ua}"),
                entry_type: EntryType::UserAgent,
                value: WhitelistValue::UserAgent(UserAgentMatcher::substring(ua.clone())),
                expires_at_ms: None,
                origin: "system".to_string(),
            });
        }
        for asn in &config.asns {
            entries.push(WhitelistEntry {
                id: format!("system-asn-{asn}"),
                entry_type: EntryType::Asn,
                value: WhitelistValue::Asn(*asn),
                expires_at_ms: None,
                origin: "system".to_string(),
            });
        }

        let monitoring_tools = [
            r"(?i)pingdom",
            r"(?i)uptimerobot",
            r"(?i)datadog",
            r"(?i)newrelic",
            r"(?i)statuscake",
            r"(?i)site24x7",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

        Self {
            entries: std::sync::Mutex::new(entries),
            max_entries: config.max_entries,
            monitoring_tools,
            monitoring_bypass_enabled: config.enable_monitoring_tools_bypass,
            next_id: std::sync::atomic::AtomicU64::new(1),
            event_sink,
        }
    }

    pub fn add(&self, entry_type: EntryType, value: WhitelistValue, expires_at_ms: Option<u64>, origin: &str) -> Result<String> {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_entries {
            return Err(Error::CapacityExceeded(format!(
                "whitelist is at capacity ({} entries)",
                self.max_entries
            )));
        }
        let id = format!("entry-{}", self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst));
        entries.push(WhitelistEntry {
            id: id.clone(),
            entry_type,
            value,
            expires_at_ms,
            origin: origin.to_string(),
        });
        drop(entries);
        self.event_sink.emit(Event::EntryAdded { id: id.clone() });
        Ok(id)
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Checks `ip`/`user_agent`/`geo`/`fingerprint` against the whitelist in
    /// the spec's mandated priority order: IP, then user agent, then the
    /// monitoring-tool list, then ASN, then fingerprint. The first category
    /// with a live match wins `bypassType`; later categories are never
    /// consulted once one fires.
    pub fn check(&self, ip: &str, user_agent: &str, geo: Option<&GeoLocation>, fingerprint: Option<&str>) -> WhitelistCheck {
        let ip = normalize_ip(ip);
        let now = now_ms();
        let entries = self.entries.lock().unwrap();
        let live = || entries.iter().filter(|e| !e.is_expired(now));

        if let Some(entry) = live().find(|e| matches!(&e.value, WhitelistValue::Ip(w) if *w == ip)) {
            return WhitelistCheck {
                is_whitelisted: true,
                matched_entries: vec![entry.id.clone()],
                reason: Some(format!("whitelisted ip {ip}")),
                bypass_type: Some(BypassType::Ip),
            };
        }

        if let Some(entry) = live().find(|e| matches!(&e.value, WhitelistValue::UserAgent(m) if m.is_match(user_agent))) {
            return WhitelistCheck {
                is_whitelisted: true,
                matched_entries: vec![entry.id.clone()],
                reason: Some(format!("whitelisted user agent \"{user_agent}\"")),
                bypass_type: Some(BypassType::UserAgent),
            };
        }

        if self.monitoring_bypass_enabled && self.monitoring_tools.iter().any(|re| re.is_match(user_agent)) {
            return WhitelistCheck {
                is_whitelisted: true,
                matched_entries: vec!["monitoring-tool".to_string()],
                reason: Some("whitelist bypass (monitoring tool)".to_string()),
                bypass_type: Some(BypassType::Monitoring),
            };
        }

        if let Some(entry) = live().find(|e| matches!(&e.value, WhitelistValue::Asn(asn) if Some(*asn) == geo.map(|g| g.asn))) {
            let asn = match &entry.value {
                WhitelistValue::Asn(asn) => *asn,
                _ => unreachable!(),
            };
            return WhitelistCheck {
                is_whitelisted: true,
                matched_entries: vec![entry.id.clone()],
                reason: Some(format!("whitelisted asn {asn}")),
                bypass_type: Some(BypassType::Asn),
            };
        }

        if let Some(entry) = live().find(|e| matches!(&e.value, WhitelistValue::Fingerprint(fp) if Some(fp.as_str()) == fingerprint)) {
            let fp = match &entry.value {
                WhitelistValue::Fingerprint(fp) => fp.clone(),
                _ => unreachable!(),
            };
            return WhitelistCheck {
                is_whitelisted: true,
                matched_entries: vec![entry.id.clone()],
                reason: Some(format!("whitelisted fingerprint {fp}")),
                bypass_type: Some(BypassType::Fingerprint),
            };
        }

        WhitelistCheck::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopSink;
    use std::sync::Arc;

    fn manager(config: &WhitelistConfig) -> WhitelistManager {
        WhitelistManager::new(config, Arc::new(NoopSink))
    }

    #[test]
    fn s6_googlebot_user_agent_bypasses() {
        let manager = manager(&WhitelistConfig::default());
        let check = manager.check(
            "66.249.66.1",
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
            None,
            None,
        );
        assert!(check.is_whitelisted);
        assert_eq!(check.bypass_type, Some(BypassType::UserAgent));
    }

    #[test]
    fn ipv4_mapped_ipv6_is_normalized_before_matching() {
        let mut config = WhitelistConfig::default();
        config.ips = vec!["1.2.3.4".to_string()];
        let manager = manager(&config);
        let check = manager.check("::ffff:1.2.3.4", "anything", None, None);
        assert!(check.is_whitelisted);
    }

    #[test]
    fn expired_entries_never_match() {
        let manager = manager(&WhitelistConfig::default());
        let id = manager
            .add(EntryType::Ip, WhitelistValue::Ip("9.9.9.9".to_string()), Some(1), "test")
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let check = manager.check("9.9.9.9", "anything", None, None);
        assert!(!check.is_whitelisted);
        manager.remove(&id);
    }

    #[test]
    fn adding_beyond_capacity_fails() {
        let mut config = WhitelistConfig::default();
        config.max_entries = 0;
        let manager = manager(&config);
        let result = manager.add(EntryType::Ip, WhitelistValue::Ip("1.1.1.1".to_string()), None, "test");
        assert!(matches!(result, Err(Error::CapacityExceeded(_))));
    }

    #[test]
    fn asn_bypass_fires_when_geo_is_supplied() {
        let mut config = WhitelistConfig::default();
        config.asns = vec![64512];
        let manager = manager(&config);
        let mut geo = GeoLocation::unknown_external();
        geo.asn = 64512;
        let check = manager.check("203.0.113.1", "anything", Some(&geo), None);
        assert!(check.is_whitelisted);
        assert_eq!(check.bypass_type, Some(BypassType::Asn));
    }

    #[test]
    fn monitoring_tool_wins_over_asn_match() {
        let mut config = WhitelistConfig::default();
        config.asns = vec![64512];
        let manager = manager(&config);
        let mut geo = GeoLocation::unknown_external();
        geo.asn = 64512;
        let check = manager.check("203.0.113.1", "Pingdom.com_bot_version_1.4", Some(&geo), None);
        assert_eq!(check.bypass_type, Some(BypassType::Monitoring));
    }

    #[test]
    fn adding_entry_emits_entry_added_event() {
        let (sink, receiver) = crate::events::ChannelSink::new();
        let manager = WhitelistManager::new(&WhitelistConfig::default(), Arc::new(sink));
        let id = manager
            .add(EntryType::Ip, WhitelistValue::Ip("1.1.1.1".to_string()), None, "test")
            .unwrap();
        match receiver.recv().unwrap() {
            Event::EntryAdded { id: emitted } => assert_eq!(emitted, id),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
