//! Per-IP session store (spec §3 `SessionData`, §4.2).
//!
//! Generalizes the teacher's `reducers::RateTracker` — a `Mutex<HashMap<String,
//! Arc<RateStats>>>` keyed by IP, with `cleanup_inactive` sweeping stale
//! entries — from a bare timestamp ring into the full rolling request
//! history the scoring engine needs.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::Cache;
use crate::request::RequestView;

/// Maximum number of requests retained per session (spec invariant).
pub const MAX_REQUEST_LOG: usize = 100;

#[derive(Debug, Clone)]
pub struct RequestLog {
    pub timestamp_ms: u64,
    pub path: String,
    pub method: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct SessionData {
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub request_count: u64,
    pub requests: Vec<RequestLog>,
    pub fingerprints: HashSet<String>,
    pub suspicion_history: Vec<u32>,
}

impl SessionData {
    fn new(now_ms: u64) -> Self {
        Self {
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            request_count: 0,
            requests: Vec::new(),
            fingerprints: HashSet::new(),
            suspicion_history: Vec::new(),
        }
    }

    fn record(&mut self, now_ms: u64, req: &RequestView) {
        self.last_seen_ms = now_ms;
        self.request_count += 1;
        self.requests.push(RequestLog {
            timestamp_ms: now_ms,
            path: req.path.clone(),
            method: req.method.clone(),
            user_agent: req.user_agent.clone(),
        });
        if self.requests.len() > MAX_REQUEST_LOG {
            let overflow = self.requests.len() - MAX_REQUEST_LOG;
            self.requests.drain(0..overflow);
        }
    }

    pub fn push_suspicion(&mut self, score: u32, max_history: usize) {
        self.suspicion_history.push(score);
        if self.suspicion_history.len() > max_history {
            let overflow = self.suspicion_history.len() - max_history;
            self.suspicion_history.drain(0..overflow);
        }
    }

    pub fn push_fingerprint(&mut self, fingerprint: String) {
        self.fingerprints.insert(fingerprint);
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-IP session store backed by the shared LRU+TTL cache.
pub struct SessionStore {
    cache: Cache<String, SessionData>,
    session_timeout: Duration,
}

impl SessionStore {
    pub fn new(max_sessions: usize, session_timeout: Duration) -> Self {
        Self {
            cache: Cache::new(max_sessions),
            session_timeout,
        }
    }

    /// Append a request to the session for `ip`, creating it if absent.
    /// The read-modify-write happens under one lock acquisition so
    /// concurrent `track` calls for the same IP never lose an update.
    pub fn track(&self, ip: &str, req: &RequestView) -> SessionData {
        let now = now_ms();
        let ttl = self.session_timeout;
        self.cache
            .update_or_insert_with(ip.to_string(), ttl, |existing| {
                let mut session = existing.unwrap_or_else(|| SessionData::new(now));
                session.record(now, req);
                session
            });
        self.cache.get(&ip.to_string()).expect("just inserted")
    }

    pub fn get(&self, ip: &str) -> Option<SessionData> {
        self.cache.get(&ip.to_string())
    }

    pub fn set(&self, ip: &str, data: SessionData) {
        self.cache.set(ip.to_string(), data, self.session_timeout);
    }

    pub fn clear(&self, ip: &str) -> bool {
        self.cache.delete(&ip.to_string())
    }

    /// Evict sessions whose `lastSeen` is older than `sessionTimeout`.
    pub fn sweep(&self) -> usize {
        self.cache.sweep()
    }

    pub fn len(&self) -> usize {
        self.cache.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
