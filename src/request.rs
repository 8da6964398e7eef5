//! Caller-supplied request facts (spec §3 `RequestView`).
//!
//! This is the sole adapter boundary between a web framework and the core:
//! nothing downstream ever touches a framework request type directly.

use std::collections::HashMap;

/// TLS facts for the transport a request arrived on, if known.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TlsInfo {
    pub protocol: Option<String>,
    pub cipher: Option<String>,
    pub encrypted: bool,
}

/// Immutable snapshot of one incoming request, as extracted by the caller.
#[derive(Debug, Clone)]
pub struct RequestView {
    pub method: String,
    pub path: String,
    pub client_ip: String,
    pub user_agent: String,
    /// Lower-cased header name -> value, multi-values already joined with ", ".
    pub headers: HashMap<String, String>,
    /// Header names in wire order, lower-cased, duplicates preserved.
    pub raw_header_order: Vec<String>,
    pub tls: Option<TlsInfo>,
}

impl RequestView {
    pub fn new(method: impl Into<String>, path: impl Into<String>, client_ip: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            client_ip: client_ip.into(),
            user_agent: String::new(),
            headers: HashMap::new(),
            raw_header_order: Vec::new(),
            tls: None,
        }
    }

    /// Normalize and insert a header: lower-case the name, join repeats.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.push_header(name, value);
        self
    }

    pub fn push_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref().to_lowercase();
        let value = value.into();
        self.raw_header_order.push(name.clone());
        self.headers
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
        if self.headers.get("user-agent").is_some() && self.user_agent.is_empty() {
            self.user_agent = self.headers.get("user-agent").cloned().unwrap_or_default();
        }
    }

    pub fn with_tls(mut self, tls: TlsInfo) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn is_encrypted(&self) -> bool {
        self.tls.as_ref().map(|t| t.encrypted).unwrap_or(false)
    }

    /// `METHOD:path`, used by behavioral navigation analysis.
    pub fn navigation_key(&self) -> String {
        format!("{}:{}", self.method, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_are_lowercased_and_joined() {
        let req = RequestView::new("GET", "/", "1.2.3.4")
            .with_header("Accept", "text/html")
            .with_header("Accept", "application/json");

        assert_eq!(req.header("accept"), Some("text/html, application/json"));
    }

    #[test]
    fn user_agent_is_picked_up_from_headers() {
        let req = RequestView::new("GET", "/", "1.2.3.4").with_header("User-Agent", "curl/7.68.0");
        assert_eq!(req.user_agent, "curl/7.68.0");
    }

    #[test]
    fn navigation_key_combines_method_and_path() {
        let req = RequestView::new("POST", "/login", "1.2.3.4");
        assert_eq!(req.navigation_key(), "POST:/login");
    }
}
