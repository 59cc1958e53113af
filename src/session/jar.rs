//! Upstream cookie jar kept on behalf of one browser session.
//!
//! Parsing and matching follow RFC 6265 closely enough for a single
//! upstream site: domain-match, default-path, `Max-Age` over `Expires`.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use url::Url;

/// A single stored upstream cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    /// Lowercase host (host-only) or domain attribute without leading dot.
    pub domain: String,
    pub host_only: bool,
    pub path: String,
    /// Expiry as unix seconds. `None` lives as long as the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl CookieEntry {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn same_key(&self, other: &CookieEntry) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_match(&host, &self.domain)
        };
        domain_ok && path_match(url.path(), &self.path) && (!self.secure || url.scheme() == "https")
    }
}

/// Cookie jar persisted per session token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar {
    entries: Vec<CookieEntry>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CookieEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CookieEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Upsert by (name, domain, path). An empty or expired entry deletes.
    pub fn insert(&mut self, entry: CookieEntry, now: i64) {
        self.entries.retain(|existing| !existing.same_key(&entry));
        if !entry.value.is_empty() && !entry.is_expired(now) {
            self.entries.push(entry);
        }
    }

    /// Merge raw `Set-Cookie` values received for `url`. Returns how many
    /// headers were accepted.
    pub fn merge_set_cookies<'a, I>(&mut self, headers: I, url: &Url, now: i64) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut accepted = 0;
        for raw in headers {
            match parse_set_cookie(raw, url, now) {
                Some(entry) => {
                    self.insert(entry, now);
                    accepted += 1;
                }
                None => tracing::debug!(url = %url.path(), "Ignoring malformed or foreign Set-Cookie"),
            }
        }
        accepted
    }

    /// Drop expired and empty entries.
    pub fn prune(&mut self, now: i64) {
        self.entries.retain(|entry| !entry.value.is_empty() && !entry.is_expired(now));
    }

    /// Compose the `Cookie` header for a request to `url`.
    pub fn cookie_header(&self, url: &Url, now: i64) -> Option<String> {
        let mut matching: Vec<&CookieEntry> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now) && entry.matches(url))
            .collect();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        let pairs: Vec<String> = matching
            .iter()
            .map(|entry| format!("{}={}", entry.name, entry.value))
            .collect();
        Some(pairs.join("; "))
    }
}

/// Parse one `Set-Cookie` header value received from `url`.
///
/// Returns `None` for malformed values and for `Domain` attributes that do
/// not cover the responding host.
pub fn parse_set_cookie(raw: &str, url: &Url, now: i64) -> Option<CookieEntry> {
    let host = url.host_str()?.to_ascii_lowercase();
    let mut parts = raw.split(';');

    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"');

    let mut entry = CookieEntry {
        name: name.to_string(),
        value: value.to_string(),
        domain: host.clone(),
        host_only: true,
        path: default_path(url.path()),
        expires: None,
        secure: false,
        http_only: false,
        same_site: None,
    };
    let mut max_age: Option<i64> = None;
    let mut expires: Option<i64> = None;

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr.trim(), ""),
        };

        match key.to_ascii_lowercase().as_str() {
            "max-age" => {
                if let Ok(secs) = val.parse::<i64>() {
                    max_age = Some(if secs <= 0 { 0 } else { now.saturating_add(secs) });
                }
            }
            "expires" => expires = parse_cookie_date(val).or(expires),
            "domain" => {
                let domain = val.trim_start_matches('.').to_ascii_lowercase();
                if domain.is_empty() {
                    continue;
                }
                if !domain_match(&host, &domain) {
                    return None;
                }
                entry.domain = domain;
                entry.host_only = false;
            }
            "path" if val.starts_with('/') => entry.path = val.to_string(),
            "secure" => entry.secure = true,
            "httponly" => entry.http_only = true,
            "samesite" if !val.is_empty() => entry.same_site = Some(val.to_string()),
            _ => {}
        }
    }

    entry.expires = max_age.or(expires);
    Some(entry)
}

fn parse_cookie_date(value: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.timestamp());
    }
    ["%a, %d-%b-%Y %H:%M:%S GMT", "%a, %d-%b-%y %H:%M:%S GMT", "%A, %d-%b-%y %H:%M:%S GMT"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc().timestamp())
}

fn domain_match(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    host.parse::<std::net::IpAddr>().is_err()
        && host.len() > domain.len()
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}
