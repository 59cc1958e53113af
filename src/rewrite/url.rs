//! Host and path canonicalization helpers.
//!
//! Everything here is pure string work; the only URL parsing happens once,
//! when the upstream base URL is turned into an [`UpstreamOrigin`].

use regex::Captures;
use url::Url;

/// The mirrored site's origin, pre-split for cheap comparisons.
#[derive(Debug, Clone)]
pub struct UpstreamOrigin {
    url: Url,
    origin: String,
    authority: String,
    host: String,
}

impl UpstreamOrigin {
    /// Parse an upstream base URL such as `https://portal.example.org`.
    pub fn parse(base_url: &str) -> Result<Self, String> {
        let url = Url::parse(base_url).map_err(|e| e.to_string())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme {:?}", url.scheme()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| "missing host".to_string())?
            .to_ascii_lowercase();
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.clone(),
        };
        let origin = format!("{}://{}", url.scheme(), authority);

        Ok(Self { url, origin, authority, host })
    }

    /// `scheme://host[:port]` without a trailing slash.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// `host[:port]`, the value sent as `Host` upstream.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Lowercase host without port.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the upstream is reached on, explicit or scheme default.
    pub fn effective_port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// True when `authority` names exactly this upstream.
    ///
    /// Comparison is case-insensitive, ignores userinfo, and treats the
    /// scheme's default port spelled out explicitly as equivalent.
    pub fn matches_authority(&self, authority: &str) -> bool {
        let authority = authority
            .rsplit_once('@')
            .map(|(_, host)| host)
            .unwrap_or(authority);

        if authority.eq_ignore_ascii_case(&self.authority) {
            return true;
        }

        match (authority.rsplit_once(':'), self.url.port()) {
            (Some((host, port)), None) => {
                host.eq_ignore_ascii_case(&self.host)
                    && port.parse::<u16>().ok() == self.effective_port()
            }
            _ => false,
        }
    }

    /// Build an absolute upstream URL from a path (plus optional query).
    pub fn join(&self, path_and_query: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}{}", self.origin, path_and_query))
    }
}

/// Local path prefix under which upstream paths are re-rooted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountPrefix(String);

impl MountPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self(prefix.trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when a root-relative reference already points inside the mount.
    pub fn contains(&self, reference: &str) -> bool {
        if self.0.is_empty() {
            return true;
        }
        match reference.strip_prefix(self.0.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with(|c: char| matches!(c, '/' | '?' | '#')),
            None => false,
        }
    }

    /// Remove the mount from a request path. `None` when the path is outside it.
    pub fn strip<'p>(&self, path: &'p str) -> Option<&'p str> {
        if self.0.is_empty() {
            return Some(path);
        }
        match path.strip_prefix(self.0.as_str()) {
            Some("") => Some("/"),
            Some(rest) if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }
}

/// Maps single URL references from upstream space into mirror space.
#[derive(Debug, Clone, Copy)]
pub struct UrlMapper<'a> {
    pub upstream: &'a UpstreamOrigin,
    pub mount: &'a MountPrefix,
    pub local_origin: &'a str,
}

impl<'a> UrlMapper<'a> {
    /// Rewrite one URL reference. Returns `None` when it must stay as-is:
    /// third-party hosts, relative paths, fragments, other schemes, and
    /// anything already in mirror space.
    pub fn map(&self, raw: &str) -> Option<String> {
        let url = raw.trim();

        let after_slashes = strip_prefix_ignore_case(url, "https://")
            .or_else(|| strip_prefix_ignore_case(url, "http://"))
            .or_else(|| url.strip_prefix("//"));

        if let Some(rest) = after_slashes {
            let end = rest
                .find(|c: char| matches!(c, '/' | '?' | '#'))
                .unwrap_or(rest.len());
            let (authority, tail) = rest.split_at(end);
            if authority.is_empty() || !self.upstream.matches_authority(authority) {
                return None;
            }
            let tail = if tail.starts_with('/') {
                tail.to_string()
            } else {
                format!("/{}", tail)
            };
            return Some(format!("{}{}{}", self.local_origin, self.mount.as_str(), tail));
        }

        if url.starts_with('/') && !self.mount.contains(url) {
            return Some(format!("{}{}", self.mount.as_str(), url));
        }

        None
    }
}

fn strip_prefix_ignore_case<'s>(s: &'s str, prefix: &str) -> Option<&'s str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Quote character and inner value of a `dq`/`sq` alternation.
pub(crate) fn quoted_value<'h>(caps: &Captures<'h>) -> Option<(char, &'h str)> {
    if let Some(m) = caps.name("dq") {
        return Some(('"', m.as_str()));
    }
    caps.name("sq").map(|m| ('\'', m.as_str()))
}
