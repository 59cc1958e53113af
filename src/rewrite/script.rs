//! Script, JSON and plain-text rule: whole-string origin replacement.
//!
//! These formats have no attribute delimiters to anchor on, so only
//! absolute upstream origins are replaced. Root-relative strings are left
//! alone.

use regex::{Captures, Regex};

use crate::rewrite::url::UpstreamOrigin;

/// Matches `http(s)://<upstream>` and its JSON-escaped form
/// `http(s):\/\/<upstream>`, followed by a host boundary.
///
/// A `.` or `:` right after the host ends it unless the host continues
/// (`.` before another label character, `:` before a port digit). The
/// boundary is captured and written back unchanged.
#[derive(Debug, Clone)]
pub struct OriginPattern {
    re: Regex,
}

impl OriginPattern {
    pub fn new(upstream: &UpstreamOrigin) -> Result<Self, regex::Error> {
        let default_port = match (upstream.authority() == upstream.host(), upstream.effective_port()) {
            (true, Some(port)) => format!("(?::{})?", port),
            _ => String::new(),
        };
        let pattern = format!(
            r"(?i)https?:(?P<sep>//|\\/\\/){}{}(?P<next>[^A-Za-z0-9.\-:]|\.(?:[^A-Za-z0-9\-]|$)|:(?:[^0-9]|$)|$)",
            regex::escape(upstream.authority()),
            default_port,
        );
        Ok(Self { re: Regex::new(&pattern)? })
    }

    /// Replace every upstream origin with `local_origin` + `mount`.
    /// `None` when the text holds no upstream origin.
    pub fn replace(&self, text: &str, local_origin: &str, mount: &str) -> Option<String> {
        if !self.re.is_match(text) {
            return None;
        }
        let plain = format!("{}{}", local_origin, mount);
        let escaped = plain.replace('/', "\\/");

        let out = self.re.replace_all(text, |caps: &Captures| {
            let next = caps.name("next").map(|m| m.as_str()).unwrap_or("");
            if &caps["sep"] == "//" {
                format!("{}{}", plain, next)
            } else {
                format!("{}{}", escaped, next)
            }
        });
        Some(out.into_owned())
    }
}
