//! URL rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! upstream Content-Type
//!     → MediaType::parse (classified once into ContentKind)
//!     → Rewriter::rewrite
//!         Html   → html.rs (attributes, inline styles, inline scripts)
//!         Css    → css.rs (url(), @import)
//!         Script → script.rs (origin replacement)
//!         Binary → untouched
//!     → Rewritten { body, diagnostic }
//! ```
//!
//! # Design Decisions
//! - Pure text transforms; no I/O, no shared state
//! - Only the configured upstream authority is ever rewritten
//! - Output is a fixed point: rewriting it again changes nothing
//! - Decoding problems never fail the request; they are reported back

pub mod css;
pub mod html;
pub mod script;
pub mod url;

use std::borrow::Cow;

use axum::body::Bytes;
use thiserror::Error;

pub use self::script::OriginPattern;
pub use self::url::{MountPrefix, UpstreamOrigin, UrlMapper};

/// Rewrite strategy selected from the response `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    /// JavaScript, JSON and plain text.
    Script,
    /// Everything else, passed through byte for byte.
    Binary,
}

impl ContentKind {
    pub fn is_textual(self) -> bool {
        !matches!(self, ContentKind::Binary)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Css => "css",
            ContentKind::Script => "script",
            ContentKind::Binary => "binary",
        }
    }
}

/// Parsed `Content-Type`: rewrite class plus declared charset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub kind: ContentKind,
    pub charset: Option<String>,
}

impl MediaType {
    pub fn parse(content_type: Option<&str>) -> Self {
        let Some(raw) = content_type else {
            return Self { kind: ContentKind::Binary, charset: None };
        };

        let mut parts = raw.split(';');
        let essence = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let charset = parts.find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
        });

        let kind = match essence.as_str() {
            "text/html" | "application/xhtml+xml" => ContentKind::Html,
            "text/css" => ContentKind::Css,
            "application/javascript"
            | "text/javascript"
            | "application/x-javascript"
            | "application/ecmascript"
            | "text/ecmascript"
            | "application/json"
            | "text/plain" => ContentKind::Script,
            other if other.ends_with("+json") => ContentKind::Script,
            _ => ContentKind::Binary,
        };

        Self { kind, charset }
    }
}

/// Non-fatal problems met while rewriting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteDiagnostic {
    #[error("body is not valid UTF-8, decoded lossily")]
    LossyDecode,

    #[error("unsupported charset {0:?}, body passed through")]
    UnsupportedCharset(String),
}

/// Errors building a rewriter.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("invalid upstream origin: {0}")]
    Upstream(String),

    #[error("invalid origin pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result of one rewrite pass.
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub body: Bytes,
    /// The body went through a text rule (it may still be unchanged).
    pub applied: bool,
    pub diagnostic: Option<RewriteDiagnostic>,
}

impl Rewritten {
    fn passthrough(body: Bytes, diagnostic: Option<RewriteDiagnostic>) -> Self {
        Self { body, applied: false, diagnostic }
    }
}

/// Upstream-bound rewriter. Built once at startup and shared; the local
/// origin varies per request and is passed in.
#[derive(Debug, Clone)]
pub struct Rewriter {
    upstream: UpstreamOrigin,
    mount: MountPrefix,
    origins: OriginPattern,
    inline: bool,
}

impl Rewriter {
    pub fn new(upstream: UpstreamOrigin, mount: MountPrefix, inline: bool) -> Result<Self, RewriteError> {
        let origins = OriginPattern::new(&upstream)?;
        Ok(Self { upstream, mount, origins, inline })
    }

    pub fn upstream(&self) -> &UpstreamOrigin {
        &self.upstream
    }

    pub fn mount(&self) -> &MountPrefix {
        &self.mount
    }

    fn mapper<'a>(&'a self, local_origin: &'a str) -> UrlMapper<'a> {
        UrlMapper { upstream: &self.upstream, mount: &self.mount, local_origin }
    }

    /// Map a single URL reference (e.g. a `Location` value).
    pub fn map_url(&self, raw: &str, local_origin: &str) -> Option<String> {
        self.mapper(local_origin).map(raw)
    }

    /// Apply the script rule to a free-form string such as a header value.
    pub fn rewrite_text<'t>(&self, text: &'t str, local_origin: &str) -> Cow<'t, str> {
        match self.origins.replace(text, local_origin, self.mount.as_str()) {
            Some(out) => Cow::Owned(out),
            None => Cow::Borrowed(text),
        }
    }

    /// Rewrite a response body according to its media type.
    pub fn rewrite(&self, body: Bytes, media: &MediaType, local_origin: &str) -> Rewritten {
        if !media.kind.is_textual() {
            return Rewritten::passthrough(body, None);
        }

        let source = body.clone();
        let (text, lossy) = match decode(&source, media.charset.as_deref()) {
            Ok(decoded) => decoded,
            Err(diagnostic) => return Rewritten::passthrough(body, Some(diagnostic)),
        };

        let mapper = self.mapper(local_origin);
        let out = match media.kind {
            ContentKind::Html => html::rewrite_html(&text, &mapper, self.inline.then_some(&self.origins)),
            ContentKind::Css => css::rewrite_css(&text, &mapper),
            ContentKind::Script => self.origins.replace(&text, local_origin, self.mount.as_str()),
            ContentKind::Binary => None,
        };

        let diagnostic = lossy.then_some(RewriteDiagnostic::LossyDecode);
        let body = match out {
            Some(rewritten) => Bytes::from(rewritten),
            None if lossy => Bytes::from(text.into_owned()),
            None => body,
        };

        Rewritten { body, applied: true, diagnostic }
    }
}

/// Decode a textual body. Invalid UTF-8 is replaced, unknown charsets refuse.
fn decode<'b>(body: &'b [u8], charset: Option<&str>) -> Result<(Cow<'b, str>, bool), RewriteDiagnostic> {
    match charset {
        None | Some("utf-8") | Some("utf8") | Some("us-ascii") | Some("ascii") => {}
        Some(other) => return Err(RewriteDiagnostic::UnsupportedCharset(other.to_string())),
    }

    match std::str::from_utf8(body) {
        Ok(text) => Ok((Cow::Borrowed(text), false)),
        Err(_) => Ok((String::from_utf8_lossy(body), true)),
    }
}

/// One-shot rewrite without a prebuilt [`Rewriter`].
pub fn rewrite(
    body: &[u8],
    content_type: &str,
    upstream_origin: &str,
    local_origin: &str,
    mount_prefix: &str,
) -> Result<Rewritten, RewriteError> {
    let upstream = UpstreamOrigin::parse(upstream_origin).map_err(RewriteError::Upstream)?;
    let rewriter = Rewriter::new(upstream, MountPrefix::new(mount_prefix), true)?;
    let media = MediaType::parse(Some(content_type));
    Ok(rewriter.rewrite(Bytes::copy_from_slice(body), &media, local_origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPSTREAM: &str = "https://portal.example.org";
    const LOCAL: &str = "https://mirror.test";

    #[test]
    fn test_classification() {
        assert_eq!(MediaType::parse(Some("text/html; charset=UTF-8")).kind, ContentKind::Html);
        assert_eq!(MediaType::parse(Some("text/html; charset=UTF-8")).charset.as_deref(), Some("utf-8"));
        assert_eq!(MediaType::parse(Some("TEXT/CSS")).kind, ContentKind::Css);
        assert_eq!(MediaType::parse(Some("application/javascript")).kind, ContentKind::Script);
        assert_eq!(MediaType::parse(Some("application/vnd.api+json")).kind, ContentKind::Script);
        assert_eq!(MediaType::parse(Some("text/plain")).kind, ContentKind::Script);
        assert_eq!(MediaType::parse(Some("image/png")).kind, ContentKind::Binary);
        assert_eq!(MediaType::parse(None).kind, ContentKind::Binary);
    }

    #[test]
    fn test_href_property_and_idempotence() {
        let out = rewrite(br#"<a href="/x">"#, "text/html", UPSTREAM, LOCAL, "/proxy").unwrap();
        assert_eq!(&out.body[..], br#"<a href="/proxy/x">"#);
        let again = rewrite(&out.body, "text/html", UPSTREAM, LOCAL, "/proxy").unwrap();
        assert_eq!(again.body, out.body);
    }

    #[test]
    fn test_binary_is_byte_identical() {
        let png: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0xff, 0x00, b'/', b'x'];
        let out = rewrite(png, "image/png", UPSTREAM, LOCAL, "/proxy").unwrap();
        assert_eq!(&out.body[..], png);
        assert!(!out.applied);
        assert!(out.diagnostic.is_none());
    }

    #[test]
    fn test_lossy_decode_reports() {
        let mut body = br#"<a href="/x">"#.to_vec();
        body.push(0xff);
        let out = rewrite(&body, "text/html", UPSTREAM, LOCAL, "/proxy").unwrap();
        assert_eq!(out.diagnostic, Some(RewriteDiagnostic::LossyDecode));
        assert!(String::from_utf8(out.body.to_vec()).unwrap().starts_with(r#"<a href="/proxy/x">"#));
    }

    #[test]
    fn test_unsupported_charset_passes_through() {
        let body = b"<a href=\"/x\">\xe9t\xe9</a>";
        let out = rewrite(body, "text/html; charset=iso-8859-1", UPSTREAM, LOCAL, "/proxy").unwrap();
        assert_eq!(&out.body[..], &body[..]);
        assert_eq!(
            out.diagnostic,
            Some(RewriteDiagnostic::UnsupportedCharset("iso-8859-1".into()))
        );
    }

    #[test]
    fn test_script_rule_skips_root_relative() {
        let js = br#"fetch("/api"); go("https://portal.example.org/home")"#;
        let out = rewrite(js, "text/javascript", UPSTREAM, LOCAL, "/proxy").unwrap();
        assert_eq!(&out.body[..], br#"fetch("/api"); go("https://mirror.test/proxy/home")"#);
    }

    #[test]
    fn test_origin_in_prose_rewritten() {
        let html = b"<p>Sign in at https://portal.example.org.</p>";
        let out = rewrite(html, "text/html", UPSTREAM, LOCAL, "/proxy").unwrap();
        assert_eq!(&out.body[..], &b"<p>Sign in at https://mirror.test/proxy.</p>"[..]);
    }

    #[test]
    fn test_unchanged_text_keeps_bytes() {
        let css = b"body { color: red }";
        let out = rewrite(css, "text/css", UPSTREAM, LOCAL, "/proxy").unwrap();
        assert!(out.applied);
        assert_eq!(&out.body[..], css);
    }
}
