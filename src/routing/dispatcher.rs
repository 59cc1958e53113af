//! Maps an incoming request URI onto the upstream site.

use axum::http::Uri;
use url::Url;

use crate::rewrite::{MountPrefix, UpstreamOrigin};

/// Resolves browser paths to upstream URLs.
///
/// Immutable after construction and shared across requests.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    upstream: UpstreamOrigin,
    mount: MountPrefix,
    landing_path: Option<String>,
}

impl Dispatcher {
    pub fn new(upstream: UpstreamOrigin, mount: MountPrefix, landing_path: Option<String>) -> Self {
        Self { upstream, mount, landing_path }
    }

    /// Target URL for a request. The mount is optional on the way in, so
    /// `/a` and `<mount>/a` resolve identically.
    pub fn resolve(&self, uri: &Uri) -> Result<Url, url::ParseError> {
        let path = uri.path();
        let mut path = self.mount.strip(path).unwrap_or(path);
        if path == "/" {
            if let Some(landing) = self.landing_path.as_deref() {
                path = landing;
            }
        }

        match uri.query() {
            Some(query) => self.upstream.join(&format!("{}?{}", path, query)),
            None => self.upstream.join(path),
        }
    }
}
