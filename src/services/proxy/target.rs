//! `/<service>/<remainder...>` parsing and upstream URL construction.
//!
//! The remainder is matched against access permissions and then appended to
//! the backend URL as-is, so it must not contain anything the URL parser would
//! rewrite. Dot segments (`.`, `..` and their `%2e` spellings) and backslashes
//! are rejected rather than resolved.
use axum::http::Uri;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("path has no service segment")]
    MissingService,
    #[error("path contains a dot segment or backslash")]
    UnsafePath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTarget {
    pub service: String,
    /// Always starts with `/`; `/<service>` alone yields `/`.
    pub remainder: String,
    pub query: Option<String>,
}

impl GatewayTarget {
    pub fn parse(uri: &Uri) -> Result<Self, TargetError> {
        let raw = uri.path();
        if raw.contains('\\') || raw.split('/').any(is_dot_segment) {
            return Err(TargetError::UnsafePath);
        }

        let path = raw.strip_prefix('/').ok_or(TargetError::MissingService)?;
        let (service, rest) = match path.split_once('/') {
            Some((service, rest)) => (service, rest),
            None => (path, ""),
        };
        if service.is_empty() {
            return Err(TargetError::MissingService);
        }
        Ok(Self {
            service: service.to_string(),
            remainder: format!("/{}", rest),
            query: uri.query().map(str::to_string),
        })
    }

    /// `base_url` (trailing `/` trimmed) + remainder, with the original query.
    pub fn upstream_url(&self, base_url: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(base_url)?;
        let path = format!("{}{}", url.path().trim_end_matches('/'), self.remainder);
        url.set_path(&path);
        url.set_query(self.query.as_deref());
        Ok(url)
    }
}

/// `.` or `..`, with any dot possibly written as `%2e` / `%2E`.
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.replace("%2e", ".").replace("%2E", ".");
    decoded == "." || decoded == ".."
}
