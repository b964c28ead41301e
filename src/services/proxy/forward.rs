//! Backend request forwarding.
//!
//! The inbound request is replayed against the service's upstream URL with the
//! same method and a streamed body. Hop-by-hop headers never cross the proxy in
//! either direction. The backend response (status, headers, body) is streamed
//! back as-is; redirects are not followed.
//!
//! # Security
//!
//! - `Authorization` is stripped unless `forward_authorization` is set
//! - When `identity_header` is configured, any inbound copy is removed before
//!   the verified identity is written, so callers cannot assert an identity

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::Request;
use axum::response::Response;
use futures_util::TryStreamExt;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::services::auth::VerifiedIdentity;

/// RFC 9110 §7.6.1 connection-specific headers (plus the legacy proxy-connection).
const HOP_BY_HOP_HEADERS: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Bound on waiting for the backend's response head.
    pub backend_timeout: Duration,
    pub connect_timeout: Duration,
    pub forward_authorization: bool,
    pub identity_header: Option<HeaderName>,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            forward_authorization: false,
            identity_header: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream url: {0}")]
    InvalidUpstream(#[from] url::ParseError),
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),
    #[error("backend request failed: {0}")]
    Upstream(reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    config: ForwarderConfig,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub async fn forward(
        &self,
        upstream: Url,
        identity: &VerifiedIdentity,
        req: Request<Body>,
    ) -> Result<Response, ProxyError> {
        let (parts, body) = req.into_parts();
        let client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let headers = self.upstream_headers(&parts.headers, identity, client_ip);
        let mut request = self
            .client
            .request(parts.method, upstream.clone())
            .headers(headers);

        if has_body(&body) {
            request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        debug!(upstream = %upstream, "forwarding request");

        let timeout = self.config.backend_timeout;
        let response = match tokio::time::timeout(timeout, request.send()).await {
            Err(_) => return Err(ProxyError::Timeout(timeout)),
            Ok(Err(err)) if err.is_timeout() => return Err(ProxyError::Timeout(timeout)),
            Ok(Err(err)) => return Err(ProxyError::Upstream(err)),
            Ok(Ok(response)) => response,
        };

        Ok(downstream_response(response))
    }

    fn upstream_headers(
        &self,
        inbound: &HeaderMap,
        identity: &VerifiedIdentity,
        client_ip: Option<IpAddr>,
    ) -> HeaderMap {
        let mut headers = inbound.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        if !self.config.forward_authorization {
            headers.remove(header::AUTHORIZATION);
        }

        if let Some(name) = &self.config.identity_header {
            headers.remove(name);
            match HeaderValue::from_str(&identity.email) {
                Ok(value) => {
                    headers.insert(name.clone(), value);
                }
                Err(_) => warn!(header = %name, "identity is not a valid header value; not forwarded"),
            }
        }

        if let Some(ip) = client_ip {
            let forwarded_for = match inbound.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{}, {}", prior, ip),
                None => ip.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
        if let Some(host) = inbound.get(header::HOST) {
            headers.insert(X_FORWARDED_HOST, host.clone());
        }
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));

        headers
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}

/// Decided from the body, not its framing headers: HTTP/2 requests may carry
/// data with neither `Content-Length` nor `Transfer-Encoding`.
fn has_body(body: &Body) -> bool {
    !body.is_end_stream()
}

fn downstream_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let stream = upstream.bytes_stream().map_err(std::io::Error::other);

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
