//! OIDC bearer-token verification.
//!
//! The issuer is discovered once at startup (`/.well-known/openid-configuration`)
//! and its JWKS is cached for the life of the process. A token whose `kid` is not
//! in the cached set triggers a re-fetch, at most once per `jwks_min_refresh`,
//! so key rotation is picked up without letting callers hammer the issuer.
//!
//! Tokens that are not JWTs are handed to the introspection endpoint when a
//! client secret is configured, and rejected otherwise.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::services::auth::introspection::Introspector;
use crate::services::auth::verifier::{AuthenticationError, TokenVerifier, VerifiedIdentity};

/// Issuer settings, passed explicitly to the verifier at construction.
#[derive(Clone, Debug)]
pub struct OidcConfig {
    pub issuer_url: String,
    /// Expected `aud`, and the client used for introspection.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Claim whose value is the caller's identity.
    pub identity_claim: String,
    pub verify_audience: bool,
    pub leeway_seconds: u64,
    pub http_timeout: Duration,
    pub jwks_min_refresh: Duration,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer_url: String::new(),
            client_id: None,
            client_secret: None,
            identity_claim: "email".to_string(),
            verify_audience: true,
            leeway_seconds: 60,
            http_timeout: Duration::from_secs(5),
            jwks_min_refresh: Duration::from_secs(60),
        }
    }
}

/// Startup failures while discovering the issuer. Fatal for the process.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },
    #[error("no usable keys in JWKS")]
    EmptyKeySet,
}

/// OIDC discovery document (fields we use)
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    jwks_uri: String,
    #[serde(default)]
    introspection_endpoint: Option<String>,
}

/// Claims needed from the access token. `iss`/`aud` are checked by `Validation`.
#[derive(Debug, Clone, Deserialize)]
struct IdentityClaims {
    exp: u64,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

pub(crate) fn string_claim(
    claims: &HashMap<String, serde_json::Value>,
    name: &str,
) -> Result<String, AuthenticationError> {
    claims
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthenticationError::MissingClaim(name.to_string()))
}

/// Without a `kid`, only an unambiguous single-key set is usable.
fn find_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}

pub struct OidcVerifier {
    config: OidcConfig,
    jwks_uri: Option<String>,
    keys: RwLock<JwkSet>,
    /// Held for the whole refresh; readers of `keys` never wait on it.
    last_refresh: Mutex<Instant>,
    introspector: Option<Introspector>,
    http: reqwest::Client,
}

impl std::fmt::Debug for OidcVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print client secret
        f.debug_struct("OidcVerifier")
            .field("issuer", &self.config.issuer_url)
            .field("jwks_uri", &self.jwks_uri)
            .field("introspection", &self.introspector.is_some())
            .finish()
    }
}

impl OidcVerifier {
    /// Discover the issuer and load its signing keys.
    pub async fn discover(config: OidcConfig) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            config.issuer_url.trim_end_matches('/')
        );
        debug!(url = %discovery_url, "fetching OIDC discovery document");

        let discovery: DiscoveryDocument = fetch_json(&http, &discovery_url).await?;
        if discovery.issuer != config.issuer_url {
            return Err(DiscoveryError::IssuerMismatch {
                expected: config.issuer_url.clone(),
                actual: discovery.issuer,
            });
        }

        let keys: JwkSet = fetch_json(&http, &discovery.jwks_uri).await?;
        if keys.keys.is_empty() {
            return Err(DiscoveryError::EmptyKeySet);
        }

        let introspector = match (
            discovery.introspection_endpoint,
            &config.client_id,
            &config.client_secret,
        ) {
            (Some(endpoint), Some(id), Some(secret)) => Some(Introspector::new(
                http.clone(),
                endpoint,
                id.clone(),
                secret.clone(),
                config.issuer_url.clone(),
            )),
            _ => None,
        };

        info!(
            issuer = %config.issuer_url,
            key_count = keys.keys.len(),
            introspection = introspector.is_some(),
            "OIDC issuer discovered"
        );

        Ok(Self {
            config,
            jwks_uri: Some(discovery.jwks_uri),
            keys: RwLock::new(keys),
            last_refresh: Mutex::new(Instant::now()),
            introspector,
            http,
        })
    }

    /// Verifier over a fixed key set (no discovery, no refresh).
    pub fn with_key_set(config: OidcConfig, keys: JwkSet) -> Self {
        Self {
            config,
            jwks_uri: None,
            keys: RwLock::new(keys),
            last_refresh: Mutex::new(Instant::now()),
            introspector: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.set_issuer(&[&self.config.issuer_url]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = self.config.leeway_seconds;

        match (&self.config.client_id, self.config.verify_audience) {
            (Some(client_id), true) => validation.set_audience(&[client_id]),
            _ => validation.validate_aud = false,
        }

        validation
    }

    async fn verify_jwt(
        &self,
        token: &str,
        alg: Algorithm,
        kid: Option<String>,
    ) -> Result<VerifiedIdentity, AuthenticationError> {
        if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AuthenticationError::UnsupportedAlgorithm);
        }

        let key = self.decoding_key(kid).await?;
        let data = decode::<IdentityClaims>(token, &key, &self.validation(alg))?;
        let email = string_claim(&data.claims.extra, &self.config.identity_claim)?;

        Ok(VerifiedIdentity {
            email,
            expires_at: Some(data.claims.exp),
        })
    }

    async fn decoding_key(&self, kid: Option<String>) -> Result<DecodingKey, AuthenticationError> {
        {
            let keys = self.keys.read().await;
            if let Some(jwk) = find_key(&keys, kid.as_deref()) {
                return DecodingKey::from_jwk(jwk).map_err(AuthenticationError::Rejected);
            }
        }

        self.refresh_keys().await?;

        let keys = self.keys.read().await;
        let jwk = find_key(&keys, kid.as_deref())
            .ok_or_else(|| AuthenticationError::UnknownKey(kid.clone()))?;
        DecodingKey::from_jwk(jwk).map_err(AuthenticationError::Rejected)
    }

    /// Re-fetch the JWKS unless it was fetched within `jwks_min_refresh`.
    async fn refresh_keys(&self) -> Result<(), AuthenticationError> {
        let Some(jwks_uri) = &self.jwks_uri else {
            return Ok(());
        };

        // Concurrent misses queue here and find the stamp already fresh.
        let mut last_refresh = self.last_refresh.lock().await;
        if last_refresh.elapsed() < self.config.jwks_min_refresh {
            return Ok(());
        }

        // Stamp before fetching so a failing issuer is not retried on every request.
        *last_refresh = Instant::now();
        match fetch_json::<JwkSet>(&self.http, jwks_uri).await {
            Ok(keys) if !keys.keys.is_empty() => {
                info!(key_count = keys.keys.len(), "refreshed JWKS");
                *self.keys.write().await = keys;
                Ok(())
            }
            Ok(_) => {
                warn!("issuer returned an empty JWKS; keeping previous keys");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "JWKS refresh failed");
                Err(AuthenticationError::IssuerUnavailable(err.to_string()))
            }
        }
    }
}

#[async_trait]
impl TokenVerifier for OidcVerifier {
    async fn verify(&self, raw_token: &str) -> Result<VerifiedIdentity, AuthenticationError> {
        match decode_header(raw_token) {
            Ok(header) => self.verify_jwt(raw_token, header.alg, header.kid).await,
            Err(err) => match &self.introspector {
                Some(introspector) => {
                    introspector
                        .introspect(raw_token, &self.config.identity_claim)
                        .await
                }
                None => Err(AuthenticationError::Malformed(err.to_string())),
            },
        }
    }
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
) -> Result<T, DiscoveryError> {
    let fetch_err = |reason: String| DiscoveryError::Fetch {
        url: url.to_string(),
        reason,
    };

    http.get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| fetch_err(e.to_string()))?
        .json::<T>()
        .await
        .map_err(|e| fetch_err(e.to_string()))
}
