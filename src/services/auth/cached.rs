//! Verification cache in front of any `TokenVerifier`.
//!
//! - Key: `authn:` + base64url(SHA-256(token)); the raw token is never stored
//! - TTL: min(max_ttl, expiry - now), whole seconds; tokens without a known
//!   expiry (or with less than a second left) are not cached
//! - Failed verifications are never cached
//! - Cache backend errors are logged and fall through to full verification
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::services::auth::verifier::{AuthenticationError, TokenVerifier, VerifiedIdentity};
use crate::services::cache::CacheClient;

const KEY_PREFIX: &str = "authn";

#[derive(Debug, Serialize, Deserialize)]
struct CachedIdentity {
    email: String,
    exp: u64,
}

pub struct CachingVerifier<C: CacheClient> {
    inner: Arc<dyn TokenVerifier>,
    cache: C,
    max_ttl: Duration,
}

impl<C: CacheClient> CachingVerifier<C> {
    pub fn new(inner: Arc<dyn TokenVerifier>, cache: C, max_ttl: Duration) -> Self {
        Self {
            inner,
            cache,
            max_ttl,
        }
    }

    pub fn cache_key(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        format!("{}:{}", KEY_PREFIX, URL_SAFE_NO_PAD.encode(digest))
    }

    async fn lookup(&self, key: &str, now: u64) -> Option<VerifiedIdentity> {
        let raw = match self.cache.get_string(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(backend = self.cache.backend_name(), error = %err, "verification cache read failed");
                return None;
            }
        };

        let cached: CachedIdentity = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(error = %err, "dropping unreadable verification cache entry");
                if let Err(err) = self.cache.del(key).await {
                    warn!(backend = self.cache.backend_name(), error = %err, "verification cache evict failed");
                }
                return None;
            }
        };
        // Backends with whole-second TTLs may return an entry slightly late.
        (cached.exp > now).then(|| VerifiedIdentity {
            email: cached.email,
            expires_at: Some(cached.exp),
        })
    }

    async fn store(&self, key: &str, identity: &VerifiedIdentity, now: u64) {
        let Some(exp) = identity.expires_at else {
            return;
        };
        let Some(ttl) = cache_ttl(exp, now, self.max_ttl) else {
            return;
        };

        let value = CachedIdentity {
            email: identity.email.clone(),
            exp,
        };
        let Ok(raw) = serde_json::to_string(&value) else {
            return;
        };

        if let Err(err) = self.cache.set_with_ttl(key, &raw, ttl).await {
            warn!(backend = self.cache.backend_name(), error = %err, "verification cache write failed");
        }
    }
}

/// Whole seconds the entry may live; `None` when not worth caching.
pub fn cache_ttl(expires_at: u64, now: u64, max_ttl: Duration) -> Option<Duration> {
    let remaining = expires_at.checked_sub(now)?;
    let secs = remaining.min(max_ttl.as_secs());
    (secs >= 1).then(|| Duration::from_secs(secs))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[async_trait]
impl<C: CacheClient> TokenVerifier for CachingVerifier<C> {
    async fn verify(&self, raw_token: &str) -> Result<VerifiedIdentity, AuthenticationError> {
        let key = Self::cache_key(raw_token);

        if let Some(identity) = self.lookup(&key, unix_now()).await {
            return Ok(identity);
        }

        let identity = self.inner.verify(raw_token).await?;
        self.store(&key, &identity, unix_now()).await;
        Ok(identity)
    }
}
